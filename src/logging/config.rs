use std::{fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Уровни, которые принимает `level`.
const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Формат вывода событий.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(LoggingError::InvalidFormat(other.to_string())),
        }
    }
}

/// Ошибки настройки логирования.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unknown log level `{0}`")]
    InvalidLevel(String),
    #[error("unknown log format `{0}`")]
    InvalidFormat(String),
    #[error("file logging is enabled but `file_name` is empty")]
    EmptyFileName,
    #[error("log directory is not usable: {0}")]
    Io(#[from] io::Error),
    #[error("global subscriber is already set: {0}")]
    AlreadyInitialized(String),
}

/// Настройки логирования (секция `[logging]`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень для событий этого крейта: trace/debug/info/warn/error/off
    pub level: String,
    /// Формат консоли и файла
    pub format: LogFormat,
    /// Писать в stdout
    pub console_enabled: bool,
    /// ANSI-цвета в консоли
    pub with_ansi: bool,
    /// Показывать target события
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
    /// Писать в файл с ежедневной ротацией
    pub file_enabled: bool,
    /// Каталог для файлов логов
    pub log_dir: PathBuf,
    /// Базовое имя файла; к нему добавляется дата
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            console_enabled: true,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            file_name: "clusterbus.log".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Применяет переопределения из окружения:
    /// `CLUSTERBUS_LOG_LEVEL`, `CLUSTERBUS_LOG_FORMAT`, `NO_COLOR`.
    ///
    /// Непонятный формат игнорируется, уровень проверит `validate`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("CLUSTERBUS_LOG_LEVEL") {
            self.level = level;
        }
        if let Ok(format) = std::env::var("CLUSTERBUS_LOG_FORMAT") {
            if let Ok(format) = format.parse() {
                self.format = format;
            }
        }
        if std::env::var_os("NO_COLOR").is_some() {
            self.with_ansi = false;
        }
    }

    pub fn validate(&self) -> Result<(), LoggingError> {
        let level = self.level.to_ascii_lowercase();
        if !LEVELS.contains(&level.as_str()) {
            return Err(LoggingError::InvalidLevel(self.level.clone()));
        }
        if self.file_enabled && self.file_name.trim().is_empty() {
            return Err(LoggingError::EmptyFileName);
        }
        Ok(())
    }

    /// Директива для `EnvFilter`: сторонние крейты на `warn`, наши на
    /// `level`.
    pub fn build_filter_directive(&self) -> String {
        let level = self.level.to_ascii_lowercase();
        format!("warn,clusterbus={level},clusterbus_error={level}")
    }

    /// Создаёт каталог логов, если включён файловый вывод.
    pub fn ensure_log_dir(&self) -> Result<(), LoggingError> {
        if self.file_enabled {
            fs::create_dir_all(&self.log_dir)?;
        }
        Ok(())
    }
}
