use std::{path::Path, time::Duration};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    connection::PoolConfig,
    logging::{LoggingConfig, LoggingError},
};

/// Префикс переменных окружения: `CLUSTERBUS__POOL__MAX_CONNECTIONS=8`.
pub const ENV_PREFIX: &str = "CLUSTERBUS";

/// Ошибки загрузки настроек.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    Logging(#[from] LoggingError),
}

/// Секция `[pool]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolSettings {
    pub max_connections: usize,
    pub acquire_timeout_ms: u64,
    pub channel_capacity: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        let defaults = PoolConfig::default();
        Self {
            max_connections: defaults.max_connections,
            acquire_timeout_ms: defaults.acquire_timeout.as_millis() as u64,
            channel_capacity: defaults.channel_capacity,
        }
    }
}

impl PoolSettings {
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Секция `[messenger]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MessengerSettings {
    /// Пауза перед повторной подпиской
    pub reconnect_backoff_ms: u64,
    /// Таймаут запроса по умолчанию
    pub request_timeout_ms: u64,
}

impl Default for MessengerSettings {
    fn default() -> Self {
        Self {
            reconnect_backoff_ms: 5_000,
            request_timeout_ms: 3_000,
        }
    }
}

impl MessengerSettings {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Настройки узла.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Префикс кластера, например `"lobby:"`
    pub cluster: String,
    pub pool: PoolSettings,
    pub messenger: MessengerSettings,
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cluster: "default:".to_string(),
            pool: PoolSettings::default(),
            messenger: MessengerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Загружает настройки: значения по умолчанию, затем TOML-файл (если
    /// указан), затем переменные окружения `CLUSTERBUS__*`.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            // Значения по умолчанию
            .set_default("cluster", "default:")?
            .set_default("messenger.reconnect_backoff_ms", 5_000)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.cluster.is_empty() {
            return Err(SettingsError::Invalid {
                field: "cluster",
                reason: "cluster prefix cannot be empty".to_string(),
            });
        }
        if self.pool.max_connections == 0 {
            return Err(SettingsError::Invalid {
                field: "pool.max_connections",
                reason: "at least one connection is required".to_string(),
            });
        }
        if self.pool.channel_capacity == 0 {
            return Err(SettingsError::Invalid {
                field: "pool.channel_capacity",
                reason: "channel buffer cannot be empty".to_string(),
            });
        }
        if self.messenger.reconnect_backoff_ms == 0 {
            return Err(SettingsError::Invalid {
                field: "messenger.reconnect_backoff_ms",
                reason: "reconnect backoff must be positive".to_string(),
            });
        }
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serial_test::serial;
    use tempfile::Builder;

    use super::*;
    use crate::logging::LogFormat;

    fn clear_env() {
        for (key, _) in std::env::vars() {
            if key.starts_with("CLUSTERBUS__") {
                std::env::remove_var(key);
            }
        }
    }

    /// Тест проверяет значения по умолчанию без файла и окружения.
    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(
            settings.messenger.reconnect_backoff(),
            Duration::from_secs(5)
        );
    }

    /// Тест проверяет, что окружение перекрывает файл.
    #[test]
    #[serial]
    fn test_file_then_env() {
        clear_env();
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
cluster = "lobby:"

[pool]
max_connections = 4

[logging]
format = "json"
"#
        )
        .unwrap();

        std::env::set_var("CLUSTERBUS__POOL__MAX_CONNECTIONS", "8");
        std::env::set_var("CLUSTERBUS__MESSENGER__REQUEST_TIMEOUT_MS", "250");
        let settings = Settings::load(Some(file.path()));
        clear_env();
        let settings = settings.unwrap();

        assert_eq!(settings.cluster, "lobby:");
        assert_eq!(settings.pool.max_connections, 8);
        assert_eq!(settings.pool.channel_capacity, 1024);
        assert_eq!(settings.messenger.request_timeout(), Duration::from_millis(250));
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    /// Тест проверяет, что нулевой размер пула отклоняется.
    #[test]
    #[serial]
    fn test_invalid_pool_size() {
        clear_env();
        std::env::set_var("CLUSTERBUS__POOL__MAX_CONNECTIONS", "0");
        let result = Settings::load(None);
        clear_env();

        assert!(matches!(
            result,
            Err(SettingsError::Invalid {
                field: "pool.max_connections",
                ..
            })
        ));
    }

    /// Тест проверяет, что отсутствующий файл является ошибкой.
    #[test]
    #[serial]
    fn test_missing_file() {
        clear_env();
        let result = Settings::load(Some(Path::new("/nonexistent/clusterbus.toml")));
        assert!(matches!(result, Err(SettingsError::Load(_))));
    }

    #[test]
    fn test_pool_config_conversion() {
        let pool = PoolSettings {
            max_connections: 3,
            acquire_timeout_ms: 1500,
            channel_capacity: 64,
        };
        let config = pool.to_pool_config();
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.acquire_timeout, Duration::from_millis(1500));
        assert_eq!(config.channel_capacity, 64);
    }
}
