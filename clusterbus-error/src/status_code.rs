use std::fmt;

use num_enum::TryFromPrimitive;

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных
/// - 4xxx: Ограничения (пул, отставание подписчика)
/// - 5xxx: Хранилище и сериализация
/// - 6xxx: Сеть / брокер
/// - 9xxx: Обмен сообщениями
///
/// `num_enum::TryFromPrimitive` даёт реализацию `TryFrom<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,

    // === 2xxx: Ошибки данных ===
    NotFound = 2000,
    InvalidKey = 2003,
    InvalidValue = 2004,
    WrongType = 2007,

    // === 4xxx: Ограничения ===
    RateLimited = 4000,
    TooManyConnections = 4002,

    // === 5xxx: Хранилище ===
    StorageUnavailable = 5000,
    SerializationFailed = 5003,
    DeserializationFailed = 5004,

    // === 6xxx: Сеть/брокер ===
    Io = 6000,
    ConnectionClosed = 6001,
    Timeout = 6002,
    ConnectionFailed = 6004,
    PoolClosed = 6008,

    // === 9xxx: Обмен сообщениями ===
    NotRegistered = 9000,
    RequestTimeout = 9001,
}

/// Рекомендуемый уровень логирования.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Имеет ли смысл повторить операцию с этим кодом.
    ///
    /// Транспортные ошибки повторяет цикл подписки; публикации сам
    /// мессенджер не повторяет, это решает вызывающий код.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::StorageUnavailable
                | Self::RateLimited
                | Self::TooManyConnections
                | Self::ConnectionFailed
                | Self::ConnectionClosed
        )
    }

    /// Транспортная ошибка (диапазон 6xxx).
    pub fn is_transport_error(&self) -> bool {
        (6000..=6999).contains(&self.code())
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Internal | Self::StorageUnavailable)
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::NotFound => LogLevel::Debug,
            Self::InvalidArgs
            | Self::InvalidKey
            | Self::InvalidValue
            | Self::WrongType
            | Self::NotRegistered => LogLevel::Info,
            Self::RateLimited
            | Self::Timeout
            | Self::RequestTimeout
            | Self::ConnectionClosed
            | Self::ConnectionFailed => LogLevel::Warn,
            Self::Internal | Self::StorageUnavailable => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что retryable-коды помечаются корректно.
    #[test]
    fn test_retryable() {
        assert!(StatusCode::Timeout.is_retryable());
        assert!(StatusCode::ConnectionFailed.is_retryable());
        assert!(!StatusCode::PoolClosed.is_retryable());
        assert!(!StatusCode::InvalidArgs.is_retryable());
    }

    /// Тест проверяет диапазон транспортных ошибок.
    #[test]
    fn test_transport_range() {
        assert!(StatusCode::PoolClosed.is_transport_error());
        assert!(StatusCode::ConnectionClosed.is_transport_error());
        assert!(!StatusCode::RequestTimeout.is_transport_error());
    }

    /// Тест проверяет конвертацию через `TryFrom<u32>` и `from_u32`.
    #[test]
    fn test_from_try_from_u32() {
        let n = StatusCode::RequestTimeout.code();
        assert_eq!(StatusCode::try_from(n).unwrap(), StatusCode::RequestTimeout);
        assert!(StatusCode::from_u32(99999).is_none());
    }

    /// Тест проверяет числовое представление и `From<StatusCode> for u32`.
    #[test]
    fn test_code_and_into() {
        let n: u32 = StatusCode::NotFound.into();
        assert_eq!(n, 2000);
        assert!(StatusCode::is_success(StatusCode::Success.code()));
        assert!(!StatusCode::is_success(n));
    }

    /// Тест проверяет уровни логирования.
    #[test]
    fn test_log_level_mappings() {
        assert_eq!(StatusCode::Success.log_level(), LogLevel::Trace);
        assert_eq!(StatusCode::RequestTimeout.log_level(), LogLevel::Warn);
        assert_eq!(StatusCode::Internal.log_level(), LogLevel::Error);
    }

    /// Тест проверяет формат `Display`: имя варианта и числовой код.
    #[test]
    fn test_display_contains_name_and_code() {
        let s = format!("{}", StatusCode::PoolClosed);
        assert!(s.contains("PoolClosed"), "got: {s}");
        assert!(s.contains("6008"), "got: {s}");
    }
}
