use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки хранилища ключ–значение.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// Нулевой или слишком большой TTL
    InvalidTtl { key: String, reason: String },
    /// Невалидный glob-шаблон при сканировании ключей
    InvalidPattern { pattern: String, reason: String },
}

impl std::fmt::Display for StorageError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::InvalidTtl { key, reason } => write!(f, "Invalid TTL for '{key}': {reason}"),
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid key pattern '{pattern}': {reason}")
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl ErrorExt for StorageError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidTtl { .. } => StatusCode::InvalidValue,
            Self::InvalidPattern { .. } => StatusCode::InvalidArgs,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "storage".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        if let Self::InvalidTtl { key, .. } = self {
            tags.push(("key", key.clone()));
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_ttl() {
        let err = StorageError::InvalidTtl {
            key: "session".to_string(),
            reason: "ttl must be at least one second".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::InvalidValue);
        assert!(err.to_string().contains("session"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = StorageError::InvalidPattern {
            pattern: "lobby:[".to_string(),
            reason: "unclosed character class".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::InvalidArgs);
        assert!(err.metrics_tags().iter().all(|(k, _)| *k != "key"));
    }
}
