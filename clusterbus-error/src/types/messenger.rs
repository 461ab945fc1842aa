use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки мессенджера.
#[derive(Debug, Clone)]
pub enum MessengerError {
    /// Операция вызвана до `register()`: канал ещё не вычислен
    NotRegistered,
    /// За отведённое время ответ на запрос не пришёл
    RequestTimeout { channel: String, correlation_id: String },
    /// Запрос с таким идентификатором уже ожидает ответа
    DuplicateCorrelationId { correlation_id: String },
    /// Не удалось закодировать конверт
    EncodeFailed { reason: String },
    /// Не удалось разобрать входящий конверт
    DecodeFailed { reason: String },
}

impl std::fmt::Display for MessengerError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::NotRegistered => write!(f, "Messenger is not registered"),
            Self::RequestTimeout {
                channel,
                correlation_id,
            } => write!(
                f,
                "Request {correlation_id} on '{channel}' received no response in time"
            ),
            Self::DuplicateCorrelationId { correlation_id } => {
                write!(f, "Request {correlation_id} is already pending")
            }
            Self::EncodeFailed { reason } => write!(f, "Envelope encoding failed: {reason}"),
            Self::DecodeFailed { reason } => write!(f, "Envelope decoding failed: {reason}"),
        }
    }
}

impl std::error::Error for MessengerError {}

impl ErrorExt for MessengerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotRegistered => StatusCode::NotRegistered,
            Self::RequestTimeout { .. } => StatusCode::RequestTimeout,
            Self::DuplicateCorrelationId { .. } => StatusCode::InvalidArgs,
            Self::EncodeFailed { .. } => StatusCode::SerializationFailed,
            Self::DecodeFailed { .. } => StatusCode::DeserializationFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::DecodeFailed { .. } | Self::EncodeFailed { .. } => {
                "Message format error".to_string()
            }
            _ => self.to_string(),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "messenger".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        if let Self::RequestTimeout { channel, .. } = self {
            tags.push(("channel", channel.clone()));
        }

        tags
    }
}
