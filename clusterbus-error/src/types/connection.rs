use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки пула соединений и транспорта брокера.
#[derive(Debug, Clone)]
pub enum ConnectionError {
    /// Пул закрыт, новые соединения не выдаются
    PoolClosed,
    /// Свободное соединение не появилось за отведённое время
    PoolExhausted { max_connections: usize, waited_ms: u64 },
    /// Брокер недоступен
    ConnectionFailed { reason: String },
    /// Подписка закрыта брокером (разрыв соединения)
    SubscriptionClosed { channel: String },
    /// Подписчик отстал и пропустил сообщения
    Lagged { channel: String, skipped: u64 },
}

impl std::fmt::Display for ConnectionError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::PoolClosed => write!(f, "Connection pool is closed"),
            Self::PoolExhausted {
                max_connections,
                waited_ms,
            } => write!(
                f,
                "No free connection after {waited_ms}ms (pool size {max_connections})"
            ),
            Self::ConnectionFailed { reason } => write!(f, "Broker connection failed: {reason}"),
            Self::SubscriptionClosed { channel } => {
                write!(f, "Subscription to '{channel}' closed by broker")
            }
            Self::Lagged { channel, skipped } => {
                write!(f, "Subscriber of '{channel}' lagged behind by {skipped} messages")
            }
        }
    }
}

impl std::error::Error for ConnectionError {}

impl ErrorExt for ConnectionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::PoolClosed => StatusCode::PoolClosed,
            Self::PoolExhausted { .. } => StatusCode::TooManyConnections,
            Self::ConnectionFailed { .. } => StatusCode::ConnectionFailed,
            Self::SubscriptionClosed { .. } => StatusCode::ConnectionClosed,
            Self::Lagged { .. } => StatusCode::RateLimited,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "connection".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::SubscriptionClosed { channel } | Self::Lagged { channel, .. } => {
                tags.push(("channel", channel.clone()));
            }
            Self::PoolExhausted {
                max_connections, ..
            } => {
                tags.push(("pool_size", max_connections.to_string()));
            }
            _ => {}
        }

        tags
    }
}

/// Конвертация из tokio::sync::broadcast::error::RecvError.
///
/// Имя канала здесь неизвестно, вызывающий код подставляет его сам через
/// [`ConnectionError::from_recv`].
#[cfg(feature = "tokio")]
impl ConnectionError {
    pub fn from_recv(
        channel: &str,
        err: tokio::sync::broadcast::error::RecvError,
    ) -> Self {
        match err {
            tokio::sync::broadcast::error::RecvError::Closed => Self::SubscriptionClosed {
                channel: channel.to_string(),
            },
            tokio::sync::broadcast::error::RecvError::Lagged(n) => Self::Lagged {
                channel: channel.to_string(),
                skipped: n,
            },
        }
    }
}
