use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Идентификатор, связывающий запрос с ответом.
pub type CorrelationId = Uuid;

/// Тип сообщения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Normal,
    Request,
    Response,
}

/// Конверт, в котором сообщение путешествует по каналу.
///
/// На проводе это JSON-объект вида
/// `{"type": "REQUEST", "identifier": "<uuid>", "JSON": "<payload>"}`.
/// У `NORMAL` идентификатора нет; лишние поля при разборе игнорируются,
/// поэтому `"identifier": null` тоже допустим.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Envelope {
    Normal {
        #[serde(rename = "JSON")]
        payload: String,
    },
    Request {
        identifier: CorrelationId,
        #[serde(rename = "JSON")]
        payload: String,
    },
    Response {
        identifier: CorrelationId,
        #[serde(rename = "JSON")]
        payload: String,
    },
}

impl Envelope {
    pub fn normal(payload: impl Into<String>) -> Self {
        Self::Normal {
            payload: payload.into(),
        }
    }

    pub fn request(
        identifier: CorrelationId,
        payload: impl Into<String>,
    ) -> Self {
        Self::Request {
            identifier,
            payload: payload.into(),
        }
    }

    pub fn response(
        identifier: CorrelationId,
        payload: impl Into<String>,
    ) -> Self {
        Self::Response {
            identifier,
            payload: payload.into(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Normal { .. } => MessageKind::Normal,
            Self::Request { .. } => MessageKind::Request,
            Self::Response { .. } => MessageKind::Response,
        }
    }

    /// Идентификатор корреляции; `None` только у `NORMAL`.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        match self {
            Self::Normal { .. } => None,
            Self::Request { identifier, .. } | Self::Response { identifier, .. } => {
                Some(*identifier)
            }
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            Self::Normal { payload }
            | Self::Request { payload, .. }
            | Self::Response { payload, .. } => payload,
        }
    }
}
