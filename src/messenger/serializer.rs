use clusterbus_error::{BusResult, MessengerError};

use super::Envelope;

/// Кодек конвертов.
pub trait Serializer: Send + Sync {
    fn serialize(
        &self,
        envelope: &Envelope,
    ) -> BusResult<String>;

    fn deserialize(
        &self,
        raw: &str,
    ) -> BusResult<Envelope>;
}

/// JSON-кодек на `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(
        &self,
        envelope: &Envelope,
    ) -> BusResult<String> {
        serde_json::to_string(envelope).map_err(|e| {
            MessengerError::EncodeFailed {
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn deserialize(
        &self,
        raw: &str,
    ) -> BusResult<Envelope> {
        serde_json::from_str(raw).map_err(|e| {
            MessengerError::DecodeFailed {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use clusterbus_error::StatusCode;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_json_roundtrip() {
        let codec = JsonSerializer;
        let envelope = Envelope::response(Uuid::new_v4(), r#"{"nested":"json"}"#);
        let raw = codec.serialize(&envelope).unwrap();
        assert_eq!(codec.deserialize(&raw).unwrap(), envelope);
    }

    /// Тест проверяет, что мусор на входе даёт `DeserializationFailed`.
    #[test]
    fn test_garbage_is_decode_error() {
        let err = JsonSerializer.deserialize("not json").unwrap_err();
        assert_eq!(err.status_code(), StatusCode::DeserializationFailed);

        let err = JsonSerializer
            .deserialize(r#"{"type":"BROADCAST","JSON":"x"}"#)
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::DeserializationFailed);
    }
}
