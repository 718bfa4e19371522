//! Queue payload encoding: base64 over UTF-8 JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize queue payload: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("queue payload is neither base64 JSON nor JSON: {0}")]
    Decode(#[source] serde_json::Error),
}

pub fn encode_queue_payload(value: &impl Serialize) -> Result<String, CodecError> {
    let json = serde_json::to_vec(value).map_err(CodecError::Serialize)?;
    Ok(STANDARD.encode(json))
}

pub fn decode_queue_payload<T: DeserializeOwned>(body: &str) -> Result<T, CodecError> {
    let trimmed = body.trim();
    if let Ok(bytes) = STANDARD.decode(trimmed) {
        if let Ok(value) = serde_json::from_slice(&bytes) {
            return Ok(value);
        }
    }

    serde_json::from_str(trimmed).map_err(CodecError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Message, SendJob};

    #[test]
    fn batch_pointer_is_base64_of_json_string() {
        let encoded = encode_queue_payload(&"1580644770456-batch-0").expect("should encode");
        assert_eq!(
            STANDARD.decode(&encoded).expect("should be base64"),
            br#""1580644770456-batch-0""#
        );

        let decoded: String = decode_queue_payload(&encoded).expect("should decode");
        assert_eq!(decoded, "1580644770456-batch-0");
    }

    #[test]
    fn raw_json_bodies_are_accepted() {
        let job: SendJob = decode_queue_payload(
            r#"{"message": {"text": "hi"}, "phoneNumber": "07700900004"}"#,
        )
        .expect("raw json should decode");
        assert_eq!(
            job,
            SendJob {
                message: Message::new(None, "hi"),
                phone_number: "07700900004".to_string(),
            }
        );
    }

    #[test]
    fn garbage_is_rejected() {
        let error = decode_queue_payload::<SendJob>("%%%").expect_err("garbage should fail");
        assert!(error.to_string().starts_with("queue payload is neither"));
    }
}
