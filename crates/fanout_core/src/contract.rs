use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::triage::GatewayError;

pub const DEFAULT_CHUNK_SIZE: usize = 2_500;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub phone_number: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Contact {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            extra: Map::new(),
        }
    }
}

/// Message body plus an optional identifier used to correlate receipts.
///
/// Older uploads carry the message as a bare JSON string; both shapes
/// deserialize into this type and it always serializes as an object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "MessageWire")]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub text: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageWire {
    Plain(String),
    Structured {
        #[serde(default)]
        id: Option<String>,
        text: String,
    },
}

impl From<MessageWire> for Message {
    fn from(wire: MessageWire) -> Self {
        match wire {
            MessageWire::Plain(text) => Self { id: None, text },
            MessageWire::Structured { id, text } => Self { id, text },
        }
    }
}

impl Message {
    pub fn new(id: Option<String>, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }

    pub fn reference_for(&self, receipt_id: &str) -> String {
        match &self.id {
            Some(id) => format!("{id}:{receipt_id}"),
            None => receipt_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactList {
    pub message: Message,
    pub contacts: Vec<Contact>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Batch {
    pub contacts: Vec<Contact>,
    pub message: Message,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendJob {
    pub message: Message,
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeldNotification {
    pub error: GatewayError,
    pub notification: SendJob,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StagedBatchRecord {
    pub blob_name: String,
    pub visible_in_seconds: u32,
}

// Labels are read by the reporting site; keep them stable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReceiptStatus {
    #[serde(rename = "Internal: Sent to Notify")]
    Sent,
    #[serde(rename = "Internal: To be retried")]
    Retry,
    #[serde(rename = "Internal: Rate limit exceeded")]
    RateLimited,
    #[serde(rename = "Internal: DB conflict")]
    DbConflict,
    #[serde(rename = "Internal: Failed to send")]
    FailedToSend,
}

impl ReceiptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "Internal: Sent to Notify",
            Self::Retry => "Internal: To be retried",
            Self::RateLimited => "Internal: Rate limit exceeded",
            Self::DbConflict => "Internal: DB conflict",
            Self::FailedToSend => "Internal: Failed to send",
        }
    }
}

impl std::fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message_id: Option<String>,
    pub status: ReceiptStatus,
    pub to: String,
}

impl Receipt {
    pub fn for_job(id: impl Into<String>, job: &SendJob) -> Self {
        Self {
            id: id.into(),
            message_id: job.message.id.clone(),
            status: ReceiptStatus::Sent,
            to: job.phone_number.clone(),
        }
    }

    pub fn with_status(&self, status: ReceiptStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn parse_contact_list(bytes: &[u8]) -> Result<ContactList, ValidationError> {
    let list: ContactList = serde_json::from_slice(bytes)
        .map_err(|error| ValidationError::new(format!("Malformed contact list: {error}")))?;
    normalize_contact_list(list)
}

pub fn normalize_contact_list(list: ContactList) -> Result<ContactList, ValidationError> {
    if list.message.text.trim().is_empty() {
        return Err(ValidationError::new("message text cannot be empty"));
    }

    let id = match list.message.id {
        Some(id) if id.trim().is_empty() => {
            return Err(ValidationError::new("message id cannot be blank when present"));
        }
        other => other,
    };

    Ok(ContactList {
        message: Message {
            id,
            text: list.message.text,
        },
        contacts: list.contacts,
    })
}

pub fn contact_list_fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn message_accepts_plain_string_generation() {
        let list: ContactList = serde_json::from_value(json!({
            "message": "hello there",
            "contacts": [{"phoneNumber": "07700900001"}]
        }))
        .expect("plain message should parse");

        assert_eq!(list.message, Message::new(None, "hello there"));
        assert_eq!(list.contacts[0].phone_number, "07700900001");
    }

    #[test]
    fn message_accepts_structured_generation_and_serializes_as_object() {
        let message: Message =
            serde_json::from_value(json!({"id": "msg-1", "text": "hi"})).expect("should parse");
        assert_eq!(message.id.as_deref(), Some("msg-1"));

        let value = serde_json::to_value(&message).expect("should serialize");
        assert_eq!(value, json!({"id": "msg-1", "text": "hi"}));
    }

    #[test]
    fn contact_extra_fields_pass_through() {
        let contact: Contact =
            serde_json::from_value(json!({"phoneNumber": "07700900002", "name": "Ada"}))
                .expect("contact should parse");

        let value = serde_json::to_value(&contact).expect("contact should serialize");
        assert_eq!(value, json!({"phoneNumber": "07700900002", "name": "Ada"}));
    }

    #[test]
    fn reference_combines_message_and_receipt_ids() {
        let with_id = Message::new(Some("msg-7".to_string()), "body");
        assert_eq!(with_id.reference_for("r-1"), "msg-7:r-1");

        let without_id = Message::new(None, "body");
        assert_eq!(without_id.reference_for("r-1"), "r-1");
    }

    #[test]
    fn receipt_status_labels_round_trip() {
        let receipt = Receipt {
            id: "r-1".to_string(),
            message_id: None,
            status: ReceiptStatus::RateLimited,
            to: "07700900003".to_string(),
        };

        let value = serde_json::to_value(&receipt).expect("receipt should serialize");
        assert_eq!(
            value,
            json!({"id": "r-1", "status": "Internal: Rate limit exceeded", "to": "07700900003"})
        );
        assert_eq!(ReceiptStatus::DbConflict.to_string(), "Internal: DB conflict");
    }

    #[test]
    fn normalize_rejects_blank_message_text() {
        let error = parse_contact_list(br#"{"message": "  ", "contacts": []}"#)
            .expect_err("blank message should fail");
        assert_eq!(error.message(), "message text cannot be empty");
    }

    #[test]
    fn parse_reports_malformed_json() {
        let error = parse_contact_list(b"{not json").expect_err("malformed json should fail");
        assert!(error.message().starts_with("Malformed contact list"));
    }

    #[test]
    fn fingerprint_is_stable_for_identical_uploads() {
        let body = br#"{"message":"m","contacts":[]}"#;
        assert_eq!(contact_list_fingerprint(body), contact_list_fingerprint(body));
        assert_ne!(
            contact_list_fingerprint(body),
            contact_list_fingerprint(b"{}")
        );
    }
}
