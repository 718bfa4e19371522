//! Ports the handlers talk to. Each has an AWS implementation and an
//! in-memory one in [`memory`].

use async_trait::async_trait;
use fanout_core::contract::Receipt;
use fanout_core::triage::GatewayError;
use serde_json::{Map, Value};

use crate::error::{BlobStoreError, QueueError, ReceiptStoreError};

pub mod dynamodb;
pub mod memory;
pub mod notify;
pub mod s3;
pub mod sqs;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, name: &str, body: Vec<u8>, content_type: &str)
        -> Result<(), BlobStoreError>;

    async fn get(&self, name: &str) -> Result<Vec<u8>, BlobStoreError>;

    /// Deleting a blob that is already gone succeeds.
    async fn delete(&self, name: &str) -> Result<(), BlobStoreError>;

    async fn list(&self, limit: usize) -> Result<Vec<String>, BlobStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub id: String,
    pub payload: String,
    pub receipt_token: String,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, payload: String, delay_seconds: u32) -> Result<String, QueueError>;

    async fn receive(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, QueueError>;

    async fn delete(&self, message_id: &str, receipt_token: &str) -> Result<(), QueueError>;
}

#[async_trait]
pub trait ReceiptStore: Send + Sync {
    /// Fails with [`ReceiptStoreError::Conflict`] when the id already exists.
    async fn create(&self, receipt: &Receipt) -> Result<(), ReceiptStoreError>;

    async fn replace(&self, receipt: &Receipt) -> Result<(), ReceiptStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsRequest {
    pub template_id: String,
    pub phone_number: String,
    pub personalisation: Map<String, Value>,
    pub reference: String,
}

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send_sms(&self, request: &SmsRequest) -> Result<(), GatewayError>;
}
