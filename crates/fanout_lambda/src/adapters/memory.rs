//! In-process adapters for tests and local runs. Each records what it was
//! asked to do so assertions can inspect the calls.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use fanout_core::contract::Receipt;
use fanout_core::triage::GatewayError;

use super::{BlobStore, MessageQueue, ReceiptStore, ReceivedMessage, SmsGateway, SmsRequest};
use crate::error::{BlobStoreError, QueueError, ReceiptStoreError};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub body: Vec<u8>,
    pub content_type: String,
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, StoredBlob>>,
    fail_puts: Mutex<bool>,
    fail_deletes: Mutex<bool>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, body: impl Into<Vec<u8>>) {
        locked(&self.blobs).insert(
            name.to_string(),
            StoredBlob {
                body: body.into(),
                content_type: super::JSON_CONTENT_TYPE.to_string(),
            },
        );
    }

    pub fn names(&self) -> Vec<String> {
        locked(&self.blobs).keys().cloned().collect()
    }

    pub fn blob(&self, name: &str) -> Option<StoredBlob> {
        locked(&self.blobs).get(name).cloned()
    }

    pub fn fail_puts(&self) {
        *locked(&self.fail_puts) = true;
    }

    pub fn fail_deletes(&self) {
        *locked(&self.fail_deletes) = true;
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        name: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BlobStoreError> {
        if *locked(&self.fail_puts) {
            return Err(BlobStoreError::Request {
                name: name.to_string(),
                message: "injected put failure".to_string(),
            });
        }
        locked(&self.blobs).insert(
            name.to_string(),
            StoredBlob {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, BlobStoreError> {
        locked(&self.blobs)
            .get(name)
            .map(|blob| blob.body.clone())
            .ok_or_else(|| BlobStoreError::NotFound {
                name: name.to_string(),
            })
    }

    async fn delete(&self, name: &str) -> Result<(), BlobStoreError> {
        if *locked(&self.fail_deletes) {
            return Err(BlobStoreError::Request {
                name: name.to_string(),
                message: "injected delete failure".to_string(),
            });
        }
        locked(&self.blobs).remove(name);
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<String>, BlobStoreError> {
        Ok(locked(&self.blobs)
            .keys()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub id: String,
    pub payload: String,
    pub delay_seconds: u32,
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    pending: VecDeque<SentMessage>,
    sent: Vec<SentMessage>,
    deleted: Vec<String>,
    receive_calls: usize,
    fail_sends: bool,
}

/// A queue that ignores delays: every sent message is immediately receivable.
pub struct MemoryQueue {
    name: String,
    state: Mutex<QueueState>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        locked(&self.state).sent.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        locked(&self.state).deleted.clone()
    }

    pub fn receive_calls(&self) -> usize {
        locked(&self.state).receive_calls
    }

    pub fn pending_len(&self) -> usize {
        locked(&self.state).pending.len()
    }

    pub fn take_pending(&self) -> Vec<SentMessage> {
        locked(&self.state).pending.drain(..).collect()
    }

    pub fn fail_sends(&self) {
        locked(&self.state).fail_sends = true;
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, payload: String, delay_seconds: u32) -> Result<String, QueueError> {
        let mut state = locked(&self.state);
        if state.fail_sends {
            return Err(QueueError::Request {
                queue: self.name.clone(),
                message: "injected send failure".to_string(),
            });
        }
        state.next_id += 1;
        let message = SentMessage {
            id: format!("{}-{}", self.name, state.next_id),
            payload,
            delay_seconds,
        };
        state.sent.push(message.clone());
        state.pending.push_back(message.clone());
        Ok(message.id)
    }

    async fn receive(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut state = locked(&self.state);
        state.receive_calls += 1;
        let count = max_messages.min(state.pending.len());
        Ok(state
            .pending
            .drain(..count)
            .map(|message| ReceivedMessage {
                receipt_token: format!("token-{}", message.id),
                id: message.id,
                payload: message.payload,
            })
            .collect())
    }

    async fn delete(&self, message_id: &str, _receipt_token: &str) -> Result<(), QueueError> {
        locked(&self.state).deleted.push(message_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryReceiptStore {
    receipts: Mutex<HashMap<String, Receipt>>,
    history: Mutex<Vec<Receipt>>,
    scripted_create_errors: Mutex<VecDeque<ReceiptStoreError>>,
}

impl MemoryReceiptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Receipt> {
        locked(&self.receipts).get(id).cloned()
    }

    pub fn len(&self) -> usize {
        locked(&self.receipts).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn history(&self) -> Vec<Receipt> {
        locked(&self.history).clone()
    }

    pub fn fail_next_create(&self, error: ReceiptStoreError) {
        locked(&self.scripted_create_errors).push_back(error);
    }
}

#[async_trait]
impl ReceiptStore for MemoryReceiptStore {
    async fn create(&self, receipt: &Receipt) -> Result<(), ReceiptStoreError> {
        if let Some(error) = locked(&self.scripted_create_errors).pop_front() {
            return Err(error);
        }

        let mut receipts = locked(&self.receipts);
        if receipts.contains_key(&receipt.id) {
            return Err(ReceiptStoreError::Conflict(receipt.id.clone()));
        }
        receipts.insert(receipt.id.clone(), receipt.clone());
        locked(&self.history).push(receipt.clone());
        Ok(())
    }

    async fn replace(&self, receipt: &Receipt) -> Result<(), ReceiptStoreError> {
        locked(&self.receipts).insert(receipt.id.clone(), receipt.clone());
        locked(&self.history).push(receipt.clone());
        Ok(())
    }
}

/// Gateway that replays scripted responses in order and succeeds once the
/// script runs out.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<(), GatewayError>>>,
    requests: Mutex<Vec<SmsRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_failure(&self, error: GatewayError) {
        locked(&self.script).push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<SmsRequest> {
        locked(&self.requests).clone()
    }
}

#[async_trait]
impl SmsGateway for ScriptedGateway {
    async fn send_sms(&self, request: &SmsRequest) -> Result<(), GatewayError> {
        locked(&self.requests).push(request.clone());
        locked(&self.script).pop_front().unwrap_or(Ok(()))
    }
}
