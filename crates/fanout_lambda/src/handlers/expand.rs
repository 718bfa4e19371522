use fanout_core::codec::encode_queue_payload;
use fanout_core::contract::{Batch, SendJob};
use futures_util::stream::{self, TryStreamExt};

use crate::adapters::{BlobStore, MessageQueue};
use crate::error::{FanoutError, FanoutResult};

const COMPONENT: &str = "expand";

pub const SEND_CONCURRENCY: usize = 16;

pub fn expand_batch(batch: Batch) -> Vec<SendJob> {
    let Batch { contacts, message } = batch;
    contacts
        .into_iter()
        .map(|contact| SendJob {
            message: message.clone(),
            phone_number: contact.phone_number,
        })
        .collect()
}

pub async fn handle_batch_pointer(
    blob_name: &str,
    batches: &dyn BlobStore,
    send_queue: &dyn MessageQueue,
) -> FanoutResult<usize> {
    let bytes = batches.get(blob_name).await?;
    let batch: Batch = serde_json::from_slice(&bytes)?;
    let jobs = expand_batch(batch);

    let payloads = jobs
        .iter()
        .map(encode_queue_payload)
        .collect::<Result<Vec<_>, _>>()?;
    stream::iter(payloads.into_iter().map(Ok::<String, FanoutError>))
        .try_for_each_concurrent(SEND_CONCURRENCY, |payload| async move {
            send_queue.send(payload, 0).await?;
            Ok(())
        })
        .await?;

    tracing::info!(
        component = COMPONENT,
        blob = %blob_name,
        jobs = jobs.len(),
        queue = send_queue.name(),
        "batch expanded"
    );

    batches.delete(blob_name).await?;
    tracing::info!(component = COMPONENT, blob = %blob_name, "batch blob deleted");
    Ok(jobs.len())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use fanout_core::codec::decode_queue_payload;
    use fanout_core::contract::{Contact, Message};

    use super::*;
    use crate::adapters::memory::{MemoryBlobStore, MemoryQueue};
    use crate::adapters::ReceivedMessage;
    use crate::error::QueueError;

    #[derive(Default)]
    struct CountingQueue {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl MessageQueue for CountingQueue {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send(&self, _payload: String, _delay_seconds: u32) -> Result<String, QueueError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let id = self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(format!("counting-{id}"))
        }

        async fn receive(&self, _max_messages: usize) -> Result<Vec<ReceivedMessage>, QueueError> {
            Ok(Vec::new())
        }

        async fn delete(&self, _message_id: &str, _receipt_token: &str) -> Result<(), QueueError> {
            Ok(())
        }
    }

    fn batch(count: usize) -> Batch {
        Batch {
            contacts: (0..count)
                .map(|index| Contact::new(format!("0770090{index:04}")))
                .collect(),
            message: Message::new(Some("msg-1".to_string()), "Clinic reminder"),
        }
    }

    #[test]
    fn expansion_keeps_order_and_count() {
        let jobs = expand_batch(batch(4));
        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[0].phone_number, "07700900000");
        assert_eq!(jobs[3].phone_number, "07700900003");
        assert!(jobs
            .iter()
            .all(|job| job.message.text == "Clinic reminder"));
    }

    #[tokio::test]
    async fn enqueues_every_job_then_deletes_blob() {
        let batches = MemoryBlobStore::new();
        let queue = MemoryQueue::new("notifications-to-send");
        batches.insert(
            "1580644770456-batch-0",
            serde_json::to_vec(&batch(3)).expect("batch should serialize"),
        );

        let count = handle_batch_pointer("1580644770456-batch-0", &batches, &queue)
            .await
            .expect("expansion should succeed");

        assert_eq!(count, 3);
        assert!(batches.names().is_empty());
        let phones: Vec<String> = queue
            .sent()
            .iter()
            .map(|message| {
                decode_queue_payload::<SendJob>(&message.payload)
                    .expect("job should decode")
                    .phone_number
            })
            .collect();
        assert_eq!(phones, vec!["07700900000", "07700900001", "07700900002"]);
    }

    #[tokio::test]
    async fn full_batch_is_sent_with_bounded_concurrency() {
        let batches = MemoryBlobStore::new();
        let queue = CountingQueue::default();
        batches.insert(
            "1580644770456-batch-0",
            serde_json::to_vec(&batch(2500)).expect("batch should serialize"),
        );

        let count = handle_batch_pointer("1580644770456-batch-0", &batches, &queue)
            .await
            .expect("expansion should succeed");

        assert_eq!(count, 2500);
        assert_eq!(queue.sent.load(Ordering::SeqCst), 2500);
        let peak = queue.peak.load(Ordering::SeqCst);
        assert!(peak <= SEND_CONCURRENCY, "peak {peak} exceeds limit");
    }

    #[tokio::test]
    async fn missing_blob_propagates() {
        let batches = MemoryBlobStore::new();
        let queue = MemoryQueue::new("notifications-to-send");

        let error = handle_batch_pointer("gone", &batches, &queue)
            .await
            .expect_err("missing blob should fail");
        assert!(matches!(error, FanoutError::BlobStore(_)));
    }

    #[tokio::test]
    async fn send_failure_keeps_blob_for_redelivery() {
        let batches = MemoryBlobStore::new();
        let queue = MemoryQueue::new("notifications-to-send");
        queue.fail_sends();
        batches.insert(
            "b",
            serde_json::to_vec(&batch(2)).expect("batch should serialize"),
        );

        let result = handle_batch_pointer("b", &batches, &queue).await;
        assert!(matches!(result, Err(FanoutError::Queue(_))));
        assert_eq!(batches.names(), vec!["b"]);
    }
}
