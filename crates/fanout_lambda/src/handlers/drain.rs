use chrono::{DateTime, Utc};
use fanout_core::codec::{decode_queue_payload, encode_queue_payload};
use fanout_core::contract::HeldNotification;
use fanout_core::schedule::drain_visibility;
use futures_util::future::{try_join_all, BoxFuture};
use futures_util::FutureExt;
use serde::Serialize;

use crate::adapters::{BlobStore, MessageQueue};
use crate::config::DrainSettings;
use crate::error::{FanoutError, FanoutResult};

const COMPONENT: &str = "drain";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub deferred: bool,
    pub moved: usize,
    pub waves: u32,
    /// Held messages that could not be decoded. They stay on the holding
    /// queue for its redrive policy to deal with.
    pub skipped: usize,
    pub daily_limited: usize,
}

pub async fn drain(
    batches: &dyn BlobStore,
    held_queue: &dyn MessageQueue,
    send_queue: &dyn MessageQueue,
    settings: DrainSettings,
    now: DateTime<Utc>,
) -> FanoutResult<DrainSummary> {
    let pending = batches.list(1).await?;
    if let Some(blob) = pending.first() {
        tracing::info!(
            component = COMPONENT,
            pending_blob = %blob,
            "batches still pending expansion, not draining"
        );
        return Ok(DrainSummary {
            deferred: true,
            ..DrainSummary::default()
        });
    }

    let mut summary = DrainSummary::default();
    loop {
        let messages = held_queue.receive(settings.batch_size).await?;
        if messages.is_empty() {
            break;
        }

        summary.waves += 1;
        let wave = summary.waves;
        let mut work: Vec<BoxFuture<'_, FanoutResult<()>>> = Vec::with_capacity(messages.len());
        let mut daily_limited = 0usize;
        let mut max_visibility = 0;

        for message in messages {
            let held: HeldNotification = match decode_queue_payload(&message.payload) {
                Ok(held) => held,
                Err(error) => {
                    tracing::error!(
                        component = COMPONENT,
                        message_id = %message.id,
                        error = %error,
                        "held message is malformed, leaving it on the queue"
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            let daily_limit = held.error.is_daily_limit_exceeded();
            if daily_limit {
                daily_limited += 1;
            }
            let visibility =
                drain_visibility(settings.visibility_base_seconds, wave, daily_limit, now);
            max_visibility = max_visibility.max(visibility);
            let payload = encode_queue_payload(&held.notification)?;

            // The held copy goes only once the job is back on the send queue.
            work.push(
                async move {
                    send_queue.send(payload, visibility).await?;
                    held_queue.delete(&message.id, &message.receipt_token).await?;
                    Ok::<(), FanoutError>(())
                }
                .boxed(),
            );
        }

        let wave_moved = work.len();
        try_join_all(work).await?;
        summary.moved += wave_moved;
        summary.daily_limited += daily_limited;

        tracing::info!(
            component = COMPONENT,
            wave,
            moved = wave_moved,
            from = held_queue.name(),
            to = send_queue.name(),
            daily_limited,
            max_visibility_seconds = max_visibility,
            "drain wave completed"
        );
    }

    tracing::info!(
        component = COMPONENT,
        moved = summary.moved,
        waves = summary.waves,
        skipped = summary.skipped,
        daily_limited = summary.daily_limited,
        "drain finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use fanout_core::contract::{Message, SendJob};
    use fanout_core::triage::{GatewayError, GatewayErrorDetail};

    use super::*;
    use crate::adapters::memory::{MemoryBlobStore, MemoryQueue};

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2020-02-02T11:59:30.456Z")
            .expect("timestamp should parse")
            .with_timezone(&Utc)
    }

    fn settings() -> DrainSettings {
        DrainSettings {
            batch_size: 32,
            visibility_base_seconds: 2,
        }
    }

    fn held(index: usize, error: &str, message: &str) -> String {
        encode_queue_payload(&HeldNotification {
            error: GatewayError::from_status(
                429,
                vec![GatewayErrorDetail {
                    error: error.to_string(),
                    message: message.to_string(),
                }],
            ),
            notification: SendJob {
                message: Message::new(None, "message"),
                phone_number: format!("0770090{index:04}"),
            },
        })
        .expect("envelope should encode")
    }

    async fn fill(queue: &MemoryQueue, count: usize) {
        for index in 0..count {
            queue
                .send(held(index, "RateLimitError", "Exceeded rate limit"), 0)
                .await
                .expect("seed send should succeed");
        }
    }

    #[tokio::test]
    async fn pending_batches_block_the_drain() {
        let batches = MemoryBlobStore::new();
        batches.insert("1580644770456-batch-0", b"{}".to_vec());
        let held_queue = MemoryQueue::new("rate-limited");
        let send_queue = MemoryQueue::new("notifications-to-send");
        fill(&held_queue, 3).await;

        let summary = drain(&batches, &held_queue, &send_queue, settings(), now())
            .await
            .expect("drain should succeed");

        assert!(summary.deferred);
        assert_eq!(summary.moved, 0);
        assert_eq!(held_queue.receive_calls(), 0);
        assert!(held_queue.deleted().is_empty());
        assert!(send_queue.sent().is_empty());
    }

    #[tokio::test]
    async fn moves_held_jobs_in_waves_with_growing_visibility() {
        let batches = MemoryBlobStore::new();
        let held_queue = MemoryQueue::new("rate-limited");
        let send_queue = MemoryQueue::new("notifications-to-send");
        fill(&held_queue, 37).await;

        let summary = drain(&batches, &held_queue, &send_queue, settings(), now())
            .await
            .expect("drain should succeed");

        assert_eq!(summary.moved, 37);
        assert_eq!(summary.waves, 2);
        assert_eq!(held_queue.receive_calls(), 3);
        assert_eq!(held_queue.deleted().len(), 37);

        let sent = send_queue.sent();
        assert_eq!(sent.len(), 37);
        assert_eq!(sent.iter().filter(|m| m.delay_seconds == 3).count(), 32);
        assert_eq!(sent.iter().filter(|m| m.delay_seconds == 4).count(), 5);

        let job: SendJob = decode_queue_payload(&sent[0].payload).expect("job should decode");
        assert_eq!(job.phone_number, "07700900000");
    }

    #[tokio::test]
    async fn daily_limit_jobs_wait_for_the_reset() {
        let batches = MemoryBlobStore::new();
        let held_queue = MemoryQueue::new("rate-limited");
        let send_queue = MemoryQueue::new("notifications-to-send");
        held_queue
            .send(
                held(0, "TooManyRequestsError", "Exceeded send limits (250000) for today"),
                0,
            )
            .await
            .expect("seed send should succeed");

        fill(&held_queue, 1).await;

        let summary = drain(&batches, &held_queue, &send_queue, settings(), now())
            .await
            .expect("drain should succeed");

        assert_eq!(summary.moved, 2);
        assert_eq!(summary.daily_limited, 1);
        let mut delays: Vec<u32> = send_queue.sent().iter().map(|m| m.delay_seconds).collect();
        delays.sort_unstable();
        assert_eq!(delays, vec![3, 3 + 46_830]);
    }

    #[tokio::test]
    async fn failed_requeue_keeps_the_held_copy() {
        let batches = MemoryBlobStore::new();
        let held_queue = MemoryQueue::new("rate-limited");
        let send_queue = MemoryQueue::new("notifications-to-send");
        fill(&held_queue, 1).await;
        send_queue.fail_sends();

        let result = drain(&batches, &held_queue, &send_queue, settings(), now()).await;

        assert!(matches!(result, Err(FanoutError::Queue(_))));
        assert!(held_queue.deleted().is_empty());
        assert!(send_queue.sent().is_empty());
    }

    #[tokio::test]
    async fn malformed_held_message_is_skipped_and_kept() {
        let batches = MemoryBlobStore::new();
        let held_queue = MemoryQueue::new("rate-limited");
        let send_queue = MemoryQueue::new("notifications-to-send");
        held_queue
            .send("not an envelope".to_string(), 0)
            .await
            .expect("seed send should succeed");
        fill(&held_queue, 1).await;

        let summary = drain(&batches, &held_queue, &send_queue, settings(), now())
            .await
            .expect("drain should succeed");

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.moved, 1);
        assert_eq!(held_queue.deleted(), vec!["rate-limited-2"]);
    }
}
