use std::time::Instant;

use chrono::{DateTime, Utc};
use fanout_core::batching::{plan_stages, split, StagedBatch, StagingSchedule};
use fanout_core::codec::encode_queue_payload;
use fanout_core::contract::{contact_list_fingerprint, parse_contact_list, StagedBatchRecord};
use futures_util::future::{try_join_all, BoxFuture};
use futures_util::FutureExt;

use crate::adapters::{BlobStore, MessageQueue, JSON_CONTENT_TYPE};
use crate::error::{FanoutError, FanoutResult};

const COMPONENT: &str = "split";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSettings {
    pub chunk_size: usize,
    pub schedule: StagingSchedule,
}

pub async fn enqueue_batches(
    staged: Vec<StagedBatch>,
    batches: &dyn BlobStore,
    batch_queue: &dyn MessageQueue,
) -> FanoutResult<Vec<StagedBatchRecord>> {
    let mut work: Vec<BoxFuture<'_, FanoutResult<()>>> = Vec::with_capacity(staged.len() * 2);
    let mut records = Vec::with_capacity(staged.len());

    for StagedBatch { record, batch } in staged {
        let body = serde_json::to_vec(&batch)?;
        let pointer = encode_queue_payload(&record.blob_name)?;
        let blob_name = record.blob_name.clone();
        let visible_in_seconds = record.visible_in_seconds;

        work.push(
            async move {
                batches.put(&blob_name, body, JSON_CONTENT_TYPE).await?;
                Ok::<(), FanoutError>(())
            }
            .boxed(),
        );
        work.push(
            async move {
                batch_queue.send(pointer, visible_in_seconds).await?;
                Ok::<(), FanoutError>(())
            }
            .boxed(),
        );
        records.push(record);
    }

    try_join_all(work).await?;
    Ok(records)
}

pub async fn handle_contact_list(
    name: &str,
    contact_lists: &dyn BlobStore,
    batches: &dyn BlobStore,
    batch_queue: &dyn MessageQueue,
    settings: SplitSettings,
    now: DateTime<Utc>,
) -> FanoutResult<Vec<StagedBatchRecord>> {
    let started_at = Instant::now();
    let bytes = contact_lists.get(name).await?;
    let fingerprint = contact_list_fingerprint(&bytes);

    let list = parse_contact_list(&bytes).map_err(|error| {
        tracing::error!(
            component = COMPONENT,
            contact_list = %name,
            %fingerprint,
            error = %error,
            "contact list rejected"
        );
        FanoutError::from(error)
    })?;
    let contact_count = list.contacts.len();

    let split_batches = split(list.contacts, &list.message, settings.chunk_size)?;
    let staged = plan_stages(split_batches, now.timestamp_millis(), settings.schedule);
    let records = enqueue_batches(staged, batches, batch_queue).await?;

    for record in &records {
        tracing::info!(
            component = COMPONENT,
            blob = %record.blob_name,
            visible_in_seconds = record.visible_in_seconds,
            "batch staged"
        );
    }

    contact_lists.delete(name).await?;

    tracing::info!(
        component = COMPONENT,
        contact_list = %name,
        %fingerprint,
        contacts = contact_count,
        batches = records.len(),
        queue = batch_queue.name(),
        duration_ms = started_at.elapsed().as_millis() as u64,
        "contact list split"
    );
    Ok(records)
}
