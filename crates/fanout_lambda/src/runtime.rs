//! Wiring between Lambda events and the pipeline handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fanout_core::codec::decode_queue_payload;
use fanout_core::contract::SendJob;
use fanout_core::schedule::remaining_delay;
use fanout_core::storage_keys::blob_name_from_key;
use fanout_core::triage::Outcome;
use serde_json::{json, Value};

use crate::adapters::{BlobStore, MessageQueue, ReceiptStore, SmsGateway};
use crate::config::{DrainSettings, FanoutConfig};
use crate::error::{BlobStoreError, FanoutError, FanoutResult};
use crate::events::{parse_event, BatchResponse, FanoutEvent, ObjectCreated, QueueRecord};
use crate::handlers::drain::drain;
use crate::handlers::expand::handle_batch_pointer;
use crate::handlers::send::{handle_send_job, SendTargets};
use crate::handlers::split::{handle_contact_list, SplitSettings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub bucket: String,
    pub contact_list_prefix: String,
    pub split: SplitSettings,
    pub drain: DrainSettings,
    pub template_id: String,
}

impl From<&FanoutConfig> for PipelineSettings {
    fn from(config: &FanoutConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            contact_list_prefix: config.contact_list_prefix.clone(),
            split: SplitSettings {
                chunk_size: config.chunk_size,
                schedule: config.staging,
            },
            drain: config.drain,
            template_id: config.notify.template_id.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    pub contact_lists: Arc<dyn BlobStore>,
    pub batches: Arc<dyn BlobStore>,
    pub batch_queue: Arc<dyn MessageQueue>,
    pub send_queue: Arc<dyn MessageQueue>,
    pub failed_queue: Arc<dyn MessageQueue>,
    pub rate_limit_queue: Arc<dyn MessageQueue>,
    pub receipts: Arc<dyn ReceiptStore>,
    pub gateway: Arc<dyn SmsGateway>,
    pub settings: PipelineSettings,
}

impl Pipeline {
    pub async fn dispatch(&self, event: Value, now: DateTime<Utc>) -> FanoutResult<Value> {
        match parse_event(&event)? {
            FanoutEvent::ObjectsCreated(objects) => self.split_objects(objects, now).await,
            FanoutEvent::QueueMessages { queue, records } => {
                let response = if queue == self.batch_queue.name() {
                    self.expand_records(records, now).await
                } else if queue == self.send_queue.name() {
                    self.send_records(records, now).await
                } else {
                    return Err(FanoutError::Event(format!(
                        "no handler for queue '{queue}'"
                    )));
                };
                Ok(serde_json::to_value(response)?)
            }
            FanoutEvent::Scheduled => {
                let summary = drain(
                    self.batches.as_ref(),
                    self.rate_limit_queue.as_ref(),
                    self.send_queue.as_ref(),
                    self.settings.drain,
                    now,
                )
                .await?;
                Ok(serde_json::to_value(summary)?)
            }
        }
    }

    async fn split_objects(
        &self,
        objects: Vec<ObjectCreated>,
        now: DateTime<Utc>,
    ) -> FanoutResult<Value> {
        let mut staged = 0;
        for object in objects {
            if object.bucket != self.settings.bucket {
                tracing::warn!(bucket = %object.bucket, key = %object.key, "ignoring object from another bucket");
                continue;
            }
            let Some(name) = blob_name_from_key(&self.settings.contact_list_prefix, &object.key)
            else {
                tracing::warn!(key = %object.key, "ignoring object outside the contact list prefix");
                continue;
            };

            let records = handle_contact_list(
                name,
                self.contact_lists.as_ref(),
                self.batches.as_ref(),
                self.batch_queue.as_ref(),
                self.settings.split,
                now,
            )
            .await?;
            staged += records.len();
        }
        Ok(json!({ "status": "ok", "batches": staged }))
    }

    /// Re-sends a message whose hop-delayed target time has not arrived yet.
    /// Returns `true` when the record was deferred and needs no processing.
    async fn defer_if_early(
        &self,
        queue: &dyn MessageQueue,
        record: &QueueRecord,
        now: DateTime<Utc>,
    ) -> FanoutResult<bool> {
        let Some(remaining) = record
            .not_before
            .and_then(|not_before| remaining_delay(not_before, now))
        else {
            return Ok(false);
        };

        queue.send(record.body.clone(), remaining).await?;
        tracing::debug!(
            queue = queue.name(),
            message_id = %record.message_id,
            remaining_seconds = remaining,
            "message deferred for another hop"
        );
        Ok(true)
    }

    async fn expand_records(&self, records: Vec<QueueRecord>, now: DateTime<Utc>) -> BatchResponse {
        let mut response = BatchResponse::default();
        for record in records {
            if let Err(error) = self.expand_record(&record, now).await {
                tracing::error!(
                    component = "expand",
                    message_id = %record.message_id,
                    attempt = record.attempt_count,
                    error = %error,
                    "batch pointer failed"
                );
                response.fail(&record.message_id);
            }
        }
        response
    }

    async fn expand_record(&self, record: &QueueRecord, now: DateTime<Utc>) -> FanoutResult<()> {
        if self
            .defer_if_early(self.batch_queue.as_ref(), record, now)
            .await?
        {
            return Ok(());
        }
        let blob_name: String = decode_queue_payload(&record.body)?;
        match handle_batch_pointer(&blob_name, self.batches.as_ref(), self.send_queue.as_ref())
            .await
        {
            Ok(_) => Ok(()),
            // A redelivery after the blob was deleted means the batch is done.
            Err(FanoutError::BlobStore(BlobStoreError::NotFound { .. })) => {
                tracing::warn!(
                    component = "expand",
                    message_id = %record.message_id,
                    blob = %blob_name,
                    attempt = record.attempt_count,
                    "batch blob already gone, treating pointer as expanded"
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn send_records(&self, records: Vec<QueueRecord>, now: DateTime<Utc>) -> BatchResponse {
        let targets = SendTargets {
            receipts: self.receipts.as_ref(),
            gateway: self.gateway.as_ref(),
            rate_limit_queue: self.rate_limit_queue.as_ref(),
            failed_queue: self.failed_queue.as_ref(),
            template_id: &self.settings.template_id,
        };

        let mut response = BatchResponse::default();
        for record in records {
            match self.send_record(&record, &targets, now).await {
                Ok(Outcome::RetryRequested) => response.fail(&record.message_id),
                Ok(_) => {}
                Err(error) => {
                    tracing::error!(
                        component = "send",
                        message_id = %record.message_id,
                        attempt = record.attempt_count,
                        error = %error,
                        "send job could not be processed"
                    );
                    response.fail(&record.message_id);
                }
            }
        }
        response
    }

    async fn send_record(
        &self,
        record: &QueueRecord,
        targets: &SendTargets<'_>,
        now: DateTime<Utc>,
    ) -> FanoutResult<Outcome> {
        if self
            .defer_if_early(self.send_queue.as_ref(), record, now)
            .await?
        {
            return Ok(Outcome::Sent);
        }
        let job: SendJob = decode_queue_payload(&record.body)?;
        handle_send_job(&job, record.attempt_count, targets).await
    }
}
