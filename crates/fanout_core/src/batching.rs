use crate::contract::{Batch, Contact, Message, StagedBatchRecord, ValidationError};
use crate::storage_keys::batch_blob_name;

pub const DEFAULT_INITIAL_VISIBILITY_SECONDS: u32 = 2;
pub const DEFAULT_VISIBILITY_STRIDE_SECONDS: u32 = 90;

pub fn split(
    contacts: Vec<Contact>,
    message: &Message,
    chunk_size: usize,
) -> Result<Vec<Batch>, ValidationError> {
    if chunk_size == 0 {
        return Err(ValidationError::new(
            "chunk_size must be a positive integer",
        ));
    }

    let mut batches = Vec::with_capacity(contacts.len().div_ceil(chunk_size));
    let mut remaining = contacts.into_iter().peekable();

    while remaining.peek().is_some() {
        batches.push(Batch {
            contacts: remaining.by_ref().take(chunk_size).collect(),
            message: message.clone(),
        });
    }

    Ok(batches)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingSchedule {
    pub initial_visibility_seconds: u32,
    pub stride_seconds: u32,
}

impl Default for StagingSchedule {
    fn default() -> Self {
        Self {
            initial_visibility_seconds: DEFAULT_INITIAL_VISIBILITY_SECONDS,
            stride_seconds: DEFAULT_VISIBILITY_STRIDE_SECONDS,
        }
    }
}

impl StagingSchedule {
    pub fn visibility_for(&self, index: usize) -> u32 {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        self.initial_visibility_seconds
            .saturating_add(index.saturating_mul(self.stride_seconds))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StagedBatch {
    pub record: StagedBatchRecord,
    pub batch: Batch,
}

pub fn plan_stages(
    batches: Vec<Batch>,
    epoch_millis: i64,
    schedule: StagingSchedule,
) -> Vec<StagedBatch> {
    batches
        .into_iter()
        .enumerate()
        .map(|(index, batch)| StagedBatch {
            record: StagedBatchRecord {
                blob_name: batch_blob_name(epoch_millis, index),
                visible_in_seconds: schedule.visibility_for(index),
            },
            batch,
        })
        .collect()
}
