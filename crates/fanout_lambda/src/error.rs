//! Error types for the runtime crate.

use fanout_core::codec::CodecError;
use fanout_core::contract::ValidationError;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob '{name}' not found")]
    NotFound { name: String },

    #[error("blob store request for '{name}' failed: {message}")]
    Request { name: String, message: String },
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue '{queue}' request failed: {message}")]
    Request { queue: String, message: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[derive(Debug, Error)]
pub enum ReceiptStoreError {
    #[error("receipt '{0}' already exists")]
    Conflict(String),

    #[error("receipt store request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    BlobStore(#[from] BlobStoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    ReceiptStore(#[from] ReceiptStoreError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported event: {0}")]
    Event(String),
}

pub type FanoutResult<T> = Result<T, FanoutError>;
