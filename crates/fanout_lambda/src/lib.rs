//! AWS-oriented adapters and handlers for the SMS fan-out pipeline.
//!
//! This crate owns runtime integration details (Lambda event dispatch, S3,
//! SQS, DynamoDB and Notify adapters) on top of the deterministic primitives
//! in `fanout_core`.

pub mod adapters;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod logging;
pub mod runtime;
