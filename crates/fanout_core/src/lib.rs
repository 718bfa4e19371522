//! Shared SMS fan-out domain primitives.
//!
//! This crate owns the deterministic parts of the pipeline: batching and
//! staged visibility planning, retry triage, drain scheduling, queue payload
//! encoding and object key layout. It intentionally excludes AWS SDK, HTTP
//! and Lambda runtime concerns, which live in `fanout_lambda`.

pub mod batching;
pub mod codec;
pub mod contract;
pub mod schedule;
pub mod storage_keys;
pub mod triage;
