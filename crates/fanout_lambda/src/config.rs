//! Environment-driven configuration, read once per cold start.

use fanout_core::batching::{
    StagingSchedule, DEFAULT_INITIAL_VISIBILITY_SECONDS, DEFAULT_VISIBILITY_STRIDE_SECONDS,
};
use fanout_core::contract::DEFAULT_CHUNK_SIZE;
use fanout_core::schedule::{DEFAULT_DRAIN_BATCH_SIZE, DEFAULT_DRAIN_VISIBILITY_BASE_SECONDS};
use fanout_core::storage_keys::{DEFAULT_BATCH_PREFIX, DEFAULT_CONTACT_LIST_PREFIX};
use thiserror::Error;

pub const DEFAULT_NOTIFY_BASE_URL: &str = "https://api.notifications.service.gov.uk";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be configured")]
    Missing(&'static str),

    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutConfig {
    pub bucket: String,
    pub contact_list_prefix: String,
    pub batch_prefix: String,
    pub batch_queue_url: String,
    pub send_queue_url: String,
    pub failed_queue_url: String,
    pub rate_limit_queue_url: String,
    pub chunk_size: usize,
    pub staging: StagingSchedule,
    pub drain: DrainSettings,
    pub receipts_table: String,
    pub notify: NotifySettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSettings {
    pub batch_size: usize,
    pub visibility_base_seconds: u32,
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_DRAIN_BATCH_SIZE,
            visibility_base_seconds: DEFAULT_DRAIN_VISIBILITY_BASE_SECONDS,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct NotifySettings {
    pub api_key: String,
    pub template_id: String,
    pub base_url: String,
}

// The API key must never reach the logs.
impl std::fmt::Debug for NotifySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifySettings")
            .field("api_key", &"<redacted>")
            .field("template_id", &self.template_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl FanoutConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(lookup);

        let chunk_size = env.parsed("CONTACT_LIST_BATCH_SIZE", DEFAULT_CHUNK_SIZE)?;
        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                name: "CONTACT_LIST_BATCH_SIZE",
                value: "0".to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }

        let drain_batch_size = env.parsed(
            "NOTIFICATIONS_FAILED_TO_SEND_PROCESSING_BATCH_SIZE",
            DEFAULT_DRAIN_BATCH_SIZE,
        )?;
        if drain_batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "NOTIFICATIONS_FAILED_TO_SEND_PROCESSING_BATCH_SIZE",
                value: "0".to_string(),
                reason: "must be a positive integer".to_string(),
            });
        }

        Ok(Self {
            bucket: env.required("FANOUT_BUCKET")?,
            contact_list_prefix: env.or("CONTACT_LIST_PREFIX", DEFAULT_CONTACT_LIST_PREFIX),
            batch_prefix: env.or("CONTACT_LIST_BATCHES_PREFIX", DEFAULT_BATCH_PREFIX),
            batch_queue_url: env.required("CONTACT_LIST_BATCHES_QUEUE_URL")?,
            send_queue_url: env.required("NOTIFICATIONS_TO_SEND_QUEUE_URL")?,
            failed_queue_url: env.required("NOTIFICATIONS_FAILED_TO_SEND_QUEUE_URL")?,
            rate_limit_queue_url: env
                .required("NOTIFICATIONS_FAILED_TO_SEND_RATE_LIMIT_QUEUE_URL")?,
            chunk_size,
            staging: StagingSchedule {
                initial_visibility_seconds: env.parsed(
                    "INITIAL_MESSAGE_VISIBILITY",
                    DEFAULT_INITIAL_VISIBILITY_SECONDS,
                )?,
                stride_seconds: env
                    .parsed("BATCH_VISIBILITY_STRIDE", DEFAULT_VISIBILITY_STRIDE_SECONDS)?,
            },
            drain: DrainSettings {
                batch_size: drain_batch_size,
                visibility_base_seconds: env.parsed(
                    "NOTIFICATIONS_FAILED_TO_SEND_VISIBILITY_TIMEOUT_BASE",
                    DEFAULT_DRAIN_VISIBILITY_BASE_SECONDS,
                )?,
            },
            receipts_table: env.required("RECEIPTS_TABLE")?,
            notify: NotifySettings {
                api_key: env.required("NOTIFY_API_KEY")?,
                template_id: env.required("NOTIFY_TEMPLATE_ID")?,
                base_url: env.or("NOTIFY_BASE_URL", DEFAULT_NOTIFY_BASE_URL),
            },
        })
    }
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn value(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.value(name).ok_or(ConfigError::Missing(name))
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.value(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.value(name) {
            None => Ok(default),
            Some(raw) => raw.parse::<T>().map_err(|error| ConfigError::Invalid {
                name,
                value: raw.clone(),
                reason: error.to_string(),
            }),
        }
    }
}
