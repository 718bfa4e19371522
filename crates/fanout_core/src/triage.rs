//! Failure classification for a single send attempt.
//!
//! Every failure is first normalized into a [`GatewayError`] (or a receipt
//! store fault) at the adapter boundary. [`decide`] then maps it, together
//! with the delivery attempt count, onto the receipt status to record and the
//! [`Outcome`] the queue boundary acts on.

use serde::{Deserialize, Serialize};

use crate::contract::ReceiptStatus;

/// Deliveries allowed before a retriable failure is parked as terminal.
/// Kept equal to the queue's redrive cap.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

pub const RATE_LIMITED_STATUS: u16 = 429;
pub const FORBIDDEN_STATUS: u16 = 403;
pub const CONFLICT_STATUS: u16 = 409;

pub const CODE_CONNECTION_RESET: &str = "ECONNRESET";
pub const CODE_DNS_RETRY: &str = "EAI_AGAIN";
pub const CODE_HOST_NOT_FOUND: &str = "ENOTFOUND";
pub const CODE_TIMEOUT: &str = "ETIMEDOUT";
pub const CODE_RECEIPT_CONFLICT: &str = "ReceiptConflict";
pub const CODE_RECEIPT_STORE: &str = "ReceiptStoreError";

const RETRIABLE_CODES: [&str; 4] = [
    CODE_CONNECTION_RESET,
    CODE_DNS_RETRY,
    CODE_HOST_NOT_FOUND,
    CODE_TIMEOUT,
];

const DAILY_LIMIT_ERROR: &str = "TooManyRequestsError";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GatewayErrorDetail {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GatewayError {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code: Option<String>,
    #[serde(default)]
    pub errors: Vec<GatewayErrorDetail>,
}

impl GatewayError {
    pub fn from_status(status_code: u16, errors: Vec<GatewayErrorDetail>) -> Self {
        Self {
            status_code: Some(status_code),
            code: None,
            errors,
        }
    }

    pub fn from_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            status_code: None,
            errors: vec![GatewayErrorDetail {
                error: code.clone(),
                message: message.into(),
            }],
            code: Some(code),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status_code == Some(RATE_LIMITED_STATUS)
    }

    pub fn is_daily_limit_exceeded(&self) -> bool {
        self.is_rate_limited()
            && self.errors.iter().any(|detail| {
                detail.error == DAILY_LIMIT_ERROR || detail.message.contains("for today")
            })
    }

    fn is_transient(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| RETRIABLE_CODES.contains(&code))
            || self.status_code == Some(FORBIDDEN_STATUS)
    }

    pub fn summary(&self) -> String {
        let detail = self
            .errors
            .first()
            .map(|detail| format!("{}: {}", detail.error, detail.message))
            .unwrap_or_default();
        match (self.status_code, self.code.as_deref()) {
            (Some(status), _) => format!("status {status} {detail}"),
            (None, Some(code)) => format!("{code} {detail}"),
            (None, None) => detail,
        }
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.summary().trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Gateway(GatewayError),
    ReceiptConflict(String),
    ReceiptStore(String),
}

impl Failure {
    pub fn to_error_record(&self) -> GatewayError {
        match self {
            Self::Gateway(error) => error.clone(),
            Self::ReceiptConflict(message) => GatewayError {
                status_code: Some(CONFLICT_STATUS),
                ..GatewayError::from_code(CODE_RECEIPT_CONFLICT, message.clone())
            },
            Self::ReceiptStore(message) => {
                GatewayError::from_code(CODE_RECEIPT_STORE, message.clone())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    TransientInfra,
    RateLimited,
    StorageConflict,
    Terminal,
}

pub fn classify(failure: &Failure) -> FaultClass {
    match failure {
        Failure::Gateway(error) if error.is_rate_limited() => FaultClass::RateLimited,
        Failure::Gateway(error) if error.is_transient() => FaultClass::TransientInfra,
        Failure::Gateway(_) => FaultClass::Terminal,
        Failure::ReceiptConflict(_) => FaultClass::StorageConflict,
        Failure::ReceiptStore(_) => FaultClass::Terminal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Sent,
    RetryRequested,
    RateLimited,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::RetryRequested => "retry_requested",
            Self::RateLimited => "rate_limited",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub class: FaultClass,
    pub outcome: Outcome,
    pub status: ReceiptStatus,
}

// Retriable classes share one budget since the receive count already
// counts every delivery regardless of cause.
pub fn decide(failure: &Failure, attempt_count: u32) -> Decision {
    let class = classify(failure);
    let within_budget = attempt_count < MAX_DELIVERY_ATTEMPTS;

    let (outcome, status) = match class {
        FaultClass::RateLimited => (Outcome::RateLimited, ReceiptStatus::RateLimited),
        FaultClass::TransientInfra if within_budget => {
            (Outcome::RetryRequested, ReceiptStatus::Retry)
        }
        FaultClass::StorageConflict if within_budget => {
            (Outcome::RetryRequested, ReceiptStatus::DbConflict)
        }
        _ => (Outcome::Failed, ReceiptStatus::FailedToSend),
    };

    Decision {
        class,
        outcome,
        status,
    }
}
