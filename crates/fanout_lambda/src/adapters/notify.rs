//! GOV.UK Notify SMS client.
//!
//! Requests are authenticated with a short-lived HS256 JWT signed by the
//! secret half of the API key. Every failure, transport or HTTP, is folded
//! into a [`GatewayError`] here so triage never sees a `reqwest` type.

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fanout_core::triage::{
    GatewayError, GatewayErrorDetail, CODE_CONNECTION_RESET, CODE_DNS_RETRY,
    CODE_HOST_NOT_FOUND, CODE_TIMEOUT,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::{SmsGateway, SmsRequest};
use crate::config::ConfigError;

const SMS_PATH: &str = "/v2/notifications/sms";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UUID_LEN: usize = 36;

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    iat: i64,
}

#[derive(Debug, Serialize)]
struct SmsBody<'a> {
    phone_number: &'a str,
    template_id: &'a str,
    personalisation: &'a serde_json::Map<String, serde_json::Value>,
    reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<GatewayErrorDetail>,
}

/// Service id and signing secret carried inside a Notify API key, which is
/// `<key name>-<service id>-<secret>` with both ids as 36-char UUIDs.
#[derive(Clone, PartialEq, Eq)]
pub struct NotifyCredentials {
    service_id: String,
    secret: String,
}

impl NotifyCredentials {
    pub fn parse(api_key: &str) -> Result<Self, ConfigError> {
        let key = api_key.trim();
        let invalid = |reason: &str| ConfigError::Invalid {
            name: "NOTIFY_API_KEY",
            value: "<redacted>".to_string(),
            reason: reason.to_string(),
        };

        if !key.is_ascii() || key.len() < 2 * UUID_LEN + 1 {
            return Err(invalid("too short to hold a service id and secret"));
        }

        let secret = &key[key.len() - UUID_LEN..];
        let service_id = &key[key.len() - 2 * UUID_LEN - 1..key.len() - UUID_LEN - 1];
        if key.as_bytes()[key.len() - UUID_LEN - 1] != b'-' {
            return Err(invalid("service id and secret must be separated by '-'"));
        }

        Ok(Self {
            service_id: service_id.to_string(),
            secret: secret.to_string(),
        })
    }

    fn bearer_token(&self) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            iss: &self.service_id,
            iat: Utc::now().timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }
}

impl std::fmt::Debug for NotifyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyCredentials")
            .field("service_id", &self.service_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct NotifyGateway {
    client: reqwest::Client,
    endpoint: String,
    credentials: NotifyCredentials,
}

impl NotifyGateway {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| ConfigError::Invalid {
                name: "NOTIFY_BASE_URL",
                value: base_url.to_string(),
                reason: format!("http client could not be built: {error}"),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}{SMS_PATH}", base_url.trim_end_matches('/')),
            credentials: NotifyCredentials::parse(api_key)?,
        })
    }
}

#[async_trait]
impl SmsGateway for NotifyGateway {
    async fn send_sms(&self, request: &SmsRequest) -> Result<(), GatewayError> {
        let token = self.credentials.bearer_token().map_err(|error| {
            GatewayError::from_code("TokenError", format!("failed to sign request: {error}"))
        })?;

        let body = SmsBody {
            phone_number: &request.phone_number,
            template_id: &request.template_id,
            personalisation: &request.personalisation,
            reference: &request.reference,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|error| transport_error(&error))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(http_error(status.as_u16(), &text))
    }
}

pub fn http_error(status_code: u16, body: &str) -> GatewayError {
    let errors = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors,
        _ => vec![GatewayErrorDetail {
            error: format!("HTTP{status_code}"),
            message: body.trim().to_string(),
        }],
    };
    GatewayError::from_status(status_code, errors)
}

fn transport_error(error: &reqwest::Error) -> GatewayError {
    let mut chain = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }

    let code = transport_code(error.is_timeout(), error.is_connect(), &chain);
    GatewayError::from_code(code, chain)
}

pub fn transport_code(is_timeout: bool, is_connect: bool, description: &str) -> &'static str {
    let lowered = description.to_ascii_lowercase();
    if is_timeout || lowered.contains("timed out") {
        CODE_TIMEOUT
    } else if lowered.contains("temporary failure in name resolution")
        || lowered.contains("try again")
    {
        CODE_DNS_RETRY
    } else if is_connect
        && (lowered.contains("dns")
            || lowered.contains("lookup")
            || lowered.contains("name or service not known"))
    {
        CODE_HOST_NOT_FOUND
    } else {
        CODE_CONNECTION_RESET
    }
}
