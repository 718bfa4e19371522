use fanout_core::codec::encode_queue_payload;
use fanout_core::contract::{HeldNotification, Receipt, ReceiptStatus, SendJob};
use fanout_core::triage::{decide, Failure, GatewayError, Outcome};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::adapters::{MessageQueue, ReceiptStore, SmsGateway, SmsRequest};
use crate::error::{FanoutResult, ReceiptStoreError};

const COMPONENT: &str = "send";

#[derive(Debug, Clone, PartialEq)]
pub struct TriageReport {
    pub receipt_id: String,
    pub outcome: Outcome,
    pub status: ReceiptStatus,
    pub error: Option<GatewayError>,
}

pub struct SendTargets<'a> {
    pub receipts: &'a dyn ReceiptStore,
    pub gateway: &'a dyn SmsGateway,
    pub rate_limit_queue: &'a dyn MessageQueue,
    pub failed_queue: &'a dyn MessageQueue,
    pub template_id: &'a str,
}

fn personalisation(job: &SendJob) -> Map<String, Value> {
    Map::from_iter([(
        "message".to_string(),
        Value::String(job.message.text.clone()),
    )])
}

fn store_failure(error: ReceiptStoreError) -> Failure {
    match error {
        ReceiptStoreError::Conflict(id) => {
            Failure::ReceiptConflict(format!("receipt '{id}' already exists"))
        }
        ReceiptStoreError::Request(message) => Failure::ReceiptStore(message),
    }
}

/// The receipt is written before the gateway call and rewritten on failure,
/// so routing always follows the receipt update.
pub async fn triage(
    job: &SendJob,
    attempt_count: u32,
    receipts: &dyn ReceiptStore,
    gateway: &dyn SmsGateway,
    template_id: &str,
) -> TriageReport {
    let receipt = Receipt::for_job(Uuid::new_v4().to_string(), job);

    let failure = match receipts.create(&receipt).await {
        Err(error) => store_failure(error),
        Ok(()) => {
            let request = SmsRequest {
                template_id: template_id.to_string(),
                phone_number: job.phone_number.clone(),
                personalisation: personalisation(job),
                reference: job.message.reference_for(&receipt.id),
            };
            match gateway.send_sms(&request).await {
                Ok(()) => {
                    tracing::info!(
                        component = COMPONENT,
                        receipt_id = %receipt.id,
                        attempt = attempt_count,
                        outcome = Outcome::Sent.as_str(),
                        "notification sent"
                    );
                    return TriageReport {
                        receipt_id: receipt.id,
                        outcome: Outcome::Sent,
                        status: ReceiptStatus::Sent,
                        error: None,
                    };
                }
                Err(error) => Failure::Gateway(error),
            }
        }
    };

    let decision = decide(&failure, attempt_count);
    let error = failure.to_error_record();

    if let Err(store_error) = receipts.replace(&receipt.with_status(decision.status)).await {
        tracing::error!(
            component = COMPONENT,
            receipt_id = %receipt.id,
            status = %decision.status,
            error = %store_error,
            "receipt status update failed"
        );
    }

    tracing::warn!(
        component = COMPONENT,
        receipt_id = %receipt.id,
        attempt = attempt_count,
        class = ?decision.class,
        outcome = decision.outcome.as_str(),
        error = %error,
        "send attempt failed"
    );

    TriageReport {
        receipt_id: receipt.id,
        outcome: decision.outcome,
        status: decision.status,
        error: Some(error),
    }
}

pub async fn route(
    job: &SendJob,
    report: &TriageReport,
    rate_limit_queue: &dyn MessageQueue,
    failed_queue: &dyn MessageQueue,
) -> FanoutResult<()> {
    let target = match report.outcome {
        Outcome::RateLimited => rate_limit_queue,
        Outcome::Failed => failed_queue,
        Outcome::Sent | Outcome::RetryRequested => return Ok(()),
    };

    let held = HeldNotification {
        error: report.error.clone().unwrap_or_default(),
        notification: job.clone(),
    };
    target.send(encode_queue_payload(&held)?, 0).await?;

    tracing::info!(
        component = COMPONENT,
        receipt_id = %report.receipt_id,
        queue = target.name(),
        "notification held"
    );
    Ok(())
}

pub async fn handle_send_job(
    job: &SendJob,
    attempt_count: u32,
    targets: &SendTargets<'_>,
) -> FanoutResult<Outcome> {
    let report = triage(
        job,
        attempt_count,
        targets.receipts,
        targets.gateway,
        targets.template_id,
    )
    .await;
    route(job, &report, targets.rate_limit_queue, targets.failed_queue).await?;
    Ok(report.outcome)
}
