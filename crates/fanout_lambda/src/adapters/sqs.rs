use async_trait::async_trait;
use aws_sdk_sqs::types::MessageAttributeValue;
use chrono::Utc;
use fanout_core::schedule::DeliveryHop;

use super::{MessageQueue, ReceivedMessage};
use crate::error::QueueError;

pub const NOT_BEFORE_ATTRIBUTE: &str = "not_before";

const MAX_RECEIVE_PER_CALL: usize = 10;

#[derive(Clone)]
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
    name: String,
}

impl SqsQueue {
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        let queue_url = queue_url.into();
        let name = queue_name_from_url(&queue_url).to_string();
        Self {
            client,
            queue_url,
            name,
        }
    }

    fn request_error(&self, action: &str, error: impl std::fmt::Display) -> QueueError {
        QueueError::Request {
            queue: self.name.clone(),
            message: format!("{action}: {error}"),
        }
    }
}

pub fn queue_name_from_url(queue_url: &str) -> &str {
    queue_url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(queue_url)
}

#[async_trait]
impl MessageQueue for SqsQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, payload: String, delay_seconds: u32) -> Result<String, QueueError> {
        let hop = DeliveryHop::plan(delay_seconds, Utc::now());
        let delay = i32::try_from(hop.delay_seconds).unwrap_or(i32::MAX);

        let mut request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(payload)
            .delay_seconds(delay);

        if let Some(not_before) = hop.not_before {
            let attribute = MessageAttributeValue::builder()
                .data_type("Number")
                .string_value(not_before.to_string())
                .build()
                .map_err(|error| self.request_error("build not_before attribute", error))?;
            request = request.message_attributes(NOT_BEFORE_ATTRIBUTE, attribute);
            tracing::debug!(
                queue = %self.name,
                delay_seconds,
                not_before,
                "long delay split into hops"
            );
        }

        let output = request.send().await.map_err(|error| {
            self.request_error("send_message", aws_sdk_sqs::error::DisplayErrorContext(error))
        })?;
        Ok(output.message_id().unwrap_or_default().to_string())
    }

    async fn receive(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut received = Vec::with_capacity(max_messages);

        while received.len() < max_messages {
            let wanted = (max_messages - received.len()).min(MAX_RECEIVE_PER_CALL);
            let output = self
                .client
                .receive_message()
                .queue_url(&self.queue_url)
                .max_number_of_messages(i32::try_from(wanted).unwrap_or(1))
                .send()
                .await
                .map_err(|error| {
                    self.request_error(
                        "receive_message",
                        aws_sdk_sqs::error::DisplayErrorContext(error),
                    )
                })?;

            let messages = output.messages.unwrap_or_default();
            if messages.is_empty() {
                break;
            }

            for message in messages {
                let (Some(id), Some(body), Some(handle)) = (
                    message.message_id,
                    message.body,
                    message.receipt_handle,
                ) else {
                    tracing::warn!(queue = %self.name, "skipping message without id, body or receipt handle");
                    continue;
                };
                received.push(ReceivedMessage {
                    id,
                    payload: body,
                    receipt_token: handle,
                });
            }
        }

        Ok(received)
    }

    async fn delete(&self, message_id: &str, receipt_token: &str) -> Result<(), QueueError> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_token)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                self.request_error(
                    &format!("delete_message {message_id}"),
                    aws_sdk_sqs::error::DisplayErrorContext(error),
                )
            })
    }
}
