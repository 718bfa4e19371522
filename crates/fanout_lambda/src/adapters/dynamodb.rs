use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use fanout_core::contract::Receipt;

use super::ReceiptStore;
use crate::error::ReceiptStoreError;

#[derive(Clone)]
pub struct DynamoReceiptStore {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl DynamoReceiptStore {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

pub fn receipt_item(receipt: &Receipt) -> HashMap<String, AttributeValue> {
    let mut item = HashMap::from([
        ("id".to_string(), AttributeValue::S(receipt.id.clone())),
        (
            "status".to_string(),
            AttributeValue::S(receipt.status.as_str().to_string()),
        ),
        ("to".to_string(), AttributeValue::S(receipt.to.clone())),
    ]);
    if let Some(message_id) = &receipt.message_id {
        item.insert(
            "messageId".to_string(),
            AttributeValue::S(message_id.clone()),
        );
    }
    item
}

#[async_trait]
impl ReceiptStore for DynamoReceiptStore {
    async fn create(&self, receipt: &Receipt) -> Result<(), ReceiptStoreError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(receipt_item(receipt)))
            .condition_expression("attribute_not_exists(id)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(error)
                if error
                    .as_service_error()
                    .is_some_and(|service| service.is_conditional_check_failed_exception()) =>
            {
                Err(ReceiptStoreError::Conflict(receipt.id.clone()))
            }
            Err(error) => Err(ReceiptStoreError::Request(format!(
                "create {}: {}",
                receipt.id,
                aws_sdk_dynamodb::error::DisplayErrorContext(error)
            ))),
        }
    }

    async fn replace(&self, receipt: &Receipt) -> Result<(), ReceiptStoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(receipt_item(receipt)))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                ReceiptStoreError::Request(format!(
                    "replace {}: {}",
                    receipt.id,
                    aws_sdk_dynamodb::error::DisplayErrorContext(error)
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use fanout_core::contract::{Message, ReceiptStatus, SendJob};

    use super::*;

    #[test]
    fn item_uses_reporting_labels_and_optional_message_id() {
        let job = SendJob {
            message: Message::new(Some("msg-7".to_string()), "hello"),
            phone_number: "07700900001".to_string(),
        };
        let receipt = Receipt::for_job("r-1", &job).with_status(ReceiptStatus::Retry);

        let item = receipt_item(&receipt);
        assert_eq!(
            item.get("status"),
            Some(&AttributeValue::S("Internal: To be retried".to_string()))
        );
        assert_eq!(
            item.get("messageId"),
            Some(&AttributeValue::S("msg-7".to_string()))
        );

        let anonymous = Receipt::for_job(
            "r-2",
            &SendJob {
                message: Message::new(None, "hello"),
                phone_number: "07700900001".to_string(),
            },
        );
        assert!(!receipt_item(&anonymous).contains_key("messageId"));
    }
}
