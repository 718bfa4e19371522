//! Lambda event shapes the runtime binary accepts, recognised by structure
//! rather than by separate entry points.

use serde::Serialize;
use serde_json::Value;

use crate::adapters::sqs::{queue_name_from_url, NOT_BEFORE_ATTRIBUTE};
use crate::error::{FanoutError, FanoutResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectCreated {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRecord {
    pub message_id: String,
    pub body: String,
    /// SQS `ApproximateReceiveCount`, 1 on first delivery.
    pub attempt_count: u32,
    pub not_before: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutEvent {
    ObjectsCreated(Vec<ObjectCreated>),
    QueueMessages {
        queue: String,
        records: Vec<QueueRecord>,
    },
    Scheduled,
}

pub fn parse_event(event: &Value) -> FanoutResult<FanoutEvent> {
    if is_scheduled_event(event) {
        return Ok(FanoutEvent::Scheduled);
    }

    match records_source(event) {
        Some("aws:s3") => decode_s3_records(event).map(FanoutEvent::ObjectsCreated),
        Some("aws:sqs") => decode_sqs_records(event),
        Some(other) => Err(FanoutError::Event(format!(
            "unsupported record source '{other}'"
        ))),
        None => Err(FanoutError::Event(
            "event is neither a record batch nor a scheduled event".to_string(),
        )),
    }
}

fn is_scheduled_event(event: &Value) -> bool {
    event.get("source").and_then(Value::as_str) == Some("aws.events")
        && event.get("detail-type").and_then(Value::as_str) == Some("Scheduled Event")
}

fn records_source(event: &Value) -> Option<&str> {
    let records = event.get("Records").and_then(Value::as_array)?;
    let first = records.first()?;
    let source = first
        .get("eventSource")
        .or_else(|| first.get("EventSource"))
        .and_then(Value::as_str)?;

    records
        .iter()
        .all(|record| {
            record
                .get("eventSource")
                .or_else(|| record.get("EventSource"))
                .and_then(Value::as_str)
                == Some(source)
        })
        .then_some(source)
}

fn records(event: &Value) -> FanoutResult<&Vec<Value>> {
    event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| FanoutError::Event("event must include Records array".to_string()))
}

fn decode_s3_records(event: &Value) -> FanoutResult<Vec<ObjectCreated>> {
    let mut objects = Vec::new();
    for record in records(event)? {
        let event_name = record
            .get("eventName")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !event_name.starts_with("ObjectCreated") {
            tracing::debug!(event_name, "ignoring non-create s3 record");
            continue;
        }

        let s3 = record
            .get("s3")
            .ok_or_else(|| FanoutError::Event("S3 record must include s3".to_string()))?;
        let bucket = s3
            .pointer("/bucket/name")
            .and_then(Value::as_str)
            .ok_or_else(|| FanoutError::Event("S3 record bucket name must be a string".to_string()))?;
        let raw_key = s3
            .pointer("/object/key")
            .and_then(Value::as_str)
            .ok_or_else(|| FanoutError::Event("S3 record object key must be a string".to_string()))?;

        objects.push(ObjectCreated {
            bucket: bucket.to_string(),
            key: decode_object_key(raw_key)?,
        });
    }
    Ok(objects)
}

/// S3 notifications form-encode keys: spaces arrive as `+`.
pub fn decode_object_key(raw_key: &str) -> FanoutResult<String> {
    let spaced = raw_key.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|key| key.into_owned())
        .map_err(|error| FanoutError::Event(format!("S3 object key is not valid UTF-8: {error}")))
}

fn decode_sqs_records(event: &Value) -> FanoutResult<FanoutEvent> {
    let records = records(event)?;
    let mut queue: Option<String> = None;
    let mut decoded = Vec::with_capacity(records.len());

    for record in records {
        let source_arn = record
            .get("eventSourceARN")
            .and_then(Value::as_str)
            .ok_or_else(|| FanoutError::Event("SQS record must name its source ARN".to_string()))?;
        let name = queue_name_from_url(source_arn);
        match &queue {
            Some(existing) if existing != name => {
                return Err(FanoutError::Event(format!(
                    "SQS batch mixes queues '{existing}' and '{name}'"
                )));
            }
            Some(_) => {}
            None => queue = Some(name.to_string()),
        }

        let message_id = record
            .get("messageId")
            .and_then(Value::as_str)
            .ok_or_else(|| FanoutError::Event("SQS record messageId must be a string".to_string()))?;
        let body = record
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| FanoutError::Event("SQS record body must be a string".to_string()))?;
        let attempt_count = record
            .pointer("/attributes/ApproximateReceiveCount")
            .and_then(Value::as_str)
            .and_then(|count| count.parse::<u32>().ok())
            .unwrap_or(1);
        let not_before = record
            .get("messageAttributes")
            .and_then(|attributes| attributes.get(NOT_BEFORE_ATTRIBUTE))
            .and_then(|attribute| attribute.get("stringValue"))
            .and_then(Value::as_str)
            .and_then(|value| value.parse::<i64>().ok());

        decoded.push(QueueRecord {
            message_id: message_id.to_string(),
            body: body.to_string(),
            attempt_count,
            not_before,
        });
    }

    Ok(FanoutEvent::QueueMessages {
        queue: queue.unwrap_or_default(),
        records: decoded,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}

/// SQS partial batch response. Listed messages are redelivered; the rest
/// are deleted by the event source mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResponse {
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

impl BatchResponse {
    pub fn fail(&mut self, message_id: &str) {
        self.batch_item_failures.push(BatchItemFailure {
            item_identifier: message_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn detects_scheduled_event() {
        let event = json!({
            "source": "aws.events",
            "detail-type": "Scheduled Event",
            "detail": {}
        });
        assert_eq!(parse_event(&event).expect("should parse"), FanoutEvent::Scheduled);
    }

    #[test]
    fn decodes_s3_keys_and_skips_other_events() {
        let event = json!({
            "Records": [
                {
                    "eventSource": "aws:s3",
                    "eventName": "ObjectCreated:Put",
                    "s3": {"bucket": {"name": "fanout"}, "object": {"key": "contact-lists/march+list%281%29.json"}}
                },
                {
                    "eventSource": "aws:s3",
                    "eventName": "ObjectRemoved:Delete",
                    "s3": {"bucket": {"name": "fanout"}, "object": {"key": "contact-lists/old.json"}}
                }
            ]
        });

        let parsed = parse_event(&event).expect("should parse");
        assert_eq!(
            parsed,
            FanoutEvent::ObjectsCreated(vec![ObjectCreated {
                bucket: "fanout".to_string(),
                key: "contact-lists/march list(1).json".to_string(),
            }])
        );
    }

    #[test]
    fn reads_sqs_attempt_count_and_not_before() {
        let event = json!({
            "Records": [{
                "eventSource": "aws:sqs",
                "eventSourceARN": "arn:aws:sqs:eu-west-2:123456789012:notifications-to-send",
                "messageId": "m-1",
                "body": "e30=",
                "attributes": {"ApproximateReceiveCount": "4"},
                "messageAttributes": {
                    "not_before": {"stringValue": "1580691600", "dataType": "Number"}
                }
            }]
        });

        let FanoutEvent::QueueMessages { queue, records } =
            parse_event(&event).expect("should parse")
        else {
            panic!("expected queue messages");
        };
        assert_eq!(queue, "notifications-to-send");
        assert_eq!(records[0].attempt_count, 4);
        assert_eq!(records[0].not_before, Some(1_580_691_600));
    }

    #[test]
    fn rejects_record_without_body_string() {
        let event = json!({
            "Records": [{
                "eventSource": "aws:sqs",
                "eventSourceARN": "arn:aws:sqs:eu-west-2:1:q",
                "messageId": "m-1",
                "body": 42
            }]
        });

        let error = parse_event(&event).expect_err("non-string body should fail");
        assert!(error.to_string().contains("SQS record body must be a string"));
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(parse_event(&json!({"hello": "world"})).is_err());
        assert!(parse_event(&json!({"Records": [{"eventSource": "aws:sns"}]})).is_err());
    }

    #[test]
    fn batch_response_uses_lambda_field_names() {
        let mut response = BatchResponse::default();
        response.fail("m-2");
        assert_eq!(
            serde_json::to_value(&response).expect("should serialize"),
            json!({"batchItemFailures": [{"itemIdentifier": "m-2"}]})
        );
    }
}
