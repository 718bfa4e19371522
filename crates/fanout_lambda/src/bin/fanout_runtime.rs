use std::sync::Arc;

use chrono::Utc;
use fanout_core::storage_keys::BlobArea;
use fanout_lambda::adapters::dynamodb::DynamoReceiptStore;
use fanout_lambda::adapters::notify::NotifyGateway;
use fanout_lambda::adapters::s3::S3BlobStore;
use fanout_lambda::adapters::sqs::SqsQueue;
use fanout_lambda::config::FanoutConfig;
use fanout_lambda::logging;
use fanout_lambda::runtime::{Pipeline, PipelineSettings};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

async fn build_pipeline(config: &FanoutConfig) -> Result<Pipeline, Error> {
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let s3_client = aws_sdk_s3::Client::new(&aws_config);
    let sqs_client = aws_sdk_sqs::Client::new(&aws_config);
    let dynamodb_client = aws_sdk_dynamodb::Client::new(&aws_config);

    Ok(Pipeline {
        contact_lists: Arc::new(S3BlobStore::new(
            s3_client.clone(),
            &config.bucket,
            &config.contact_list_prefix,
            BlobArea::ContactLists,
        )),
        batches: Arc::new(S3BlobStore::new(
            s3_client,
            &config.bucket,
            &config.batch_prefix,
            BlobArea::Batches,
        )),
        batch_queue: Arc::new(SqsQueue::new(sqs_client.clone(), &config.batch_queue_url)),
        send_queue: Arc::new(SqsQueue::new(sqs_client.clone(), &config.send_queue_url)),
        failed_queue: Arc::new(SqsQueue::new(sqs_client.clone(), &config.failed_queue_url)),
        rate_limit_queue: Arc::new(SqsQueue::new(sqs_client, &config.rate_limit_queue_url)),
        receipts: Arc::new(DynamoReceiptStore::new(
            dynamodb_client,
            &config.receipts_table,
        )),
        gateway: Arc::new(NotifyGateway::new(
            &config.notify.base_url,
            &config.notify.api_key,
        )?),
        settings: PipelineSettings::from(config),
    })
}

async fn handle_request(pipeline: Arc<Pipeline>, event: LambdaEvent<Value>) -> Result<Value, Error> {
    let request_id = event.context.request_id.clone();
    match pipeline.dispatch(event.payload, Utc::now()).await {
        Ok(response) => Ok(response),
        Err(error) => {
            tracing::error!(request_id = %request_id, error = %error, "invocation failed");
            Err(error.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    logging::init();

    let config = FanoutConfig::from_env()?;
    tracing::info!(
        bucket = %config.bucket,
        chunk_size = config.chunk_size,
        drain_batch_size = config.drain.batch_size,
        "fanout runtime starting"
    );
    let pipeline = Arc::new(build_pipeline(&config).await?);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        handle_request(pipeline.clone(), event)
    }))
    .await
}
