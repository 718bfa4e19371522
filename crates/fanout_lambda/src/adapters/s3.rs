use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use fanout_core::storage_keys::{area_prefix, blob_name_from_key, object_key, BlobArea};

use super::BlobStore;
use crate::error::BlobStoreError;

#[derive(Clone)]
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    area: BlobArea,
}

impl S3BlobStore {
    pub fn new(
        client: aws_sdk_s3::Client,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        area: BlobArea,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            area,
        }
    }

    fn key(&self, name: &str) -> String {
        object_key(&self.prefix, name)
    }

    fn request_error(&self, name: &str, error: impl std::fmt::Display) -> BlobStoreError {
        tracing::warn!(
            area = self.area.as_str(),
            bucket = %self.bucket,
            blob = %name,
            error = %error,
            "s3 request failed"
        );
        BlobStoreError::Request {
            name: name.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        name: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BlobStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.key(name))
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| self.request_error(name, aws_sdk_s3::error::DisplayErrorContext(error)))
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>, BlobStoreError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.key(name))
            .send()
            .await
        {
            Ok(output) => output,
            Err(error) => {
                if error
                    .as_service_error()
                    .is_some_and(|service| service.is_no_such_key())
                {
                    return Err(BlobStoreError::NotFound {
                        name: name.to_string(),
                    });
                }
                return Err(
                    self.request_error(name, aws_sdk_s3::error::DisplayErrorContext(error))
                );
            }
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|error| self.request_error(name, error))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn delete(&self, name: &str) -> Result<(), BlobStoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key(name))
            .send()
            .await
            .map(|_| ())
            .map_err(|error| self.request_error(name, aws_sdk_s3::error::DisplayErrorContext(error)))
    }

    async fn list(&self, limit: usize) -> Result<Vec<String>, BlobStoreError> {
        let prefix = area_prefix(&self.prefix);
        let max_keys = i32::try_from(limit).unwrap_or(i32::MAX);
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&prefix)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|error| {
                self.request_error(&prefix, aws_sdk_s3::error::DisplayErrorContext(error))
            })?;

        Ok(output
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .filter_map(|key| blob_name_from_key(&self.prefix, key))
            .map(str::to_string)
            .take(limit)
            .collect())
    }
}
