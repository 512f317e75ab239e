//! S3-compatible multipart store
//!
//! Wraps the AWS SDK multipart calls behind [`MultipartStore`].

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    types::{CompletedMultipartUpload, CompletedPart},
    Client,
};
use bytes::Bytes;

use crate::config::StorageConfig;
use crate::error::StorageError;

use super::types::{MultipartStore, PartInfo, StoreOperation};

const DEFAULT_REGION: &str = "us-east-1";

/// S3-compatible storage client
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    bucket: String,
}

impl S3Client {
    /// Create a new S3 client from configuration
    ///
    /// Static credentials are used when both keys are configured, otherwise
    /// the default AWS provider chain applies.
    pub async fn new(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if shared.region().is_none() {
            builder = builder.region(Region::new(DEFAULT_REGION));
        }

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            let credentials =
                Credentials::new(access_key, secret_key, None, None, "multipart-relay");
            builder = builder.credentials_provider(credentials);
        }

        if let Some(endpoint) = &config.endpoint {
            // Required for MinIO and other S3-compatible services
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        let bucket = config.bucket.clone();
        match client.head_bucket().bucket(&bucket).send().await {
            Ok(_) => {
                tracing::info!("Connected to S3 bucket: {}", bucket);
            }
            Err(e) => {
                tracing::warn!(
                    "Could not verify bucket {}: {}. Will attempt operations anyway.",
                    bucket,
                    DisplayErrorContext(&e)
                );
            }
        }

        Self { client, bucket }
    }
}

#[async_trait]
impl MultipartStore for S3Client {
    async fn initiate(&self, key: &str) -> Result<String, StorageError> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::sdk(StoreOperation::Initiate, DisplayErrorContext(&e).to_string())
            })?;

        response
            .upload_id()
            .map(str::to_string)
            .ok_or(StorageError::MissingField {
                operation: StoreOperation::Initiate,
                field: "UploadId",
            })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
        content_length: u64,
    ) -> Result<String, StorageError> {
        let part_number = i32::try_from(part_number).map_err(|_| {
            StorageError::rejected(
                StoreOperation::UploadPart,
                format!("part number {} out of range", part_number),
            )
        })?;
        let content_length = i64::try_from(content_length).map_err(|_| {
            StorageError::rejected(
                StoreOperation::UploadPart,
                format!("content length {} out of range", content_length),
            )
        })?;

        tracing::debug!(
            key = %key,
            part_number = part_number,
            content_length = content_length,
            "Uploading part to S3"
        );

        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(content_length)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                StorageError::sdk(
                    StoreOperation::UploadPart,
                    DisplayErrorContext(&e).to_string(),
                )
            })?;

        response
            .e_tag()
            .map(str::to_string)
            .ok_or(StorageError::MissingField {
                operation: StoreOperation::UploadPart,
                field: "ETag",
            })
    }

    async fn complete(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartInfo],
    ) -> Result<(), StorageError> {
        let completed_parts = parts
            .iter()
            .map(|part| {
                let part_number = i32::try_from(part.part_number).map_err(|_| {
                    StorageError::rejected(
                        StoreOperation::Complete,
                        format!("part number {} out of range", part.part_number),
                    )
                })?;
                Ok(CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(&part.etag)
                    .build())
            })
            .collect::<Result<Vec<_>, StorageError>>()?;

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| {
                StorageError::sdk(StoreOperation::Complete, DisplayErrorContext(&e).to_string())
            })?;

        tracing::info!(key = %key, parts = parts.len(), "S3 multipart upload completed");

        Ok(())
    }

    async fn abort(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| {
                StorageError::sdk(StoreOperation::Abort, DisplayErrorContext(&e).to_string())
            })?;

        Ok(())
    }
}
