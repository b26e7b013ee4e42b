//! S3-compatible blob store.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use memoir_models::BlobId;
use tracing::{debug, info, warn};

use crate::blob::{BlobReader, BlobStore, BlobUpload};
use crate::error::{StorageError, StorageResult};

/// Minimum multipart part size accepted by S3 (except for the last part).
pub const MULTIPART_PART_BYTES: usize = 8 * 1024 * 1024;

/// Object metadata key holding the upload's descriptive name.
const NAME_METADATA_KEY: &str = "original-name";

/// Configuration for the S3 backend.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region
    pub region: String,
    /// Key prefix under which blobs are stored
    pub key_prefix: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("S3_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("S3_BUCKET_NAME not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            key_prefix: std::env::var("S3_KEY_PREFIX").unwrap_or_else(|_| "blobs".to_string()),
        })
    }
}

/// Object key for a blob id.
fn object_key(prefix: &str, id: &BlobId) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        id.as_str().to_string()
    } else {
        format!("{}/{}", prefix, id)
    }
}

/// S3 metadata values must be printable ASCII.
fn metadata_value(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect()
}

/// [`BlobStore`] backed by an S3-compatible bucket.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3BlobStore {
    /// Build the client and verify the bucket is reachable.
    pub async fn connect(config: S3Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "memoir",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let store = Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            prefix: config.key_prefix,
        };
        store.check_connectivity().await?;

        info!(bucket = %store.bucket, prefix = %store.prefix, "Connected to blob store");
        Ok(store)
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::connect(S3Config::from_env()?).await
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::unavailable(format!("bucket check failed: {}", e)))?;
        Ok(())
    }

    /// Release the client. In-flight handles keep their own clone.
    pub fn teardown(self) {
        info!(bucket = %self.bucket, "Blob store torn down");
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn key(&self, id: &BlobId) -> String {
        object_key(&self.prefix, id)
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn open_upload(
        &self,
        name: &str,
        content_type: &str,
    ) -> StorageResult<Box<dyn BlobUpload>> {
        let id = BlobId::new();
        let key = self.key(&id);
        debug!(blob_id = %id, key, name, "Opening upload");

        Ok(Box::new(S3Upload {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key,
            id,
            name: metadata_value(name),
            content_type: content_type.to_string(),
            buffer: Vec::new(),
            upload_id: None,
            parts: Vec::new(),
        }))
    }

    async fn open_download(&self, id: &BlobId) -> StorageResult<BlobReader> {
        let key = self.key(id);
        debug!(blob_id = %id, key, "Opening download");

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                    StorageError::not_found(id.as_str())
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        Ok(Box::pin(response.body.into_async_read()))
    }

    async fn exists(&self, id: &BlobId) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.key(id))
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) => Ok(false),
            Err(e) => Err(StorageError::unavailable(e.to_string())),
        }
    }

    async fn delete(&self, id: &BlobId) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.key(id))
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;
        Ok(())
    }
}

/// Upload handle that switches to a multipart upload once a full part is buffered.
struct S3Upload {
    client: Client,
    bucket: String,
    key: String,
    id: BlobId,
    name: String,
    content_type: String,
    buffer: Vec<u8>,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
}

impl S3Upload {
    async fn ensure_multipart(&mut self) -> StorageResult<String> {
        if let Some(upload_id) = &self.upload_id {
            return Ok(upload_id.clone());
        }

        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type(&self.content_type)
            .metadata(NAME_METADATA_KEY, &self.name)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        let upload_id = output
            .upload_id()
            .ok_or_else(|| StorageError::upload_failed("multipart upload returned no id"))?
            .to_string();

        debug!(key = %self.key, upload_id, "Started multipart upload");
        self.upload_id = Some(upload_id.clone());
        Ok(upload_id)
    }

    async fn upload_part(&mut self, data: Vec<u8>) -> StorageResult<()> {
        let upload_id = self.ensure_multipart().await?;
        let part_number = self.parts.len() as i32 + 1;

        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.parts.push(
            CompletedPart::builder()
                .set_e_tag(output.e_tag().map(str::to_string))
                .part_number(part_number)
                .build(),
        );
        Ok(())
    }

    async fn put_single(&mut self) -> StorageResult<()> {
        let body = std::mem::take(&mut self.buffer);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_type(&self.content_type)
            .metadata(NAME_METADATA_KEY, &self.name)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;
        Ok(())
    }

    async fn complete_multipart(&mut self) -> StorageResult<()> {
        if !self.buffer.is_empty() {
            let last = std::mem::take(&mut self.buffer);
            self.upload_part(last).await?;
        }
        let upload_id = self.ensure_multipart().await?;

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(std::mem::take(&mut self.parts)))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;
        Ok(())
    }

    async fn abort_multipart(&self) -> StorageResult<()> {
        let Some(upload_id) = &self.upload_id else {
            return Ok(());
        };

        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        debug!(key = %self.key, "Aborted multipart upload");
        Ok(())
    }
}

#[async_trait]
impl BlobUpload for S3Upload {
    async fn write(&mut self, chunk: &[u8]) -> StorageResult<()> {
        self.buffer.extend_from_slice(chunk);
        while self.buffer.len() >= MULTIPART_PART_BYTES {
            let rest = self.buffer.split_off(MULTIPART_PART_BYTES);
            let part = std::mem::replace(&mut self.buffer, rest);
            self.upload_part(part).await?;
        }
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<BlobId> {
        let result = if self.upload_id.is_none() {
            self.put_single().await
        } else {
            self.complete_multipart().await
        };

        if let Err(e) = result {
            if let Err(abort_err) = self.abort_multipart().await {
                warn!(key = %self.key, error = %abort_err, "Failed to abort multipart upload");
            }
            return Err(e);
        }

        info!(blob_id = %self.id, key = %self.key, parts = self.parts.len(), "Blob committed");
        Ok(self.id.clone())
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        self.abort_multipart().await
    }
}
