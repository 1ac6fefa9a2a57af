//! S3 adapter implementation
//!
//! This adapter provides access to Amazon S3 or S3-compatible storage
//! backends (MinIO, LocalStack, etc.). Directories are virtual; visibility
//! is stored in object user metadata.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_stream::try_stream;
use async_trait::async_trait;
use aws_config::environment::EnvironmentVariableCredentialsProvider;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, trace};

use crate::adapter::{normalize_path, Adapter, DirEntry, DirEntryStream, Metadata, Visibility};
use crate::config::ConfigError;
use crate::error::{ComposeError, Result, StorageError};
use crate::registry::{parse_options, AdapterFactory, BuildContext};

/// S3 metadata key for storing visibility
const S3_VISIBILITY_METADATA_KEY: &str = "visibility";

/// Options of the `awss3v3` adapter kind
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3AdapterConfig {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,

    /// Key prefix for exposing a subpath of the bucket
    #[serde(default)]
    pub prefix: Option<String>,

    /// Custom endpoint URL (for S3-compatible stores)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Force path-style addressing (for MinIO, LocalStack, etc.)
    #[serde(default)]
    pub force_path_style: bool,

    /// Access key id; taken from the environment when absent
    #[serde(default)]
    pub key: Option<String>,

    /// Secret access key; required together with `key`
    #[serde(default)]
    pub secret: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl S3AdapterConfig {
    fn check(&self) -> std::result::Result<(), String> {
        if self.bucket.is_empty() {
            return Err("bucket cannot be empty".to_string());
        }
        if self.key.is_some() != self.secret.is_some() {
            return Err("key and secret must be given together".to_string());
        }
        Ok(())
    }
}

/// S3 adapter for Amazon S3 and S3-compatible storage
pub struct S3Adapter {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Adapter {
    /// Create a new S3 adapter. No request is sent until the first operation.
    pub fn new(config: S3AdapterConfig) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        builder = match (&config.key, &config.secret) {
            (Some(key), Some(secret)) => builder.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                "storage-composer",
            )),
            _ => builder.credentials_provider(EnvironmentVariableCredentialsProvider::new()),
        };

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
            prefix: config.prefix.unwrap_or_default(),
        }
    }

    /// Convert an adapter path to an S3 key
    fn path_to_key(&self, path: &str) -> Result<String> {
        let path = normalize_path(path)?;
        Ok(prefixed_key(&self.prefix, &path))
    }

    fn visibility_metadata(visibility: Visibility) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert(
            S3_VISIBILITY_METADATA_KEY.to_string(),
            visibility.as_str().to_string(),
        );
        metadata
    }
}

fn prefixed_key(prefix: &str, path: &str) -> String {
    if path.is_empty() {
        prefix.to_string()
    } else if prefix.is_empty() {
        path.to_string()
    } else if prefix.ends_with('/') {
        format!("{}{}", prefix, path)
    } else {
        format!("{}/{}", prefix, path)
    }
}

/// Strip the adapter prefix from an object key
fn key_to_path(prefix: &str, key: &str) -> String {
    let key = key.strip_prefix(prefix).unwrap_or(key);
    key.trim_start_matches('/').trim_end_matches('/').to_string()
}

#[async_trait]
impl Adapter for S3Adapter {
    fn kind(&self) -> &'static str {
        "awss3v3"
    }

    async fn metadata(&self, path: &str) -> Result<Metadata> {
        let key = self.path_to_key(path)?;
        trace!("metadata: path={} key={}", path, key);

        // Root directory always exists
        if key.is_empty() || key == self.prefix {
            return Ok(Metadata::directory(SystemTime::now(), Visibility::Public));
        }

        let head_result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;

        match head_result {
            Ok(output) => {
                let size = output.content_length().unwrap_or(0) as u64;
                let mtime = output
                    .last_modified()
                    .and_then(|dt| {
                        SystemTime::UNIX_EPOCH.checked_add(Duration::from_secs(dt.secs() as u64))
                    })
                    .unwrap_or(SystemTime::now());
                let visibility = output
                    .metadata()
                    .and_then(|m| m.get(S3_VISIBILITY_METADATA_KEY))
                    .and_then(|v| Visibility::parse(v))
                    .unwrap_or_default();

                return Ok(Metadata::file(size, mtime, visibility));
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if !service_error.is_not_found() {
                    return Err(StorageError::Backend(format!(
                        "S3 HeadObject error: {}",
                        service_error
                    )));
                }
            }
        }

        // Try as a directory (any object under this prefix)
        let dir_key = format!("{}/", key.trim_end_matches('/'));
        let list_result = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&dir_key)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| {
                StorageError::Backend(format!(
                    "S3 ListObjectsV2 error for prefix '{}': {}",
                    dir_key,
                    e.into_service_error()
                ))
            })?;

        if list_result.key_count().unwrap_or(0) > 0 || !list_result.common_prefixes().is_empty() {
            return Ok(Metadata::directory(SystemTime::now(), Visibility::Public));
        }

        Err(StorageError::NotFound(path.to_string()))
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let key = self.path_to_key(path)?;
        trace!("read: path={} key={}", path, key);

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    StorageError::NotFound(path.to_string())
                } else {
                    StorageError::Backend(format!("S3 GetObject error: {}", service_error))
                }
            })?;

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("S3 read body error: {}", e)))?;

        Ok(body.into_bytes())
    }

    async fn write(&self, path: &str, data: &[u8], visibility: Visibility) -> Result<()> {
        let key = self.path_to_key(path)?;
        debug!("write: path={} key={} size={}", path, key, data.len());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .set_metadata(Some(Self::visibility_metadata(visibility)))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("S3 PutObject error: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let key = self.path_to_key(path)?;
        debug!("delete: path={} key={}", path, key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("S3 DeleteObject error: {}", e)))?;

        Ok(())
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        // Zero-byte object with a trailing slash marks the directory
        let key = format!("{}/", self.path_to_key(path)?.trim_end_matches('/'));
        debug!("create_dir: path={} key={}", path, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(Vec::new()))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("S3 PutObject error: {}", e)))?;

        Ok(())
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        let key = format!("{}/", self.path_to_key(path)?.trim_end_matches('/'));
        debug!("delete_dir: path={} key={}", path, key);

        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&key);

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let list_result = request.send().await.map_err(|e| {
                StorageError::Backend(format!(
                    "S3 ListObjectsV2 delete_dir error: {}",
                    e.into_service_error()
                ))
            })?;

            let mut objects = Vec::new();
            for k in list_result.contents().iter().filter_map(|obj| obj.key()) {
                let id = aws_sdk_s3::types::ObjectIdentifier::builder()
                    .key(k)
                    .build()
                    .map_err(|e| StorageError::Backend(format!("Failed to build delete: {}", e)))?;
                objects.push(id);
            }

            if !objects.is_empty() {
                let delete = aws_sdk_s3::types::Delete::builder()
                    .set_objects(Some(objects))
                    .build()
                    .map_err(|e| StorageError::Backend(format!("Failed to build delete: {}", e)))?;

                self.client
                    .delete_objects()
                    .bucket(&self.bucket)
                    .delete(delete)
                    .send()
                    .await
                    .map_err(|e| StorageError::Backend(format!("S3 DeleteObjects error: {}", e)))?;
            }

            if list_result.is_truncated().unwrap_or(false) {
                continuation_token = list_result.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        Ok(())
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let key = self.path_to_key(path)?;
        debug!("set_visibility: path={} key={} {}", path, key, visibility.as_str());

        // Metadata cannot be edited in place; copy the object onto itself
        let copy_source = format!("{}/{}", self.bucket, key);

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(&key)
            .copy_source(&copy_source)
            .metadata_directive(aws_sdk_s3::types::MetadataDirective::Replace)
            .set_metadata(Some(Self::visibility_metadata(visibility)))
            .send()
            .await
            .map_err(|e| StorageError::Backend(format!("S3 CopyObject error: {}", e)))?;

        Ok(())
    }

    fn list_contents(&self, path: &str, recursive: bool) -> DirEntryStream {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let root_prefix = self.prefix.clone();
        let key = self.path_to_key(path);

        Box::pin(try_stream! {
            let mut prefix = key?;
            if !prefix.is_empty() && !prefix.ends_with('/') {
                prefix.push('/');
            }
            let mut continuation_token: Option<String> = None;

            loop {
                let mut request = client.list_objects_v2().bucket(&bucket).prefix(&prefix);
                if !recursive {
                    request = request.delimiter("/");
                }
                if let Some(token) = continuation_token.take() {
                    request = request.continuation_token(token);
                }

                let result = request.send().await.map_err(|e| {
                    StorageError::Backend(format!(
                        "S3 ListObjectsV2 list_contents error: {}",
                        e.into_service_error()
                    ))
                })?;

                for obj in result.contents() {
                    if let Some(key) = obj.key() {
                        if key == prefix {
                            continue;
                        }
                        let rel = key_to_path(&root_prefix, key);
                        if key.ends_with('/') {
                            yield DirEntry::directory(rel);
                        } else {
                            yield DirEntry::file(rel);
                        }
                    }
                }

                for common_prefix in result.common_prefixes() {
                    if let Some(p) = common_prefix.prefix() {
                        let rel = key_to_path(&root_prefix, p);
                        if !rel.is_empty() {
                            yield DirEntry::directory(rel);
                        }
                    }
                }

                if result.is_truncated().unwrap_or(false) {
                    continuation_token = result.next_continuation_token().map(|s| s.to_string());
                } else {
                    break;
                }
            }
        })
    }
}

/// Factory for the `awss3v3` adapter kind
pub struct S3AdapterFactory;

impl AdapterFactory for S3AdapterFactory {
    fn key(&self) -> &str {
        "awss3v3"
    }

    fn validate(&self, options: &Value) -> std::result::Result<(), ConfigError> {
        let config: S3AdapterConfig = parse_options(self.key(), options)?;
        config
            .check()
            .map_err(|e| ConfigError::ValidationError(format!("awss3v3: {}", e)))
    }

    fn create(
        &self,
        _ctx: &BuildContext,
        id: &str,
        options: &Value,
    ) -> std::result::Result<Arc<dyn Adapter>, ComposeError> {
        let config: S3AdapterConfig = parse_options(self.key(), options)?;
        config
            .check()
            .map_err(|e| ComposeError::construction(id, StorageError::InvalidArgument(e)))?;
        debug!("{}: S3 adapter for bucket {}", id, config.bucket);
        Ok(Arc::new(S3Adapter::new(config)))
    }
}
