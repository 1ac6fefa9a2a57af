//! Cache decorator
//!
//! `CachedAdapter` sits between a filesystem facade and its adapter. It
//! answers `metadata` and `exists` from the cache when it can and keeps the
//! cache coherent on every mutating call. It implements [`Adapter`] itself,
//! so the facade cannot tell it apart from a plain adapter.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::adapter::{normalize_path, Adapter, DirEntryStream, Metadata, Visibility};
use crate::cache::MetadataCache;
use crate::error::Result;

/// Adapter wrapped by a metadata cache
pub struct CachedAdapter {
    inner: Arc<dyn Adapter>,
    cache: Arc<dyn MetadataCache>,
}

/// Wrap `adapter` with `cache`
pub fn decorate(adapter: Arc<dyn Adapter>, cache: Arc<dyn MetadataCache>) -> Arc<CachedAdapter> {
    Arc::new(CachedAdapter::new(adapter, cache))
}

impl CachedAdapter {
    pub fn new(inner: Arc<dyn Adapter>, cache: Arc<dyn MetadataCache>) -> Self {
        Self { inner, cache }
    }

    /// The wrapped adapter
    pub fn inner(&self) -> &Arc<dyn Adapter> {
        &self.inner
    }

    pub fn cache(&self) -> &Arc<dyn MetadataCache> {
        &self.cache
    }

    fn invalidate(&self, path: &str) -> Result<()> {
        self.cache.delete(&normalize_path(path)?);
        Ok(())
    }
}

#[async_trait]
impl Adapter for CachedAdapter {
    fn kind(&self) -> &'static str {
        "cached"
    }

    async fn metadata(&self, path: &str) -> Result<Metadata> {
        let key = normalize_path(path)?;
        if let Some(hit) = self.cache.get(&key) {
            trace!("cache hit: {}", key);
            return Ok(hit);
        }
        let metadata = self.inner.metadata(&key).await?;
        self.cache.set(&key, metadata.clone());
        Ok(metadata)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let key = normalize_path(path)?;
        if self.cache.get(&key).is_some() {
            return Ok(true);
        }
        self.inner.exists(&key).await
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, data: &[u8], visibility: Visibility) -> Result<()> {
        let result = self.inner.write(path, data, visibility).await;
        self.invalidate(path)?;
        result
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let result = self.inner.delete(path).await;
        self.invalidate(path)?;
        result
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let result = self.inner.create_dir(path).await;
        self.invalidate(path)?;
        result
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        let result = self.inner.delete_dir(path).await;
        // Descendants are unknown to the cache contract; drop everything
        self.cache.flush()?;
        result
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let result = self.inner.set_visibility(path, visibility).await;
        self.invalidate(path)?;
        result
    }

    fn list_contents(&self, path: &str, recursive: bool) -> DirEntryStream {
        self.inner.list_contents(path, recursive)
    }
}
