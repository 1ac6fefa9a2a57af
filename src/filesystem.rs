//! Filesystem facade
//!
//! The object applications consume. A `Filesystem` owns exactly one backend
//! handle, which is either a plain adapter or a [`CachedAdapter`] wrapping
//! one, plus the per-filesystem options and attached plugins.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde_yaml::Value;
use tracing::trace;

use crate::adapter::{Adapter, DirEntryStream, Metadata, Visibility};
use crate::cache::CachedAdapter;
use crate::error::{Result, StorageError};
use crate::plugin::Plugin;

/// Per-filesystem options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilesystemOptions {
    /// Visibility given to files written without an explicit one
    pub visibility: Visibility,

    /// Skip the existence checks done before write, update and delete
    pub disable_asserts: bool,
}

/// Backing handle of a facade
#[derive(Clone)]
enum Backend {
    Plain(Arc<dyn Adapter>),
    Cached(Arc<CachedAdapter>),
}

/// Named filesystem facade
pub struct Filesystem {
    backend: Backend,
    options: FilesystemOptions,
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("Filesystem")
            .field("adapter", &self.adapter().kind())
            .field("options", &self.options)
            .field("plugins", &methods)
            .finish()
    }
}

impl Filesystem {
    /// Facade over an undecorated adapter
    pub fn new(adapter: Arc<dyn Adapter>, options: FilesystemOptions) -> Self {
        Self::with_backend(Backend::Plain(adapter), options)
    }

    /// Facade over a cache-decorated adapter
    pub fn cached(adapter: Arc<CachedAdapter>, options: FilesystemOptions) -> Self {
        Self::with_backend(Backend::Cached(adapter), options)
    }

    fn with_backend(backend: Backend, options: FilesystemOptions) -> Self {
        Self {
            backend,
            options,
            plugins: HashMap::new(),
        }
    }

    /// Attach a plugin. Replaces a previously attached plugin that provides
    /// the same method.
    pub fn add_plugin(&mut self, plugin: Arc<dyn Plugin>) {
        let method = plugin.method().to_string();
        if self.plugins.insert(method.clone(), plugin).is_some() {
            trace!("plugin method '{}' overridden", method);
        }
    }

    /// The adapter this facade talks to; a `CachedAdapter` when a cache is
    /// configured
    pub fn adapter(&self) -> Arc<dyn Adapter> {
        match &self.backend {
            Backend::Plain(adapter) => adapter.clone(),
            Backend::Cached(cached) => cached.clone(),
        }
    }

    /// The cache decorator, if this facade has one
    pub fn cached_adapter(&self) -> Option<&Arc<CachedAdapter>> {
        match &self.backend {
            Backend::Plain(_) => None,
            Backend::Cached(cached) => Some(cached),
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cached_adapter().is_some()
    }

    pub fn options(&self) -> &FilesystemOptions {
        &self.options
    }

    fn backend(&self) -> &dyn Adapter {
        match &self.backend {
            Backend::Plain(adapter) => adapter.as_ref(),
            Backend::Cached(cached) => cached.as_ref(),
        }
    }

    async fn assert_present(&self, path: &str) -> Result<()> {
        if !self.options.disable_asserts && !self.backend().exists(path).await? {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(())
    }

    async fn assert_absent(&self, path: &str) -> Result<()> {
        if !self.options.disable_asserts && self.backend().exists(path).await? {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }
        Ok(())
    }

    /// Write a new file with the default visibility
    pub async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.write_with_visibility(path, data, self.options.visibility)
            .await
    }

    /// Write a new file; fails if it exists unless asserts are disabled
    pub async fn write_with_visibility(
        &self,
        path: &str,
        data: &[u8],
        visibility: Visibility,
    ) -> Result<()> {
        self.assert_absent(path).await?;
        self.backend().write(path, data, visibility).await
    }

    /// Replace an existing file, keeping its visibility
    pub async fn update(&self, path: &str, data: &[u8]) -> Result<()> {
        self.assert_present(path).await?;
        let visibility = match self.backend().metadata(path).await {
            Ok(metadata) => metadata.visibility,
            Err(StorageError::NotFound(_)) => self.options.visibility,
            Err(e) => return Err(e),
        };
        self.backend().write(path, data, visibility).await
    }

    /// Create or replace a file
    pub async fn put(&self, path: &str, data: &[u8]) -> Result<()> {
        if self.backend().exists(path).await? {
            self.update(path, data).await
        } else {
            self.backend()
                .write(path, data, self.options.visibility)
                .await
        }
    }

    pub async fn read(&self, path: &str) -> Result<Bytes> {
        self.assert_present(path).await?;
        self.backend().read(path).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.assert_present(path).await?;
        self.backend().delete(path).await
    }

    pub async fn has(&self, path: &str) -> Result<bool> {
        self.backend().exists(path).await
    }

    pub async fn metadata(&self, path: &str) -> Result<Metadata> {
        self.backend().metadata(path).await
    }

    pub async fn get_visibility(&self, path: &str) -> Result<Visibility> {
        Ok(self.metadata(path).await?.visibility)
    }

    pub async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        self.assert_present(path).await?;
        self.backend().set_visibility(path, visibility).await
    }

    /// Copy a file within this filesystem
    pub async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let data = self.read(from).await?;
        let visibility = self.get_visibility(from).await?;
        self.write_with_visibility(to, &data, visibility).await
    }

    /// Move a file within this filesystem
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.copy(from, to).await?;
        self.backend().delete(from).await
    }

    pub fn list_contents(&self, path: &str, recursive: bool) -> DirEntryStream {
        self.backend().list_contents(path, recursive)
    }

    pub async fn create_dir(&self, path: &str) -> Result<()> {
        self.backend().create_dir(path).await
    }

    pub async fn delete_dir(&self, path: &str) -> Result<()> {
        self.backend().delete_dir(path).await
    }

    /// Whether an attached plugin provides `method`
    pub fn has_method(&self, method: &str) -> bool {
        self.plugins.contains_key(method)
    }

    /// Invoke a plugin method
    pub async fn call(&self, method: &str, args: &[Value]) -> Result<Value> {
        let plugin = self
            .plugins
            .get(method)
            .cloned()
            .ok_or_else(|| StorageError::UnknownPluginMethod(method.to_string()))?;
        plugin.handle(self, args).await
    }
}
