//! Mount manager
//!
//! Indexes filesystems by mount prefix and routes `prefix://path` style
//! paths to the filesystem mounted under `prefix`. Only filesystems that
//! declare a non-empty mount are present; any other prefix, a filesystem
//! name included, is an `UnknownMount` error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, info};

use crate::adapter::{DirEntry, DirEntryStream, Metadata};
use crate::error::{Result, StorageError};
use crate::filesystem::Filesystem;

/// Split `prefix://path` into its prefix and path
pub fn split_prefixed(path: &str) -> Result<(&str, &str)> {
    match path.split_once("://") {
        Some((prefix, rest)) if !prefix.is_empty() => Ok((prefix, rest)),
        _ => Err(StorageError::InvalidPath(format!(
            "expected 'prefix://path', got '{}'",
            path
        ))),
    }
}

/// Mount table: prefix -> filesystem
#[derive(Default)]
pub struct MountManager {
    filesystems: HashMap<String, Arc<Filesystem>>,
}

impl fmt::Debug for MountManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountManager")
            .field("prefixes", &self.prefixes())
            .finish()
    }
}

impl MountManager {
    /// Create an empty mount manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `filesystem` under `prefix`
    pub fn mount(&mut self, prefix: &str, filesystem: Arc<Filesystem>) -> Result<()> {
        if prefix.is_empty() {
            return Err(StorageError::InvalidArgument(
                "mount prefix cannot be empty".to_string(),
            ));
        }
        if self.filesystems.contains_key(prefix) {
            return Err(StorageError::AlreadyExists(format!("{}://", prefix)));
        }

        info!("Mounting filesystem under '{}://'", prefix);
        self.filesystems.insert(prefix.to_string(), filesystem);
        Ok(())
    }

    /// Filesystem mounted under `prefix`
    pub fn get_filesystem(&self, prefix: &str) -> Result<Arc<Filesystem>> {
        self.filesystems
            .get(prefix)
            .cloned()
            .ok_or_else(|| StorageError::UnknownMount(prefix.to_string()))
    }

    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.filesystems.contains_key(prefix)
    }

    /// Mounted prefixes, sorted
    pub fn prefixes(&self) -> Vec<&str> {
        let mut prefixes: Vec<&str> = self.filesystems.keys().map(String::as_str).collect();
        prefixes.sort_unstable();
        prefixes
    }

    /// Number of mounted filesystems
    pub fn count(&self) -> usize {
        self.filesystems.len()
    }

    /// Resolve `prefix://path` to the mounted filesystem and the inner path
    pub fn resolve<'a>(&self, path: &'a str) -> Result<(Arc<Filesystem>, &'a str)> {
        let (prefix, inner) = split_prefixed(path)?;
        Ok((self.get_filesystem(prefix)?, inner))
    }

    pub async fn read(&self, path: &str) -> Result<Bytes> {
        let (fs, inner) = self.resolve(path)?;
        fs.read(inner).await
    }

    pub async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let (fs, inner) = self.resolve(path)?;
        fs.write(inner, data).await
    }

    pub async fn put(&self, path: &str, data: &[u8]) -> Result<()> {
        let (fs, inner) = self.resolve(path)?;
        fs.put(inner, data).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let (fs, inner) = self.resolve(path)?;
        fs.delete(inner).await
    }

    pub async fn has(&self, path: &str) -> Result<bool> {
        let (fs, inner) = self.resolve(path)?;
        fs.has(inner).await
    }

    pub async fn metadata(&self, path: &str) -> Result<Metadata> {
        let (fs, inner) = self.resolve(path)?;
        fs.metadata(inner).await
    }

    /// List a directory; yielded paths carry the `prefix://` of the mount
    pub fn list_contents(&self, path: &str, recursive: bool) -> Result<DirEntryStream> {
        let (prefix, inner) = split_prefixed(path)?;
        let fs = self.get_filesystem(prefix)?;
        let prefix = prefix.to_string();
        let stream = fs.list_contents(inner, recursive).map(move |entry| {
            entry.map(|entry| DirEntry {
                path: format!("{}://{}", prefix, entry.path),
                file_type: entry.file_type,
            })
        });
        Ok(Box::pin(stream))
    }

    /// Copy a file, possibly between two mounts. Keeps the visibility.
    pub async fn copy(&self, from: &str, to: &str) -> Result<()> {
        let (source, source_path) = self.resolve(from)?;
        let (target, target_path) = self.resolve(to)?;

        if Arc::ptr_eq(&source, &target) {
            return source.copy(source_path, target_path).await;
        }

        let data = source.read(source_path).await?;
        let visibility = source.get_visibility(source_path).await?;
        debug!("copy {} -> {} ({} bytes)", from, to, data.len());
        target
            .write_with_visibility(target_path, &data, visibility)
            .await
    }

    /// Move a file, possibly between two mounts
    pub async fn move_file(&self, from: &str, to: &str) -> Result<()> {
        let (source, source_path) = self.resolve(from)?;
        let (target, target_path) = self.resolve(to)?;

        if Arc::ptr_eq(&source, &target) {
            return source.rename(source_path, target_path).await;
        }

        self.copy(from, to).await?;
        source.delete(source_path).await
    }
}
