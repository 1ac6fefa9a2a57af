//! Local disk adapter
//!
//! Stores files below a root directory on the host filesystem. Visibility
//! is mapped to POSIX permission bits using a configurable table.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, trace};

use crate::adapter::{join_path, normalize_path, Adapter, DirEntry, DirEntryStream, Metadata, Visibility};
use crate::config::ConfigError;
use crate::error::{ComposeError, Result, StorageError};
use crate::registry::{parse_options, AdapterFactory, BuildContext};

/// Permission bits for one visibility pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModePair {
    pub public: u32,
    pub private: u32,
}

/// Permission table used to translate visibility into modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalPermissions {
    #[serde(default = "default_file_modes")]
    pub file: ModePair,
    #[serde(default = "default_dir_modes")]
    pub dir: ModePair,
}

fn default_file_modes() -> ModePair {
    ModePair {
        public: 0o644,
        private: 0o600,
    }
}

fn default_dir_modes() -> ModePair {
    ModePair {
        public: 0o755,
        private: 0o700,
    }
}

impl Default for LocalPermissions {
    fn default() -> Self {
        Self {
            file: default_file_modes(),
            dir: default_dir_modes(),
        }
    }
}

/// Options of the `local` adapter kind
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalAdapterConfig {
    /// Root directory; relative paths resolve against the build context
    pub directory: PathBuf,

    /// Do not create the root directory at construction time
    #[serde(default)]
    pub lazy: bool,

    #[serde(default)]
    pub permissions: LocalPermissions,
}

/// Adapter rooted at a directory on local disk
#[derive(Debug)]
pub struct LocalAdapter {
    root: PathBuf,
    permissions: LocalPermissions,
}

impl LocalAdapter {
    /// Create a new local adapter, creating the root directory unless `lazy`
    pub fn new(root: PathBuf, permissions: LocalPermissions, lazy: bool) -> Result<Self> {
        if !lazy {
            std::fs::create_dir_all(&root)
                .map_err(|e| StorageError::from_io(e, &root.to_string_lossy()))?;
        }
        Ok(Self { root, permissions })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<(String, PathBuf)> {
        let rel = normalize_path(path)?;
        let full = if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&rel)
        };
        Ok((rel, full))
    }

    fn visibility_for_mode(&self, mode: u32, is_dir: bool) -> Visibility {
        let pair = if is_dir {
            self.permissions.dir
        } else {
            self.permissions.file
        };
        if mode & 0o777 == pair.private & 0o777 {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }

    async fn apply_mode(&self, full: &Path, mode: u32) -> Result<()> {
        set_mode(full, mode)
            .await
            .map_err(|e| StorageError::from_io(e, &full.to_string_lossy()))
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> u32 {
    0o644
}

#[async_trait]
impl Adapter for LocalAdapter {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn metadata(&self, path: &str) -> Result<Metadata> {
        let (rel, full) = self.resolve(path)?;
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| StorageError::from_io(e, &rel))?;
        let mtime = meta.modified()?;
        let visibility = self.visibility_for_mode(mode_of(&meta), meta.is_dir());

        if meta.is_dir() {
            Ok(Metadata::directory(mtime, visibility))
        } else {
            Ok(Metadata::file(meta.len(), mtime, visibility))
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let (rel, full) = self.resolve(path)?;
        trace!("local read {:?}", full);
        let data = tokio::fs::read(&full)
            .await
            .map_err(|e| StorageError::from_io(e, &rel))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, data: &[u8], visibility: Visibility) -> Result<()> {
        let (rel, full) = self.resolve(path)?;
        if rel.is_empty() {
            return Err(StorageError::IsADirectory(path.to_string()));
        }
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io(e, &rel))?;
        }
        trace!("local write {:?} ({} bytes)", full, data.len());
        tokio::fs::write(&full, data)
            .await
            .map_err(|e| StorageError::from_io(e, &rel))?;

        let mode = match visibility {
            Visibility::Public => self.permissions.file.public,
            Visibility::Private => self.permissions.file.private,
        };
        self.apply_mode(&full, mode).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let (rel, full) = self.resolve(path)?;
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| StorageError::from_io(e, &rel))?;
        if meta.is_dir() {
            return Err(StorageError::IsADirectory(rel));
        }
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| StorageError::from_io(e, &rel))
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let (rel, full) = self.resolve(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| StorageError::from_io(e, &rel))?;
        self.apply_mode(&full, self.permissions.dir.public).await
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        let (rel, full) = self.resolve(path)?;
        if rel.is_empty() {
            return Err(StorageError::InvalidPath(
                "refusing to delete the adapter root".to_string(),
            ));
        }
        tokio::fs::remove_dir_all(&full)
            .await
            .map_err(|e| StorageError::from_io(e, &rel))
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let (rel, full) = self.resolve(path)?;
        let meta = tokio::fs::metadata(&full)
            .await
            .map_err(|e| StorageError::from_io(e, &rel))?;
        let pair = if meta.is_dir() {
            self.permissions.dir
        } else {
            self.permissions.file
        };
        let mode = match visibility {
            Visibility::Public => pair.public,
            Visibility::Private => pair.private,
        };
        self.apply_mode(&full, mode).await
    }

    fn list_contents(&self, path: &str, recursive: bool) -> DirEntryStream {
        let resolved = self.resolve(path);

        Box::pin(try_stream! {
            let (rel, full) = resolved?;
            let mut pending = vec![(rel, full)];

            while let Some((dir_rel, dir_full)) = pending.pop() {
                let mut entries = tokio::fs::read_dir(&dir_full)
                    .await
                    .map_err(|e| StorageError::from_io(e, &dir_rel))?;

                while let Some(entry) = entries.next_entry().await? {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let child = join_path(&dir_rel, &name);
                    let file_type = entry.file_type().await?;

                    if file_type.is_dir() {
                        if recursive {
                            pending.push((child.clone(), entry.path()));
                        }
                        yield DirEntry::directory(child);
                    } else {
                        yield DirEntry::file(child);
                    }
                }
            }
        })
    }
}

/// Factory for the `local` adapter kind
pub struct LocalAdapterFactory;

impl AdapterFactory for LocalAdapterFactory {
    fn key(&self) -> &str {
        "local"
    }

    fn validate(&self, options: &Value) -> std::result::Result<(), ConfigError> {
        parse_options::<LocalAdapterConfig>(self.key(), options).map(|_| ())
    }

    fn create(
        &self,
        ctx: &BuildContext,
        id: &str,
        options: &Value,
    ) -> std::result::Result<Arc<dyn Adapter>, ComposeError> {
        let config: LocalAdapterConfig = parse_options(self.key(), options)?;
        let root = ctx.resolve_path(&config.directory);
        debug!("{}: local adapter rooted at {:?}", id, root);

        let adapter = LocalAdapter::new(root, config.permissions, config.lazy)
            .map_err(|e| ComposeError::construction(id, e))?;
        Ok(Arc::new(adapter))
    }
}
