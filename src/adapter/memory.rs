//! Volatile in-memory adapter
//!
//! Useful for tests and scratch space. Directories are implicit: any
//! prefix of a stored file path is reported as a directory.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::stream;
use serde::Deserialize;
use serde_yaml::Value;

use crate::adapter::{normalize_path, Adapter, DirEntry, DirEntryStream, FileType, Metadata, Visibility};
use crate::config::ConfigError;
use crate::error::{ComposeError, Result, StorageError};
use crate::registry::{parse_options, AdapterFactory, BuildContext};

#[derive(Debug, Clone)]
enum Node {
    File {
        data: Bytes,
        mtime: SystemTime,
        visibility: Visibility,
    },
    Directory {
        mtime: SystemTime,
    },
}

/// In-memory adapter backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    nodes: DashMap<String, Node>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn has_children(&self, dir: &str) -> bool {
        let prefix = format!("{}/", dir);
        self.nodes.iter().any(|entry| entry.key().starts_with(&prefix))
    }

    fn ensure_parent_is_not_file(&self, path: &str) -> Result<()> {
        let mut current = String::new();
        for segment in path.split('/').take(path.split('/').count().saturating_sub(1)) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            if let Some(node) = self.nodes.get(&current) {
                if matches!(*node, Node::File { .. }) {
                    return Err(StorageError::NotADirectory(current));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn metadata(&self, path: &str) -> Result<Metadata> {
        let path = normalize_path(path)?;
        if path.is_empty() {
            return Ok(Metadata::directory(SystemTime::UNIX_EPOCH, Visibility::Public));
        }
        match self.nodes.get(&path).map(|n| n.clone()) {
            Some(Node::File {
                data,
                mtime,
                visibility,
            }) => Ok(Metadata::file(data.len() as u64, mtime, visibility)),
            Some(Node::Directory { mtime }) => Ok(Metadata::directory(mtime, Visibility::Public)),
            None if self.has_children(&path) => {
                Ok(Metadata::directory(SystemTime::UNIX_EPOCH, Visibility::Public))
            }
            None => Err(StorageError::NotFound(path)),
        }
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let path = normalize_path(path)?;
        match self.nodes.get(&path).map(|n| n.clone()) {
            Some(Node::File { data, .. }) => Ok(data),
            Some(Node::Directory { .. }) => Err(StorageError::IsADirectory(path)),
            None => Err(StorageError::NotFound(path)),
        }
    }

    async fn write(&self, path: &str, data: &[u8], visibility: Visibility) -> Result<()> {
        let path = normalize_path(path)?;
        if path.is_empty() || matches!(self.nodes.get(&path).map(|n| n.clone()), Some(Node::Directory { .. })) {
            return Err(StorageError::IsADirectory(path));
        }
        self.ensure_parent_is_not_file(&path)?;
        self.nodes.insert(
            path,
            Node::File {
                data: Bytes::copy_from_slice(data),
                mtime: SystemTime::now(),
                visibility,
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        match self.nodes.get(&path).map(|n| n.clone()) {
            Some(Node::File { .. }) => {
                self.nodes.remove(&path);
                Ok(())
            }
            Some(Node::Directory { .. }) => Err(StorageError::IsADirectory(path)),
            None => Err(StorageError::NotFound(path)),
        }
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        if path.is_empty() {
            return Ok(());
        }
        self.ensure_parent_is_not_file(&path)?;
        if let Some(Node::File { .. }) = self.nodes.get(&path).map(|n| n.clone()) {
            return Err(StorageError::AlreadyExists(path));
        }
        self.nodes.insert(
            path,
            Node::Directory {
                mtime: SystemTime::now(),
            },
        );
        Ok(())
    }

    async fn delete_dir(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        if path.is_empty() {
            return Err(StorageError::InvalidPath(
                "refusing to delete the adapter root".to_string(),
            ));
        }
        let prefix = format!("{}/", path);
        let existed = self.nodes.remove(&path).is_some() | self.has_children(&path);
        if !existed {
            return Err(StorageError::NotFound(path));
        }
        self.nodes.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()> {
        let path = normalize_path(path)?;
        match self.nodes.get_mut(&path) {
            Some(mut node) => {
                if let Node::File { visibility: v, .. } = node.value_mut() {
                    *v = visibility;
                }
                Ok(())
            }
            None => Err(StorageError::NotFound(path)),
        }
    }

    fn list_contents(&self, path: &str, recursive: bool) -> DirEntryStream {
        let dir = match normalize_path(path) {
            Ok(dir) => dir,
            Err(e) => return Box::pin(stream::iter(vec![Err(e)])),
        };
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        // path -> type; BTreeMap keeps the listing sorted and deduplicated
        let mut found: BTreeMap<String, FileType> = BTreeMap::new();
        for entry in self.nodes.iter() {
            let Some(rest) = entry.key().strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let segments: Vec<&str> = rest.split('/').collect();
            let depth = if recursive { segments.len() } else { 1 };

            for i in 0..depth {
                let child = format!("{}{}", prefix, segments[..=i].join("/"));
                let is_leaf = i + 1 == segments.len();
                let file_type = match (is_leaf, entry.value()) {
                    (true, Node::File { .. }) => FileType::File,
                    _ => FileType::Directory,
                };
                found.entry(child).or_insert(file_type);
            }
        }

        let entries: Vec<Result<DirEntry>> = found
            .into_iter()
            .map(|(path, file_type)| Ok(DirEntry { path, file_type }))
            .collect();
        Box::pin(stream::iter(entries))
    }
}

/// The `memory` adapter kind takes no options
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryAdapterConfig {}

/// Factory for the `memory` adapter kind
pub struct MemoryAdapterFactory;

impl AdapterFactory for MemoryAdapterFactory {
    fn key(&self) -> &str {
        "memory"
    }

    fn validate(&self, options: &Value) -> std::result::Result<(), ConfigError> {
        parse_options::<MemoryAdapterConfig>(self.key(), options).map(|_| ())
    }

    fn create(
        &self,
        _ctx: &BuildContext,
        _id: &str,
        options: &Value,
    ) -> std::result::Result<Arc<dyn Adapter>, ComposeError> {
        let _: MemoryAdapterConfig = parse_options(self.key(), options)?;
        Ok(Arc::new(MemoryAdapter::new()))
    }
}
