pub mod local;
pub mod memory;
pub mod s3;

use std::pin::Pin;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};

/// File type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
}

/// Whether a path is readable by everyone or only by its owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

/// Metadata for a file or directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub file_type: FileType,
    pub size: u64,
    pub mtime: SystemTime,
    pub visibility: Visibility,
}

impl Metadata {
    pub fn file(size: u64, mtime: SystemTime, visibility: Visibility) -> Self {
        Self {
            file_type: FileType::File,
            size,
            mtime,
            visibility,
        }
    }

    pub fn directory(mtime: SystemTime, visibility: Visibility) -> Self {
        Self {
            file_type: FileType::Directory,
            size: 0,
            mtime,
            visibility,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.file_type, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }
}

/// Entry yielded by `list_contents`. `path` is relative to the adapter root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: String,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file_type: FileType::File,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file_type: FileType::Directory,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.file_type, FileType::File)
    }
}

/// Stream type for directory listings
pub type DirEntryStream = Pin<Box<dyn Stream<Item = Result<DirEntry>> + Send>>;

/// Backend capability contract.
///
/// Adapters are path-based: every path is relative to the adapter root and
/// uses `/` as separator. Implementations must be safe for concurrent use;
/// the composition layer shares one instance between every filesystem that
/// references it.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short name of the implementation, e.g. `local` or `cached`
    fn kind(&self) -> &'static str;

    /// Get metadata for a path
    async fn metadata(&self, path: &str) -> Result<Metadata>;

    /// Check if a path exists
    ///
    /// Default implementation uses metadata()
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.metadata(path).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Read the whole file
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Create or replace a file
    async fn write(&self, path: &str, data: &[u8], visibility: Visibility) -> Result<()>;

    /// Remove a file
    async fn delete(&self, path: &str) -> Result<()>;

    /// Create a directory, including missing parents
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// Remove a directory and everything below it
    async fn delete_dir(&self, path: &str) -> Result<()>;

    /// Change the visibility of a file
    async fn set_visibility(&self, path: &str, visibility: Visibility) -> Result<()>;

    /// List directory contents as a stream
    fn list_contents(&self, path: &str, recursive: bool) -> DirEntryStream;
}

/// Normalize a relative path: strips leading and trailing separators,
/// collapses `.` and empty segments and resolves `..` without leaving the
/// root.
pub fn normalize_path(path: &str) -> Result<String> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(StorageError::InvalidPath(format!(
                        "path escapes the adapter root: {}",
                        path
                    )));
                }
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Join a directory and a child name into a normalized relative path
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}
