use std::io;
use thiserror::Error;

use crate::config::ConfigError;

/// Runtime error type for adapter, cache and lookup operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No filesystem mounted under prefix '{0}'")]
    UnknownMount(String),

    #[error("No filesystem registered for protocol '{0}'")]
    UnknownProtocol(String),

    #[error("No plugin provides method '{0}'")]
    UnknownPluginMethod(String),
}

impl StorageError {
    /// Build a `StorageError` from an I/O error, keeping the path for the
    /// variants callers match on.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_string()),
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.to_string()),
            _ => StorageError::Io(err),
        }
    }
}

/// Result type alias for adapter and facade operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Composition-time errors. Every variant is fatal to startup.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error(transparent)]
    Schema(#[from] ConfigError),

    #[error("No {category} factory registered for kind '{kind}'")]
    UnknownKind { category: &'static str, kind: String },

    #[error("The {category} '{name}' is not configured")]
    Unconfigured { category: &'static str, name: String },

    #[error("The {category} '{name}' referenced by filesystem '{filesystem}' is not defined")]
    UndefinedReference {
        category: &'static str,
        name: String,
        filesystem: String,
    },

    #[error("A {category} factory for kind '{kind}' is already registered")]
    DuplicateFactory { category: &'static str, kind: String },

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Failed to construct service '{id}': {source}")]
    Construction {
        id: String,
        #[source]
        source: StorageError,
    },
}

impl ComposeError {
    pub(crate) fn construction(id: &str, source: StorageError) -> Self {
        ComposeError::Construction {
            id: id.to_string(),
            source,
        }
    }
}
