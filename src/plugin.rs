//! Filesystem plugins
//!
//! A plugin adds one named method to a filesystem facade. Plugins are
//! registered by id and attached to a facade in the order the filesystem
//! configuration lists them; a plugin attached later replaces an earlier
//! one that provides the same method.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_yaml::Value;

use crate::adapter::FileType;
use crate::error::{ComposeError, Result, StorageError};
use crate::filesystem::Filesystem;

/// Extra capability attached to a filesystem facade
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name of the method this plugin provides
    fn method(&self) -> &str;

    /// Run the method against `fs`
    async fn handle(&self, fs: &Filesystem, args: &[Value]) -> Result<Value>;
}

/// Plugins known to a composition, keyed by id
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin` under `id`. Ids are unique.
    pub fn register(&mut self, id: &str, plugin: Arc<dyn Plugin>) -> std::result::Result<(), ComposeError> {
        if self.plugins.contains_key(id) {
            return Err(ComposeError::DuplicateFactory {
                category: "plugin",
                kind: id.to_string(),
            });
        }
        self.plugins.insert(id.to_string(), plugin);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// Add the bundled plugins
    pub(crate) fn register_builtin(&mut self) {
        let builtin: [Arc<dyn Plugin>; 3] = [
            Arc::new(ListPaths { files_only: true }),
            Arc::new(ListPaths { files_only: false }),
            Arc::new(EmptyDir),
        ];
        for plugin in builtin {
            let id = plugin.method().to_string();
            let _ = self.register(&id, plugin);
        }
    }
}

/// Reads `[directory, recursive]` from plugin arguments
fn listing_args(args: &[Value]) -> Result<(String, bool)> {
    let dir = match args.first() {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(StorageError::InvalidArgument(format!(
                "expected a directory path, got {:?}",
                other
            )))
        }
    };
    let recursive = match args.get(1) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(StorageError::InvalidArgument(format!(
                "expected a boolean recursive flag, got {:?}",
                other
            )))
        }
    };
    Ok((dir, recursive))
}

/// `list_files` / `list_paths`: collect the paths below a directory
struct ListPaths {
    files_only: bool,
}

#[async_trait]
impl Plugin for ListPaths {
    fn method(&self) -> &str {
        if self.files_only {
            "list_files"
        } else {
            "list_paths"
        }
    }

    async fn handle(&self, fs: &Filesystem, args: &[Value]) -> Result<Value> {
        let (dir, recursive) = listing_args(args)?;
        let entries: Vec<_> = fs.list_contents(&dir, recursive).try_collect().await?;
        let paths = entries
            .into_iter()
            .filter(|entry| !self.files_only || entry.file_type == FileType::File)
            .map(|entry| Value::String(entry.path))
            .collect();
        Ok(Value::Sequence(paths))
    }
}

/// `empty_dir`: delete everything below a directory but keep the directory
struct EmptyDir;

#[async_trait]
impl Plugin for EmptyDir {
    fn method(&self) -> &str {
        "empty_dir"
    }

    async fn handle(&self, fs: &Filesystem, args: &[Value]) -> Result<Value> {
        let (dir, _) = listing_args(args)?;
        let entries: Vec<_> = fs.list_contents(&dir, false).try_collect().await?;
        for entry in entries {
            match entry.file_type {
                FileType::File => fs.delete(&entry.path).await?,
                FileType::Directory => fs.delete_dir(&entry.path).await?,
            }
        }
        Ok(Value::Null)
    }
}
