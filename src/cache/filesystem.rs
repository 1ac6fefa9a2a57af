//! Filesystem-backed metadata cache
//!
//! Keeps entries in memory and persists them as a YAML document so cached
//! metadata survives process restarts. With `autosave` (the default) every
//! mutation rewrites the file; otherwise the file is written by `save()`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{debug, error, info};

use crate::adapter::Metadata;
use crate::cache::MetadataCache;
use crate::config::ConfigError;
use crate::error::{ComposeError, Result, StorageError};
use crate::registry::{parse_options, BuildContext, CacheFactory};

/// Filesystem cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemCacheConfig {
    /// File the cache is persisted to; relative to the build context
    pub path: PathBuf,

    /// How long an entry stays valid; forever if unset
    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,

    /// Persist after every mutation
    #[serde(default = "default_autosave")]
    pub autosave: bool,
}

fn default_autosave() -> bool {
    true
}

/// Persisted entry. Wall-clock expiry so it stays meaningful across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    metadata: Metadata,
    expires_at: Option<SystemTime>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| SystemTime::now() >= deadline)
    }
}

/// Metadata cache persisted to a local file
pub struct FilesystemCache {
    file: PathBuf,
    ttl: Option<Duration>,
    autosave: bool,
    entries: RwLock<HashMap<String, StoredEntry>>,
}

impl FilesystemCache {
    /// Open the cache, loading previously persisted entries if the file exists
    pub fn open(file: PathBuf, ttl: Option<Duration>, autosave: bool) -> Result<Self> {
        let entries = Self::load(&file)?;
        info!("Filesystem cache {:?} loaded {} entries", file, entries.len());
        Ok(Self {
            file,
            ttl,
            autosave,
            entries: RwLock::new(entries),
        })
    }

    fn load(file: &Path) -> Result<HashMap<String, StoredEntry>> {
        let content = match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(StorageError::from_io(e, &file.to_string_lossy())),
        };
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        let mut entries: HashMap<String, StoredEntry> = serde_yaml::from_str(&content)
            .map_err(|e| StorageError::Cache(format!("corrupt cache file {:?}: {}", file, e)))?;
        entries.retain(|_, entry| !entry.is_expired());
        Ok(entries)
    }

    /// Write all live entries to the cache file
    pub fn save(&self) -> Result<()> {
        let content = {
            let entries = self.entries.read();
            serde_yaml::to_string(&*entries)
                .map_err(|e| StorageError::Cache(format!("cannot serialize cache: {}", e)))?
        };
        if let Some(parent) = self.file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.file, content)?;
        debug!("Filesystem cache saved to {:?}", self.file);
        Ok(())
    }

    fn autosave(&self) {
        if self.autosave {
            if let Err(e) = self.save() {
                error!("Failed to persist cache {:?}: {}", self.file, e);
            }
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

impl MetadataCache for FilesystemCache {
    fn kind(&self) -> &'static str {
        "filesystem"
    }

    fn get(&self, path: &str) -> Option<Metadata> {
        let entry = self.entries.read().get(path).cloned()?;
        if entry.is_expired() {
            self.entries.write().remove(path);
            return None;
        }
        Some(entry.metadata)
    }

    fn set(&self, path: &str, metadata: Metadata) {
        let expires_at = self.ttl.map(|ttl| SystemTime::now() + ttl);
        self.entries.write().insert(
            path.to_string(),
            StoredEntry {
                metadata,
                expires_at,
            },
        );
        self.autosave();
    }

    fn delete(&self, path: &str) {
        let removed = self.entries.write().remove(path).is_some();
        if removed {
            self.autosave();
        }
    }

    fn flush(&self) -> Result<()> {
        self.entries.write().clear();
        if self.autosave {
            self.save()?;
        }
        Ok(())
    }
}

/// Factory for the `filesystem` cache kind
pub struct FilesystemCacheFactory;

impl CacheFactory for FilesystemCacheFactory {
    fn key(&self) -> &str {
        "filesystem"
    }

    fn validate(&self, options: &Value) -> std::result::Result<(), ConfigError> {
        let config: FilesystemCacheConfig = parse_options(self.key(), options)?;
        if config.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "filesystem cache path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn create(
        &self,
        ctx: &BuildContext,
        id: &str,
        options: &Value,
    ) -> std::result::Result<Arc<dyn MetadataCache>, ComposeError> {
        let config: FilesystemCacheConfig = parse_options(self.key(), options)?;
        let file = ctx.resolve_path(&config.path);
        let cache = FilesystemCache::open(file, config.ttl, config.autosave)
            .map_err(|e| ComposeError::construction(id, e))?;
        Ok(Arc::new(cache))
    }
}
