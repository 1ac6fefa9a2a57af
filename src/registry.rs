//! Kind-keyed factory registries
//!
//! Every adapter and cache kind is provided by a factory registered under a
//! string key. Keys are normalized (`-` becomes `_`) on registration and on
//! lookup so `aws-s3` in a configuration file finds a factory registered as
//! `aws_s3`. Registering two factories under the same normalized key is an
//! error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_yaml::Value;

use crate::adapter::local::LocalAdapterFactory;
use crate::adapter::memory::MemoryAdapterFactory;
use crate::adapter::s3::S3AdapterFactory;
use crate::adapter::Adapter;
use crate::cache::filesystem::FilesystemCacheFactory;
use crate::cache::memory::MemoryCacheFactory;
use crate::cache::none::NoopCacheFactory;
use crate::cache::MetadataCache;
use crate::config::ConfigError;
use crate::error::ComposeError;
use crate::plugin::PluginRegistry;

/// Context handed to factories while building services
#[derive(Debug, Clone)]
pub struct BuildContext {
    base_dir: PathBuf,
}

impl BuildContext {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Directory that relative paths in options are resolved against
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

/// Builds adapters of one kind
pub trait AdapterFactory: Send + Sync {
    /// Kind discriminator used in configuration
    fn key(&self) -> &str;

    /// Check kind options before anything is constructed
    fn validate(&self, _options: &Value) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Build the adapter registered under `id`
    fn create(
        &self,
        ctx: &BuildContext,
        id: &str,
        options: &Value,
    ) -> Result<Arc<dyn Adapter>, ComposeError>;
}

/// Builds metadata caches of one kind
pub trait CacheFactory: Send + Sync {
    fn key(&self) -> &str;

    fn validate(&self, _options: &Value) -> Result<(), ConfigError> {
        Ok(())
    }

    fn create(
        &self,
        ctx: &BuildContext,
        id: &str,
        options: &Value,
    ) -> Result<Arc<dyn MetadataCache>, ComposeError>;
}

/// Common view over both factory traits used by [`FactoryRegistry`]
pub trait Factory: Send + Sync {
    fn factory_key(&self) -> &str;

    fn validate_options(&self, options: &Value) -> Result<(), ConfigError>;
}

impl Factory for dyn AdapterFactory {
    fn factory_key(&self) -> &str {
        self.key()
    }

    fn validate_options(&self, options: &Value) -> Result<(), ConfigError> {
        self.validate(options)
    }
}

impl Factory for dyn CacheFactory {
    fn factory_key(&self) -> &str {
        self.key()
    }

    fn validate_options(&self, options: &Value) -> Result<(), ConfigError> {
        self.validate(options)
    }
}

/// Normalize a kind key so configuration and lookup formats agree
pub fn normalize_kind(key: &str) -> String {
    key.replace('-', "_")
}

/// Registry of factories of one category
pub struct FactoryRegistry<F: ?Sized> {
    category: &'static str,
    factories: BTreeMap<String, Arc<F>>,
}

impl<F: ?Sized> Clone for FactoryRegistry<F> {
    fn clone(&self) -> Self {
        Self {
            category: self.category,
            factories: self.factories.clone(),
        }
    }
}

impl<F: ?Sized + Factory> FactoryRegistry<F> {
    pub fn new(category: &'static str) -> Self {
        Self {
            category,
            factories: BTreeMap::new(),
        }
    }

    /// Register a factory under its normalized key
    pub fn register(&mut self, factory: Arc<F>) -> Result<(), ComposeError> {
        let kind = normalize_kind(factory.factory_key());
        if self.factories.contains_key(&kind) {
            return Err(ComposeError::DuplicateFactory {
                category: self.category,
                kind,
            });
        }
        self.factories.insert(kind, factory);
        Ok(())
    }

    /// Look up the factory for a kind
    pub fn resolve(&self, kind: &str) -> Result<Arc<F>, ComposeError> {
        let kind = normalize_kind(kind);
        self.factories
            .get(&kind)
            .cloned()
            .ok_or(ComposeError::UnknownKind {
                category: self.category,
                kind,
            })
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(&normalize_kind(kind))
    }

    /// Known kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn category(&self) -> &'static str {
        self.category
    }
}

pub type AdapterRegistry = FactoryRegistry<dyn AdapterFactory>;
pub type CacheRegistry = FactoryRegistry<dyn CacheFactory>;

/// Adapter, cache and plugin registries consulted during composition
#[derive(Clone)]
pub struct Registries {
    pub adapters: AdapterRegistry,
    pub caches: CacheRegistry,
    pub plugins: PluginRegistry,
}

/// Built-in registries, built on first use and shared for the rest of the
/// process
static BUILTIN: Lazy<Registries> = Lazy::new(Registries::build_builtin);

impl Registries {
    /// Empty registries, for callers that want full control over kinds
    pub fn empty() -> Self {
        Self {
            adapters: AdapterRegistry::new("adapter"),
            caches: CacheRegistry::new("cache"),
            plugins: PluginRegistry::new(),
        }
    }

    /// Registries holding every bundled adapter, cache and plugin.
    ///
    /// Returns a copy; registering more kinds on it does not affect other
    /// callers.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    fn build_builtin() -> Self {
        let mut registries = Self::empty();
        let adapters: [Arc<dyn AdapterFactory>; 3] = [
            Arc::new(LocalAdapterFactory),
            Arc::new(MemoryAdapterFactory),
            Arc::new(S3AdapterFactory),
        ];
        let caches: [Arc<dyn CacheFactory>; 3] = [
            Arc::new(MemoryCacheFactory),
            Arc::new(FilesystemCacheFactory),
            Arc::new(NoopCacheFactory),
        ];

        // Keys of the bundled factories are distinct
        for factory in adapters {
            let _ = registries.adapters.register(factory);
        }
        for factory in caches {
            let _ = registries.caches.register(factory);
        }
        registries.plugins.register_builtin();
        registries
    }

    pub fn register_adapter(&mut self, factory: Arc<dyn AdapterFactory>) -> Result<(), ComposeError> {
        self.adapters.register(factory)
    }

    pub fn register_cache(&mut self, factory: Arc<dyn CacheFactory>) -> Result<(), ComposeError> {
        self.caches.register(factory)
    }
}

/// Deserialize kind options into a typed struct. A missing option block
/// (`~`) is treated as an empty mapping.
pub fn parse_options<T: DeserializeOwned>(kind: &str, options: &Value) -> Result<T, ConfigError> {
    let value = match options {
        Value::Null => Value::Mapping(Default::default()),
        other => other.clone(),
    };
    serde_yaml::from_value(value)
        .map_err(|e| ConfigError::ValidationError(format!("invalid '{}' options: {}", kind, e)))
}
