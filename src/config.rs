//! Configuration parsing and schema validation

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::adapter::Visibility;
use crate::env::substitute_env_vars;
use crate::error::ComposeError;
use crate::registry::{normalize_kind, Factory, FactoryRegistry, Registries};
use crate::stream_wrapper::StreamWrapperConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named adapters
    #[serde(default)]
    pub adapters: BTreeMap<String, KindBlock>,

    /// Named caches
    #[serde(default)]
    pub cache: BTreeMap<String, KindBlock>,

    /// Named filesystems
    #[serde(default)]
    pub filesystems: BTreeMap<String, FilesystemConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// An adapter or cache block: a mapping holding exactly one kind tag whose
/// value is the option tree for that kind.
///
/// ```yaml
/// local:
///   directory: /srv/uploads
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct KindBlock(Mapping);

impl KindBlock {
    /// Build a block from a kind tag and its options
    pub fn new(kind: &str, options: Value) -> Self {
        let mut mapping = Mapping::new();
        mapping.insert(Value::String(kind.to_string()), options);
        Self(mapping)
    }

    /// Pick the kind tag and its factory.
    ///
    /// Fails with `Unconfigured` when the block names no kind at all and
    /// with `UnknownKind` when the registry has no factory for the tag.
    pub fn select<F: ?Sized + Factory>(
        &self,
        name: &str,
        registry: &FactoryRegistry<F>,
    ) -> Result<(String, &Value, Arc<F>), ComposeError> {
        let mut entries = self.0.iter();
        let (key, options) = entries.next().ok_or_else(|| ComposeError::Unconfigured {
            category: registry.category(),
            name: name.to_string(),
        })?;

        if entries.next().is_some() {
            return Err(ConfigError::ValidationError(format!(
                "{} '{}' must declare exactly one kind, found {}",
                registry.category(),
                name,
                self.0.len()
            ))
            .into());
        }

        let kind = key.as_str().ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "{} '{}' has a non-string kind key",
                registry.category(),
                name
            ))
        })?;

        let factory = registry.resolve(kind)?;
        Ok((normalize_kind(kind), options, factory))
    }
}

/// Filesystem configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemConfig {
    /// Name of the adapter backing this filesystem
    pub adapter: String,

    /// Name of the cache placed in front of the adapter
    #[serde(default)]
    pub cache: Option<String>,

    /// Prefix under which the mount manager exposes this filesystem
    #[serde(default)]
    pub mount: Option<String>,

    /// Public service name replacing `<name>_filesystem`
    #[serde(default)]
    pub alias: Option<String>,

    /// Default visibility for new files
    #[serde(default)]
    pub visibility: Option<Visibility>,

    /// Skip existence checks before write/update/delete
    #[serde(default)]
    pub disable_asserts: bool,

    /// Plugin ids, attached in order
    #[serde(default)]
    pub plugins: Vec<String>,

    /// Exposes the filesystem under a URI protocol
    #[serde(default)]
    pub stream_wrapper: Option<StreamWrapperConfig>,
}

impl FilesystemConfig {
    /// Mount prefix, ignoring an empty value
    pub fn mount_point(&self) -> Option<&str> {
        self.mount.as_deref().filter(|m| !m.is_empty())
    }

    /// Alias, ignoring an empty value
    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_deref().filter(|a| !a.is_empty())
    }

    /// Cache reference, ignoring an empty value
    pub fn cache_name(&self) -> Option<&str> {
        self.cache.as_deref().filter(|c| !c.is_empty())
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.clone(), e.to_string()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string, substituting `${VAR}`
    /// references in string values
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let mut value: Value =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        if value.is_null() {
            return Ok(Self::default());
        }
        substitute_env_vars(&mut value)?;
        serde_yaml::from_value(value).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the configuration against the known kinds.
    ///
    /// Runs before any service is constructed.
    pub fn validate(&self, registries: &Registries) -> Result<(), ConfigError> {
        for (name, block) in &self.adapters {
            Self::validate_block(name, block, &registries.adapters)?;
        }
        for (name, block) in &self.cache {
            Self::validate_block(name, block, &registries.caches)?;
        }

        let mut mounts: HashMap<&str, &str> = HashMap::new();
        let mut protocols: HashMap<&str, &str> = HashMap::new();

        for (name, fs) in &self.filesystems {
            if fs.adapter.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "filesystem '{}': adapter cannot be empty",
                    name
                )));
            }

            if let Some(mount) = fs.mount_point() {
                if let Some(other) = mounts.insert(mount, name) {
                    return Err(ConfigError::ValidationError(format!(
                        "filesystems '{}' and '{}' share the mount prefix '{}'",
                        other, name, mount
                    )));
                }
            }

            if let Some(stream_wrapper) = &fs.stream_wrapper {
                stream_wrapper.validate().map_err(|e| {
                    ConfigError::ValidationError(format!("filesystem '{}': {}", name, e))
                })?;
                if let Some(other) = protocols.insert(stream_wrapper.protocol(), name) {
                    return Err(ConfigError::ValidationError(format!(
                        "filesystems '{}' and '{}' share the stream protocol '{}'",
                        other,
                        name,
                        stream_wrapper.protocol()
                    )));
                }
            }
        }

        Ok(())
    }

    fn validate_block<F: ?Sized + Factory>(
        name: &str,
        block: &KindBlock,
        registry: &FactoryRegistry<F>,
    ) -> Result<(), ConfigError> {
        let (_, options, factory) = block.select(name, registry).map_err(|e| match e {
            ComposeError::Schema(inner) => inner,
            other => ConfigError::ValidationError(other.to_string()),
        })?;
        factory.validate_options(options).map_err(|e| match e {
            ConfigError::ValidationError(msg) => ConfigError::ValidationError(format!(
                "{} '{}': {}",
                registry.category(),
                name,
                msg
            )),
            other => other,
        })
    }

    /// Whether any filesystem asks for a stream wrapper
    pub fn has_stream_wrappers(&self) -> bool {
        self.filesystems
            .values()
            .any(|fs| fs.stream_wrapper.is_some())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
