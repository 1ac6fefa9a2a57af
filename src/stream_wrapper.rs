//! Stream protocol registration
//!
//! A filesystem can be exposed under a URI protocol so that
//! `<protocol>://some/path` resolves to a path inside that filesystem. The
//! configuration is either a bare protocol string or a mapping with an
//! optional `configuration` block:
//!
//! ```yaml
//! stream_wrapper: uploads
//!
//! stream_wrapper:
//!   protocol: uploads
//!   configuration:
//!     permissions:
//!       dir:  { private: 0o700, public: 0o755 }
//!       file: { private: 0o600, public: 0o644 }
//!     metadata: [visibility]
//!     public_mask: 0o044
//! ```
//!
//! A `configuration` block, once present, must be complete.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::adapter::local::{LocalPermissions, ModePair};
use crate::adapter::{normalize_path, FileType, Visibility};
use crate::config::ConfigError;
use crate::error::{Result, StorageError};
use crate::filesystem::Filesystem;
use crate::mount::split_prefixed;

static PROTOCOL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*$").expect("valid protocol pattern"));

/// Whether this build can register stream wrappers
pub fn feature_available() -> bool {
    cfg!(feature = "stream-wrapper")
}

/// `stream_wrapper` block of a filesystem
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "StreamWrapperRepr")]
pub struct StreamWrapperConfig {
    protocol: String,
    configuration: Option<RawStreamWrapperOptions>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StreamWrapperRepr {
    Shorthand(String),
    Full(FullRepr),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FullRepr {
    protocol: String,
    #[serde(default, deserialize_with = "present")]
    configuration: Option<RawStreamWrapperOptions>,
}

/// A key that is present maps to `Some`, even when its value is null
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<RawStreamWrapperOptions>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawStreamWrapperOptions>::deserialize(deserializer).map(|raw| Some(raw.unwrap_or_default()))
}

impl From<StreamWrapperRepr> for StreamWrapperConfig {
    fn from(repr: StreamWrapperRepr) -> Self {
        match repr {
            StreamWrapperRepr::Shorthand(protocol) => Self {
                protocol,
                configuration: None,
            },
            StreamWrapperRepr::Full(full) => Self {
                protocol: full.protocol,
                configuration: full.configuration,
            },
        }
    }
}

/// Configuration block as written, before the completeness check
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStreamWrapperOptions {
    #[serde(default)]
    pub permissions: Option<RawPermissions>,
    #[serde(default)]
    pub metadata: Option<Vec<String>>,
    #[serde(default)]
    pub public_mask: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPermissions {
    #[serde(default)]
    pub dir: Option<ModePair>,
    #[serde(default)]
    pub file: Option<ModePair>,
}

impl StreamWrapperConfig {
    /// Shorthand form: protocol only
    pub fn new(protocol: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            configuration: None,
        }
    }

    pub fn with_configuration(protocol: impl Into<String>, configuration: RawStreamWrapperOptions) -> Self {
        Self {
            protocol: protocol.into(),
            configuration: Some(configuration),
        }
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// The configuration block exactly as supplied
    pub fn raw_configuration(&self) -> Option<&RawStreamWrapperOptions> {
        self.configuration.as_ref()
    }

    /// Validated options; `None` when no configuration block was given
    pub fn options(&self) -> std::result::Result<Option<StreamWrapperOptions>, ConfigError> {
        if !PROTOCOL_PATTERN.is_match(&self.protocol) {
            return Err(ConfigError::ValidationError(format!(
                "'{}' is not a valid stream protocol",
                self.protocol
            )));
        }
        self.configuration
            .as_ref()
            .map(StreamWrapperOptions::try_from)
            .transpose()
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.options().map(|_| ())
    }
}

/// Complete stream wrapper configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamWrapperOptions {
    pub permissions: LocalPermissions,
    pub metadata: Vec<String>,
    pub public_mask: u32,
}

impl TryFrom<&RawStreamWrapperOptions> for StreamWrapperOptions {
    type Error = ConfigError;

    fn try_from(raw: &RawStreamWrapperOptions) -> std::result::Result<Self, ConfigError> {
        let missing = |what: &str| {
            ConfigError::ValidationError(format!(
                "stream wrapper configuration requires a non-empty '{}'",
                what
            ))
        };

        let permissions = raw.permissions.as_ref().ok_or_else(|| missing("permissions"))?;
        let dir = permissions.dir.ok_or_else(|| missing("permissions.dir"))?;
        let file = permissions.file.ok_or_else(|| missing("permissions.file"))?;

        let metadata = match &raw.metadata {
            Some(keys) if !keys.is_empty() => keys.clone(),
            _ => return Err(missing("metadata")),
        };
        let public_mask = raw.public_mask.ok_or_else(|| missing("public_mask"))?;

        Ok(Self {
            permissions: LocalPermissions { file, dir },
            metadata,
            public_mask,
        })
    }
}

impl StreamWrapperOptions {
    /// POSIX mode used for a new file or directory of the given visibility
    pub fn mode_for(&self, file_type: FileType, visibility: Visibility) -> u32 {
        let pair = match file_type {
            FileType::File => self.permissions.file,
            FileType::Directory => self.permissions.dir,
        };
        match visibility {
            Visibility::Public => pair.public,
            Visibility::Private => pair.private,
        }
    }

    /// Visibility implied by a POSIX mode: public when any bit of
    /// `public_mask` is set
    pub fn visibility_for_mode(&self, mode: u32) -> Visibility {
        if mode & self.public_mask != 0 {
            Visibility::Public
        } else {
            Visibility::Private
        }
    }
}

/// One registered protocol
#[derive(Debug)]
pub struct StreamWrapperEntry {
    filesystem_name: String,
    protocol: String,
    filesystem: Arc<Filesystem>,
    options: Option<StreamWrapperOptions>,
}

impl StreamWrapperEntry {
    pub fn filesystem_name(&self) -> &str {
        &self.filesystem_name
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn filesystem(&self) -> &Arc<Filesystem> {
        &self.filesystem
    }

    pub fn options(&self) -> Option<&StreamWrapperOptions> {
        self.options.as_ref()
    }
}

/// Protocol table, indexed by protocol and by filesystem name
#[derive(Debug, Default)]
pub struct StreamWrapperManager {
    by_protocol: BTreeMap<String, Arc<StreamWrapperEntry>>,
    by_filesystem: HashMap<String, Arc<StreamWrapperEntry>>,
}

impl StreamWrapperManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `filesystem` under the protocol of `config`
    pub fn register(
        &mut self,
        filesystem_name: &str,
        filesystem: Arc<Filesystem>,
        config: &StreamWrapperConfig,
    ) -> std::result::Result<(), ConfigError> {
        let options = config.options()?;
        if let Some(existing) = self.by_protocol.get(config.protocol()) {
            return Err(ConfigError::ValidationError(format!(
                "stream protocol '{}' is already registered by filesystem '{}'",
                config.protocol(),
                existing.filesystem_name
            )));
        }

        let entry = Arc::new(StreamWrapperEntry {
            filesystem_name: filesystem_name.to_string(),
            protocol: config.protocol().to_string(),
            filesystem,
            options,
        });
        self.by_protocol
            .insert(entry.protocol.clone(), entry.clone());
        self.by_filesystem
            .insert(entry.filesystem_name.clone(), entry);
        Ok(())
    }

    /// Whether `filesystem_name` is exposed under a protocol
    pub fn has_configuration(&self, filesystem_name: &str) -> bool {
        self.by_filesystem.contains_key(filesystem_name)
    }

    pub fn configuration(&self, filesystem_name: &str) -> Option<&StreamWrapperEntry> {
        self.by_filesystem.get(filesystem_name).map(Arc::as_ref)
    }

    pub fn by_protocol(&self, protocol: &str) -> Option<&StreamWrapperEntry> {
        self.by_protocol.get(protocol).map(Arc::as_ref)
    }

    /// Registered protocols, sorted
    pub fn protocols(&self) -> Vec<&str> {
        self.by_protocol.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_protocol.is_empty()
    }

    /// Resolve `protocol://path` to its filesystem and the path inside it
    pub fn resolve_url(&self, url: &str) -> Result<(Arc<Filesystem>, String)> {
        let (protocol, path) = split_prefixed(url)?;
        let entry = self
            .by_protocol
            .get(protocol)
            .ok_or_else(|| StorageError::UnknownProtocol(protocol.to_string()))?;
        Ok((entry.filesystem.clone(), normalize_path(path)?))
    }
}
