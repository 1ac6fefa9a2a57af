//! Service table
//!
//! Every object built by a composition is stored under a deterministic id
//! (`<name>_adapter`, `<name>_cache`, `<name>_filesystem`, ...). Ids can be
//! public or private; public lookups only see public ids and aliases.
//! Argument aliases are a separate, always private, index from a
//! `Filesystem $camelName` key to a filesystem id.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::adapter::Adapter;
use crate::cache::MetadataCache;
use crate::filesystem::Filesystem;
use crate::mount::MountManager;
use crate::stream_wrapper::StreamWrapperManager;

/// A built object
#[derive(Clone)]
pub enum Service {
    Adapter(Arc<dyn Adapter>),
    Cache(Arc<dyn MetadataCache>),
    Filesystem(Arc<Filesystem>),
    MountManager(Arc<MountManager>),
    StreamWrapperManager(Arc<StreamWrapperManager>),
}

impl Service {
    pub fn as_adapter(&self) -> Option<&Arc<dyn Adapter>> {
        match self {
            Service::Adapter(adapter) => Some(adapter),
            _ => None,
        }
    }

    pub fn as_cache(&self) -> Option<&Arc<dyn MetadataCache>> {
        match self {
            Service::Cache(cache) => Some(cache),
            _ => None,
        }
    }

    pub fn as_filesystem(&self) -> Option<&Arc<Filesystem>> {
        match self {
            Service::Filesystem(fs) => Some(fs),
            _ => None,
        }
    }

    pub fn as_mount_manager(&self) -> Option<&Arc<MountManager>> {
        match self {
            Service::MountManager(manager) => Some(manager),
            _ => None,
        }
    }

    pub fn as_stream_wrapper_manager(&self) -> Option<&Arc<StreamWrapperManager>> {
        match self {
            Service::StreamWrapperManager(manager) => Some(manager),
            _ => None,
        }
    }

    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Service::Adapter(_) => "adapter",
            Service::Cache(_) => "cache",
            Service::Filesystem(_) => "filesystem",
            Service::MountManager(_) => "mount_manager",
            Service::StreamWrapperManager(_) => "stream_wrapper_manager",
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Adapter(adapter) => write!(f, "Adapter({})", adapter.kind()),
            Service::Cache(cache) => write!(f, "Cache({})", cache.kind()),
            Service::Filesystem(fs) => write!(f, "{:?}", fs),
            Service::MountManager(_) => f.write_str("MountManager"),
            Service::StreamWrapperManager(_) => f.write_str("StreamWrapperManager"),
        }
    }
}

/// A service and its visibility
#[derive(Debug, Clone)]
pub struct Definition {
    service: Service,
    public: bool,
}

impl Definition {
    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn is_public(&self) -> bool {
        self.public
    }
}

/// Outcome of [`ServiceTable::alias_or_existing`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasOutcome {
    Inserted,
    /// The alias already pointed at this id and was left untouched
    Existing(String),
}

/// Ids, aliases and argument aliases of one composition
#[derive(Debug, Clone, Default)]
pub struct ServiceTable {
    definitions: BTreeMap<String, Definition>,
    aliases: BTreeMap<String, String>,
    argument_aliases: BTreeMap<String, String>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `service` under `id`, replacing any previous definition
    pub fn insert(&mut self, id: impl Into<String>, service: Service, public: bool) {
        self.definitions
            .insert(id.into(), Definition { service, public });
    }

    pub fn set_public(&mut self, id: &str, public: bool) {
        if let Some(definition) = self.definitions.get_mut(id) {
            definition.public = public;
        }
    }

    /// Point the public alias `alias` at `target` unless the alias already
    /// exists, in which case the existing target is kept.
    pub fn alias_or_existing(&mut self, alias: &str, target: &str) -> AliasOutcome {
        if self.definitions.contains_key(alias) {
            return AliasOutcome::Existing(alias.to_string());
        }
        match self.aliases.entry(alias.to_string()) {
            Entry::Occupied(existing) => AliasOutcome::Existing(existing.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(target.to_string());
                AliasOutcome::Inserted
            }
        }
    }

    pub fn insert_argument_alias(&mut self, key: impl Into<String>, target: impl Into<String>) {
        self.argument_aliases.insert(key.into(), target.into());
    }

    /// Id targeted by an argument alias
    pub fn argument_alias(&self, key: &str) -> Option<&str> {
        self.argument_aliases.get(key).map(String::as_str)
    }

    /// Id an alias points at
    pub fn alias_target(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// Public lookup: public ids and aliases only
    pub fn get(&self, id: &str) -> Option<&Service> {
        if let Some(target) = self.aliases.get(id) {
            return self.definitions.get(target).map(Definition::service);
        }
        self.definitions
            .get(id)
            .filter(|definition| definition.public)
            .map(Definition::service)
    }

    /// Lookup of any id, public or not. Aliases are followed.
    pub fn definition(&self, id: &str) -> Option<&Definition> {
        let id = self.aliases.get(id).map(String::as_str).unwrap_or(id);
        self.definitions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id) || self.aliases.contains_key(id)
    }

    /// All definitions, sorted by id
    pub fn definitions(&self) -> impl Iterator<Item = (&str, &Definition)> {
        self.definitions
            .iter()
            .map(|(id, definition)| (id.as_str(), definition))
    }

    /// All aliases and their targets, sorted by alias
    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .iter()
            .map(|(alias, target)| (alias.as_str(), target.as_str()))
    }

    pub fn argument_aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.argument_aliases
            .iter()
            .map(|(key, target)| (key.as_str(), target.as_str()))
    }
}
