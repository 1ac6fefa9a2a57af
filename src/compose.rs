//! Composition resolver
//!
//! Turns a validated [`Config`] into live services. Resolution runs in a
//! fixed phase order: schema validation, every adapter, every cache, every
//! filesystem, the mount table and finally the stream wrappers. All objects
//! are built into locals; a [`Composition`] is only returned once every
//! phase succeeded, so a failure never leaves a partial result behind.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::adapter::Adapter;
use crate::cache::{decorate, MetadataCache};
use crate::config::{Config, FilesystemConfig};
use crate::error::ComposeError;
use crate::filesystem::{Filesystem, FilesystemOptions};
use crate::mount::MountManager;
use crate::registry::{BuildContext, Registries};
use crate::service::{AliasOutcome, Definition, Service, ServiceTable};
use crate::stream_wrapper::{self, StreamWrapperManager};

/// Well-known id of the mount manager
pub const MOUNT_MANAGER_ID: &str = "mount_manager";

/// Well-known id of the stream wrapper manager
pub const STREAM_WRAPPER_MANAGER_ID: &str = "stream_wrapper.manager";

pub fn adapter_id(name: &str) -> String {
    format!("{}_adapter", name)
}

pub fn cache_id(name: &str) -> String {
    format!("{}_cache", name)
}

pub fn filesystem_id(name: &str) -> String {
    format!("{}_filesystem", name)
}

/// Argument alias key of a filesystem.
///
/// `Filesystem` is appended unless the name already ends with it (compared
/// case-insensitively), then the result is camel-cased: `acme` and
/// `acme_filesystem` both become `Filesystem $acmeFilesystem`.
pub fn argument_alias_key(name: &str) -> String {
    let mut base = name.to_string();
    if !base.to_ascii_lowercase().ends_with("filesystem") {
        base.push_str("Filesystem");
    }
    format!("Filesystem ${}", camel_case(&base))
}

fn camel_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut upper_next = false;
    for c in input.chars() {
        if matches!(c, '_' | '-' | '.' | ' ') {
            upper_next = !out.is_empty();
            continue;
        }
        if out.is_empty() {
            out.extend(c.to_lowercase());
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Builds compositions from configurations
#[derive(Clone)]
pub struct Composer {
    registries: Registries,
    context: BuildContext,
    argument_aliases: bool,
    stream_wrapper_available: bool,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new()
    }
}

impl Composer {
    /// Composer over the builtin registries
    pub fn new() -> Self {
        Self::with_registries(Registries::builtin())
    }

    pub fn with_registries(registries: Registries) -> Self {
        Self {
            registries,
            context: BuildContext::default(),
            argument_aliases: true,
            stream_wrapper_available: stream_wrapper::feature_available(),
        }
    }

    /// Context handed to every factory
    pub fn with_context(mut self, context: BuildContext) -> Self {
        self.context = context;
        self
    }

    /// Register `Filesystem $nameFilesystem` argument aliases (default on)
    pub fn with_argument_aliases(mut self, enabled: bool) -> Self {
        self.argument_aliases = enabled;
        self
    }

    /// Override whether stream wrappers can be registered
    pub fn with_stream_wrapper_available(mut self, available: bool) -> Self {
        self.stream_wrapper_available = available;
        self
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn registries_mut(&mut self) -> &mut Registries {
        &mut self.registries
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    /// Build every service described by `config`
    pub fn compose(&self, config: &Config) -> Result<Composition, ComposeError> {
        config.validate(&self.registries)?;

        let wants_stream_wrappers = config.has_stream_wrappers();
        if wants_stream_wrappers && !self.stream_wrapper_available {
            return Err(ComposeError::MissingDependency(
                "stream wrapper support is not available in this build \
                 (enable the `stream-wrapper` feature)"
                    .to_string(),
            ));
        }

        let mut services = ServiceTable::new();

        info!("Resolving {} adapter(s)", config.adapters.len());
        let adapters = self.resolve_adapters(config, &mut services)?;

        info!("Resolving {} cache(s)", config.cache.len());
        let caches = self.resolve_caches(config, &mut services)?;

        info!("Resolving {} filesystem(s)", config.filesystems.len());
        let mut filesystems = BTreeMap::new();
        for (name, fs_config) in &config.filesystems {
            let facade = self.resolve_filesystem(name, fs_config, &adapters, &caches, &mut services)?;
            filesystems.insert(name.clone(), facade);
        }

        let mut mount_manager = MountManager::new();
        for (name, fs_config) in &config.filesystems {
            if let Some(prefix) = fs_config.mount_point() {
                debug!("{}: mounted under '{}'", name, prefix);
                mount_manager
                    .mount(prefix, filesystems[name].clone())
                    .map_err(|e| ComposeError::construction(MOUNT_MANAGER_ID, e))?;
            }
        }
        let mount_manager = Arc::new(mount_manager);
        services.insert(
            MOUNT_MANAGER_ID,
            Service::MountManager(mount_manager.clone()),
            true,
        );

        let stream_wrapper_manager = if wants_stream_wrappers {
            let mut manager = StreamWrapperManager::new();
            for (name, fs_config) in &config.filesystems {
                if let Some(stream_wrapper) = &fs_config.stream_wrapper {
                    manager.register(name, filesystems[name].clone(), stream_wrapper)?;
                    debug!("{}: stream protocol '{}'", name, stream_wrapper.protocol());
                }
            }
            let manager = Arc::new(manager);
            services.insert(
                STREAM_WRAPPER_MANAGER_ID,
                Service::StreamWrapperManager(manager.clone()),
                true,
            );
            Some(manager)
        } else {
            None
        };

        info!(
            "Composition complete: {} adapter(s), {} cache(s), {} filesystem(s), {} mount(s)",
            adapters.len(),
            caches.len(),
            filesystems.len(),
            mount_manager.count()
        );

        Ok(Composition {
            services,
            adapters,
            caches,
            filesystems,
            mount_manager,
            stream_wrapper_manager,
        })
    }

    fn resolve_adapters(
        &self,
        config: &Config,
        services: &mut ServiceTable,
    ) -> Result<BTreeMap<String, Arc<dyn Adapter>>, ComposeError> {
        let mut adapters = BTreeMap::new();
        for (name, block) in &config.adapters {
            let (kind, options, factory) = block.select(name, &self.registries.adapters)?;
            let id = adapter_id(name);
            let adapter = factory.create(&self.context, &id, options)?;
            debug!("{}: {} adapter", id, kind);
            services.insert(id, Service::Adapter(adapter.clone()), false);
            adapters.insert(name.clone(), adapter);
        }
        Ok(adapters)
    }

    fn resolve_caches(
        &self,
        config: &Config,
        services: &mut ServiceTable,
    ) -> Result<BTreeMap<String, Arc<dyn MetadataCache>>, ComposeError> {
        let mut caches = BTreeMap::new();
        for (name, block) in &config.cache {
            let (kind, options, factory) = block.select(name, &self.registries.caches)?;
            let id = cache_id(name);
            let cache = factory.create(&self.context, &id, options)?;
            debug!("{}: {} cache", id, kind);
            services.insert(id, Service::Cache(cache.clone()), false);
            caches.insert(name.clone(), cache);
        }
        Ok(caches)
    }

    fn resolve_filesystem(
        &self,
        name: &str,
        config: &FilesystemConfig,
        adapters: &BTreeMap<String, Arc<dyn Adapter>>,
        caches: &BTreeMap<String, Arc<dyn MetadataCache>>,
        services: &mut ServiceTable,
    ) -> Result<Arc<Filesystem>, ComposeError> {
        let undefined = |category: &'static str, reference: &str| ComposeError::UndefinedReference {
            category,
            name: reference.to_string(),
            filesystem: name.to_string(),
        };

        let adapter = adapters
            .get(&config.adapter)
            .cloned()
            .ok_or_else(|| undefined("adapter", &config.adapter))?;

        let options = FilesystemOptions {
            visibility: config.visibility.unwrap_or_default(),
            disable_asserts: config.disable_asserts,
        };

        let mut facade = match config.cache_name() {
            Some(cache_name) => {
                let cache = caches
                    .get(cache_name)
                    .cloned()
                    .ok_or_else(|| undefined("cache", cache_name))?;
                Filesystem::cached(decorate(adapter, cache), options)
            }
            None => Filesystem::new(adapter, options),
        };

        for plugin_id in &config.plugins {
            let plugin = self
                .registries
                .plugins
                .get(plugin_id)
                .ok_or_else(|| undefined("plugin", plugin_id))?;
            facade.add_plugin(plugin);
        }

        let facade = Arc::new(facade);
        let id = filesystem_id(name);
        let alias = config.alias_name();
        services.insert(id.clone(), Service::Filesystem(facade.clone()), alias.is_none());

        if let Some(alias) = alias {
            match services.alias_or_existing(alias, &id) {
                AliasOutcome::Inserted => debug!("{}: aliased as '{}'", id, alias),
                AliasOutcome::Existing(target) => warn!(
                    "Alias '{}' already points at '{}'; reusing it for filesystem '{}'",
                    alias, target, name
                ),
            }
        }

        if self.argument_aliases {
            services.insert_argument_alias(argument_alias_key(name), id.clone());
        }

        debug!(
            "{}: built (cached={}, plugins={})",
            id,
            facade.is_cached(),
            config.plugins.len()
        );
        Ok(facade)
    }
}

/// Result of a successful composition. Immutable; share it behind an `Arc`.
pub struct Composition {
    services: ServiceTable,
    adapters: BTreeMap<String, Arc<dyn Adapter>>,
    caches: BTreeMap<String, Arc<dyn MetadataCache>>,
    filesystems: BTreeMap<String, Arc<Filesystem>>,
    mount_manager: Arc<MountManager>,
    stream_wrapper_manager: Option<Arc<StreamWrapperManager>>,
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composition")
            .field("services", &self.services)
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .field("caches", &self.caches.keys().collect::<Vec<_>>())
            .field("filesystems", &self.filesystems)
            .field("mount_manager", &self.mount_manager)
            .field("stream_wrapper_manager", &self.stream_wrapper_manager)
            .finish()
    }
}

impl Composition {
    /// Public lookup by id or alias
    pub fn get(&self, id: &str) -> Option<&Service> {
        self.services.get(id)
    }

    /// Lookup of any id, including private ones
    pub fn definition(&self, id: &str) -> Option<&Definition> {
        self.services.definition(id)
    }

    /// Filesystem by configured name
    pub fn filesystem(&self, name: &str) -> Option<Arc<Filesystem>> {
        self.filesystems.get(name).cloned()
    }

    /// Adapter by configured name
    pub fn adapter(&self, name: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(name).cloned()
    }

    /// Cache by configured name
    pub fn cache(&self, name: &str) -> Option<Arc<dyn MetadataCache>> {
        self.caches.get(name).cloned()
    }

    pub fn mount_manager(&self) -> Arc<MountManager> {
        self.mount_manager.clone()
    }

    /// Present only when some filesystem declared a stream wrapper
    pub fn stream_wrapper_manager(&self) -> Option<Arc<StreamWrapperManager>> {
        self.stream_wrapper_manager.clone()
    }

    /// Filesystem behind an argument alias key
    pub fn argument_alias(&self, key: &str) -> Option<Arc<Filesystem>> {
        let target = self.services.argument_alias(key)?;
        self.services
            .definition(target)
            .and_then(|definition| definition.service().as_filesystem())
            .cloned()
    }

    pub fn services(&self) -> &ServiceTable {
        &self.services
    }

    /// Configured filesystem names, sorted
    pub fn filesystem_names(&self) -> impl Iterator<Item = &str> {
        self.filesystems.keys().map(String::as_str)
    }
}
