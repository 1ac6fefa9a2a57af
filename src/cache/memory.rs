//! In-memory metadata cache
//!
//! Entries expire after `ttl` and the oldest entries are evicted once the
//! cache holds more than `max_entries`. Paths matching one of the
//! `exclude` glob patterns are never cached.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, trace, warn};

use crate::adapter::Metadata;
use crate::cache::MetadataCache;
use crate::config::ConfigError;
use crate::error::{ComposeError, Result};
use crate::registry::{parse_options, BuildContext, CacheFactory};

/// In-memory cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryCacheConfig {
    /// How long an entry stays valid (e.g. "30s", "5m"); forever if unset
    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,

    /// Maximum number of cached entries
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Glob patterns for paths that must not be cached
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_max_entries() -> usize {
    1000
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            max_entries: default_max_entries(),
            exclude: Vec::new(),
        }
    }
}

/// Cached metadata entry
#[derive(Debug, Clone)]
struct CachedMetadata {
    metadata: Metadata,
    cached_at: Instant,
}

/// Metadata cache held in a concurrent map
pub struct MemoryCache {
    config: MemoryCacheConfig,
    entries: DashMap<String, CachedMetadata>,
    exclude_matcher: Option<GlobSet>,
}

impl MemoryCache {
    pub fn new(config: MemoryCacheConfig) -> Self {
        let exclude_matcher = Self::build_exclude_matcher(&config.exclude);
        Self {
            config,
            entries: DashMap::new(),
            exclude_matcher,
        }
    }

    /// Build a GlobSet from exclude patterns
    fn build_exclude_matcher(patterns: &[String]) -> Option<GlobSet> {
        if patterns.is_empty() {
            return None;
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => {
                    warn!("Invalid cache exclude pattern '{}': {}", pattern, e);
                }
            }
        }

        match builder.build() {
            Ok(set) => Some(set),
            Err(e) => {
                warn!("Failed to build cache exclude matcher: {}", e);
                None
            }
        }
    }

    fn is_excluded(&self, path: &str) -> bool {
        self.exclude_matcher
            .as_ref()
            .is_some_and(|matcher| matcher.is_match(path))
    }

    fn is_expired(&self, entry: &CachedMetadata) -> bool {
        self.config
            .ttl
            .is_some_and(|ttl| entry.cached_at.elapsed() >= ttl)
    }

    /// Drop the oldest entries until the cache is within `max_entries`
    fn evict_if_needed(&self) {
        while self.entries.len() > self.config.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().cached_at)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(path) => {
                    trace!("memory cache evicting {}", path);
                    self.entries.remove(&path);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataCache for MemoryCache {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn get(&self, path: &str) -> Option<Metadata> {
        let entry = self.entries.get(path)?.clone();
        if self.is_expired(&entry) {
            self.entries.remove(path);
            return None;
        }
        Some(entry.metadata)
    }

    fn set(&self, path: &str, metadata: Metadata) {
        if self.is_excluded(path) {
            return;
        }
        self.entries.insert(
            path.to_string(),
            CachedMetadata {
                metadata,
                cached_at: Instant::now(),
            },
        );
        self.evict_if_needed();
    }

    fn delete(&self, path: &str) {
        self.entries.remove(path);
    }

    fn flush(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

/// Factory for the `memory` cache kind
pub struct MemoryCacheFactory;

impl CacheFactory for MemoryCacheFactory {
    fn key(&self) -> &str {
        "memory"
    }

    fn validate(&self, options: &Value) -> std::result::Result<(), ConfigError> {
        let config: MemoryCacheConfig = parse_options(self.key(), options)?;
        if config.max_entries == 0 {
            return Err(ConfigError::ValidationError(
                "memory cache max_entries must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn create(
        &self,
        _ctx: &BuildContext,
        id: &str,
        options: &Value,
    ) -> std::result::Result<Arc<dyn MetadataCache>, ComposeError> {
        let config: MemoryCacheConfig = parse_options(self.key(), options)?;
        debug!(
            "{}: memory cache (max_entries={}, ttl={:?})",
            id, config.max_entries, config.ttl
        );
        Ok(Arc::new(MemoryCache::new(config)))
    }
}
