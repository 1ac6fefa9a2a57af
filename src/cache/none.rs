//! Cache that never remembers anything
//!
//! Filesystems referencing a `noop` cache still get the decorator, but
//! every lookup is a miss and all operations reach the adapter.

use std::sync::Arc;

use serde::Deserialize;
use serde_yaml::Value;

use crate::adapter::Metadata;
use crate::cache::MetadataCache;
use crate::config::ConfigError;
use crate::error::{ComposeError, Result};
use crate::registry::{parse_options, BuildContext, CacheFactory};

/// Passthrough cache that stores nothing
#[derive(Debug, Default)]
pub struct NoopCache;

impl MetadataCache for NoopCache {
    fn kind(&self) -> &'static str {
        "noop"
    }

    fn get(&self, _path: &str) -> Option<Metadata> {
        None
    }

    fn set(&self, _path: &str, _metadata: Metadata) {}

    fn delete(&self, _path: &str) {}

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoopCacheConfig {}

/// Factory for the `noop` cache kind
pub struct NoopCacheFactory;

impl CacheFactory for NoopCacheFactory {
    fn key(&self) -> &str {
        "noop"
    }

    fn validate(&self, options: &Value) -> std::result::Result<(), ConfigError> {
        parse_options::<NoopCacheConfig>(self.key(), options).map(|_| ())
    }

    fn create(
        &self,
        _ctx: &BuildContext,
        _id: &str,
        _options: &Value,
    ) -> std::result::Result<Arc<dyn MetadataCache>, ComposeError> {
        Ok(Arc::new(NoopCache))
    }
}
