pub mod decorator;
pub mod filesystem;
pub mod memory;
pub mod none;

use crate::adapter::Metadata;
use crate::error::Result;

pub use decorator::{decorate, CachedAdapter};

/// Cache capability contract.
///
/// A metadata cache remembers what an adapter reported for a path so the
/// cache decorator can answer `metadata` and `exists` without a backend
/// round-trip. Implementations must be safe for concurrent use.
pub trait MetadataCache: Send + Sync {
    /// Short name of the implementation, e.g. `memory`
    fn kind(&self) -> &'static str;

    /// Cached metadata for a path, `None` on a miss
    fn get(&self, path: &str) -> Option<Metadata>;

    /// Remember metadata for a path
    fn set(&self, path: &str, metadata: Metadata);

    /// Forget a single path
    fn delete(&self, path: &str);

    /// Forget everything
    fn flush(&self) -> Result<()>;
}
