//! storage-composer: configuration-driven assembly of storage filesystems
//!
//! This library turns a YAML description of named storage adapters, caches
//! and filesystems into live, shareable filesystem facades.
//!
//! # Architecture
//!
//! - **Adapters**: Storage backends (local disk, in-memory, S3) implementing
//!   the `Adapter` trait for path-based file operations.
//! - **Caches**: Metadata caches implementing `MetadataCache`. A filesystem
//!   that references a cache talks to a `CachedAdapter` decorator instead of
//!   the plain adapter.
//! - **Registries**: Kind-keyed factories building adapters and caches from
//!   their configuration blocks. Third parties register additional kinds.
//! - **Composer**: Resolves adapters, caches and filesystems in a fixed
//!   phase order and produces an immutable `Composition`.
//! - **Mount Manager**: Looks filesystems up by mount prefix and routes
//!   `prefix://path` operations.
//! - **Stream Wrapper Manager**: Exposes filesystems under URI protocols.
//!
//! # Example
//!
//! ```no_run
//! use storage_composer::compose::Composer;
//! use storage_composer::config::Config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file(&"storage.yaml".into())?;
//! let composition = Composer::new().compose(&config)?;
//!
//! let uploads = composition.mount_manager().get_filesystem("uploads")?;
//! uploads.write("hello.txt", b"hello").await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cache;
pub mod compose;
pub mod config;
pub mod env;
pub mod error;
pub mod filesystem;
pub mod mount;
pub mod plugin;
pub mod registry;
pub mod service;
pub mod stream_wrapper;

pub use compose::{Composer, Composition};
pub use error::{ComposeError, Result, StorageError};
