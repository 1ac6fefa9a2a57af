//! Common test utilities and fixtures

#![allow(dead_code)]

pub use storage_composer_e2e::*;

use anyhow::Result;
use futures::TryStreamExt;
use storage_composer::adapter::DirEntry;
use storage_composer::filesystem::Filesystem;

/// Two local filesystems and one in-memory filesystem, each mounted under
/// its own prefix
pub fn mounted_trio(builder: TestConfigBuilder) -> TestConfigBuilder {
    builder
        .add_local_adapter("public_store", "public")
        .add_local_adapter("private_store", "private")
        .add_memory_adapter("scratch_store")
        .add_filesystem("public", FilesystemSpec::new("public_store").mount("pub"))
        .add_filesystem(
            "private",
            FilesystemSpec::new("private_store")
                .mount("priv")
                .visibility("private"),
        )
        .add_filesystem("scratch", FilesystemSpec::new("scratch_store").mount("tmp"))
}

/// Collect a listing into paths
pub async fn list_paths(fs: &Filesystem, dir: &str, recursive: bool) -> Result<Vec<String>> {
    let entries: Vec<DirEntry> = fs.list_contents(dir, recursive).try_collect().await?;
    Ok(entries.into_iter().map(|e| e.path).collect())
}
