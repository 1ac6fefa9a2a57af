//! Filesystem facade tests
//!
//! Tests options, plugins and cache behaviour of composed facades backed by
//! real adapters.

mod common;

use anyhow::Result;
use common::*;
use serde_yaml::Value;
use std::time::Duration;
use storage_composer::adapter::Visibility;
use storage_composer::cache::filesystem::FilesystemCache;
use storage_composer::cache::MetadataCache;
use storage_composer::{ComposeError, StorageError};

// =============================================================================
// Options
// =============================================================================

#[tokio::test]
async fn test_asserts_enabled_by_default() -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_local_adapter("a1", "store")
            .add_filesystem("fs1", FilesystemSpec::new("a1"))
    })?;
    let fs = harness.filesystem("fs1")?;

    fs.write("file.txt", b"one").await?;
    assert!(matches!(
        fs.write("file.txt", b"two").await,
        Err(StorageError::AlreadyExists(_))
    ));
    assert!(matches!(
        fs.delete("missing.txt").await,
        Err(StorageError::NotFound(_))
    ));
    assert_file_content_str(&harness.path("store/file.txt"), "one");

    harness.cleanup()
}

#[tokio::test]
async fn test_disable_asserts() -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_local_adapter("a1", "store")
            .add_filesystem("fs1", FilesystemSpec::new("a1").disable_asserts())
    })?;
    let fs = harness.filesystem("fs1")?;
    assert!(fs.options().disable_asserts);

    fs.write("file.txt", b"one").await?;
    fs.write("file.txt", b"two").await?;
    assert_file_content_str(&harness.path("store/file.txt"), "two");

    harness.cleanup()
}

#[tokio::test]
async fn test_default_visibility_maps_to_mode() -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_local_adapter("a1", "store")
            .add_filesystem("open", FilesystemSpec::new("a1"))
            .add_filesystem("closed", FilesystemSpec::new("a1").visibility("private"))
    })?;

    harness.filesystem("open")?.write("open.txt", b"o").await?;
    harness.filesystem("closed")?.write("closed.txt", b"c").await?;
    assert_file_mode(&harness.path("store/open.txt"), 0o644);
    assert_file_mode(&harness.path("store/closed.txt"), 0o600);

    let open = harness.filesystem("open")?;
    assert_eq!(open.get_visibility("closed.txt").await?, Visibility::Private);
    open.set_visibility("closed.txt", Visibility::Public).await?;
    assert_file_mode(&harness.path("store/closed.txt"), 0o644);

    harness.cleanup()
}

// =============================================================================
// Plugins
// =============================================================================

#[tokio::test]
async fn test_plugins_attached_in_order() -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_local_adapter("a1", "store").add_filesystem(
            "fs1",
            FilesystemSpec::new("a1")
                .plugin("list_files")
                .plugin("empty_dir"),
        )
    })?;
    let fs = harness.filesystem("fs1")?;
    assert!(fs.has_method("list_files"));
    assert!(fs.has_method("empty_dir"));
    assert!(!fs.has_method("list_paths"));

    fs.write("inbox/a.txt", b"a").await?;
    fs.write("inbox/nested/b.txt", b"b").await?;

    let listed = fs
        .call("list_files", &[Value::from("inbox"), Value::from(true)])
        .await?;
    let mut listed: Vec<String> = serde_yaml::from_value(listed)?;
    listed.sort();
    assert_eq!(listed, vec!["inbox/a.txt", "inbox/nested/b.txt"]);

    fs.call("empty_dir", &[Value::from("inbox")]).await?;
    assert_dir_exists(&harness.path("store/inbox"));
    assert_eq!(list_paths(&fs, "inbox", true).await?, Vec::<String>::new());

    assert!(matches!(
        fs.call("list_paths", &[]).await,
        Err(StorageError::UnknownPluginMethod(_))
    ));

    harness.cleanup()
}

#[test]
fn test_unknown_plugin() -> Result<()> {
    let err = TestHarness::expect_error(|b| {
        b.add_memory_adapter("a1")
            .add_filesystem("fs1", FilesystemSpec::new("a1").plugin("compress"))
    })?;
    assert!(
        matches!(err, ComposeError::UndefinedReference { category: "plugin", ref name, .. } if name == "compress"),
        "{}",
        err
    );
    Ok(())
}

// =============================================================================
// Caches
// =============================================================================

#[tokio::test]
async fn test_cached_facade_sees_own_writes() -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_local_adapter("a1", "store")
            .add_cache("c1", "memory", options(&[("ttl", Value::from("5m"))]))
            .add_filesystem("fs1", FilesystemSpec::new("a1").cache("c1"))
    })?;
    let fs = harness.filesystem("fs1")?;

    fs.write("f.txt", b"12").await?;
    assert_eq!(fs.metadata("f.txt").await?.size, 2);

    fs.update("f.txt", b"12345").await?;
    assert_eq!(fs.metadata("f.txt").await?.size, 5);

    fs.delete("f.txt").await?;
    assert!(!fs.has("f.txt").await?);

    harness.cleanup()
}

#[tokio::test]
async fn test_filesystem_cache_persists_entries() -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_memory_adapter("a1")
            .add_filesystem_cache("c1", "cache/meta.yaml")
            .add_filesystem("fs1", FilesystemSpec::new("a1").cache("c1"))
    })?;
    let fs = harness.filesystem("fs1")?;

    fs.write("kept.txt", b"data").await?;
    fs.metadata("kept.txt").await?;
    assert_file_exists(&harness.path("cache/meta.yaml"));

    let reopened = FilesystemCache::open(
        harness.path("cache/meta.yaml"),
        Some(Duration::from_secs(60)),
        false,
    )?;
    assert_eq!(reopened.get("kept.txt").map(|m| m.size), Some(4));

    harness.cleanup()
}
