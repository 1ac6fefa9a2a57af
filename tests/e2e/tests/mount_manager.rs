//! Mount manager tests
//!
//! Tests prefix lookup and `prefix://path` operations routed through the
//! mount manager onto local and in-memory filesystems.

mod common;

use anyhow::Result;
use common::*;
use futures::TryStreamExt;
use storage_composer::adapter::Visibility;
use storage_composer::StorageError;

fn text(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

// =============================================================================
// Lookup
// =============================================================================

/// Writes through a mounted local filesystem land in its directory
#[tokio::test]
async fn test_mounted_local_filesystem_writes_to_directory() -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_local_adapter("a1", "store")
            .add_filesystem("fs1", FilesystemSpec::new("a1").mount("prefix"))
    })?;

    let fs = harness.mount_manager().get_filesystem("prefix")?;
    assert_same_filesystem(&fs, &harness.filesystem("fs1")?);

    fs.write("hello.txt", b"hello world").await?;
    assert_file_content_str(&harness.path("store/hello.txt"), "hello world");

    assert_unknown_mount(&harness.mount_manager(), "other");
    harness.cleanup()
}

/// A filesystem without `mount` is not reachable by its name
#[test]
fn test_unmounted_filesystem_not_reachable_by_name() -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_memory_adapter("a1")
            .add_filesystem("mounted", FilesystemSpec::new("a1").mount("m"))
            .add_filesystem("hidden", FilesystemSpec::new("a1"))
            .add_filesystem("blank", FilesystemSpec::new("a1").mount(""))
    })?;

    let manager = harness.mount_manager();
    assert_eq!(manager.prefixes(), vec!["m"]);
    assert_unknown_mount(&manager, "hidden");
    assert_unknown_mount(&manager, "blank");
    assert_unknown_mount(&manager, "");

    harness.cleanup()
}

// =============================================================================
// Prefixed operations
// =============================================================================

#[tokio::test]
async fn test_prefixed_operations() -> Result<()> {
    let harness = TestHarness::with_config(mounted_trio)?;
    let manager = harness.mount_manager();

    manager.write("pub://docs/readme.md", b"# readme").await?;
    assert_file_exists(&harness.path("public/docs/readme.md"));
    assert!(manager.has("pub://docs/readme.md").await?);
    assert!(!manager.has("priv://docs/readme.md").await?);

    assert_eq!(text(manager.read("pub://docs/readme.md").await?), "# readme");
    assert_eq!(manager.metadata("pub://docs/readme.md").await?.size, 8);

    manager.put("tmp://scratch.bin", &random_bytes(64)).await?;
    manager.put("tmp://scratch.bin", b"short").await?;
    assert_eq!(text(manager.read("tmp://scratch.bin").await?), "short");

    manager.delete("pub://docs/readme.md").await?;
    assert_file_not_exists(&harness.path("public/docs/readme.md"));

    harness.cleanup()
}

#[tokio::test]
async fn test_malformed_and_unknown_prefixes() -> Result<()> {
    let harness = TestHarness::with_config(mounted_trio)?;
    let manager = harness.mount_manager();

    assert!(matches!(
        manager.read("no-prefix.txt").await,
        Err(StorageError::InvalidPath(_))
    ));
    assert!(matches!(
        manager.read("://x").await,
        Err(StorageError::InvalidPath(_))
    ));
    assert!(matches!(
        manager.write("nowhere://x", b"x").await,
        Err(StorageError::UnknownMount(p)) if p == "nowhere"
    ));

    harness.cleanup()
}

#[tokio::test]
async fn test_copy_between_mounts_keeps_visibility() -> Result<()> {
    let harness = TestHarness::with_config(mounted_trio)?;
    let manager = harness.mount_manager();
    let private = manager.get_filesystem("priv")?;

    let name = random_filename("secret");
    private.write(&name, b"top secret").await?;
    assert_eq!(private.get_visibility(&name).await?, Visibility::Private);
    assert_file_mode(&harness.path(&format!("private/{}", name)), 0o600);

    manager
        .copy(&format!("priv://{}", name), &format!("tmp://{}", name))
        .await?;
    let scratch = manager.get_filesystem("tmp")?;
    assert_eq!(scratch.get_visibility(&name).await?, Visibility::Private);
    assert_fs_content(&scratch, &name, b"top secret").await?;

    manager
        .move_file(&format!("tmp://{}", name), "pub://moved.txt")
        .await?;
    assert_fs_missing(&scratch, &name).await?;
    assert_file_content_str(&harness.path("public/moved.txt"), "top secret");

    harness.cleanup()
}

#[tokio::test]
async fn test_listing_through_mount_manager() -> Result<()> {
    let harness = TestHarness::with_config(mounted_trio)?;
    let manager = harness.mount_manager();

    manager.write("tmp://a/one.txt", b"1").await?;
    manager.write("tmp://a/b/two.txt", b"2").await?;

    let scratch = manager.get_filesystem("tmp")?;
    assert_eq!(
        list_paths(&scratch, "a", true).await?,
        vec!["a/b", "a/b/two.txt", "a/one.txt"]
    );

    let prefixed: Vec<String> = manager
        .list_contents("tmp://a", false)?
        .map_ok(|entry| entry.path)
        .try_collect()
        .await?;
    assert_eq!(prefixed, vec!["tmp://a/b", "tmp://a/one.txt"]);

    harness.cleanup()
}
