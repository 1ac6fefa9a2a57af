//! Stream wrapper tests
//!
//! Tests protocol registration, the all-or-nothing configuration rule and
//! URL resolution.

mod common;

use anyhow::Result;
use common::*;
use serde_yaml::{Mapping, Value};
use storage_composer::compose::STREAM_WRAPPER_MANAGER_ID;
use storage_composer::service::Service;
use storage_composer::stream_wrapper::StreamWrapperManager;
use storage_composer::{ComposeError, StorageError};
use std::sync::Arc;
use test_case::test_case;

fn manager(harness: &TestHarness) -> Arc<StreamWrapperManager> {
    harness
        .composition()
        .stream_wrapper_manager()
        .expect("stream wrapper manager should be registered")
}

/// Complete configuration with one key replaced
fn configuration_with(key: &str, value: Value) -> Value {
    let mut configuration = stream_wrapper_configuration();
    if let Value::Mapping(mapping) = &mut configuration {
        mapping.insert(Value::from(key), value);
    }
    configuration
}

#[test]
fn test_no_manager_without_stream_wrappers() -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_memory_adapter("a1")
            .add_filesystem("fs1", FilesystemSpec::new("a1"))
    })?;

    assert!(harness.composition().stream_wrapper_manager().is_none());
    assert!(harness.composition().definition(STREAM_WRAPPER_MANAGER_ID).is_none());
    harness.cleanup()
}

#[test_case(FilesystemSpec::new("a1").stream_protocol("myfilesystem") ; "shorthand")]
#[test_case(FilesystemSpec::new("a1").stream_wrapper("myfilesystem", None) ; "mapping without configuration")]
fn test_protocol_without_configuration(spec: FilesystemSpec) -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_memory_adapter("a1")
            .add_filesystem("myfilesystem", spec)
            .add_filesystem("myfilesystem2", FilesystemSpec::new("a1"))
    })?;

    let manager = manager(&harness);
    assert!(manager.has_configuration("myfilesystem"));
    assert!(!manager.has_configuration("myfilesystem2"));
    assert!(!manager.has_configuration("myfilesystem3"));

    let entry = manager.configuration("myfilesystem").expect("entry");
    assert_eq!(entry.protocol(), "myfilesystem");
    assert!(entry.options().is_none());
    assert_same_filesystem(entry.filesystem(), &harness.filesystem("myfilesystem")?);

    let via_id = harness
        .composition()
        .get(STREAM_WRAPPER_MANAGER_ID)
        .and_then(Service::as_stream_wrapper_manager)
        .expect("manager reachable by its id");
    assert!(Arc::ptr_eq(via_id, &manager));

    harness.cleanup()
}

#[test]
fn test_complete_configuration_round_trips() -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_memory_adapter("a1").add_filesystem(
            "myfilesystem",
            FilesystemSpec::new("a1")
                .stream_wrapper("myfilesystem", Some(stream_wrapper_configuration())),
        )
    })?;

    let manager = manager(&harness);
    let options = manager
        .configuration("myfilesystem")
        .and_then(|entry| entry.options())
        .expect("configuration present");
    assert_eq!(options.permissions.dir.private, 0o700);
    assert_eq!(options.permissions.dir.public, 0o744);
    assert_eq!(options.permissions.file.private, 0o700);
    assert_eq!(options.permissions.file.public, 0o744);
    assert_eq!(options.metadata, vec!["visibility".to_string()]);
    assert_eq!(options.public_mask, 0o044);

    harness.cleanup()
}

#[test_case(Value::Null ; "null configuration")]
#[test_case(Value::Mapping(Mapping::new()) ; "empty configuration")]
#[test_case(configuration_with("permissions", Value::Null) ; "missing permissions")]
#[test_case(configuration_with("metadata", Value::Null) ; "missing metadata")]
#[test_case(configuration_with("metadata", Value::Sequence(vec![])) ; "empty metadata")]
#[test_case(configuration_with("public_mask", Value::Null) ; "missing public mask")]
fn test_defective_configuration(configuration: Value) -> Result<()> {
    let err = TestHarness::expect_error(|b| {
        b.add_memory_adapter("a1").add_filesystem(
            "myfilesystem",
            FilesystemSpec::new("a1").stream_wrapper("myadapter", Some(configuration)),
        )
    })?;
    assert!(matches!(err, ComposeError::Schema(_)), "{}", err);
    Ok(())
}

#[test_case("9lives" ; "leading digit")]
#[test_case("has space" ; "whitespace")]
fn test_invalid_protocol(protocol: &str) -> Result<()> {
    let err = TestHarness::expect_error(|b| {
        b.add_memory_adapter("a1")
            .add_filesystem("fs1", FilesystemSpec::new("a1").stream_protocol(protocol))
    })?;
    assert!(matches!(err, ComposeError::Schema(_)), "{}", err);
    Ok(())
}

#[test]
fn test_duplicate_protocol() -> Result<()> {
    let err = TestHarness::expect_error(|b| {
        b.add_memory_adapter("a1")
            .add_filesystem("one", FilesystemSpec::new("a1").stream_protocol("files"))
            .add_filesystem("two", FilesystemSpec::new("a1").stream_protocol("files"))
    })?;
    assert!(err.to_string().contains("files"), "{}", err);
    Ok(())
}

#[test]
fn test_missing_dependency() -> Result<()> {
    let config = TestConfig::builder()
        .add_memory_adapter("a1")
        .add_filesystem("fs1", FilesystemSpec::new("a1").stream_protocol("fs1"))
        .build();
    let err = HarnessBuilder::new(config)
        .composer(|c| c.with_stream_wrapper_available(false))
        .build_err()?;
    assert!(matches!(err, ComposeError::MissingDependency(_)), "{}", err);
    Ok(())
}

#[tokio::test]
async fn test_resolve_url() -> Result<()> {
    let harness = TestHarness::with_config(|b| {
        b.add_local_adapter("a1", "uploads")
            .add_filesystem("uploads", FilesystemSpec::new("a1").stream_protocol("uploads"))
    })?;

    let manager = manager(&harness);
    let (fs, path) = manager.resolve_url("uploads://avatars/me.png")?;
    fs.write(&path, b"png").await?;
    assert_file_content(&harness.path("uploads/avatars/me.png"), b"png");

    assert!(matches!(
        manager.resolve_url("ftp://x"),
        Err(StorageError::UnknownProtocol(p)) if p == "ftp"
    ));

    harness.cleanup()
}
