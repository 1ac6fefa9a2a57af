//! Assertions for e2e tests
//!
//! Host filesystem checks for the `local` adapter plus checks against
//! composed filesystem facades.

use anyhow::{bail, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use storage_composer::filesystem::Filesystem;
use storage_composer::mount::MountManager;
use storage_composer::StorageError;

/// Assert that a file exists at the given path
pub fn assert_file_exists(path: &Path) {
    assert!(
        path.exists() && path.is_file(),
        "Expected file to exist at {:?}, but it doesn't or is not a file",
        path
    );
}

/// Assert that a file does not exist
pub fn assert_file_not_exists(path: &Path) {
    assert!(
        !path.exists() || !path.is_file(),
        "Expected file NOT to exist at {:?}, but it does",
        path
    );
}

/// Assert that a directory exists at the given path
pub fn assert_dir_exists(path: &Path) {
    assert!(
        path.exists() && path.is_dir(),
        "Expected directory to exist at {:?}, but it doesn't or is not a directory",
        path
    );
}

/// Assert that a file has the expected content
pub fn assert_file_content(path: &Path, expected: &[u8]) {
    let actual = fs::read(path).unwrap_or_else(|e| panic!("Failed to read file {:?}: {}", path, e));
    assert_eq!(
        actual,
        expected,
        "File content mismatch at {:?}\nExpected {} bytes, got {} bytes",
        path,
        expected.len(),
        actual.len()
    );
}

/// Assert that a file contains the expected text
pub fn assert_file_content_str(path: &Path, expected: &str) {
    assert_file_content(path, expected.as_bytes());
}

/// Assert the permission bits of a file
#[cfg(unix)]
pub fn assert_file_mode(path: &Path, expected_mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    let metadata =
        fs::metadata(path).unwrap_or_else(|e| panic!("Failed to get metadata for {:?}: {}", path, e));
    let actual = metadata.permissions().mode() & 0o777;
    assert_eq!(
        actual, expected_mode,
        "Mode mismatch at {:?}: expected {:o}, got {:o}",
        path, expected_mode, actual
    );
}

#[cfg(not(unix))]
pub fn assert_file_mode(_path: &Path, _expected_mode: u32) {}

/// Assert that a facade returns `expected` for `path`
pub async fn assert_fs_content(fs: &Filesystem, path: &str, expected: &[u8]) -> Result<()> {
    let actual = fs.read(path).await?;
    if actual.as_ref() != expected {
        bail!(
            "Content mismatch at '{}': expected {} bytes, got {} bytes",
            path,
            expected.len(),
            actual.len()
        );
    }
    Ok(())
}

/// Assert that a facade does not have `path`
pub async fn assert_fs_missing(fs: &Filesystem, path: &str) -> Result<()> {
    if fs.has(path).await? {
        bail!("Expected '{}' to be missing", path);
    }
    Ok(())
}

/// Assert that two handles point at the same facade instance
pub fn assert_same_filesystem(a: &Arc<Filesystem>, b: &Arc<Filesystem>) {
    assert!(
        Arc::ptr_eq(a, b),
        "Expected the same filesystem instance, got {:?} and {:?}",
        a,
        b
    );
}

/// Assert that `prefix` is not mounted
pub fn assert_unknown_mount(manager: &MountManager, prefix: &str) {
    match manager.get_filesystem(prefix) {
        Err(StorageError::UnknownMount(p)) => assert_eq!(p, prefix),
        Err(e) => panic!("Expected UnknownMount for '{}', got {}", prefix, e),
        Ok(fs) => panic!("Expected UnknownMount for '{}', got {:?}", prefix, fs),
    }
}

/// Generate random bytes
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a random filename with the given prefix
pub fn random_filename(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}
