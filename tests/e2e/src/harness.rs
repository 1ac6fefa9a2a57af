//! Test harness for e2e tests
//!
//! Every harness owns a temporary directory. The configuration is written
//! there as YAML, loaded back through `Config::from_file` and composed with
//! the temporary directory as build context, so relative adapter and cache
//! paths land inside it.
//!
//! ```ignore
//! let harness = TestHarness::with_config(|builder| {
//!     builder
//!         .add_local_adapter("a1", "store")
//!         .add_filesystem("fs1", FilesystemSpec::new("a1").mount("prefix"))
//! })?;
//! let fs = harness.mount_manager().get_filesystem("prefix")?;
//! // ... test code ...
//! harness.cleanup()?;
//! ```

use crate::config::{TestConfig, TestConfigBuilder};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage_composer::compose::{Composer, Composition};
use storage_composer::config::Config;
use storage_composer::filesystem::Filesystem;
use storage_composer::mount::MountManager;
use storage_composer::registry::BuildContext;
use storage_composer::ComposeError;
use tempfile::TempDir;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Initialize logging for tests (call once per test run)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Builds a harness with a customised composer
pub struct HarnessBuilder {
    config: TestConfig,
    composer: Composer,
}

impl HarnessBuilder {
    pub fn new(config: TestConfig) -> Self {
        Self {
            config,
            composer: Composer::new(),
        }
    }

    /// Adjust the composer, e.g. to disable argument aliases
    pub fn composer<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Composer) -> Composer,
    {
        self.composer = f(self.composer);
        self
    }

    /// Write the configuration and compose it
    pub fn try_build(self) -> Result<(TempDir, PathBuf, std::result::Result<Composition, ComposeError>)> {
        init_logging();

        let temp_dir = TempDir::new().context("Failed to create temp dir")?;
        let config_path = temp_dir.path().join("storage.yaml");
        self.config.write_to_file(&config_path)?;
        debug!("Config written to {:?}", config_path);

        let config = Config::from_file(&config_path)
            .with_context(|| format!("Failed to load {:?}", config_path))?;
        let composer = self
            .composer
            .with_context(BuildContext::new(temp_dir.path()));
        let result = composer.compose(&config);
        Ok((temp_dir, config_path, result))
    }

    pub fn build(self) -> Result<TestHarness> {
        let (temp_dir, config_path, result) = self.try_build()?;
        let composition = result.context("Composition failed")?;
        info!("Harness ready in {:?}", temp_dir.path());
        Ok(TestHarness {
            temp_dir,
            config_path,
            composition,
        })
    }

    /// Compose and return the error; fails if composition succeeds
    pub fn build_err(self) -> Result<ComposeError> {
        let (_temp_dir, _, result) = self.try_build()?;
        match result {
            Ok(_) => Err(anyhow!("Composition succeeded but an error was expected")),
            Err(e) => Ok(e),
        }
    }
}

/// A composed configuration living in its own temporary directory
pub struct TestHarness {
    temp_dir: TempDir,
    config_path: PathBuf,
    composition: Composition,
}

impl TestHarness {
    /// Compose the configuration produced by `f`
    pub fn with_config<F>(f: F) -> Result<Self>
    where
        F: FnOnce(TestConfigBuilder) -> TestConfigBuilder,
    {
        HarnessBuilder::new(f(TestConfigBuilder::new()).build()).build()
    }

    /// Compose and expect failure
    pub fn expect_error<F>(f: F) -> Result<ComposeError>
    where
        F: FnOnce(TestConfigBuilder) -> TestConfigBuilder,
    {
        HarnessBuilder::new(f(TestConfigBuilder::new()).build()).build_err()
    }

    /// Root of the temporary directory
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Path below the harness root
    pub fn path(&self, relative: &str) -> PathBuf {
        self.temp_dir.path().join(relative)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Filesystem by configured name
    pub fn filesystem(&self, name: &str) -> Result<Arc<Filesystem>> {
        self.composition
            .filesystem(name)
            .with_context(|| format!("No filesystem named '{}'", name))
    }

    pub fn mount_manager(&self) -> Arc<MountManager> {
        self.composition.mount_manager()
    }

    /// Remove the temporary directory
    pub fn cleanup(self) -> Result<()> {
        self.temp_dir
            .close()
            .context("Failed to remove harness directory")
    }
}
