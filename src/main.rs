//! storage-composer entry point
//!
//! Composes a configuration file and prints the resulting service table.
//! Exits non-zero when the configuration cannot be composed.

use std::path::PathBuf;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use storage_composer::config::Config;
use storage_composer::registry::BuildContext;
use storage_composer::Composer;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: storage-composer <config.yaml>");
    eprintln!();
    eprintln!("storage-composer - Compose storage adapters, caches and filesystems");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  config.yaml    Path to configuration file");
    eprintln!();
    eprintln!("Relative paths in adapter and cache options resolve against the");
    eprintln!("directory containing the configuration file.");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  storage-composer /etc/storage-composer/storage.yaml");
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);

    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("storage-composer starting");
    info!("Loaded configuration from {:?}", config_path);

    let base_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    debug!("Resolving relative paths against {:?}", base_dir);

    let composer = Composer::new().with_context(BuildContext::new(base_dir));
    let composition = match composer.compose(&config) {
        Ok(c) => c,
        Err(e) => {
            error!("Composition failed: {}", e);
            std::process::exit(1);
        }
    };

    for (id, definition) in composition.services().definitions() {
        let visibility = if definition.is_public() { "public" } else { "private" };
        println!("{:<40} {:<8} {:?}", id, visibility, definition.service());
    }
    for (alias, target) in composition.services().aliases() {
        println!("{:<40} alias -> {}", alias, target);
    }
    for (key, target) in composition.services().argument_aliases() {
        println!("{:<40} argument -> {}", key, target);
    }

    let mounts = composition.mount_manager();
    for prefix in mounts.prefixes() {
        println!("{}://", prefix);
    }
    if let Some(manager) = composition.stream_wrapper_manager() {
        for protocol in manager.protocols() {
            println!("{}:// (stream)", protocol);
        }
    }

    info!(
        "{} filesystem(s) composed, {} mounted",
        composition.filesystem_names().count(),
        mounts.count()
    );
}
