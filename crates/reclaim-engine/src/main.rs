#![warn(missing_docs)]

//! `reclaimd`: configuration bring-up for the ReclaimFS policy engine.
//!
//! Loads and validates the engine configuration and reports the resulting
//! runtime parameters. The database binding is deployment-specific and wired
//! in by the embedding service; this binary exists so operators can vet a
//! configuration before handing it to one. Takes a single optional argument:
//! the path to a `.toml` or `.json` configuration file.

use anyhow::Result;
use reclaim_engine::EngineConfig;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => EngineConfig::from_file(&path)?,
        None => {
            tracing::warn!("no config file given, using defaults");
            EngineConfig::default()
        }
    };
    config.validate()?;

    tracing::info!(
        workers = config.worker_threads,
        queue_capacity = config.queue_capacity,
        poll_interval_ms = config.poll_interval_ms,
        "engine configuration ok"
    );
    for mount in &config.mounts {
        tracing::info!(
            name = %mount.name,
            cache = %mount.cache_root,
            reference = %mount.reference_root,
            mounted = mount.mounted,
            "reference mount"
        );
    }
    if config.mount_table().is_empty() {
        tracing::warn!("no reference mounts configured; every run would skip all entries");
    }

    Ok(())
}
