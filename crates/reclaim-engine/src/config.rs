//! Engine configuration.
//!
//! Loaded from a TOML or JSON file (selected by extension) or built from
//! [`Default`] for bring-up. Validation runs once at load time so the run
//! path never re-checks structural invariants.

use crate::db::DbSort;
use crate::error::{EngineError, EngineResult};
use reclaim_lifecycle::{GracePolicy, MountEntry, MountTable};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One configured reference mount, mirrored into the lifecycle mount table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Name used in logs and reports.
    pub name: String,
    /// Cache-side path prefix.
    pub cache_root: String,
    /// Reference-side root the prefix maps onto.
    pub reference_root: String,
    /// Whether the reference location is currently mounted.
    #[serde(default = "default_true")]
    pub mounted: bool,
}

fn default_true() -> bool {
    true
}

/// Top-level engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of OS worker threads per run.
    pub worker_threads: usize,
    /// Bounded queue capacity; producers block when it is reached.
    pub queue_capacity: usize,
    /// Drain-phase polling interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Grace-window policy for lifecycle decisions.
    pub grace: GracePolicy,
    /// Reference mounts.
    pub mounts: Vec<MountConfig>,
    /// Candidate listing order.
    pub sort: DbSort,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            queue_capacity: 1000,
            poll_interval_ms: 500,
            grace: GracePolicy::default(),
            mounts: Vec::new(),
            sort: DbSort::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a `.toml` or `.json` file and validates it.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config: EngineConfig = match ext {
            "toml" => toml::from_str(&data)
                .map_err(|e| EngineError::Config(format!("invalid TOML: {e}")))?,
            "json" => serde_json::from_str(&data)
                .map_err(|e| EngineError::Config(format!("invalid JSON: {e}")))?,
            other => {
                return Err(EngineError::Config(format!(
                    "unsupported config format: .{other}"
                )))
            }
        };
        config.validate()?;
        info!(
            workers = config.worker_threads,
            queue = config.queue_capacity,
            mounts = config.mounts.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Structural validation, run once at load time.
    pub fn validate(&self) -> EngineResult<()> {
        if self.worker_threads == 0 {
            return Err(EngineError::Config("worker_threads must be > 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::Config("queue_capacity must be > 0".into()));
        }
        for mount in &self.mounts {
            if !mount.cache_root.starts_with('/') {
                return Err(EngineError::Config(format!(
                    "mount {}: cache_root must be absolute",
                    mount.name
                )));
            }
            if !mount.reference_root.starts_with('/') {
                return Err(EngineError::Config(format!(
                    "mount {}: reference_root must be absolute",
                    mount.name
                )));
            }
        }
        Ok(())
    }

    /// Builds the lifecycle mount table from the configured mounts.
    pub fn mount_table(&self) -> MountTable {
        MountTable::new(
            self.mounts
                .iter()
                .map(|m| MountEntry {
                    name: m.name.clone(),
                    cache_root: m.cache_root.clone(),
                    reference_root: m.reference_root.clone(),
                    mounted: m.mounted,
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = EngineConfig {
            worker_threads: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_relative_mount_root_rejected() {
        let config = EngineConfig {
            mounts: vec![MountConfig {
                name: "bad".into(),
                cache_root: "fs/data".into(),
                reference_root: "/backing".into(),
                mounted: true,
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        write!(
            file,
            r#"
worker_threads = 8
queue_capacity = 256

[[mounts]]
name = "data"
cache_root = "/fs/data"
reference_root = "/backing/data"
"#
        )
        .unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.mounts.len(), 1);
        assert!(config.mounts[0].mounted, "mounted defaults to true");
        // Unspecified fields fall back to defaults.
        assert_eq!(config.poll_interval_ms, 500);
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::Builder::new()
            .suffix(".json")
            .tempfile()
            .unwrap();
        write!(file, r#"{{"worker_threads": 2, "queue_capacity": 10}}"#).unwrap();
        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.worker_threads, 2);
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(EngineConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_invalid_file_contents_rejected() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        write!(file, "worker_threads = \"many\"").unwrap();
        assert!(EngineConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_mount_table_mirrors_config() {
        let config = EngineConfig {
            mounts: vec![MountConfig {
                name: "data".into(),
                cache_root: "/fs/data".into(),
                reference_root: "/backing/data".into(),
                mounted: true,
            }],
            ..Default::default()
        };
        let table = config.mount_table();
        assert_eq!(table.resolve("/fs/data/x").unwrap().name, "data");
    }
}
