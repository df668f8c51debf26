//! Application State Management
//!
//! This module provides the application state shared by all HTTP workers,
//! and wires the store and the GC worker to the same data directory.

use std::io;
use std::sync::Arc;
use log::info;

use crate::config::AppConfig;
use crate::service::gc_worker::{GcStats, GcWorker};
use crate::service::trigger::GcTrigger;
use crate::storage::{LocalStore, Reconciler, Storage, Tombstones};

/// Application state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub gc_trigger: GcTrigger,
    pub gc_stats: Arc<GcStats>,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state from configuration. The returned worker must
    /// be started for GC requests to be served.
    pub fn from_config(config: AppConfig) -> io::Result<(Self, GcWorker)> {
        let tombstones = Tombstones::new(config.storage.tombstone_suffix.clone());
        let store = LocalStore::open(&config.storage.data_dir, tombstones.clone())?;
        info!("Data directory: {}", store.root().display());

        let reconciler = Reconciler::new(store.root(), tombstones);
        let (gc_trigger, signals) = GcTrigger::channel();
        let gc_stats = Arc::new(GcStats::new());
        let worker = GcWorker::new(reconciler, gc_stats.clone(), signals);

        let state = Self {
            storage: Arc::new(store),
            gc_trigger,
            gc_stats,
            config,
        };
        Ok((state, worker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_from_config_creates_data_dir() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.data_dir = dir.path().join("data").to_string_lossy().into_owned();

        let (state, _worker) = AppState::from_config(config).unwrap();
        assert!(dir.path().join("data").is_dir());
        assert_eq!(state.gc_stats.passes(), 0);
    }
}
