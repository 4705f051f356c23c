//! Storage Context
//!
//! Node-wide services shared by every processor: the memory accountant,
//! the flush worker pool and the WAL manager.

use std::fs;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::flush::FlushPool;
use crate::memory::MemController;
use crate::wal::WalManager;

/// Shared services of one storage node
#[derive(Clone)]
pub struct StorageContext {
    config: Arc<Config>,
    mem_controller: Arc<MemController>,
    flush_pool: Arc<FlushPool>,
    wal_manager: Option<Arc<WalManager>>,
}

impl StorageContext {
    /// Validate the config and start the shared services
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let mem_controller = Arc::new(MemController::from_config(&config));
        let flush_pool = Arc::new(FlushPool::new(
            config.flush_pool_size,
            config.flush_queue_capacity,
        )?);
        let wal_manager = if config.wal_enabled {
            Some(Arc::new(WalManager::new(
                &config.wal_dir(),
                config.wal_sync_strategy,
            )?))
        } else {
            None
        };

        tracing::info!(
            data_dir = %config.data_dir.display(),
            flush_workers = config.flush_pool_size,
            wal = config.wal_enabled,
            "storage context ready"
        );

        Ok(Self {
            config: Arc::new(config),
            mem_controller,
            flush_pool,
            wal_manager,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mem_controller(&self) -> &Arc<MemController> {
        &self.mem_controller
    }

    pub fn flush_pool(&self) -> &Arc<FlushPool> {
        &self.flush_pool
    }

    pub fn wal_manager(&self) -> Option<&Arc<WalManager>> {
        self.wal_manager.as_ref()
    }
}
