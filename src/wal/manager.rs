//! WAL Manager
//!
//! Hands out one [`WriteLogNode`] per name under a shared directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::WalSyncStrategy;
use crate::error::Result;

use super::WriteLogNode;

/// Registry of WAL nodes of one storage node
pub struct WalManager {
    dir: PathBuf,
    sync_strategy: WalSyncStrategy,
    nodes: Mutex<HashMap<String, Arc<WriteLogNode>>>,
}

impl WalManager {
    pub fn new(dir: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            sync_strategy,
            nodes: Mutex::new(HashMap::new()),
        })
    }

    /// Get the node for `name`, opening it on first use
    pub fn get_node(&self, name: &str) -> Result<Arc<WriteLogNode>> {
        let mut nodes = self.nodes.lock();
        if let Some(node) = nodes.get(name) {
            return Ok(Arc::clone(node));
        }
        let node = Arc::new(WriteLogNode::open(
            &self.dir.join(name),
            name,
            self.sync_strategy,
        )?);
        nodes.insert(name.to_string(), Arc::clone(&node));
        Ok(node)
    }

    /// Forget a node and delete its directory
    pub fn delete_node(&self, name: &str) -> Result<()> {
        self.nodes.lock().remove(name);
        let dir = self.dir.join(name);
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
