//! Version Controllers
//!
//! Each flush generation of a partition is tagged with a strictly
//! increasing version. Readers that see the same timestamp in several
//! chunks keep the value from the chunk with the larger version.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{AtlasError, Result};

/// Mints flush-generation versions for one partition
pub trait VersionController: Send + Sync {
    /// Next version, strictly greater than every version returned before
    fn next_version(&self) -> Result<u64>;

    /// Last version handed out
    fn current_version(&self) -> u64;
}

/// In-memory counter, starting after `start`
#[derive(Debug, Default)]
pub struct SimpleVersionController {
    current: AtomicU64,
}

impl SimpleVersionController {
    pub fn new(start: u64) -> Self {
        Self {
            current: AtomicU64::new(start),
        }
    }
}

impl VersionController for SimpleVersionController {
    fn next_version(&self) -> Result<u64> {
        Ok(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn current_version(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

/// Counter that survives restarts
///
/// Every `save_interval` versions a reservation file `Version-{n}` is
/// written, meaning "versions up to n may have been used". After a restart
/// counting resumes at the last reservation, so versions never repeat.
pub struct FileVersionController {
    dir: PathBuf,
    save_interval: u64,
    state: Mutex<VersionState>,
}

struct VersionState {
    current: u64,
    reserved: u64,
}

impl FileVersionController {
    const FILE_PREFIX: &'static str = "Version-";

    /// Open (or create) the controller stored in `dir`
    pub fn open(dir: &Path, save_interval: u64) -> Result<Self> {
        if save_interval == 0 {
            return Err(AtlasError::Config(
                "version save interval must be > 0".to_string(),
            ));
        }
        fs::create_dir_all(dir)?;

        let mut reserved = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if let Some(n) = Self::parse_reservation(&path) {
                reserved = reserved.max(n);
            }
        }

        let controller = Self {
            dir: dir.to_path_buf(),
            save_interval,
            state: Mutex::new(VersionState {
                current: reserved,
                reserved,
            }),
        };

        // Reserve the first window before handing anything out
        {
            let mut state = controller.state.lock();
            controller.reserve(&mut state)?;
        }
        Ok(controller)
    }

    fn reserve(&self, state: &mut VersionState) -> Result<()> {
        let next = state.reserved + self.save_interval;
        fs::write(self.reservation_path(next), b"")?;
        if state.reserved > 0 {
            let old = self.reservation_path(state.reserved);
            if old.exists() {
                fs::remove_file(old)?;
            }
        }
        state.reserved = next;
        Ok(())
    }

    fn reservation_path(&self, n: u64) -> PathBuf {
        self.dir.join(format!("{}{}", Self::FILE_PREFIX, n))
    }

    /// "Version-300" → Some(300)
    fn parse_reservation(path: &Path) -> Option<u64> {
        let name = path.file_name()?.to_string_lossy();
        name.strip_prefix(Self::FILE_PREFIX)?.parse().ok()
    }
}

impl VersionController for FileVersionController {
    fn next_version(&self) -> Result<u64> {
        let mut state = self.state.lock();
        if state.current + 1 > state.reserved {
            self.reserve(&mut state)?;
        }
        state.current += 1;
        Ok(state.current)
    }

    fn current_version(&self) -> u64 {
        self.state.lock().current
    }
}
