//! Memory Accountant
//!
//! Process-wide bookkeeping of buffered bytes. Every processor reports what
//! it buffers and what it releases; the accountant answers with a usage
//! tier that the processor turns into admission control.
//!
//! ## Tiers
//! ```text
//!   0 ─────────── warning ─────────── dangerous ─────────── budget
//!   │    SAFE        │      WARNING       │      DANGEROUS
//! ```
//! A DANGEROUS request is not recorded, so owners only ever free what was
//! actually admitted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::config::Config;

/// Usage tier returned by [`MemController::report_use`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageLevel {
    Safe,
    Warning,
    Dangerous,
}

/// Token identifying one accounting owner (one processor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemOwner(u64);

impl MemOwner {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Shared memory accountant
///
/// ## Concurrency:
/// - `usage`: per-owner totals and the global total, under one Mutex so the
///   tier check and the increment are a single step
/// - `next_owner`: atomic counter
pub struct MemController {
    warning_threshold: u64,
    dangerous_threshold: u64,
    usage: Mutex<Usage>,
    next_owner: AtomicU64,
}

#[derive(Default)]
struct Usage {
    total: u64,
    owners: HashMap<MemOwner, (String, u64)>,
}

impl MemController {
    /// Create an accountant with absolute thresholds (in bytes)
    pub fn new(warning_threshold: u64, dangerous_threshold: u64) -> Self {
        Self {
            warning_threshold,
            dangerous_threshold,
            usage: Mutex::new(Usage::default()),
            next_owner: AtomicU64::new(1),
        }
    }

    /// Create an accountant from the node config
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.memory_warning_threshold(),
            config.memory_dangerous_threshold(),
        )
    }

    /// Register a new owner
    pub fn register(&self, name: &str) -> MemOwner {
        let owner = MemOwner(self.next_owner.fetch_add(1, Ordering::Relaxed));
        self.usage.lock().owners.insert(owner, (name.to_string(), 0));
        owner
    }

    /// Release whatever the owner still holds and forget it
    pub fn deregister(&self, owner: MemOwner) {
        let mut usage = self.usage.lock();
        if let Some((_, held)) = usage.owners.remove(&owner) {
            usage.total -= held;
        }
    }

    /// Report `delta` more buffered bytes for `owner`
    pub fn report_use(&self, owner: MemOwner, delta: u64) -> UsageLevel {
        let mut usage = self.usage.lock();
        let new_total = usage.total + delta;

        let level = if new_total < self.warning_threshold {
            UsageLevel::Safe
        } else if new_total < self.dangerous_threshold {
            UsageLevel::Warning
        } else {
            UsageLevel::Dangerous
        };

        if level != UsageLevel::Dangerous {
            usage.total = new_total;
            usage.owners.entry(owner).or_insert_with(|| (String::new(), 0)).1 += delta;
        }
        level
    }

    /// Report that `owner` released `amount` bytes
    pub fn report_free(&self, owner: MemOwner, amount: u64) {
        let mut usage = self.usage.lock();
        let Some((name, held)) = usage.owners.get_mut(&owner) else {
            tracing::error!(owner = owner.0, amount, "free reported by unknown owner");
            return;
        };

        let freed = if amount > *held {
            tracing::error!(
                owner = %name,
                held = *held,
                amount,
                "owner frees more than it holds, releasing all of it"
            );
            *held
        } else {
            amount
        };
        *held -= freed;
        usage.total -= freed;
    }

    /// Bytes currently accounted across all owners
    pub fn total_usage(&self) -> u64 {
        self.usage.lock().total
    }

    /// Bytes currently accounted for one owner
    pub fn usage_of(&self, owner: MemOwner) -> u64 {
        self.usage
            .lock()
            .owners
            .get(&owner)
            .map(|(_, held)| *held)
            .unwrap_or(0)
    }

    pub fn warning_threshold(&self) -> u64 {
        self.warning_threshold
    }

    pub fn dangerous_threshold(&self) -> u64 {
        self.dangerous_threshold
    }
}

/// Human readable byte count for log lines
pub fn bytes_to_string(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
