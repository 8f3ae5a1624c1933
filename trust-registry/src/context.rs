//! What the ledger tells every operation: who is calling, when, and on which network

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use ethers::types::{Address, U256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    /// Ledger time (unix seconds) at execution
    pub timestamp: u64,
    pub network_id: U256,
}

impl CallContext {
    pub fn new(caller: Address, timestamp: u64, network_id: U256) -> Self {
        Self {
            caller,
            timestamp,
            network_id,
        }
    }
}

/// Source of the ledger's notion of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time, never moving backwards across calls
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        let wall = Utc::now().timestamp().max(0) as u64;
        let prev = self.last.fetch_max(wall, Ordering::SeqCst);
        prev.max(wall)
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
