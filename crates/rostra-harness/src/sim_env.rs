//! Simulated clock.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use rostra_core::Environment;

/// Environment whose clock only moves when told to.
///
/// Clones share the same clock.
#[derive(Debug, Clone)]
pub struct SimEnv {
    secs: Arc<AtomicU64>,
}

impl SimEnv {
    /// Clock starting at `start_secs`.
    pub fn at(start_secs: u64) -> Self {
        Self { secs: Arc::new(AtomicU64::new(start_secs)) }
    }

    /// Move the clock forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::at(1_700_000_000)
    }
}

impl Environment for SimEnv {
    fn wall_clock_secs(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}
