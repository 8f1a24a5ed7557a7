//! Environment abstraction for deterministic testing.
//!
//! Decouples provisioning and lifecycle logic from the system clock so tests
//! can pin timestamps. Production uses the wall clock.

use crate::ids::Timestamp;

/// Abstract environment providing wall-clock time.
///
/// # Invariants
///
/// - `wall_clock_secs()` is seconds since the Unix epoch
/// - Implementations are infallible
pub trait Environment: Clone + Send + Sync + 'static {
    /// Seconds since the Unix epoch.
    fn wall_clock_secs(&self) -> u64;

    /// Current time as a [`Timestamp`].
    fn now(&self) -> Timestamp {
        Timestamp::from_secs(self.wall_clock_secs())
    }
}
