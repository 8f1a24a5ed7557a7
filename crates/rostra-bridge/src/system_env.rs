//! Production Environment implementation using the system clock.

use rostra_core::Environment;

/// Production environment reading the wall clock.
///
/// # Panics
///
/// Panics if the system clock reports a time before the Unix epoch. Creation
/// and modification timestamps would be meaningless on such a host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_is_past_2020() {
        let env = SystemEnv::new();
        assert!(env.wall_clock_secs() > 1_577_836_800);
        let before = env.now();
        assert!(before.as_secs() <= env.wall_clock_secs());
    }
}
