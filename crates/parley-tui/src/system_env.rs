//! Production environment using system time and OS randomness.
//!
//! `SystemEnv` is the [`Environment`] the terminal client runs with: the
//! monotonic clock advances on its own, sleeping goes through tokio, and
//! random bytes come from getrandom. Runs are not reproducible; simulations
//! use the harness environment instead.

use std::time::Duration;

use parley_core::Environment;

/// Production environment using system time and OS randomness.
///
/// Randomness only seeds health-probe ids, so it needs no cryptographic
/// strength, but the OS source is the simplest one that never repeats.
///
/// # Panics
///
/// Panics if the OS RNG fails, which indicates a broken platform.
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG is available");
    }
}
