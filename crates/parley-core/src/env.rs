//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources (time, randomness). The
//! production environment wraps the system clock; simulations substitute a
//! virtual clock and a seeded RNG.

use std::{fmt::Debug, time::Duration};

/// Abstract environment providing time, randomness, and async sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - Given the same seed, a simulated environment yields the same random
///   sequence
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type used by this environment.
    ///
    /// Production uses `std::time::Instant`, simulation uses virtual time.
    type Instant: Copy + Ord + Debug + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Sleeps for the given duration.
    ///
    /// Only driver code awaits this; state machines take `now` as input.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
