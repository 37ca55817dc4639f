//! Deterministic environment for simulation.
//!
//! Time only moves when a test advances it, and randomness comes from a
//! seeded ChaCha stream, so a run is fully reproducible from its seed.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use parley_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Virtual instant: time elapsed since the simulation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time since the simulation started.
    pub fn elapsed(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

struct SimState {
    now: SimInstant,
    rng: ChaCha8Rng,
}

/// Simulated environment with virtual time and seeded randomness.
///
/// Clones share the same clock and RNG, so every client in a simulation
/// observes one timeline.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Environment seeded with 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with an explicit seed.
    pub fn with_seed(seed: u64) -> Self {
        let state = SimState { now: SimInstant::default(), rng: ChaCha8Rng::seed_from_u64(seed) };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Move the clock forward and return the new time.
    pub fn advance(&self, duration: Duration) -> SimInstant {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.now = state.now + duration;
        state.now
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).now
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).rng.fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_moves_only_when_advanced() {
        let env = SimEnv::new();
        let start = env.now();
        assert_eq!(env.now(), start);

        env.advance(Duration::from_secs(3));
        assert_eq!(env.now() - start, Duration::from_secs(3));
    }

    #[test]
    fn clones_share_the_clock() {
        let env = SimEnv::new();
        let other = env.clone();
        env.advance(Duration::from_millis(250));
        assert_eq!(other.now().elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(42);
        let b = SimEnv::with_seed(42);
        assert_eq!(a.random_u64(), b.random_u64());
        assert_ne!(a.random_u64(), SimEnv::with_seed(43).random_u64());
    }
}
