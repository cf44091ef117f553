//! Environment abstraction for deterministic testing.
//!
//! Decouples synchronization logic from system resources (time, randomness).
//! Production code uses the tokio clock and OS entropy; tests use a virtual
//! clock and a seeded RNG so every run replays the same timeline.

use std::time::Duration;

/// Abstract environment providing time, randomness, and sleeping.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards
/// - `wall_clock_millis()` is the display clock only and is never used for
///   ordering decisions
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type used by this environment.
    ///
    /// Production uses `tokio::time::Instant`, simulation uses a virtual
    /// instant advanced explicitly by the test.
    type Instant: Copy + Ord + Send + Sync + std::fmt::Debug + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; the state machines never do.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// Given the same seed, simulation environments produce the same bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Milliseconds since the Unix epoch, used to stamp messages that arrive
    /// without a usable timestamp.
    fn wall_clock_millis(&self) -> i64;

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
