//! Bounded retry for transient operations.

use std::thread;
use std::time::Duration;

use tracing::warn;

/// Re-invokes a fallible operation up to `max_attempts` times with a fixed
/// delay between attempts.
///
/// Decorates one specific operation (login, a single network call), never
/// a whole sweep: re-running a partially archived batch would reprocess
/// messages that already succeeded. Either the first success is returned
/// or the terminal failure is handed back untouched; nothing is swallowed.
/// The inter-attempt wait blocks the calling thread.
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    max_attempts: u32,
    delay: Duration,
}

impl Retry {
    /// `max_attempts` is clamped to at least one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op`, retrying on failure while attempts remain. Every
    /// non-terminal failure is logged; the terminal one is returned.
    pub fn run<T, E>(&self, label: &str, mut op: impl FnMut() -> Result<T, E>) -> Result<T, E>
    where
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts => {
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "{label} failed, retrying in {:?}",
                        self.delay
                    );
                    thread::sleep(self.delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for Retry {
    /// Three attempts, one second apart.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
