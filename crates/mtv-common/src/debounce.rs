//! Generation-tagged debouncing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Coalesces bursts of triggers into one action.
///
/// Each trigger bumps a generation. The task scheduled for a trigger waits for
/// the window and proceeds only if no newer trigger arrived meanwhile, so a
/// burst ends up running only the task of its last trigger. The same
/// generation check, repeated after the work is done, discards stale results.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    generation: AtomicU64,
}

impl Debouncer {
    /// A zero window defers to the next scheduler tick.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            generation: AtomicU64::new(0),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Starts a new window and returns its generation.
    pub fn trigger(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Waits out the window. Returns `true` if `generation` is still the latest.
    pub async fn settle(&self, generation: u64) -> bool {
        if self.window.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.window).await;
        }
        self.is_current(generation)
    }
}
