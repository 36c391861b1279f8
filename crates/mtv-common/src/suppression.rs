//! Nesting suppression counter.

use tokio::sync::watch;

/// Counts nested suppressions of change processing.
///
/// Work is suppressed while the count is above zero. Every `suppress` must be
/// matched by exactly one `resume`; prefer [`SuppressionCounter::guard`] so the
/// pairing also holds on early returns. Resuming at zero is a caller contract
/// violation: the count saturates and a warning is logged.
#[derive(Debug)]
pub struct SuppressionCounter {
    count: watch::Sender<usize>,
}

impl Default for SuppressionCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SuppressionCounter {
    pub fn new() -> Self {
        Self {
            count: watch::Sender::new(0),
        }
    }

    /// Increments the count and returns the new value.
    pub fn suppress(&self) -> usize {
        let mut count = 0;
        self.count.send_modify(|value| {
            *value += 1;
            count = *value;
        });
        count
    }

    /// Decrements the count. Returns `true` when this call released the last
    /// suppression.
    pub fn resume(&self) -> bool {
        let mut released = false;
        self.count.send_if_modified(|value| {
            if *value == 0 {
                tracing::warn!("resume called without a matching suppress");
                return false;
            }
            *value -= 1;
            released = *value == 0;
            true
        });
        released
    }

    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    pub fn is_suppressed(&self) -> bool {
        self.count() > 0
    }

    /// Waits until no suppression is active. Returns immediately if none is.
    pub async fn wait_released(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close while borrowed.
        let _ = rx.wait_for(|count| *count == 0).await;
    }

    /// Suppresses until the returned guard is dropped.
    pub fn guard(&self) -> SuppressionGuard<'_> {
        self.suppress();
        SuppressionGuard { counter: self }
    }
}

/// Scoped suppression; resumes on drop.
#[must_use = "suppression ends when the guard is dropped"]
#[derive(Debug)]
pub struct SuppressionGuard<'a> {
    counter: &'a SuppressionCounter,
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.counter.resume();
    }
}
