//! Supersession of in-flight visibility requests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use mtv_common::lock;
use mtv_model::{HierarchyNode, NodeKey};
use tokio::sync::watch;

/// Identity of a request: the node key and its depth in the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestTag {
    pub key: NodeKey,
    pub depth: usize,
}

impl RequestTag {
    pub fn of(node: &HierarchyNode) -> Self {
        Self {
            key: node.key.clone(),
            depth: node.depth(),
        }
    }
}

/// What a request observed when it started. Dropping the ticket releases
/// its hold on the tag.
#[derive(Debug)]
pub(crate) struct Ticket<'a> {
    tracker: &'a RequestTracker,
    tag: RequestTag,
    /// Change requests issued at or after this stamp supersede the ticket.
    stamp: u64,
    /// Notification epoch, for requests abandoned by visibility changes.
    epoch: Option<u64>,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        self.tracker.release(&self.tag);
    }
}

#[derive(Debug, Default)]
struct TagState {
    /// Generation of the newest change request, 0 if none.
    latest: u64,
    /// Live tickets of the tag.
    holders: usize,
}

/// Tracks which requests are still current.
///
/// A change request takes a fresh generation, superseding every request of
/// the same tag started before it. Status requests also observe the
/// notification epoch and are abandoned once a visibility change notification
/// fires. Every bump is broadcast so waiting requests stop early.
#[derive(Debug)]
pub(crate) struct RequestTracker {
    tags: Mutex<HashMap<RequestTag, TagState>>,
    next_generation: AtomicU64,
    epoch: AtomicU64,
    version: watch::Sender<u64>,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self {
            tags: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            epoch: AtomicU64::new(0),
            version: watch::Sender::new(0),
        }
    }
}

impl RequestTracker {
    /// Ticket of a status request.
    pub(crate) fn observe(&self, tag: RequestTag) -> Ticket<'_> {
        let mut tags = lock(&self.tags);
        tags.entry(tag.clone()).or_default().holders += 1;
        let stamp = self.next_generation.load(Ordering::Acquire);
        drop(tags);
        Ticket {
            tracker: self,
            tag,
            stamp,
            epoch: Some(self.epoch.load(Ordering::Acquire)),
        }
    }

    /// Ticket of a change request, superseding earlier requests of the tag.
    pub(crate) fn supersede(&self, tag: RequestTag) -> Ticket<'_> {
        let mut tags = lock(&self.tags);
        let generation = self.next_generation.fetch_add(1, Ordering::AcqRel);
        let state = tags.entry(tag.clone()).or_default();
        state.latest = generation;
        state.holders += 1;
        drop(tags);
        self.version.send_modify(|version| *version += 1);
        Ticket {
            tracker: self,
            tag,
            stamp: generation + 1,
            epoch: None,
        }
    }

    /// Abandons all status requests in flight.
    pub(crate) fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.version.send_modify(|version| *version += 1);
    }

    pub(crate) fn is_current(&self, ticket: &Ticket<'_>) -> bool {
        let latest = lock(&self.tags)
            .get(&ticket.tag)
            .map_or(0, |state| state.latest);
        latest < ticket.stamp
            && ticket
                .epoch
                .is_none_or(|epoch| epoch == self.epoch.load(Ordering::Acquire))
    }

    /// Forgets the tag once no ticket holds it.
    fn release(&self, tag: &RequestTag) {
        let mut tags = lock(&self.tags);
        if let Some(state) = tags.get_mut(tag) {
            state.holders = state.holders.saturating_sub(1);
            if state.holders == 0 {
                tags.remove(tag);
            }
        }
    }

    #[cfg(test)]
    fn tracked_tags(&self) -> usize {
        lock(&self.tags).len()
    }

    /// Drives `future` while the ticket stays current. Returns `None` as soon
    /// as it is superseded, dropping the future.
    pub(crate) async fn run<F: Future>(&self, ticket: &Ticket<'_>, future: F) -> Option<F::Output> {
        let mut version = self.version.subscribe();
        if !self.is_current(ticket) {
            return None;
        }
        let mut future = pin!(future);
        loop {
            tokio::select! {
                output = &mut future => {
                    return self.is_current(ticket).then_some(output);
                }
                changed = version.changed() => {
                    if changed.is_err() || !self.is_current(ticket) {
                        return None;
                    }
                }
            }
        }
    }
}
