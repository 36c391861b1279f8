//! The always/never-drawn element cache.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use mtv_common::{Debouncer, ListenerId, SuppressionCounter, lock};
use mtv_model::{Id, SetType};
use mtv_query::{QueryOptions, QueryProvider};
use mtv_viewport::Viewport;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::config::DrawnCacheConfig;
use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

/// Published state of one set type.
#[derive(Debug, Clone)]
struct Snapshot {
    /// Debounce generation the value was queried for.
    generation: u64,
    /// `None` while dirty.
    value: Option<std::result::Result<Arc<CacheEntry>, CacheError>>,
}

struct Slot {
    set_type: SetType,
    debouncer: Debouncer,
    snapshot: watch::Sender<Snapshot>,
    /// Set once the set type has been queried or scheduled.
    started: AtomicBool,
    /// A change arrived while suppressed and has not been marked dirty yet.
    pending: AtomicBool,
    task: Mutex<Option<AbortHandle>>,
}

impl Slot {
    fn new(set_type: SetType, config: &DrawnCacheConfig) -> Self {
        Self {
            set_type,
            debouncer: Debouncer::new(config.debounce()),
            snapshot: watch::Sender::new(Snapshot {
                generation: 0,
                value: None,
            }),
            started: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    fn has_value(&self) -> bool {
        self.snapshot.borrow().value.is_some()
    }

    fn has_failed(&self) -> bool {
        matches!(self.snapshot.borrow().value, Some(Err(_)))
    }

    fn mark_dirty(&self) {
        let generation = self.debouncer.generation();
        self.snapshot.send_if_modified(|snapshot| {
            if snapshot.generation >= generation || snapshot.value.is_none() {
                return false;
            }
            snapshot.value = None;
            true
        });
    }

    /// Publishes a result unless a newer one is already out.
    fn publish(&self, generation: u64, value: std::result::Result<Arc<CacheEntry>, CacheError>) {
        self.snapshot.send_if_modified(|snapshot| {
            if snapshot.generation > generation {
                return false;
            }
            *snapshot = Snapshot {
                generation,
                value: Some(value),
            };
            true
        });
    }

    fn abort_task(&self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

struct Shared {
    id: u64,
    viewport: Arc<dyn Viewport>,
    provider: QueryProvider,
    runtime: Handle,
    suppression: SuppressionCounter,
    slots: [Slot; 2],
    listeners: Mutex<Vec<(SetType, ListenerId)>>,
    disposed: AtomicBool,
}

impl Shared {
    fn slot(&self, set_type: SetType) -> &Slot {
        match set_type {
            SetType::Always => &self.slots[0],
            SetType::Never => &self.slots[1],
        }
    }

    fn restart_token(&self, set_type: SetType) -> String {
        format!("drawn-elements/{}/{set_type}", self.id)
    }

    /// Starts a new debounce window for the set type.
    fn schedule(self: &Arc<Self>, set_type: SetType) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let slot = self.slot(set_type);
        slot.started.store(true, Ordering::Release);
        let generation = slot.debouncer.trigger();
        if self.suppression.is_suppressed() && slot.has_value() {
            // Keep serving the last stable snapshot until suppression ends.
            slot.pending.store(true, Ordering::Release);
        } else {
            slot.mark_dirty();
        }
        tracing::trace!(cache = self.id, %set_type, generation, "scheduled requery");

        let shared = Arc::clone(self);
        let task = self
            .runtime
            .spawn(async move { shared.requery(set_type, generation).await });
        if let Some(previous) = lock(&slot.task).replace(task.abort_handle()) {
            previous.abort();
        }
    }

    async fn requery(&self, set_type: SetType, generation: u64) {
        let slot = self.slot(set_type);
        if !slot.debouncer.settle(generation).await {
            return;
        }
        // Without a snapshot, readers would wait for the suppression to end.
        if slot.has_value() {
            self.suppression.wait_released().await;
        }
        if !slot.debouncer.is_current(generation) || self.disposed.load(Ordering::Acquire) {
            return;
        }

        let element_ids = self.viewport.drawn(set_type);
        tracing::debug!(
            cache = self.id,
            %set_type,
            generation,
            elements = element_ids.len(),
            "querying drawn elements"
        );
        let options = QueryOptions::with_restart_token(self.restart_token(set_type));
        let result = self
            .provider
            .query_element_category_info(&element_ids, &options)
            .await;

        if !slot.debouncer.is_current(generation) {
            tracing::trace!(cache = self.id, %set_type, generation, "discarding stale result");
            return;
        }
        let value = match result {
            Ok(rows) => {
                if rows.len() < element_ids.len() {
                    tracing::warn!(
                        cache = self.id,
                        %set_type,
                        missing = element_ids.len() - rows.len(),
                        "some drawn elements could not be resolved to a model and category"
                    );
                }
                Ok(Arc::new(CacheEntry::from_rows(rows)))
            }
            Err(err) => {
                tracing::warn!(cache = self.id, %set_type, %err, "drawn element query failed");
                Err(CacheError::from(err))
            }
        };
        slot.publish(generation, value);
    }

    fn on_resumed(&self) {
        for slot in &self.slots {
            if slot.pending.swap(false, Ordering::AcqRel) {
                slot.mark_dirty();
            }
        }
    }
}

/// Resolves the viewport's always-drawn and never-drawn sets into
/// `model -> category -> elements` snapshots.
///
/// Each set type is queried lazily, on first access or first change. Changes
/// start a debounce window; only the query of the last change in a burst runs,
/// and its result is published only if no newer change arrived meanwhile.
/// While change processing is suppressed, changes leave the last snapshot in
/// place and the re-query waits for the suppression to end. A set type with
/// no snapshot yet is queried even while suppressed.
pub struct AlwaysAndNeverDrawnElementCache {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AlwaysAndNeverDrawnElementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlwaysAndNeverDrawnElementCache")
            .field("id", &self.shared.id)
            .field("suppressed", &self.shared.suppression.count())
            .finish_non_exhaustive()
    }
}

impl AlwaysAndNeverDrawnElementCache {
    /// Creates the cache and subscribes to the viewport's set change events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        viewport: Arc<dyn Viewport>,
        provider: QueryProvider,
        config: &DrawnCacheConfig,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        let shared = Arc::new(Shared {
            id: NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed),
            viewport,
            provider,
            runtime,
            suppression: SuppressionCounter::new(),
            slots: [
                Slot::new(SetType::Always, config),
                Slot::new(SetType::Never, config),
            ],
            listeners: Mutex::new(Vec::new()),
            disposed: AtomicBool::new(false),
        });

        let mut listeners = Vec::with_capacity(SetType::BOTH.len());
        for set_type in SetType::BOTH {
            let weak: Weak<Shared> = Arc::downgrade(&shared);
            let id = shared
                .viewport
                .events()
                .drawn_changed(set_type)
                .add_listener(move |_| {
                    if let Some(shared) = weak.upgrade() {
                        shared.schedule(set_type);
                    }
                });
            listeners.push((set_type, id));
        }
        *lock(&shared.listeners) = listeners;
        tracing::debug!(
            cache = shared.id,
            debounce_ms = config.debounce_ms,
            "drawn element cache created"
        );
        Ok(Self { shared })
    }

    /// Snapshot of a set type, waiting for a pending query to settle.
    pub async fn entry(&self, set_type: SetType) -> Result<Arc<CacheEntry>> {
        let shared = &self.shared;
        if shared.disposed.load(Ordering::Acquire) {
            return Err(CacheError::Disposed);
        }
        let slot = shared.slot(set_type);
        if !slot.started.load(Ordering::Acquire) || slot.has_failed() {
            shared.schedule(set_type);
        }
        let mut rx = slot.snapshot.subscribe();
        let snapshot = rx
            .wait_for(|snapshot| snapshot.value.is_some())
            .await
            .map_err(|_| CacheError::Disposed)?;
        match &snapshot.value {
            Some(value) => value.clone(),
            None => Err(CacheError::Disposed),
        }
    }

    /// Elements of a set, optionally restricted to a model and categories.
    pub async fn get_elements(
        &self,
        set_type: SetType,
        model_id: Option<&Id>,
        category_ids: Option<&BTreeSet<Id>>,
    ) -> Result<BTreeSet<Id>> {
        let entry = self.entry(set_type).await?;
        Ok(entry.elements(model_id, category_ids))
    }

    /// Elements of a set under one assembly parent (`None` for root elements).
    pub async fn get_child_elements(
        &self,
        set_type: SetType,
        model_id: &Id,
        category_id: &Id,
        parent_id: Option<&Id>,
    ) -> Result<BTreeSet<Id>> {
        let entry = self.entry(set_type).await?;
        Ok(entry.child_elements(model_id, category_id, parent_id))
    }

    pub fn suppress_change_events(&self) {
        let count = self.shared.suppression.suppress();
        tracing::trace!(cache = self.shared.id, count, "suppressed change events");
    }

    /// Releases one suppression. When the last one is released, set types
    /// changed in the meantime are marked dirty.
    pub fn resume_change_events(&self) {
        if self.shared.suppression.resume() {
            tracing::trace!(cache = self.shared.id, "resumed change events");
            self.shared.on_resumed();
        }
    }

    /// Suppresses change events until the guard is dropped.
    pub fn suppress(&self) -> CacheSuppression<'_> {
        self.suppress_change_events();
        CacheSuppression { cache: self }
    }

    pub fn is_suppressed(&self) -> bool {
        self.shared.suppression.is_suppressed()
    }

    /// Unsubscribes from the viewport and stops pending queries.
    pub fn dispose(&self) {
        let shared = &self.shared;
        if shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let events = shared.viewport.events();
        for (set_type, id) in lock(&shared.listeners).drain(..) {
            events.drawn_changed(set_type).remove_listener(id);
        }
        for slot in &shared.slots {
            slot.debouncer.trigger();
            slot.abort_task();
            // Wake callers still waiting for a snapshot.
            slot.snapshot.send_replace(Snapshot {
                generation: u64::MAX,
                value: Some(Err(CacheError::Disposed)),
            });
        }
        tracing::debug!(cache = shared.id, "drawn element cache disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::Acquire)
    }
}

impl Drop for AlwaysAndNeverDrawnElementCache {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Scoped suppression of a cache's change events.
#[must_use = "suppression ends when the guard is dropped"]
#[derive(Debug)]
pub struct CacheSuppression<'a> {
    cache: &'a AlwaysAndNeverDrawnElementCache,
}

impl Drop for CacheSuppression<'_> {
    fn drop(&mut self) {
        self.cache.resume_change_events();
    }
}
