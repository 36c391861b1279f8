//! The hierarchy visibility handler.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use mtv_cache::AlwaysAndNeverDrawnElementCache;
use mtv_common::{Debouncer, Event, ListenerId, SuppressionCounter, lock};
use mtv_filter::{FilterError, FilteredTree};
use mtv_model::{FilterPath, HierarchyNode, VisibilityStatus};
use mtv_query::{CachingQueryProvider, ClassInspector, QueryProvider, QuerySource};
use mtv_viewport::Viewport;
use tokio::runtime::Handle;

use crate::change::ChangePlan;
use crate::config::HandlerConfig;
use crate::error::{Result, VisibilityError};
use crate::request::{RequestTag, RequestTracker};
use crate::status::VisibilityAggregator;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

type TreeBuild = Shared<BoxFuture<'static, std::result::Result<Arc<FilteredTree>, FilterError>>>;

/// Collaborators of a [`HierarchyVisibilityHandler`].
pub struct HandlerProps {
    pub viewport: Arc<dyn Viewport>,
    pub query_source: Arc<dyn QuerySource>,
    pub class_inspector: Arc<dyn ClassInspector>,
    /// Ids cache shared with the hierarchy definition. A private one is
    /// created when absent.
    pub ids_cache: Option<Arc<CachingQueryProvider>>,
    pub config: HandlerConfig,
}

#[derive(Default)]
struct FilterState {
    paths: Option<Arc<Vec<FilterPath>>>,
    build: Option<TreeBuild>,
}

struct Inner {
    id: u64,
    viewport: Arc<dyn Viewport>,
    provider: QueryProvider,
    class_inspector: Arc<dyn ClassInspector>,
    ids: Arc<CachingQueryProvider>,
    drawn: Arc<AlwaysAndNeverDrawnElementCache>,
    aggregator: VisibilityAggregator,
    config: HandlerConfig,
    runtime: Handle,
    requests: RequestTracker,
    suppression: SuppressionCounter,
    /// A notification came due while suppressed.
    pending: AtomicBool,
    notifier: Debouncer,
    on_visibility_change: Event<()>,
    /// Index into `ViewportEvents::all()` and listener id.
    listeners: Mutex<Vec<(usize, ListenerId)>>,
    filter: Mutex<FilterState>,
    disposed: AtomicBool,
}

impl Inner {
    fn ensure_alive(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(VisibilityError::Disposed);
        }
        Ok(())
    }

    /// Starts a notification window for a viewport event.
    fn schedule_notification(self: &Arc<Self>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        if self.suppression.is_suppressed() {
            self.pending.store(true, Ordering::Release);
            return;
        }
        let generation = self.notifier.trigger();
        let weak = Arc::downgrade(self);
        self.runtime.spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.notifier.settle(generation).await {
                inner.notify();
            }
        });
    }

    fn notify(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        if self.suppression.is_suppressed() {
            self.pending.store(true, Ordering::Release);
            return;
        }
        tracing::debug!(handler = self.id, "visibility changed");
        self.requests.bump_epoch();
        self.on_visibility_change.raise(&());
    }

    fn suppress(&self) {
        let count = self.suppression.suppress();
        self.drawn.suppress_change_events();
        tracing::trace!(handler = self.id, count, "suppressed change events");
    }

    fn resume(self: &Arc<Self>) {
        self.drawn.resume_change_events();
        if self.suppression.resume() && self.pending.swap(false, Ordering::AcqRel) {
            tracing::trace!(handler = self.id, "firing deferred notification");
            self.schedule_notification();
        }
    }

    /// The filtered tree of the current filter paths, building it on first
    /// use. Concurrent callers share one build; a failed build is retried by
    /// the next caller.
    async fn filtered_tree(&self) -> Result<Option<Arc<FilteredTree>>> {
        let build = {
            let mut filter = lock(&self.filter);
            let Some(paths) = filter.paths.clone() else {
                return Ok(None);
            };
            match &filter.build {
                Some(build) => build.clone(),
                None => {
                    let provider = self.provider.clone();
                    let inspector = Arc::clone(&self.class_inspector);
                    let resolution = self.config.class_resolution.clone();
                    let build = async move {
                        FilteredTree::build(&paths, inspector.as_ref(), &provider, &resolution)
                            .await
                            .map(Arc::new)
                    }
                    .boxed()
                    .shared();
                    filter.build = Some(build.clone());
                    build
                }
            }
        };
        match build.clone().await {
            Ok(tree) => Ok(Some(tree)),
            Err(err) => {
                let mut filter = lock(&self.filter);
                if filter
                    .build
                    .as_ref()
                    .is_some_and(|current| current.ptr_eq(&build))
                {
                    filter.build = None;
                }
                Err(err.into())
            }
        }
    }

    async fn compute_status(&self, node: &HierarchyNode) -> Result<VisibilityStatus> {
        if node.is_inside_filtered_subtree()
            && let Some(tree) = self.filtered_tree().await?
        {
            let targets = tree.get_visibility_change_targets(node);
            tracing::trace!(handler = self.id, targets = targets.len(), "status of filtered node");
            return self.aggregator.filter_targets_status(&targets).await;
        }
        self.aggregator.node_status(node).await
    }

    async fn compute_plan(&self, node: &HierarchyNode, on: bool) -> Result<ChangePlan> {
        if node.is_inside_filtered_subtree()
            && let Some(tree) = self.filtered_tree().await?
        {
            let targets = tree.get_visibility_change_targets(node);
            tracing::trace!(
                handler = self.id,
                targets = targets.len(),
                on,
                "change of filtered node"
            );
            return self.aggregator.plan_filter_targets_change(&targets, on).await;
        }
        self.aggregator.plan_node_change(node, on).await
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let events = self.viewport.events().all();
        for (index, id) in lock(&self.listeners).drain(..) {
            events[index].remove_listener(id);
        }
        self.notifier.trigger();
        self.drawn.dispose();
        self.on_visibility_change.clear();
        tracing::debug!(handler = self.id, "visibility handler disposed");
    }
}

/// Answers and changes the visibility of hierarchy nodes in one viewport.
///
/// Status requests and changes are tagged with the node key and depth. A
/// change supersedes every earlier request of the same tag, and status
/// requests are abandoned when a visibility change notification fires first.
/// Superseded status requests resolve to [`VisibilityStatus::fallback`];
/// superseded changes are not applied.
///
/// Viewport events are coalesced into [`on_visibility_change`] notifications.
/// Changes suppress notifications while they write, so each change is
/// reported once after it completes.
///
/// [`on_visibility_change`]: HierarchyVisibilityHandler::on_visibility_change
pub struct HierarchyVisibilityHandler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for HierarchyVisibilityHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HierarchyVisibilityHandler")
            .field("id", &self.inner.id)
            .field("suppressed", &self.inner.suppression.count())
            .field("disposed", &self.inner.disposed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl HierarchyVisibilityHandler {
    /// Creates the handler and subscribes to the viewport's events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(props: HandlerProps) -> Result<Self> {
        let HandlerProps {
            viewport,
            query_source,
            class_inspector,
            ids_cache,
            config,
        } = props;
        let runtime = Handle::try_current().map_err(|_| VisibilityError::NoRuntime)?;
        let provider = QueryProvider::new(query_source);
        let ids =
            ids_cache.unwrap_or_else(|| Arc::new(CachingQueryProvider::new(provider.clone())));
        let drawn = Arc::new(AlwaysAndNeverDrawnElementCache::new(
            Arc::clone(&viewport),
            provider.clone(),
            &config.drawn_cache,
        )?);
        let aggregator = VisibilityAggregator::new(
            Arc::clone(&viewport),
            Arc::clone(&ids),
            Arc::clone(&drawn),
            config.disable_in_non_spatial_views,
        );

        let inner = Arc::new(Inner {
            id: NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed),
            viewport,
            provider,
            class_inspector,
            ids,
            drawn,
            aggregator,
            notifier: Debouncer::new(config.change_event_debounce()),
            config,
            runtime,
            requests: RequestTracker::default(),
            suppression: SuppressionCounter::new(),
            pending: AtomicBool::new(false),
            on_visibility_change: Event::new(),
            listeners: Mutex::new(Vec::new()),
            filter: Mutex::new(FilterState::default()),
            disposed: AtomicBool::new(false),
        });

        let listeners = inner
            .viewport
            .events()
            .all()
            .iter()
            .enumerate()
            .map(|(index, event)| {
                let weak: Weak<Inner> = Arc::downgrade(&inner);
                let id = event.add_listener(move |_| {
                    if let Some(inner) = weak.upgrade() {
                        inner.schedule_notification();
                    }
                });
                (index, id)
            })
            .collect();
        *lock(&inner.listeners) = listeners;
        tracing::debug!(
            handler = inner.id,
            debounce_ms = inner.config.change_event_debounce_ms,
            "visibility handler created"
        );
        Ok(Self { inner })
    }

    /// Current visibility of a node.
    ///
    /// Nodes inside a filtered subtree are answered from the filter targets
    /// beneath them. Resolves to the fallback status when superseded.
    pub async fn get_visibility_status(&self, node: &HierarchyNode) -> Result<VisibilityStatus> {
        let inner = &self.inner;
        inner.ensure_alive()?;
        let ticket = inner.requests.observe(RequestTag::of(node));
        match inner.requests.run(&ticket, inner.compute_status(node)).await {
            Some(status) => status,
            None => {
                tracing::trace!(handler = inner.id, key = ?node.key, "status request superseded");
                Ok(VisibilityStatus::fallback())
            }
        }
    }

    /// Turns a node on or off.
    ///
    /// Notifications and drawn-cache updates are suppressed from planning
    /// until the writes are done.
    pub async fn change_visibility(&self, node: &HierarchyNode, on: bool) -> Result<()> {
        let inner = &self.inner;
        inner.ensure_alive()?;
        let ticket = inner.requests.supersede(RequestTag::of(node));
        let _suppression = self.suppress();
        let planned = inner.requests.run(&ticket, inner.compute_plan(node, on)).await;
        match planned {
            Some(Ok(plan))
                if inner.requests.is_current(&ticket) && !inner.disposed.load(Ordering::Acquire) =>
            {
                let applied = plan.apply(inner.viewport.as_ref());
                tracing::debug!(
                    handler = inner.id,
                    key = ?node.key,
                    on,
                    planned = plan.len(),
                    applied,
                    "visibility changed"
                );
                Ok(())
            }
            Some(Ok(_)) | None => {
                tracing::trace!(handler = inner.id, key = ?node.key, "change request superseded");
                Ok(())
            }
            Some(Err(err)) => Err(err),
        }
    }

    /// Raised when the visibility of any node may have changed.
    pub fn on_visibility_change(&self) -> &Event<()> {
        &self.inner.on_visibility_change
    }

    /// Replaces the active filter. `None` shows the unfiltered hierarchy.
    ///
    /// The filtered tree is built on the next request that needs it.
    pub fn set_filter_paths(&self, paths: Option<Vec<FilterPath>>) {
        let mut filter = lock(&self.inner.filter);
        tracing::debug!(
            handler = self.inner.id,
            paths = paths.as_ref().map_or(0, Vec::len),
            "filter paths changed"
        );
        *filter = FilterState {
            paths: paths.map(Arc::new),
            build: None,
        };
    }

    /// The filtered tree of the active filter, if any.
    pub async fn filtered_tree(&self) -> Result<Option<Arc<FilteredTree>>> {
        self.inner.ensure_alive()?;
        self.inner.filtered_tree().await
    }

    /// Ids cache used for hierarchy lookups, e.g. for invalidation after
    /// data changes.
    pub fn ids_cache(&self) -> &Arc<CachingQueryProvider> {
        &self.inner.ids
    }

    pub fn drawn_cache(&self) -> &Arc<AlwaysAndNeverDrawnElementCache> {
        &self.inner.drawn
    }

    pub fn aggregator(&self) -> &VisibilityAggregator {
        &self.inner.aggregator
    }

    /// Suppresses notifications and drawn-cache updates. Every call must be
    /// matched by one [`resume_change_events`](Self::resume_change_events).
    pub fn suppress_change_events(&self) {
        self.inner.suppress();
    }

    /// Releases one suppression. When the last one is released, a
    /// notification that came due meanwhile fires.
    pub fn resume_change_events(&self) {
        self.inner.resume();
    }

    /// Suppresses change events until the guard is dropped.
    pub fn suppress(&self) -> HandlerSuppression<'_> {
        self.inner.suppress();
        HandlerSuppression { handler: self }
    }

    pub fn is_suppressed(&self) -> bool {
        self.inner.suppression.is_suppressed()
    }

    /// Unsubscribes from the viewport, disposes the drawn cache and removes
    /// all visibility change listeners.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl Drop for HierarchyVisibilityHandler {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

/// Scoped suppression of a handler's change events.
#[must_use = "suppression ends when the guard is dropped"]
#[derive(Debug)]
pub struct HandlerSuppression<'a> {
    handler: &'a HierarchyVisibilityHandler,
}

impl Drop for HandlerSuppression<'_> {
    fn drop(&mut self) {
        self.handler.inner.resume();
    }
}
