//! # Review Session
//!
//! Owns one document's suggestion lifecycle and wires the pieces together:
//!
//! ```text
//! SuggestionStore ─► SuggestionCache ─► ActiveSuggestionManager ─► HighlightEngine
//!        ▲                                       │
//!        │                                       ▼
//!        └──── reconcile ◄── SuggestionApi ◄── ResolutionManager
//! ```
//!
//! User intents (`accept`, `reject`, `edit`, navigation) apply synchronously.
//! Everything deferred is a [`TaskKind`] on the session's [`Scheduler`] and
//! runs when the owner calls [`ReviewSession::run_due`] (or
//! [`ReviewSession::run_until_idle`], which sleeps on the tokio clock between
//! deadlines). Actions within one flushed batch are awaited concurrently.
//!
//! Dropping a `run_due` future mid-send is safe: actions it left unreconciled
//! are put back in line on the next `run_due`.
//!
//! Dropping the session disposes it: pending timers are cancelled and nothing
//! further is dispatched.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::active::{ActiveSuggestionManager, Advance, Direction};
use crate::api::{self, SuggestionApi};
use crate::cache::{CacheStats, CachedView, SegmentKey, SuggestionCache, ViewKey};
use crate::config::EngineConfig;
use crate::events::EngineEvent;
use crate::highlight::{HighlightEngine, RenderOutput};
use crate::model::{HighlightSegment, NavigationContext, Suggestion, SuggestionStore};
use crate::resolution::{
    ActionKind, Dispatch, Outcome, ResolutionAction, ResolutionManager, ResolutionStats,
};
use crate::scheduler::{Scheduler, TaskKind};
use crate::viewport::ViewportTracker;
use crate::EngineResult;

/// Current time on the tokio clock (follows a paused test clock)
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

pub struct ReviewSession<A: SuggestionApi> {
    config: EngineConfig,
    store: SuggestionStore,
    cache: SuggestionCache,

    /// Validated view of the current store snapshot
    view: CachedView,

    highlighter: HighlightEngine,
    viewport: ViewportTracker,
    active: ActiveSuggestionManager,
    resolution: ResolutionManager,
    scheduler: Scheduler,
    api: A,
    events: Vec<EngineEvent>,
    disposed: bool,
}

impl<A: SuggestionApi> ReviewSession<A> {
    pub fn new(store: SuggestionStore, api: A, config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let now = now();
        let mut cache = SuggestionCache::new(config.cache.clone());
        let view = cache.get(store.suggestions(), store.content(), now);

        let mut scheduler = Scheduler::new();
        scheduler.schedule(TaskKind::CacheSweep, now + config.cache.sweep_interval());

        let mut session = Self {
            highlighter: HighlightEngine::new(config.highlight.clone()),
            viewport: ViewportTracker::new(config.highlight.visibility_debounce()),
            active: ActiveSuggestionManager::new(config.navigation.clone()),
            resolution: ResolutionManager::new(config.resolution.clone()),
            config,
            store,
            cache,
            view,
            scheduler,
            api,
            events: Vec::new(),
            disposed: false,
        };
        session.sync_available();

        info!(
            suggestions = session.store.len(),
            available = session.active.available().len(),
            dropped = session.view.dropped.len(),
            "Review session started"
        );
        Ok(session)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SuggestionStore {
        &self.store
    }

    pub fn content(&self) -> &str {
        self.store.content()
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Validated view of the current snapshot, including dropped and drifted ids
    pub fn view(&self) -> &CachedView {
        &self.view
    }

    // ---- UI surface ----

    /// Unresolved, valid suggestions in text order
    pub fn available_suggestions(&self) -> &[Suggestion] {
        self.active.available()
    }

    pub fn active_suggestion(&self) -> Option<&Suggestion> {
        self.active.active_suggestion()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.active_id()
    }

    pub fn navigation_context(&self) -> NavigationContext {
        self.active.navigation_context()
    }

    pub fn is_resolved(&self, suggestion_id: &str) -> bool {
        self.resolution.is_resolved(suggestion_id)
    }

    pub fn navigate(&mut self, direction: Direction) -> bool {
        let moved = self.active.navigate(direction);
        self.collect_events();
        moved
    }

    pub fn navigate_next(&mut self) -> bool {
        self.navigate(Direction::Next)
    }

    pub fn navigate_previous(&mut self) -> bool {
        self.navigate(Direction::Previous)
    }

    /// Select a suggestion directly (e.g. a highlight click)
    pub fn set_active(&mut self, suggestion_id: &str) -> bool {
        let changed = self.active.set_active(suggestion_id);
        self.collect_events();
        changed
    }

    /// Accept a suggestion. Returns the action id, or `None` if the
    /// suggestion is unknown, already resolved, or the session is disposed.
    pub fn accept_suggestion(&mut self, suggestion_id: &str) -> Option<String> {
        self.submit(suggestion_id, ActionKind::Accept, None)
    }

    pub fn reject_suggestion(&mut self, suggestion_id: &str) -> Option<String> {
        self.submit(suggestion_id, ActionKind::Reject, None)
    }

    /// Accept with user-edited replacement text
    pub fn edit_suggestion(&mut self, suggestion_id: &str, edited_text: impl Into<String>) -> Option<String> {
        self.submit(suggestion_id, ActionKind::Edit, Some(edited_text.into()))
    }

    fn submit(&mut self, suggestion_id: &str, kind: ActionKind, edited_text: Option<String>) -> Option<String> {
        if self.disposed {
            return None;
        }

        let suggestion = self
            .active
            .available()
            .iter()
            .find(|s| s.id == suggestion_id)?
            .clone();

        let now = now();
        let submission = self.resolution.submit(&suggestion, kind, edited_text, now)?;

        if let Some(replaced) = &submission.replaced {
            self.scheduler.cancel(&TaskKind::Retry(replaced.clone()));
        }

        let advance = self.active.resolve(suggestion_id, now);
        self.schedule_advance(advance);
        self.arm(&submission.action_id, submission.dispatch, now);
        self.collect_events();

        Some(submission.action_id)
    }

    /// Report the suggestions currently on screen; applied after the
    /// visibility debounce.
    pub fn report_visible<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.disposed {
            return;
        }
        let due = self.viewport.report_visible(ids, now());
        self.scheduler.schedule(TaskKind::VisibilityUpdate, due);
    }

    pub fn visible(&self) -> &std::collections::HashSet<String> {
        self.viewport.visible()
    }

    /// Segment map of the document for the current state (memoized)
    pub fn segments(&mut self) -> Arc<Vec<HighlightSegment>> {
        let key = SegmentKey::new(
            ViewKey::new(self.store.suggestions(), self.store.content()),
            self.active.active_id(),
            self.resolution.resolved(),
            self.viewport.visible(),
        );

        let content = self.store.content();
        let highlighter = &self.highlighter;
        let active = &self.active;
        let visible = self.viewport.visible();

        self.cache.segments(key, now(), || {
            highlighter.segment(content, active.available(), active.active_id(), visible)
        })
    }

    /// Full render pass with diagnostics (not memoized)
    pub fn render(&self) -> RenderOutput {
        self.highlighter.render(
            self.store.content(),
            self.active.available(),
            self.active.active_id(),
            self.viewport.visible(),
        )
    }

    /// Swap in a fresh suggestion list from the backend
    pub fn replace_suggestions(&mut self, suggestions: Vec<Suggestion>) {
        self.store.replace_suggestions(suggestions);
        self.sync_available();
    }

    /// Replace the document content; suggestions are revalidated against it
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.store.set_content(content);
        self.sync_available();
    }

    pub fn pending_actions(&self) -> Vec<&ResolutionAction> {
        self.resolution.pending_actions()
    }

    pub fn failed_actions(&self) -> Vec<&ResolutionAction> {
        self.resolution.failed_actions()
    }

    /// Give up on a failed action. Its suggestion stays available and any
    /// pending retry is cancelled.
    pub fn dismiss_failure(&mut self, action_id: &str) -> bool {
        self.scheduler.cancel(&TaskKind::Retry(action_id.to_string()));
        self.resolution.dismiss_failure(action_id).is_some()
    }

    pub fn stats(&self) -> ResolutionStats {
        self.resolution.stats()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- scheduling ----

    /// Earliest deadline of any pending task
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Whether any work other than the periodic cache sweep is pending
    pub fn has_pending_work(&self) -> bool {
        if self.disposed {
            return false;
        }
        self.next_work_deadline().is_some()
            || self.resolution.has_processing()
            || self.resolution.has_queued()
    }

    fn next_work_deadline(&self) -> Option<Instant> {
        self.scheduler
            .pending()
            .filter(|t| t.kind != TaskKind::CacheSweep)
            .map(|t| t.due)
            .min()
    }

    /// Run every task that is due now. Returns how many tasks ran.
    #[instrument(skip(self))]
    pub async fn run_due(&mut self) -> usize {
        if self.disposed {
            return 0;
        }
        self.recover_interrupted();

        let due = self.scheduler.take_due(now());
        let ran = due.len();
        let mut immediate = Vec::new();

        for task in due {
            match task {
                TaskKind::BatchFlush => self.flush_batch().await,
                TaskKind::Dispatch(action_id) => {
                    if let Some(action) = self.resolution.begin_immediate(&action_id) {
                        immediate.push(action);
                    }
                }
                TaskKind::Retry(action_id) => self.retry(&action_id),
                TaskKind::VisibilityUpdate => {
                    if self.viewport.commit() {
                        debug!(visible = self.viewport.visible().len(), "Viewport updated");
                    }
                }
                TaskKind::AutoAdvance => {
                    self.active.complete_auto_advance();
                }
                TaskKind::CacheSweep => {
                    let now = now();
                    self.cache.purge_expired(now);
                    self.scheduler
                        .schedule(TaskKind::CacheSweep, now + self.config.cache.sweep_interval());
                }
            }
            self.collect_events();
        }

        if !immediate.is_empty() {
            self.execute(immediate).await;
        }

        ran
    }

    /// Keep running due tasks, sleeping between deadlines, until nothing but
    /// the periodic cache sweep is left.
    pub async fn run_until_idle(&mut self) {
        loop {
            self.recover_interrupted();
            let Some(deadline) = self.next_work_deadline() else {
                break;
            };
            if deadline > now() {
                tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            }
            self.run_due().await;
        }
    }

    async fn flush_batch(&mut self) {
        if let Some((_, actions)) = self.resolution.take_next_batch() {
            self.collect_events();
            self.execute(actions).await;
        }

        // Remaining batches go out back to back, in tier order
        if self.resolution.has_queued() {
            self.scheduler.schedule(TaskKind::BatchFlush, now());
        }
    }

    /// Send `actions` concurrently and reconcile each outcome as it lands
    async fn execute(&mut self, actions: Vec<ResolutionAction>) {
        let backend = &self.api;
        let mut in_flight: FuturesUnordered<_> = actions
            .into_iter()
            .map(|action| async move {
                let result = api::dispatch(backend, &action).await;
                (action, result)
            })
            .collect();

        while let Some((action, result)) = in_flight.next().await {
            let now = now();
            match self.resolution.complete(&action.id, result, now) {
                Outcome::Completed { suggestion_id, .. } => {
                    self.store.remove(&suggestion_id);
                }
                Outcome::RetryScheduled {
                    action_id,
                    suggestion_id,
                    due,
                } => {
                    restore(&self.view, &mut self.active, &suggestion_id);
                    self.scheduler.schedule(TaskKind::Retry(action_id), due);
                }
                Outcome::Failed { suggestion_id, .. } => {
                    restore(&self.view, &mut self.active, &suggestion_id);
                }
                Outcome::Ignored => {}
            }

            self.events.extend(self.resolution.take_events());
            self.events.extend(self.active.take_events());
        }
    }

    /// Re-arm actions a dropped `run_due` left processing
    fn recover_interrupted(&mut self) {
        if self.disposed {
            return;
        }
        let now = now();
        for (action_id, dispatch) in self.resolution.requeue_interrupted(now) {
            self.arm(&action_id, dispatch, now);
        }

        // Batches queued behind an interrupted flush lost their timer
        if self.resolution.has_queued() && !self.scheduler.is_scheduled(&TaskKind::BatchFlush) {
            self.scheduler.schedule(TaskKind::BatchFlush, now);
        }
    }

    fn retry(&mut self, action_id: &str) {
        let now = now();

        // The suggestion left the store while the action waited
        let vanished = self
            .resolution
            .failed_actions()
            .iter()
            .find(|a| a.id == action_id)
            .is_some_and(|a| !self.view.available.iter().any(|s| s.id == a.suggestion_id));
        if vanished {
            debug!(action_id = %action_id, "Dropping retry for a suggestion no longer in view");
            self.resolution.dismiss_failure(action_id);
            return;
        }

        let Some((suggestion_id, dispatch)) = self.resolution.retry(action_id, now) else {
            return;
        };

        let advance = self.active.resolve(&suggestion_id, now);
        self.schedule_advance(advance);
        self.arm(action_id, dispatch, now);
    }

    fn arm(&mut self, action_id: &str, dispatch: Dispatch, now: Instant) {
        match dispatch {
            Dispatch::Queued { flush_at, .. } => {
                self.scheduler.schedule(TaskKind::BatchFlush, flush_at);
            }
            Dispatch::Immediate => {
                self.scheduler
                    .schedule(TaskKind::Dispatch(action_id.to_string()), now);
            }
        }
    }

    fn schedule_advance(&mut self, advance: Advance) {
        if let Advance::Scheduled { due, .. } = advance {
            self.scheduler.schedule(TaskKind::AutoAdvance, due);
        }
    }

    /// Rebuild the available list from the store (through the cache)
    fn sync_available(&mut self) {
        self.view = self
            .cache
            .get(self.store.suggestions(), self.store.content(), now());

        let resolution = &self.resolution;
        let available: Vec<Suggestion> = self
            .view
            .available
            .iter()
            .filter(|s| !resolution.is_resolved(&s.id))
            .cloned()
            .collect();

        self.active.sync(available);
        self.collect_events();
    }

    fn collect_events(&mut self) {
        self.events.extend(self.resolution.take_events());
        self.events.extend(self.active.take_events());
    }

    /// Cancel all pending timers and refuse further work
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.scheduler.dispose();
        self.viewport.clear();
        self.cache.clear();
        debug!("Review session disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl<A: SuggestionApi> Drop for ReviewSession<A> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Put a reverted suggestion back if it is still part of the current view
fn restore(view: &CachedView, active: &mut ActiveSuggestionManager, suggestion_id: &str) {
    if let Some(suggestion) = view.available.iter().find(|s| s.id == suggestion_id) {
        active.restore(suggestion.clone());
    }
}
