//! # Resolution Manager
//!
//! Turns accept/reject/edit intents into optimistic local state, groups them
//! into prioritized batches, and reconciles backend outcomes.
//!
//! ## Action lifecycle
//!
//! ```text
//! submit ──► pending ──► processing ──► completed
//!               ▲            │
//!               │            ▼
//!             retry ◄──── failed ──► (terminal once retries are exhausted)
//! ```
//!
//! - `submit` marks the suggestion resolved before any network round trip.
//! - With batching on, the action joins the first open batch of its tier
//!   (or a new one); the owner arms one debounced flush per submission.
//! - `take_next_batch` pops batches strictly by tier (high, normal, low),
//!   then creation order.
//! - A failure reverts the optimistic update. While retries remain the
//!   action waits `batch_delay * multiplier^retry_count` and is re-submitted.
//!
//! The manager does no I/O and never reads the clock; callers pass `now`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ResolutionConfig;
use crate::errors::ApiError;
use crate::events::EngineEvent;
use crate::model::{Priority, Suggestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Accept,
    Reject,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Batch priority tier; declaration order is flush order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchTier {
    High,
    Normal,
    Low,
}

impl From<Priority> for BatchTier {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::High => BatchTier::High,
            Priority::Medium => BatchTier::Normal,
            Priority::Low => BatchTier::Low,
        }
    }
}

/// One user intent against one suggestion
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionAction {
    pub id: String,
    pub suggestion_id: String,
    pub kind: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_text: Option<String>,
    pub status: ActionStatus,
    pub retry_count: u32,
    pub tier: BatchTier,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    submitted_at: Option<Instant>,
}

impl ResolutionAction {
    /// Time since the current attempt was submitted
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.submitted_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default()
    }
}

/// Group of queued actions sharing a tier
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub id: u64,
    pub tier: BatchTier,
    pub action_ids: Vec<String>,
    pub created_at: Instant,
}

/// How a freshly pending action leaves the manager
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Joined a batch; flush it once `flush_at` passes without new activity
    Queued { batch_id: u64, flush_at: Instant },

    /// Batching disabled; send right away
    Immediate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub action_id: String,

    /// Earlier failed action for the same suggestion that this one replaces
    pub replaced: Option<String>,

    pub dispatch: Dispatch,
}

/// Result of reconciling one backend response
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed {
        suggestion_id: String,
        latency: Duration,
    },

    /// Reverted; will be re-submitted at `due`
    RetryScheduled {
        action_id: String,
        suggestion_id: String,
        due: Instant,
    },

    /// Reverted for good
    Failed { suggestion_id: String, error: ApiError },

    /// Unknown or no longer in flight
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionStats {
    pub total_actions: u64,
    pub completed: u64,
    /// Terminal failures
    pub failed: u64,
    pub retries: u64,
    pub batches_processed: u64,
    #[serde(skip)]
    pub total_latency: Duration,
}

impl ResolutionStats {
    /// Completed share of finished actions (0.0 before anything finished)
    pub fn success_rate(&self) -> f64 {
        let finished = self.completed + self.failed;
        if finished == 0 {
            0.0
        } else {
            self.completed as f64 / finished as f64
        }
    }

    pub fn average_latency(&self) -> Duration {
        if self.completed == 0 {
            Duration::ZERO
        } else {
            self.total_latency / self.completed as u32
        }
    }
}

#[derive(Debug)]
pub struct ResolutionManager {
    config: ResolutionConfig,

    /// Suggestions hidden by an optimistic or confirmed resolution
    resolved: HashSet<String>,

    /// Pending and processing actions by id
    actions: HashMap<String, ResolutionAction>,

    /// Failed actions (awaiting retry or terminal) by id
    failed: HashMap<String, ResolutionAction>,

    queue: Vec<BatchRequest>,

    next_action: u64,
    next_batch: u64,
    stats: ResolutionStats,
    events: Vec<EngineEvent>,
}

impl ResolutionManager {
    pub fn new(config: ResolutionConfig) -> Self {
        Self {
            config,
            resolved: HashSet::new(),
            actions: HashMap::new(),
            failed: HashMap::new(),
            queue: Vec::new(),
            next_action: 0,
            next_batch: 0,
            stats: ResolutionStats::default(),
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Record an intent and hide the suggestion optimistically.
    ///
    /// Returns `None` if the suggestion is already resolved or in flight.
    pub fn submit(
        &mut self,
        suggestion: &Suggestion,
        kind: ActionKind,
        edited_text: Option<String>,
        now: Instant,
    ) -> Option<Submission> {
        if self.resolved.contains(&suggestion.id) {
            debug!(suggestion_id = %suggestion.id, "Suggestion already resolved");
            return None;
        }

        let replaced = self
            .failed
            .iter()
            .find(|(_, a)| a.suggestion_id == suggestion.id)
            .map(|(id, _)| id.clone());
        if let Some(old) = &replaced {
            self.failed.remove(old);
        }

        let action_id = format!("action-{}", self.next_action);
        self.next_action += 1;

        let action = ResolutionAction {
            id: action_id.clone(),
            suggestion_id: suggestion.id.clone(),
            kind,
            edited_text,
            status: ActionStatus::Pending,
            retry_count: 0,
            tier: suggestion.priority.into(),
            timestamp: Utc::now(),
            submitted_at: Some(now),
        };

        info!(
            action_id = %action_id,
            suggestion_id = %suggestion.id,
            kind = ?kind,
            "Resolution submitted"
        );

        self.resolved.insert(suggestion.id.clone());
        self.stats.total_actions += 1;
        let dispatch = self.admit(action, now);

        Some(Submission {
            action_id,
            replaced,
            dispatch,
        })
    }

    /// Register a pending action and route it to a batch or immediate send
    fn admit(&mut self, action: ResolutionAction, now: Instant) -> Dispatch {
        let action_id = action.id.clone();
        let tier = action.tier;
        self.actions.insert(action_id.clone(), action);
        self.route(action_id, tier, now)
    }

    fn route(&mut self, action_id: String, tier: BatchTier, now: Instant) -> Dispatch {
        if !self.config.enable_batch_processing {
            return Dispatch::Immediate;
        }

        let batch_id = self.enqueue(action_id, tier, now);
        Dispatch::Queued {
            batch_id,
            flush_at: now + self.config.batch_delay(),
        }
    }

    fn enqueue(&mut self, action_id: String, tier: BatchTier, now: Instant) -> u64 {
        let cap = self.config.batch_size;
        if let Some(batch) = self
            .queue
            .iter_mut()
            .find(|b| b.tier == tier && b.action_ids.len() < cap)
        {
            batch.action_ids.push(action_id);
            return batch.id;
        }

        let id = self.next_batch;
        self.next_batch += 1;
        self.queue.push(BatchRequest {
            id,
            tier,
            action_ids: vec![action_id],
            created_at: now,
        });
        debug!(batch_id = id, tier = ?tier, "Opened batch");
        id
    }

    /// Pop the oldest batch of the highest tier and mark its actions processing.
    ///
    /// Returns the batch and snapshots of the actions to send.
    pub fn take_next_batch(&mut self) -> Option<(BatchRequest, Vec<ResolutionAction>)> {
        let index = self
            .queue
            .iter()
            .enumerate()
            .min_by_key(|(_, b)| (b.tier, b.id))
            .map(|(i, _)| i)?;
        let batch = self.queue.remove(index);

        let actions: Vec<ResolutionAction> = batch
            .action_ids
            .iter()
            .filter_map(|id| self.start(id))
            .collect();

        self.stats.batches_processed += 1;
        info!(batch_id = batch.id, tier = ?batch.tier, size = actions.len(), "Flushing batch");
        self.events.push(EngineEvent::BatchFlushed {
            batch_id: batch.id,
            tier: batch.tier,
            size: actions.len(),
        });

        Some((batch, actions))
    }

    /// Mark an unbatched action processing and return its snapshot
    pub fn begin_immediate(&mut self, action_id: &str) -> Option<ResolutionAction> {
        self.start(action_id)
    }

    fn start(&mut self, action_id: &str) -> Option<ResolutionAction> {
        let action = self.actions.get_mut(action_id)?;
        if action.status != ActionStatus::Pending {
            return None;
        }
        action.status = ActionStatus::Processing;
        Some(action.clone())
    }

    /// Whether any action is marked processing.
    ///
    /// Outside of a running send this means the send was interrupted.
    pub fn has_processing(&self) -> bool {
        self.actions.values().any(|a| a.status == ActionStatus::Processing)
    }

    /// Put actions whose send was interrupted before reconciliation back in
    /// line, oldest first. They stay optimistically resolved.
    pub fn requeue_interrupted(&mut self, now: Instant) -> Vec<(String, Dispatch)> {
        let mut stranded: Vec<(String, BatchTier)> = self
            .actions
            .values_mut()
            .filter(|a| a.status == ActionStatus::Processing)
            .map(|a| {
                a.status = ActionStatus::Pending;
                (a.id.clone(), a.tier)
            })
            .collect();
        stranded.sort_by_key(|(id, _)| action_seq(id));

        stranded
            .into_iter()
            .map(|(action_id, tier)| {
                warn!(action_id = %action_id, "Send interrupted, requeueing");
                let dispatch = self.route(action_id.clone(), tier, now);
                (action_id, dispatch)
            })
            .collect()
    }

    /// Reconcile a backend response for `action_id`
    pub fn complete(&mut self, action_id: &str, result: Result<(), ApiError>, now: Instant) -> Outcome {
        let Some(mut action) = self.actions.remove(action_id) else {
            return Outcome::Ignored;
        };

        match result {
            Ok(()) => {
                action.status = ActionStatus::Completed;
                let latency = action.elapsed(now);
                self.stats.completed += 1;
                self.stats.total_latency += latency;

                info!(
                    action_id = %action.id,
                    suggestion_id = %action.suggestion_id,
                    latency_ms = latency.as_millis() as u64,
                    "Resolution confirmed"
                );
                self.events.push(EngineEvent::ActionCompleted {
                    action_id: action.id.clone(),
                    suggestion_id: action.suggestion_id.clone(),
                    kind: action.kind,
                    latency,
                });

                Outcome::Completed {
                    suggestion_id: action.suggestion_id,
                    latency,
                }
            }
            Err(error) => {
                action.status = ActionStatus::Failed;
                self.resolved.remove(&action.suggestion_id);

                warn!(
                    action_id = %action.id,
                    suggestion_id = %action.suggestion_id,
                    retry_count = action.retry_count,
                    error = %error,
                    "Resolution failed, reverting"
                );
                self.events.push(EngineEvent::ActionReverted {
                    action_id: action.id.clone(),
                    suggestion_id: action.suggestion_id.clone(),
                    error: error.clone(),
                });

                let suggestion_id = action.suggestion_id.clone();
                let id = action.id.clone();

                if self.config.auto_retry && action.retry_count < self.config.max_retries {
                    let delay = self.config.retry_delay(action.retry_count);
                    self.events.push(EngineEvent::RetryScheduled {
                        action_id: id.clone(),
                        suggestion_id: suggestion_id.clone(),
                        attempt: action.retry_count + 1,
                        delay,
                    });
                    self.failed.insert(id.clone(), action);

                    Outcome::RetryScheduled {
                        action_id: id,
                        suggestion_id,
                        due: now + delay,
                    }
                } else {
                    self.stats.failed += 1;
                    self.events.push(EngineEvent::ActionFailed {
                        action_id: id.clone(),
                        suggestion_id: suggestion_id.clone(),
                        error: error.clone(),
                        retryable: error.is_retryable(),
                    });
                    self.failed.insert(id, action);

                    Outcome::Failed {
                        suggestion_id,
                        error,
                    }
                }
            }
        }
    }

    /// Re-submit a failed action after its backoff.
    ///
    /// Hides the suggestion again and returns how to dispatch it, or `None`
    /// if the action was replaced, dismissed, or the suggestion got resolved
    /// some other way meanwhile.
    pub fn retry(&mut self, action_id: &str, now: Instant) -> Option<(String, Dispatch)> {
        let mut action = self.failed.remove(action_id)?;
        if self.resolved.contains(&action.suggestion_id) {
            return None;
        }

        action.retry_count += 1;
        action.status = ActionStatus::Pending;
        action.submitted_at = Some(now);
        self.stats.retries += 1;
        self.resolved.insert(action.suggestion_id.clone());

        debug!(
            action_id = %action.id,
            attempt = action.retry_count,
            "Retrying resolution"
        );

        let suggestion_id = action.suggestion_id.clone();
        let dispatch = self.admit(action, now);
        Some((suggestion_id, dispatch))
    }

    /// Drop a failed action without retrying it. The suggestion stays visible.
    pub fn dismiss_failure(&mut self, action_id: &str) -> Option<ResolutionAction> {
        self.failed.remove(action_id)
    }

    pub fn is_resolved(&self, suggestion_id: &str) -> bool {
        self.resolved.contains(suggestion_id)
    }

    pub fn resolved(&self) -> &HashSet<String> {
        &self.resolved
    }

    /// Pending and processing actions, oldest first
    pub fn pending_actions(&self) -> Vec<&ResolutionAction> {
        let mut actions: Vec<_> = self.actions.values().collect();
        actions.sort_by_key(|a| (a.timestamp, action_seq(&a.id)));
        actions
    }

    /// Failed actions awaiting retry or surfaced as terminal, oldest first
    pub fn failed_actions(&self) -> Vec<&ResolutionAction> {
        let mut actions: Vec<_> = self.failed.values().collect();
        actions.sort_by_key(|a| (a.timestamp, action_seq(&a.id)));
        actions
    }

    pub fn queued_batches(&self) -> &[BatchRequest] {
        &self.queue
    }

    pub fn has_queued(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn stats(&self) -> ResolutionStats {
        self.stats
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }
}

fn action_seq(id: &str) -> u64 {
    id.rsplit('-').next().and_then(|n| n.parse().ok()).unwrap_or(0)
}
