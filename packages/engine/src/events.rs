//! Notifications emitted by the engine
//!
//! The session collects these instead of invoking callbacks; the UI layer
//! drains them with `ReviewSession::take_events`.

use std::time::Duration;

use crate::errors::ApiError;
use crate::resolution::{ActionKind, BatchTier};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The active suggestion changed (by navigation, click, or auto-advance)
    ActiveChanged {
        previous: Option<String>,
        current: Option<String>,
    },

    /// The available set just became empty. Fires once per transition.
    AllSuggestionsResolved,

    /// A batch left the queue for dispatch
    BatchFlushed {
        batch_id: u64,
        tier: BatchTier,
        size: usize,
    },

    /// The backend confirmed an action
    ActionCompleted {
        action_id: String,
        suggestion_id: String,
        kind: ActionKind,
        latency: Duration,
    },

    /// An action failed and its optimistic update was rolled back
    ActionReverted {
        action_id: String,
        suggestion_id: String,
        error: ApiError,
    },

    /// A reverted action will be dispatched again after `delay`
    RetryScheduled {
        action_id: String,
        suggestion_id: String,
        attempt: u32,
        delay: Duration,
    },

    /// Retries are exhausted (or disabled); the suggestion stays visible
    ActionFailed {
        action_id: String,
        suggestion_id: String,
        error: ApiError,
        retryable: bool,
    },
}
