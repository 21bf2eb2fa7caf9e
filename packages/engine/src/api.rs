//! Backend contract for persisting resolutions, plus an in-memory
//! implementation for tests and offline replay.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::errors::{ApiError, ApiErrorKind};
use crate::resolution::{ActionKind, ResolutionAction};

/// Accept/reject persistence API
///
/// Both calls must be safe to repeat: a failed action is retried with the
/// same arguments.
#[allow(async_fn_in_trait)]
pub trait SuggestionApi {
    async fn accept_suggestion(&self, suggestion_id: &str, edited_text: Option<&str>) -> Result<(), ApiError>;

    async fn reject_suggestion(&self, suggestion_id: &str) -> Result<(), ApiError>;
}

/// Route one action to the matching backend call
pub async fn dispatch<A: SuggestionApi>(api: &A, action: &ResolutionAction) -> Result<(), ApiError> {
    match action.kind {
        ActionKind::Accept | ActionKind::Edit => {
            api.accept_suggestion(&action.suggestion_id, action.edited_text.as_deref())
                .await
        }
        ActionKind::Reject => api.reject_suggestion(&action.suggestion_id).await,
    }
}

/// One call received by [`ScriptedApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiCall {
    pub suggestion_id: String,
    pub accepted: bool,
    pub edited_text: Option<String>,
}

#[derive(Debug, Default)]
struct ScriptState {
    /// Remaining forced failures per suggestion id
    failures: HashMap<String, (u32, ApiErrorKind)>,
    calls: Vec<ApiCall>,
}

/// In-memory backend whose failures are scripted per suggestion
#[derive(Debug, Default)]
pub struct ScriptedApi {
    latency: Duration,
    state: Mutex<ScriptState>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` (on the tokio clock)
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next `times` calls for `suggestion_id` with `kind`
    pub fn fail_times(&self, suggestion_id: impl Into<String>, times: u32, kind: ApiErrorKind) {
        let mut state = self.lock();
        state.failures.insert(suggestion_id.into(), (times, kind));
    }

    /// Every call received so far, in arrival order
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, suggestion_id: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.suggestion_id == suggestion_id)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        // A panicking test thread must not hide the recorded calls
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn respond(&self, call: ApiCall) -> Result<(), ApiError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.lock();
        let suggestion_id = call.suggestion_id.clone();
        state.calls.push(call);

        match state.failures.get_mut(&suggestion_id) {
            Some((remaining, kind)) if *remaining > 0 => {
                *remaining -= 1;
                debug!(suggestion_id = %suggestion_id, remaining = *remaining, "Scripted failure");
                Err(ApiError::new(*kind, format!("scripted failure for {}", suggestion_id)))
            }
            _ => Ok(()),
        }
    }
}

impl SuggestionApi for ScriptedApi {
    async fn accept_suggestion(&self, suggestion_id: &str, edited_text: Option<&str>) -> Result<(), ApiError> {
        self.respond(ApiCall {
            suggestion_id: suggestion_id.to_string(),
            accepted: true,
            edited_text: edited_text.map(str::to_string),
        })
        .await
    }

    async fn reject_suggestion(&self, suggestion_id: &str) -> Result<(), ApiError> {
        self.respond(ApiCall {
            suggestion_id: suggestion_id.to_string(),
            accepted: false,
            edited_text: None,
        })
        .await
    }
}
