//! # Draftlens Engine
//!
//! Suggestion lifecycle engine for an editor with AI-generated inline
//! suggestions.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: Suggestion records + document text   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ cache: validated views, memoized segments   │
//! │  - LRU beyond maxEntries, TTL expiry        │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ highlight: priority-ranked, overlap-free    │
//! │ partition of the document                   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ active: selection + navigation state machine│
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ resolution: optimistic accept/reject/edit,  │
//! │ tiered batches, backoff retry               │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! [`ReviewSession`] ties these together around a [`SuggestionApi`]
//! implementation and a [`Scheduler`] of deferred tasks.
//!
//! ## Core Principles
//!
//! 1. **Resolution decides visibility**: a resolved suggestion is never
//!    available and never highlighted
//! 2. **Round-trip segmentation**: segment texts always concatenate back to
//!    the content
//! 3. **Bad data is dropped, not raised**: out-of-range offsets never fail a render
//! 4. **No ambient state**: every timer belongs to a session and dies with it
//!
//! ## Usage
//!
//! ```rust,ignore
//! use draftlens_engine::{EngineConfig, ReviewSession, ScriptedApi, SuggestionStore};
//!
//! let store = SuggestionStore::from_json(content, &suggestions_json)?;
//! let mut session = ReviewSession::new(store, ScriptedApi::new(), EngineConfig::default())?;
//!
//! let segments = session.segments();
//! session.accept_suggestion("s-1");
//! session.run_until_idle().await;
//!
//! for event in session.take_events() {
//!     println!("{:?}", event);
//! }
//! ```

mod active;
mod api;
mod cache;
mod config;
mod errors;
mod events;
mod highlight;
mod model;
mod resolution;
mod scheduler;
mod session;
mod viewport;

pub use active::{ActiveSuggestionManager, Advance, Direction};
pub use api::{dispatch, ApiCall, ScriptedApi, SuggestionApi};
pub use cache::{CacheStats, CachedView, SegmentKey, SuggestionCache, ViewKey};
pub use config::{
    CacheConfig, EngineConfig, HighlightConfig, NavigationConfig, ResolutionConfig,
    DEFAULT_CONFIG_NAME,
};
pub use errors::{ApiError, ApiErrorKind, EngineError, EngineResult};
pub use events::EngineEvent;
pub use highlight::{priority_score, HighlightEngine, RenderOutput, Scored};
pub use model::{
    apply_replacement, HighlightSegment, NavigationContext, Priority, SegmentKind, Suggestion,
    SuggestionStore, SuggestionType,
};
pub use resolution::{
    ActionKind, ActionStatus, BatchRequest, BatchTier, Dispatch, Outcome, ResolutionAction,
    ResolutionManager, ResolutionStats, Submission,
};
pub use scheduler::{ScheduledTask, Scheduler, TaskKind};
pub use session::ReviewSession;
pub use viewport::ViewportTracker;
