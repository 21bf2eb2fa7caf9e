//! Review sessions against the scripted backend on a paused tokio clock

use draftlens_engine::{
    ActionKind, ActionStatus, ApiErrorKind, EngineConfig, EngineEvent, Priority, ReviewSession,
    ScriptedApi, Suggestion, SuggestionStore, SuggestionType,
};
use std::time::Duration;
use tokio::time::Instant;

const CONTENT: &str = "Teh cat sat on teh mat and it were happy.";

fn suggestions() -> Vec<Suggestion> {
    vec![
        Suggestion::new("s1", SuggestionType::Spelling, 0, 3, "Teh", "The"),
        Suggestion::new("s2", SuggestionType::Spelling, 15, 18, "teh", "the")
            .with_priority(Priority::Low),
        Suggestion::new("g1", SuggestionType::Grammar, 30, 34, "were", "was")
            .with_priority(Priority::High),
    ]
}

fn config(batching: bool) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.resolution.enable_batch_processing = batching;
    config.resolution.batch_delay_ms = 100;
    config.resolution.max_retries = 2;
    config
}

fn session_with(api: ScriptedApi, config: EngineConfig) -> ReviewSession<ScriptedApi> {
    let store = SuggestionStore::new(CONTENT, suggestions());
    let mut session = ReviewSession::new(store, api, config).unwrap();
    session.take_events();
    session
}

/// Checks that no resolved suggestion is available or highlighted
fn assert_visibility_invariant(session: &mut ReviewSession<ScriptedApi>) {
    let resolved: Vec<String> = ["s1", "s2", "g1"]
        .iter()
        .filter(|id| session.is_resolved(id))
        .map(|id| id.to_string())
        .collect();

    for id in &resolved {
        assert!(!session.available_suggestions().iter().any(|s| &s.id == id));
    }
    let segments = session.segments();
    for segment in segments.iter() {
        if let Some(id) = &segment.suggestion_id {
            assert!(!resolved.contains(id), "{} is resolved but highlighted", id);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_single_suggestion_accept_fires_all_resolved_once() {
    let store = SuggestionStore::new(
        "Teh cat sat.",
        vec![Suggestion::new("s1", SuggestionType::Spelling, 0, 3, "Teh", "The")],
    );
    let mut session = ReviewSession::new(store, ScriptedApi::new(), EngineConfig::default()).unwrap();
    assert_eq!(session.active_id(), Some("s1"));

    session.accept_suggestion("s1").unwrap();
    assert!(session.available_suggestions().is_empty());
    assert!(session.accept_suggestion("s1").is_none());

    session.run_until_idle().await;

    let all_resolved = session
        .take_events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::AllSuggestionsResolved))
        .count();
    assert_eq!(all_resolved, 1);
    assert_eq!(session.stats().completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_batch_debounce_and_tier_order() {
    let mut session = session_with(ScriptedApi::new(), config(true));
    let start = Instant::now();

    session.reject_suggestion("s2");
    session.accept_suggestion("s1");
    tokio::time::advance(Duration::from_millis(60)).await;
    session.accept_suggestion("g1");
    assert_visibility_invariant(&mut session);

    // Debounce restarted by the last submission
    session.run_due().await;
    assert!(session.api().calls().is_empty());

    session.run_until_idle().await;
    assert!(Instant::now() - start >= Duration::from_millis(160));

    let order: Vec<_> = session
        .api()
        .calls()
        .into_iter()
        .map(|c| c.suggestion_id)
        .collect();
    assert_eq!(order, vec!["g1", "s1", "s2"]);

    let tiers: Vec<_> = session
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::BatchFlushed { tier, .. } => Some(tier),
            _ => None,
        })
        .collect();
    assert_eq!(tiers.len(), 3);
    assert!(tiers.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(session.stats().batches_processed, 3);
}

#[tokio::test(start_paused = true)]
async fn test_batch_actions_run_concurrently() {
    let api = ScriptedApi::new().with_latency(Duration::from_millis(500));
    let store = SuggestionStore::new(
        CONTENT,
        vec![
            Suggestion::new("s1", SuggestionType::Spelling, 0, 3, "Teh", "The"),
            Suggestion::new("g1", SuggestionType::Grammar, 30, 34, "were", "was"),
        ],
    );
    let mut session = ReviewSession::new(store, api, config(true)).unwrap();

    // Same tier, same batch
    session.accept_suggestion("s1");
    session.edit_suggestion("g1", "was");
    let flush_start = Instant::now() + Duration::from_millis(100);

    session.run_until_idle().await;

    // Two 500ms calls finished in one latency window
    assert!(Instant::now() - flush_start < Duration::from_millis(1000));
    assert_eq!(session.stats().completed, 2);
    assert_eq!(session.stats().batches_processed, 1);
    assert!(session
        .api()
        .calls()
        .iter()
        .any(|c| c.suggestion_id == "g1" && c.edited_text.as_deref() == Some("was")));
}

#[tokio::test(start_paused = true)]
async fn test_failure_reverts_then_retries_with_backoff() {
    let api = ScriptedApi::new();
    api.fail_times("s1", 2, ApiErrorKind::Network);
    let mut session = session_with(api, config(true));

    session.accept_suggestion("s1").unwrap();
    assert_eq!(session.active_id(), Some("s2"));

    // First attempt fails: suggestion comes back
    tokio::time::advance(Duration::from_millis(100)).await;
    session.run_due().await;
    assert!(!session.is_resolved("s1"));
    assert!(session.available_suggestions().iter().any(|s| s.id == "s1"));
    assert_eq!(session.failed_actions().len(), 1);
    assert_visibility_invariant(&mut session);

    session.run_until_idle().await;

    assert_eq!(session.api().call_count("s1"), 3);
    assert!(session.is_resolved("s1"));
    assert!(session.store().get("s1").is_none());
    assert!(session.failed_actions().is_empty());

    let delays: Vec<_> = session
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::RetryScheduled { delay, .. } => Some(delay),
            _ => None,
        })
        .collect();
    assert_eq!(delays, vec![Duration::from_millis(100), Duration::from_millis(200)]);

    let stats = session.stats();
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.success_rate(), 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_failure_leaves_suggestion_visible() {
    let api = ScriptedApi::new();
    api.fail_times("g1", 10, ApiErrorKind::Client(422));
    let mut session = session_with(api, config(true));

    session.reject_suggestion("g1");
    session.run_until_idle().await;

    assert_eq!(session.api().call_count("g1"), 3);
    assert!(!session.is_resolved("g1"));
    assert!(session.available_suggestions().iter().any(|s| s.id == "g1"));
    assert_eq!(session.failed_actions().len(), 1);

    let failed = session.take_events().into_iter().find_map(|e| match e {
        EngineEvent::ActionFailed { retryable, .. } => Some(retryable),
        _ => None,
    });
    assert_eq!(failed, Some(false));
    assert_eq!(session.stats().failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_resolving_again_replaces_pending_retry() {
    let api = ScriptedApi::new();
    api.fail_times("s1", 1, ApiErrorKind::Server(503));
    let mut config = config(true);
    config.resolution.batch_delay_ms = 100;
    let mut session = session_with(api, config);

    session.accept_suggestion("s1");
    tokio::time::advance(Duration::from_millis(100)).await;
    session.run_due().await;
    assert_eq!(session.failed_actions().len(), 1);

    // User rejects instead while the retry is pending
    session.reject_suggestion("s1").unwrap();
    session.run_until_idle().await;

    let calls = session.api().calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].accepted);
    assert!(!calls[1].accepted);
    assert!(session.is_resolved("s1"));
}

#[tokio::test(start_paused = true)]
async fn test_immediate_mode_dispatches_without_debounce() {
    let mut session = session_with(ScriptedApi::new(), config(false));
    let start = Instant::now();

    session.reject_suggestion("s1");
    session.accept_suggestion("g1");
    session.run_until_idle().await;

    assert_eq!(Instant::now(), start);
    assert_eq!(session.api().calls().len(), 2);
    assert_eq!(session.stats().batches_processed, 0);

    let kinds: Vec<_> = session
        .take_events()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::ActionCompleted { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert!(kinds.contains(&ActionKind::Reject));
    assert!(kinds.contains(&ActionKind::Accept));
}

#[tokio::test(start_paused = true)]
async fn test_delayed_auto_advance() {
    let mut config = config(true);
    config.navigation.auto_advance_delay_ms = 250;
    let mut session = session_with(ScriptedApi::new(), config);

    session.accept_suggestion("s1");
    assert_eq!(session.active_id(), None);

    tokio::time::advance(Duration::from_millis(250)).await;
    session.run_due().await;
    assert_eq!(session.active_id(), Some("s2"));
}

#[tokio::test(start_paused = true)]
async fn test_navigation_bounds() {
    let mut session = session_with(ScriptedApi::new(), config(true));

    assert!(!session.navigate_previous());
    assert!(session.navigate_next());
    assert!(session.navigate_next());
    assert_eq!(session.active_id(), Some("g1"));
    assert!(!session.navigate_next());
    assert_eq!(session.active_id(), Some("g1"));

    let ctx = session.navigation_context();
    assert_eq!(ctx.current_index, Some(2));
    assert!(!ctx.has_next);
    assert!(ctx.has_previous);

    assert!(!session.set_active("nope"));
    assert!(session.set_active("s1"));
}

#[tokio::test(start_paused = true)]
async fn test_visibility_is_debounced() {
    let mut config = config(true);
    config.highlight.virtualization_threshold = 1;
    config.highlight.render_batch_size = 1;
    let mut session = session_with(ScriptedApi::new(), config);

    session.report_visible(["g1"]);
    session.run_due().await;
    assert!(session.visible().is_empty());

    session.run_until_idle().await;
    assert!(session.visible().contains("g1"));

    let rendered = session.render().rendered;
    assert!(rendered.contains(&"g1".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_drop_cancels_pending_work() {
    let api = ScriptedApi::new();
    let mut session = session_with(api, config(true));

    session.accept_suggestion("s1");
    assert!(session.has_pending_work());

    session.dispose();
    assert!(!session.has_pending_work());
    session.run_until_idle().await;
    assert!(session.api().calls().is_empty());
    assert!(session.accept_suggestion("s2").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_due_requeues_the_send() {
    let api = ScriptedApi::new().with_latency(Duration::from_millis(500));
    let mut session = session_with(api, config(true));

    session.accept_suggestion("s1").unwrap();
    tokio::time::advance(Duration::from_millis(100)).await;

    // The owner gives up on the round trip to handle other input
    let timed_out = tokio::time::timeout(Duration::from_millis(100), session.run_due())
        .await
        .is_err();
    assert!(timed_out);
    assert_eq!(session.pending_actions()[0].status, ActionStatus::Processing);
    assert!(session.has_pending_work());
    assert!(session.is_resolved("s1"));

    session.run_until_idle().await;

    assert_eq!(session.api().call_count("s1"), 1);
    assert!(session.pending_actions().is_empty());
    assert!(session.store().get("s1").is_none());
    assert!(!session.has_pending_work());
    assert_eq!(session.stats().completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_replaced_suggestions_are_served_fresh() {
    let mut session = session_with(ScriptedApi::new(), config(true));
    session.accept_suggestion("s1").unwrap();

    // Same ids and offsets, different records
    let mut next = suggestions();
    next[0].replace_with = "Tha".to_string();
    next[1].kind = SuggestionType::Grammar;
    next[1].replace_with = "A".to_string();
    session.replace_suggestions(next);

    assert!(!session.available_suggestions().iter().any(|s| s.id == "s1"));
    let s2 = session
        .available_suggestions()
        .iter()
        .find(|s| s.id == "s2")
        .cloned()
        .unwrap();
    assert_eq!(s2.kind, SuggestionType::Grammar);
    assert_eq!(s2.replace_with, "A");
    assert_visibility_invariant(&mut session);

    session.run_until_idle().await;

    assert_eq!(session.api().call_count("s1"), 1);
    assert!(session.store().get("s1").is_none());
    assert_eq!(session.stats().completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_is_dropped_when_suggestion_leaves_store() {
    let api = ScriptedApi::new();
    api.fail_times("s1", 1, ApiErrorKind::Network);
    let mut session = session_with(api, config(true));

    session.accept_suggestion("s1").unwrap();
    tokio::time::advance(Duration::from_millis(100)).await;
    session.run_due().await;
    assert!(session.available_suggestions().iter().any(|s| s.id == "s1"));
    assert_eq!(session.failed_actions().len(), 1);

    session.replace_suggestions(suggestions().into_iter().filter(|s| s.id != "s1").collect());
    assert!(!session.available_suggestions().iter().any(|s| s.id == "s1"));

    session.run_until_idle().await;

    assert_eq!(session.api().call_count("s1"), 1);
    assert!(session.failed_actions().is_empty());
    assert!(!session.is_resolved("s1"));
    assert!(!session.has_pending_work());
    assert_eq!(session.stats().completed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_revert_outside_current_view_is_not_restored() {
    let api = ScriptedApi::new();
    api.fail_times("s1", 1, ApiErrorKind::Client(409));
    let mut config = config(true);
    config.resolution.auto_retry = false;
    let mut session = session_with(api, config);

    let action_id = session.accept_suggestion("s1").unwrap();
    // Every range is out of bounds for the new text
    session.set_content("Hi");
    assert!(session.available_suggestions().is_empty());

    session.run_until_idle().await;

    assert!(!session.is_resolved("s1"));
    assert!(session.available_suggestions().is_empty());
    assert!(session.segments().iter().all(|s| !s.is_highlight()));
    assert_eq!(session.failed_actions()[0].id, action_id);

    assert!(session.dismiss_failure(&action_id));
    assert!(session.failed_actions().is_empty());
    assert!(!session.dismiss_failure(&action_id));
}
