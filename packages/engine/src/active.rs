//! # Active Suggestion Manager
//!
//! Tracks which suggestion is under review and moves through the available
//! list in text order.
//!
//! ## States
//!
//! - **idle**: no suggestions available, nothing active
//! - **active**: one suggestion selected (the first by text order on load)
//! - **advancing**: the active suggestion was just resolved and a delayed
//!   auto-advance is pending; nothing is active until it fires
//!
//! Navigation never wraps: `navigate_next` on the last suggestion and
//! `navigate_previous` on the first return `false` and change nothing. Unknown
//! ids passed to `set_active` are ignored the same way.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::NavigationConfig;
use crate::events::EngineEvent;
use crate::model::{NavigationContext, Suggestion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Previous,
}

/// What happened to the selection after a resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The resolved suggestion was not active (or not present)
    Unchanged,

    /// Selection moved right away (to `None` if nothing is left or
    /// auto-advance is off)
    Moved(Option<String>),

    /// Selection will move to the target once `due` passes
    Scheduled { target: String, due: Instant },
}

#[derive(Debug)]
pub struct ActiveSuggestionManager {
    config: NavigationConfig,

    /// Unresolved suggestions in text order
    available: Vec<Suggestion>,

    active_id: Option<String>,

    /// Target of a delayed auto-advance
    pending_advance: Option<String>,

    /// Set once `AllSuggestionsResolved` fired for the current empty state
    empty_notified: bool,

    events: Vec<EngineEvent>,
}

impl ActiveSuggestionManager {
    pub fn new(config: NavigationConfig) -> Self {
        Self {
            config,
            available: Vec::new(),
            active_id: None,
            pending_advance: None,
            empty_notified: true,
            events: Vec::new(),
        }
    }

    /// Replace the available list (already validated and stripped of
    /// resolved ids, in text order).
    ///
    /// Keeps the current selection when it survives, otherwise selects the
    /// first available suggestion.
    pub fn sync(&mut self, available: Vec<Suggestion>) {
        self.available = available;

        if self
            .pending_advance
            .as_deref()
            .is_some_and(|target| !self.contains(target))
        {
            self.pending_advance = None;
        }

        let keep = self.active_id.as_deref().is_some_and(|id| self.contains(id));
        if !keep && self.pending_advance.is_none() {
            let first = self.available.first().map(|s| s.id.clone());
            self.select(first);
        }

        self.check_empty();
    }

    pub fn available(&self) -> &[Suggestion] {
        &self.available
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active_suggestion(&self) -> Option<&Suggestion> {
        let id = self.active_id.as_deref()?;
        self.available.iter().find(|s| s.id == id)
    }

    pub fn pending_advance(&self) -> Option<&str> {
        self.pending_advance.as_deref()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_of(id).is_some()
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.available.iter().position(|s| s.id == id)
    }

    pub fn navigation_context(&self) -> NavigationContext {
        let total_count = self.available.len();
        match self.active_id.as_deref().and_then(|id| self.index_of(id)) {
            Some(index) => NavigationContext {
                current_index: Some(index),
                total_count,
                has_next: index + 1 < total_count,
                has_previous: index > 0,
            },
            None => NavigationContext {
                current_index: None,
                total_count,
                has_next: total_count > 0,
                has_previous: false,
            },
        }
    }

    /// Jump straight to `id`. Returns `false` if it is not available.
    pub fn set_active(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            debug!(suggestion_id = %id, "Ignoring selection of unavailable suggestion");
            return false;
        }
        self.pending_advance = None;
        self.select(Some(id.to_string()));
        true
    }

    pub fn navigate(&mut self, direction: Direction) -> bool {
        match direction {
            Direction::Next => self.navigate_next(),
            Direction::Previous => self.navigate_previous(),
        }
    }

    /// Move to the following suggestion; with nothing active, selects the first.
    pub fn navigate_next(&mut self) -> bool {
        let target = match self.active_id.as_deref().and_then(|id| self.index_of(id)) {
            Some(index) => self.available.get(index + 1),
            None => self.available.first(),
        };

        match target.map(|s| s.id.clone()) {
            Some(id) => {
                self.pending_advance = None;
                self.select(Some(id));
                true
            }
            None => false,
        }
    }

    pub fn navigate_previous(&mut self) -> bool {
        let target = match self.active_id.as_deref().and_then(|id| self.index_of(id)) {
            Some(index) if index > 0 => self.available.get(index - 1),
            _ => None,
        };

        match target.map(|s| s.id.clone()) {
            Some(id) => {
                self.pending_advance = None;
                self.select(Some(id));
                true
            }
            None => false,
        }
    }

    /// Remove `id` from the available set, advancing the selection if it was
    /// active.
    ///
    /// The advance target is the suggestion right after `id` in the
    /// pre-resolution order, or the new first one if `id` was last.
    pub fn resolve(&mut self, id: &str, now: Instant) -> Advance {
        let Some(index) = self.index_of(id) else {
            return Advance::Unchanged;
        };

        let was_active = self.active_id.as_deref() == Some(id);
        self.available.remove(index);

        if self.pending_advance.as_deref() == Some(id) {
            self.pending_advance = self
                .available
                .get(index)
                .or_else(|| self.available.first())
                .map(|s| s.id.clone());
        }

        let advance = if was_active {
            let target = if self.config.auto_advance {
                self.available
                    .get(index)
                    .or_else(|| self.available.first())
                    .map(|s| s.id.clone())
            } else {
                None
            };
            let delay = self.config.auto_advance_delay();

            match target {
                Some(target) if delay > Duration::ZERO => {
                    self.select(None);
                    self.pending_advance = Some(target.clone());
                    Advance::Scheduled {
                        target,
                        due: now + delay,
                    }
                }
                target => {
                    self.select(target.clone());
                    Advance::Moved(target)
                }
            }
        } else {
            Advance::Unchanged
        };

        self.check_empty();
        advance
    }

    /// Fire a delayed auto-advance. Falls back to the first available
    /// suggestion if the target disappeared meanwhile.
    pub fn complete_auto_advance(&mut self) -> bool {
        let Some(target) = self.pending_advance.take() else {
            return false;
        };

        let next = if self.contains(&target) {
            Some(target)
        } else {
            self.available.first().map(|s| s.id.clone())
        };

        let moved = next.is_some();
        self.select(next);
        moved
    }

    /// Put a suggestion back (after a failed resolution), in text order.
    pub fn restore(&mut self, suggestion: Suggestion) {
        if self.contains(&suggestion.id) {
            return;
        }

        let position = self.available.partition_point(|s| {
            (s.start_offset, s.end_offset, s.id.as_str())
                < (suggestion.start_offset, suggestion.end_offset, suggestion.id.as_str())
        });
        let id = suggestion.id.clone();
        self.available.insert(position, suggestion);

        if self.active_id.is_none() && self.pending_advance.is_none() {
            self.select(Some(id));
        }

        self.check_empty();
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    fn select(&mut self, id: Option<String>) {
        if self.active_id == id {
            return;
        }
        debug!(previous = ?self.active_id, current = ?id, "Active suggestion changed");
        let previous = std::mem::replace(&mut self.active_id, id.clone());
        self.events.push(EngineEvent::ActiveChanged {
            previous,
            current: id,
        });
    }

    fn check_empty(&mut self) {
        if !self.available.is_empty() {
            self.empty_notified = false;
        } else if !self.empty_notified {
            self.empty_notified = true;
            debug!("All suggestions resolved");
            self.events.push(EngineEvent::AllSuggestionsResolved);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SuggestionType;

    fn suggestions(ids: &[&str]) -> Vec<Suggestion> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Suggestion::new(*id, SuggestionType::Grammar, i * 10, i * 10 + 3, "abc", "x"))
            .collect()
    }

    fn manager(ids: &[&str]) -> ActiveSuggestionManager {
        let mut manager = ActiveSuggestionManager::new(NavigationConfig::default());
        manager.sync(suggestions(ids));
        manager.take_events();
        manager
    }

    fn all_resolved_count(events: &[EngineEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, EngineEvent::AllSuggestionsResolved))
            .count()
    }

    #[test]
    fn test_first_suggestion_active_on_load() {
        let manager = manager(&["a", "b", "c"]);
        assert_eq!(manager.active_id(), Some("a"));

        let ctx = manager.navigation_context();
        assert_eq!(ctx.current_index, Some(0));
        assert_eq!(ctx.total_count, 3);
        assert!(ctx.has_next);
        assert!(!ctx.has_previous);
    }

    #[test]
    fn test_empty_load_is_idle() {
        let mut manager = ActiveSuggestionManager::new(NavigationConfig::default());
        manager.sync(Vec::new());

        assert_eq!(manager.active_id(), None);
        assert!(manager.take_events().is_empty());
        assert_eq!(manager.navigation_context(), NavigationContext::default());
    }

    #[test]
    fn test_navigation_stops_at_bounds() {
        let mut manager = manager(&["a", "b"]);

        assert!(!manager.navigate_previous());
        assert_eq!(manager.active_id(), Some("a"));

        assert!(manager.navigate_next());
        assert_eq!(manager.active_id(), Some("b"));

        assert!(!manager.navigate_next());
        assert_eq!(manager.active_id(), Some("b"));
        assert!(!manager.navigation_context().has_next);

        assert!(manager.navigate(Direction::Previous));
        assert_eq!(manager.active_id(), Some("a"));
    }

    #[test]
    fn test_set_active_unknown_id_is_noop() {
        let mut manager = manager(&["a", "b"]);

        assert!(!manager.set_active("zzz"));
        assert_eq!(manager.active_id(), Some("a"));
        assert!(manager.take_events().is_empty());

        assert!(manager.set_active("b"));
        assert_eq!(
            manager.take_events(),
            vec![EngineEvent::ActiveChanged {
                previous: Some("a".into()),
                current: Some("b".into()),
            }]
        );
    }

    #[test]
    fn test_resolve_active_advances_to_following() {
        let mut manager = manager(&["a", "b", "c"]);
        manager.set_active("b");

        let advance = manager.resolve("b", Instant::now());

        assert_eq!(advance, Advance::Moved(Some("c".into())));
        assert_eq!(manager.active_id(), Some("c"));
        assert!(!manager.contains("b"));
    }

    #[test]
    fn test_resolve_last_advances_to_new_first() {
        let mut manager = manager(&["a", "b", "c"]);
        manager.set_active("c");

        manager.resolve("c", Instant::now());
        assert_eq!(manager.active_id(), Some("a"));
    }

    #[test]
    fn test_resolve_inactive_keeps_selection() {
        let mut manager = manager(&["a", "b", "c"]);

        assert_eq!(manager.resolve("c", Instant::now()), Advance::Unchanged);
        assert_eq!(manager.active_id(), Some("a"));
        assert_eq!(manager.resolve("missing", Instant::now()), Advance::Unchanged);
    }

    #[test]
    fn test_auto_advance_disabled() {
        let mut manager = ActiveSuggestionManager::new(NavigationConfig {
            auto_advance: false,
            auto_advance_delay_ms: 0,
        });
        manager.sync(suggestions(&["a", "b"]));

        assert_eq!(manager.resolve("a", Instant::now()), Advance::Moved(None));
        assert_eq!(manager.active_id(), None);
    }

    #[test]
    fn test_delayed_auto_advance() {
        let mut manager = ActiveSuggestionManager::new(NavigationConfig {
            auto_advance: true,
            auto_advance_delay_ms: 250,
        });
        manager.sync(suggestions(&["a", "b"]));
        let now = Instant::now();

        let advance = manager.resolve("a", now);
        assert_eq!(
            advance,
            Advance::Scheduled {
                target: "b".into(),
                due: now + Duration::from_millis(250),
            }
        );
        assert_eq!(manager.active_id(), None);
        assert_eq!(manager.pending_advance(), Some("b"));

        assert!(manager.complete_auto_advance());
        assert_eq!(manager.active_id(), Some("b"));
        assert!(!manager.complete_auto_advance());
    }

    #[test]
    fn test_delayed_advance_target_resolved_meanwhile() {
        let mut manager = ActiveSuggestionManager::new(NavigationConfig {
            auto_advance: true,
            auto_advance_delay_ms: 250,
        });
        manager.sync(suggestions(&["a", "b", "c"]));
        let now = Instant::now();

        manager.resolve("a", now);
        manager.resolve("b", now);

        // Pending target moves on to what now follows
        assert_eq!(manager.active_id(), None);
        assert_eq!(manager.pending_advance(), Some("c"));
        assert!(manager.complete_auto_advance());
        assert_eq!(manager.active_id(), Some("c"));
    }

    #[test]
    fn test_all_resolved_fires_once_per_transition() {
        let mut manager = manager(&["a", "b"]);
        let now = Instant::now();

        manager.resolve("a", now);
        manager.resolve("b", now);
        manager.resolve("b", now);
        let events = manager.take_events();
        assert_eq!(all_resolved_count(&events), 1);

        // Failure brings one back, then it is resolved again
        manager.restore(suggestions(&["a"]).remove(0));
        assert_eq!(manager.active_id(), Some("a"));
        manager.resolve("a", now);
        assert_eq!(all_resolved_count(&manager.take_events()), 1);
    }

    #[test]
    fn test_restore_keeps_text_order() {
        let mut manager = manager(&["a", "b", "c"]);
        let removed = manager.available()[1].clone();

        manager.resolve("b", Instant::now());
        manager.restore(removed.clone());
        manager.restore(removed);

        let ids: Vec<_> = manager.available().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(manager.active_id(), Some("a"));
    }

    #[test]
    fn test_sync_keeps_surviving_selection() {
        let mut manager = manager(&["a", "b", "c"]);
        manager.set_active("c");

        manager.sync(suggestions(&["a", "b", "c", "d"]));
        assert_eq!(manager.active_id(), Some("c"));

        manager.sync(suggestions(&["x", "y"]));
        assert_eq!(manager.active_id(), Some("x"));
    }
}
