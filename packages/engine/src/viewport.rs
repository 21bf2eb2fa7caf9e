//! Debounced record of which suggestions are on screen.
//!
//! The UI reports visibility as often as it scrolls; the last report wins and
//! only takes effect once `visibility_debounce` passes without another one.

use std::collections::HashSet;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct ViewportTracker {
    debounce: Duration,
    visible: HashSet<String>,
    pending: Option<HashSet<String>>,
}

impl ViewportTracker {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            ..Default::default()
        }
    }

    /// Stage a new visible set; returns when it should be committed
    pub fn report_visible<I, S>(&mut self, ids: I, now: Instant) -> Instant
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending = Some(ids.into_iter().map(Into::into).collect());
        now + self.debounce
    }

    /// Apply the staged set. Returns whether the visible set changed.
    pub fn commit(&mut self) -> bool {
        match self.pending.take() {
            Some(next) if next != self.visible => {
                self.visible = next;
                true
            }
            _ => false,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn visible(&self) -> &HashSet<String> {
        &self.visible
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.visible.contains(id)
    }

    pub fn clear(&mut self) {
        self.visible.clear();
        self.pending = None;
    }
}
