//! # Suggestion Data Model
//!
//! Records delivered by the backend, the per-snapshot store that owns them,
//! and the derived values (segments, navigation context) the UI consumes.
//!
//! All offsets are zero-based `char` indices into the document content and
//! ranges are half-open: `[start_offset, end_offset)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::EngineResult;

/// Category of a suggestion
///
/// Values the backend sends that are not in this set deserialize to
/// [`SuggestionType::Unknown`] instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionType {
    Llm,
    Brand,
    Fact,
    Grammar,
    Spelling,
    #[serde(other)]
    Unknown,
}

impl SuggestionType {
    /// Render weight used by the highlight engine when ranking overlaps
    pub fn weight(self) -> f64 {
        match self {
            SuggestionType::Spelling => 100.0,
            SuggestionType::Grammar => 90.0,
            SuggestionType::Fact => 80.0,
            SuggestionType::Brand => 70.0,
            SuggestionType::Llm => 60.0,
            SuggestionType::Unknown => 50.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionType::Llm => "llm",
            SuggestionType::Brand => "brand",
            SuggestionType::Fact => "fact",
            SuggestionType::Grammar => "grammar",
            SuggestionType::Spelling => "spelling",
            SuggestionType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// A single AI-generated suggestion against the document text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: SuggestionType,

    #[serde(default)]
    pub priority: Priority,

    pub start_offset: usize,

    pub end_offset: usize,

    /// Text the suggestion was computed against (`content[start..end]` at creation)
    pub text_to_replace: String,

    pub replace_with: String,

    #[serde(default)]
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_after: Option<String>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Suggestion {
    pub fn new(
        id: impl Into<String>,
        kind: SuggestionType,
        start_offset: usize,
        end_offset: usize,
        text_to_replace: impl Into<String>,
        replace_with: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            priority: Priority::default(),
            start_offset,
            end_offset,
            text_to_replace: text_to_replace.into(),
            replace_with: replace_with.into(),
            reason: String::new(),
            context_before: None,
            context_after: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Length of the range in characters
    pub fn len(&self) -> usize {
        self.end_offset.saturating_sub(self.start_offset)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the range is non-degenerate and lies inside a document of
    /// `content_len` characters
    pub fn is_in_bounds(&self, content_len: usize) -> bool {
        self.start_offset < self.end_offset && self.end_offset <= content_len
    }

    /// Whether `text_to_replace` still matches the document at this range
    pub fn matches(&self, content: &str) -> bool {
        let map = CharMap::new(content);
        self.is_in_bounds(map.len())
            && map.slice(content, self.start_offset, self.end_offset) == self.text_to_replace
    }
}

/// Char-offset to byte-offset table for one content string
#[derive(Debug, Clone)]
pub(crate) struct CharMap {
    /// Byte position of every char boundary, including the end of the string
    boundaries: Vec<usize>,
}

impl CharMap {
    pub(crate) fn new(content: &str) -> Self {
        let mut boundaries: Vec<usize> = content.char_indices().map(|(b, _)| b).collect();
        boundaries.push(content.len());
        Self { boundaries }
    }

    /// Number of chars in the content
    pub(crate) fn len(&self) -> usize {
        self.boundaries.len() - 1
    }

    /// Slice `content` by char offsets; offsets past the end are clamped.
    pub(crate) fn slice<'a>(&self, content: &'a str, start: usize, end: usize) -> &'a str {
        let len = self.len();
        let start = start.min(len);
        let end = end.clamp(start, len);
        &content[self.boundaries[start]..self.boundaries[end]]
    }
}

/// Replace a suggestion's range in `content` with `edited_text` or, when none
/// is given, the suggestion's `replace_with`.
///
/// Returns the content unchanged if the range is out of bounds.
pub fn apply_replacement(content: &str, suggestion: &Suggestion, edited_text: Option<&str>) -> String {
    let map = CharMap::new(content);
    if !suggestion.is_in_bounds(map.len()) {
        return content.to_string();
    }

    let replacement = edited_text.unwrap_or(&suggestion.replace_with);
    let before = map.slice(content, 0, suggestion.start_offset);
    let after = map.slice(content, suggestion.end_offset, map.len());

    let mut out = String::with_capacity(before.len() + replacement.len() + after.len());
    out.push_str(before);
    out.push_str(replacement);
    out.push_str(after);
    out
}

/// Immutable-per-snapshot suggestion list plus the raw document text
///
/// Every mutation produces a new snapshot (new `Arc`s) and bumps `revision`,
/// so views taken from an older snapshot stay valid.
#[derive(Debug, Clone)]
pub struct SuggestionStore {
    content: Arc<str>,
    suggestions: Arc<Vec<Suggestion>>,
    revision: u64,
}

impl SuggestionStore {
    pub fn new(content: impl Into<String>, suggestions: Vec<Suggestion>) -> Self {
        let content: String = content.into();
        Self {
            content: Arc::from(content),
            suggestions: Arc::new(suggestions),
            revision: 0,
        }
    }

    /// Build a store from the backend's JSON array of suggestions
    pub fn from_json(content: impl Into<String>, json: &str) -> EngineResult<Self> {
        let suggestions: Vec<Suggestion> = serde_json::from_str(json)?;
        Ok(Self::new(content, suggestions))
    }

    pub fn content(&self) -> &Arc<str> {
        &self.content
    }

    pub fn suggestions(&self) -> &Arc<Vec<Suggestion>> {
        &self.suggestions
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.suggestions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Suggestion> {
        self.suggestions.iter().find(|s| s.id == id)
    }

    /// Swap in a fresh suggestion list from the backend
    pub fn replace_suggestions(&mut self, suggestions: Vec<Suggestion>) {
        self.suggestions = Arc::new(suggestions);
        self.revision += 1;
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        let content: String = content.into();
        self.content = Arc::from(content);
        self.revision += 1;
    }

    /// Delete a suggestion (after a confirmed resolution)
    ///
    /// Returns the removed suggestion, if it was present.
    pub fn remove(&mut self, id: &str) -> Option<Suggestion> {
        let index = self.suggestions.iter().position(|s| s.id == id)?;
        let mut next = (*self.suggestions).clone();
        let removed = next.remove(index);
        self.suggestions = Arc::new(next);
        self.revision += 1;
        Some(removed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Text,
    Highlight,
}

/// One piece of the rendered partition of the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightSegment {
    pub text: String,

    #[serde(rename = "type")]
    pub kind: SegmentKind,

    /// Suggestion rendered by this segment (highlights only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_type: Option<SuggestionType>,

    #[serde(default)]
    pub is_active: bool,

    pub start_offset: usize,

    pub end_offset: usize,
}

impl HighlightSegment {
    pub fn text(text: impl Into<String>, start_offset: usize, end_offset: usize) -> Self {
        Self {
            text: text.into(),
            kind: SegmentKind::Text,
            suggestion_id: None,
            suggestion_type: None,
            is_active: false,
            start_offset,
            end_offset,
        }
    }

    pub fn highlight(
        text: impl Into<String>,
        suggestion: &Suggestion,
        is_active: bool,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Self {
            text: text.into(),
            kind: SegmentKind::Highlight,
            suggestion_id: Some(suggestion.id.clone()),
            suggestion_type: Some(suggestion.kind),
            is_active,
            start_offset,
            end_offset,
        }
    }

    pub fn is_highlight(&self) -> bool {
        self.kind == SegmentKind::Highlight
    }
}

/// Position of the active suggestion within the available list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationContext {
    /// `None` when nothing is active
    pub current_index: Option<usize>,
    pub total_count: usize,
    pub has_next: bool,
    pub has_previous: bool,
}
