//! # Highlight Engine
//!
//! Partitions the document into an ordered, gap-free, overlap-free sequence of
//! plain and highlighted segments from an arbitrary suggestion set.
//!
//! ## Pipeline
//!
//! 1. **Score** every suggestion: `+1000` when active, otherwise its type
//!    weight, plus a position bonus `max(0, 100 * (1 - start / len))`.
//! 2. **Rank** by descending score (ties: earlier start, then id).
//! 3. **Virtualize** above `virtualization_threshold`: keep the active
//!    suggestion, the top `render_batch_size` others and anything the viewport
//!    reports as visible.
//! 4. **Claim** ranges in rank order. A suggestion overlapping an already
//!    claimed range is shadowed and dropped for this pass.
//! 5. **Walk** the winners in text order, emitting text for gaps and one
//!    highlight per winner, then a trailing text segment.
//!
//! Concatenating the emitted segment texts always reproduces the content.

use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, instrument};

use crate::config::HighlightConfig;
use crate::model::{CharMap, HighlightSegment, Suggestion};

const ACTIVE_BONUS: f64 = 1000.0;
const POSITION_BONUS: f64 = 100.0;

/// Render-priority score of one suggestion
pub fn priority_score(suggestion: &Suggestion, active_id: Option<&str>, content_len: usize) -> f64 {
    let base = if active_id == Some(suggestion.id.as_str()) {
        ACTIVE_BONUS
    } else {
        suggestion.kind.weight()
    };

    let position = if content_len == 0 {
        0.0
    } else {
        (POSITION_BONUS * (1.0 - suggestion.start_offset as f64 / content_len as f64)).max(0.0)
    };

    base + position
}

/// A suggestion paired with its score
#[derive(Debug, Clone, Copy)]
pub struct Scored<'a> {
    pub suggestion: &'a Suggestion,
    pub score: f64,
}

/// Outcome of one render pass
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub segments: Vec<HighlightSegment>,

    /// Ids rendered as highlights, in text order
    pub rendered: Vec<String>,

    /// Ids dropped because a higher-priority range overlapped them
    pub shadowed: Vec<String>,

    /// Whether the suggestion count exceeded the virtualization threshold
    pub virtualized: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HighlightEngine {
    config: HighlightConfig,
}

impl HighlightEngine {
    pub fn new(config: HighlightConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HighlightConfig {
        &self.config
    }

    /// Suggestions in descending score order
    pub fn rank<'a>(
        &self,
        suggestions: &'a [Suggestion],
        active_id: Option<&str>,
        content_len: usize,
    ) -> Vec<Scored<'a>> {
        let mut ranked: Vec<Scored<'a>> = suggestions
            .iter()
            .map(|suggestion| Scored {
                suggestion,
                score: priority_score(suggestion, active_id, content_len),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.suggestion.start_offset.cmp(&b.suggestion.start_offset))
                .then_with(|| a.suggestion.id.cmp(&b.suggestion.id))
        });
        ranked
    }

    /// Bounded subset to render, still in rank order
    pub fn select<'a>(
        &self,
        ranked: Vec<Scored<'a>>,
        active_id: Option<&str>,
        visible: &HashSet<String>,
    ) -> Vec<Scored<'a>> {
        if ranked.len() <= self.config.virtualization_threshold {
            return ranked;
        }

        let mut others = 0;
        ranked
            .into_iter()
            .filter(|scored| {
                let id = scored.suggestion.id.as_str();
                if active_id == Some(id) {
                    return true;
                }
                if others < self.config.render_batch_size {
                    others += 1;
                    return true;
                }
                visible.contains(id)
            })
            .collect()
    }

    /// Segments only; see [`HighlightEngine::render`]
    pub fn segment(
        &self,
        content: &str,
        suggestions: &[Suggestion],
        active_id: Option<&str>,
        visible: &HashSet<String>,
    ) -> Vec<HighlightSegment> {
        self.render(content, suggestions, active_id, visible).segments
    }

    #[instrument(skip_all, fields(suggestions = suggestions.len(), content_len = content.len()))]
    pub fn render(
        &self,
        content: &str,
        suggestions: &[Suggestion],
        active_id: Option<&str>,
        visible: &HashSet<String>,
    ) -> RenderOutput {
        let map = CharMap::new(content);
        let content_len = map.len();

        let virtualized = suggestions.len() > self.config.virtualization_threshold;
        let ranked = self.rank(suggestions, active_id, content_len);
        let kept = self.select(ranked, active_id, visible);

        let (mut winners, shadowed) = claim_ranges(&kept, content_len);
        winners.sort_by(|a, b| text_order(a, b));

        let mut segments = Vec::with_capacity(winners.len() * 2 + 1);
        let mut rendered = Vec::with_capacity(winners.len());
        let mut current = 0;

        for suggestion in winners {
            let start = suggestion.start_offset.max(current);
            let end = suggestion.end_offset.min(content_len);
            if start >= end {
                continue;
            }

            if start > current {
                segments.push(HighlightSegment::text(
                    map.slice(content, current, start),
                    current,
                    start,
                ));
            }

            let is_active = active_id == Some(suggestion.id.as_str());
            segments.push(HighlightSegment::highlight(
                map.slice(content, start, end),
                suggestion,
                is_active,
                start,
                end,
            ));
            rendered.push(suggestion.id.clone());
            current = end;
        }

        if current < content_len {
            segments.push(HighlightSegment::text(
                map.slice(content, current, content_len),
                current,
                content_len,
            ));
        }

        debug!(
            rendered = rendered.len(),
            shadowed = shadowed.len(),
            virtualized,
            "Segmentation complete"
        );

        RenderOutput {
            segments,
            rendered,
            shadowed,
            virtualized,
        }
    }
}

fn text_order(a: &Suggestion, b: &Suggestion) -> Ordering {
    a.start_offset
        .cmp(&b.start_offset)
        .then(a.end_offset.cmp(&b.end_offset))
        .then_with(|| a.id.cmp(&b.id))
}

/// Claim ranges in rank order; returns (winners, shadowed ids).
fn claim_ranges<'a>(ranked: &[Scored<'a>], content_len: usize) -> (Vec<&'a Suggestion>, Vec<String>) {
    // Sorted, pairwise disjoint claimed ranges
    let mut claimed: Vec<(usize, usize)> = Vec::with_capacity(ranked.len());
    let mut winners = Vec::with_capacity(ranked.len());
    let mut shadowed = Vec::new();

    for scored in ranked {
        let suggestion = scored.suggestion;
        let start = suggestion.start_offset;
        let end = suggestion.end_offset.min(content_len);
        if start >= end {
            shadowed.push(suggestion.id.clone());
            continue;
        }

        let idx = claimed.partition_point(|&(s, _)| s < end);
        let overlaps = idx > 0 && claimed[idx - 1].1 > start;
        if overlaps {
            shadowed.push(suggestion.id.clone());
            continue;
        }

        claimed.insert(idx, (start, end));
        winners.push(suggestion);
    }

    (winners, shadowed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SegmentKind, SuggestionType};

    fn suggestion(id: &str, kind: SuggestionType, start: usize, end: usize, content: &str) -> Suggestion {
        let text: String = content.chars().skip(start).take(end - start).collect();
        Suggestion::new(id, kind, start, end, text, "x")
    }

    fn concat(segments: &[HighlightSegment]) -> String {
        segments.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_priority_score_components() {
        let s = Suggestion::new("a", SuggestionType::Grammar, 50, 60, "", "");

        assert_eq!(priority_score(&s, None, 100), 90.0 + 50.0);
        assert_eq!(priority_score(&s, Some("a"), 100), 1000.0 + 50.0);
        assert_eq!(priority_score(&s, Some("b"), 0), 90.0);
    }

    #[test]
    fn test_single_spelling_suggestion() {
        let content = "Teh cat sat.";
        let engine = HighlightEngine::default();
        let suggestions = vec![suggestion("s1", SuggestionType::Spelling, 0, 3, content)];

        let segments = engine.segment(content, &suggestions, None, &HashSet::new());

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].kind, SegmentKind::Highlight);
        assert_eq!(segments[0].text, "Teh");
        assert_eq!((segments[0].start_offset, segments[0].end_offset), (0, 3));
        assert_eq!(segments[0].suggestion_id.as_deref(), Some("s1"));
        assert_eq!(segments[1].kind, SegmentKind::Text);
        assert_eq!(segments[1].text, " cat sat.");
        assert_eq!((segments[1].start_offset, segments[1].end_offset), (3, 12));
    }

    #[test]
    fn test_spelling_beats_overlapping_grammar() {
        // Long enough that the position bonus gap stays below the type gap
        let content = format!("This are a sentence.{}", " filler".repeat(20));
        let content = content.as_str();
        let engine = HighlightEngine::default();
        let suggestions = vec![
            suggestion("grammar", SuggestionType::Grammar, 0, 10, content),
            suggestion("spelling", SuggestionType::Spelling, 5, 8, content),
        ];

        let output = engine.render(content, &suggestions, None, &HashSet::new());

        assert_eq!(output.rendered, vec!["spelling"]);
        assert_eq!(output.shadowed, vec!["grammar"]);
        let highlights: Vec<_> = output.segments.iter().filter(|s| s.is_highlight()).collect();
        assert_eq!(highlights.len(), 1);
        assert_eq!((highlights[0].start_offset, highlights[0].end_offset), (5, 8));
        assert_eq!(concat(&output.segments), content);
    }

    #[test]
    fn test_active_wins_over_type_weight() {
        let content = "This are a sentence.";
        let engine = HighlightEngine::default();
        let suggestions = vec![
            suggestion("grammar", SuggestionType::Grammar, 0, 10, content),
            suggestion("spelling", SuggestionType::Spelling, 5, 8, content),
        ];

        let output = engine.render(content, &suggestions, Some("grammar"), &HashSet::new());

        assert_eq!(output.rendered, vec!["grammar"]);
        assert!(output.segments[0].is_active);
    }

    #[test]
    fn test_identical_ranges_earlier_type_wins() {
        let content = "Teh cat";
        let engine = HighlightEngine::default();
        let suggestions = vec![
            suggestion("brand", SuggestionType::Brand, 0, 3, content),
            suggestion("llm", SuggestionType::Llm, 0, 3, content),
            suggestion("fact", SuggestionType::Fact, 0, 3, content),
        ];

        let first = engine.render(content, &suggestions, None, &HashSet::new());
        let second = engine.render(content, &suggestions, None, &HashSet::new());

        assert_eq!(first.rendered, vec!["fact"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_equal_scores_break_ties_by_id() {
        let content = "Teh cat";
        let engine = HighlightEngine::default();
        let suggestions = vec![
            suggestion("b", SuggestionType::Spelling, 0, 3, content),
            suggestion("a", SuggestionType::Spelling, 0, 3, content),
        ];

        let output = engine.render(content, &suggestions, None, &HashSet::new());
        assert_eq!(output.rendered, vec!["a"]);
    }

    #[test]
    fn test_adjacent_ranges_both_render() {
        let content = "abcdef";
        let engine = HighlightEngine::default();
        let suggestions = vec![
            suggestion("x", SuggestionType::Llm, 0, 3, content),
            suggestion("y", SuggestionType::Llm, 3, 6, content),
        ];

        let segments = engine.segment(content, &suggestions, None, &HashSet::new());
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.is_highlight()));
    }

    #[test]
    fn test_empty_content_and_no_suggestions() {
        let engine = HighlightEngine::default();
        assert!(engine.segment("", &[], None, &HashSet::new()).is_empty());

        let segments = engine.segment("plain", &[], None, &HashSet::new());
        assert_eq!(segments, vec![HighlightSegment::text("plain", 0, 5)]);
    }

    #[test]
    fn test_out_of_range_end_is_clamped() {
        let engine = HighlightEngine::default();
        let suggestions = vec![Suggestion::new("a", SuggestionType::Spelling, 2, 50, "", "")];

        let segments = engine.segment("abcd", &suggestions, None, &HashSet::new());
        assert_eq!(concat(&segments), "abcd");
        assert_eq!(segments.last().unwrap().end_offset, 4);
    }

    #[test]
    fn test_multibyte_offsets() {
        let content = "naïve café";
        let engine = HighlightEngine::default();
        let suggestions = vec![suggestion("a", SuggestionType::Spelling, 6, 10, content)];

        let segments = engine.segment(content, &suggestions, None, &HashSet::new());
        assert_eq!(segments[1].text, "café");
        assert_eq!(concat(&segments), content);
    }

    #[test]
    fn test_virtualization_bounds_rendered_set() {
        let content: String = "word ".repeat(40);
        let engine = HighlightEngine::new(HighlightConfig {
            virtualization_threshold: 10,
            render_batch_size: 3,
            visibility_debounce_ms: 0,
        });
        let suggestions: Vec<Suggestion> = (0..20)
            .map(|i| suggestion(&format!("s{:02}", i), SuggestionType::Llm, i * 5, i * 5 + 4, &content))
            .collect();

        let mut visible = HashSet::new();
        visible.insert("s15".to_string());

        let output = engine.render(&content, &suggestions, Some("s19"), &visible);

        assert!(output.virtualized);
        // Active + top 3 by position bonus + visible
        assert_eq!(output.rendered, vec!["s00", "s01", "s02", "s15", "s19"]);
        assert_eq!(concat(&output.segments), content);
    }

    #[test]
    fn test_no_virtualization_at_threshold() {
        let content = "abcdefghij";
        let engine = HighlightEngine::new(HighlightConfig {
            virtualization_threshold: 2,
            render_batch_size: 1,
            visibility_debounce_ms: 0,
        });
        let suggestions = vec![
            suggestion("a", SuggestionType::Llm, 0, 2, content),
            suggestion("b", SuggestionType::Llm, 4, 6, content),
        ];

        let output = engine.render(content, &suggestions, None, &HashSet::new());
        assert!(!output.virtualized);
        assert_eq!(output.rendered.len(), 2);
    }
}
