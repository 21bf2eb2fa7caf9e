//! # Suggestion Cache
//!
//! Memoizes the derived views of a (suggestion set, content) pair:
//!
//! - the validated suggestion subset ([`CachedView`])
//! - computed segment maps, keyed additionally by the active, resolved and
//!   visible ids that shaped them
//!
//! Keys hold the exact key material (every suggestion record and the content
//! itself), so two distinct inputs can never share an entry even if their
//! hashes collide.
//! Entries are evicted least-recently-used beyond `max_entries`, and
//! independently once they are older than `ttl`.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::CacheConfig;
use crate::model::{CharMap, HighlightSegment, Suggestion};

/// Fingerprint of a suggestion set against one content snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewKey {
    /// Full records; `CachedView` copies them, so any field change is a new view
    suggestions: Vec<Suggestion>,
    content: Arc<str>,
}

impl ViewKey {
    pub fn new(suggestions: &[Suggestion], content: &Arc<str>) -> Self {
        Self {
            suggestions: suggestions.to_vec(),
            content: Arc::clone(content),
        }
    }
}

/// Fingerprint of one segmentation pass
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    view: ViewKey,
    active: Option<String>,
    hidden: Vec<String>,
    visible: Vec<String>,
}

impl SegmentKey {
    pub fn new(
        view: ViewKey,
        active: Option<&str>,
        hidden: &HashSet<String>,
        visible: &HashSet<String>,
    ) -> Self {
        let mut hidden: Vec<String> = hidden.iter().cloned().collect();
        hidden.sort();
        let mut visible: Vec<String> = visible.iter().cloned().collect();
        visible.sort();

        Self {
            view,
            active: active.map(str::to_string),
            hidden,
            visible,
        }
    }
}

/// Validated subset of a suggestion set
#[derive(Debug, Clone, PartialEq)]
pub struct CachedView {
    /// In-bounds, non-degenerate, unique-id suggestions in text order
    pub available: Arc<Vec<Suggestion>>,

    /// Ids dropped as out of range, degenerate or duplicated
    pub dropped: Vec<String>,

    /// Ids whose `text_to_replace` no longer matches the content
    pub drifted: Vec<String>,

    pub content_len: usize,
}

impl CachedView {
    /// Validate `suggestions` against `content` without touching either
    pub fn build(suggestions: &[Suggestion], content: &str, drop_drifted: bool) -> Self {
        let map = CharMap::new(content);
        let content_len = map.len();

        let mut seen = HashSet::new();
        let mut available = Vec::with_capacity(suggestions.len());
        let mut dropped = Vec::new();
        let mut drifted = Vec::new();

        for suggestion in suggestions {
            if !suggestion.is_in_bounds(content_len) || !seen.insert(suggestion.id.as_str()) {
                dropped.push(suggestion.id.clone());
                continue;
            }

            let current = map.slice(content, suggestion.start_offset, suggestion.end_offset);
            if current != suggestion.text_to_replace {
                drifted.push(suggestion.id.clone());
                if drop_drifted {
                    dropped.push(suggestion.id.clone());
                    continue;
                }
            }

            available.push(suggestion.clone());
        }

        available.sort_by(|a, b| {
            a.start_offset
                .cmp(&b.start_offset)
                .then(a.end_offset.cmp(&b.end_offset))
                .then_with(|| a.id.cmp(&b.id))
        });

        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), content_len, "Dropped invalid suggestion ranges");
        }

        Self {
            available: Arc::new(available),
            dropped,
            drifted,
            content_len,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Suggestions dropped by validation across all misses
    pub dropped_ranges: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_used: u64,
}

/// Bounded map with LRU and TTL eviction
#[derive(Debug)]
struct LruTtl<K, V> {
    entries: HashMap<K, Entry<V>>,
    max_entries: usize,
    ttl: Duration,
    clock: u64,
}

enum Lookup<V> {
    Hit(V),
    Miss,
    Expired,
}

impl<K: Hash + Eq + Clone, V: Clone> LruTtl<K, V> {
    fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn get(&mut self, key: &K, now: Instant) -> Lookup<V> {
        let tick = self.tick();
        let ttl = self.ttl;
        match self.entries.get_mut(key) {
            None => return Lookup::Miss,
            Some(entry) if now.saturating_duration_since(entry.inserted_at) < ttl => {
                entry.last_used = tick;
                return Lookup::Hit(entry.value.clone());
            }
            Some(_) => {}
        }

        self.entries.remove(key);
        Lookup::Expired
    }

    /// Insert and return how many entries were evicted to make room
    fn insert(&mut self, key: K, value: V, now: Instant) -> usize {
        let tick = self.tick();
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_used: tick,
            },
        );

        let mut evicted = 0;
        while self.entries.len() > self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.inserted_at) < ttl);
        before - self.entries.len()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Memo of validated views and segment maps
#[derive(Debug)]
pub struct SuggestionCache {
    config: CacheConfig,
    views: LruTtl<ViewKey, CachedView>,
    segments: LruTtl<SegmentKey, Arc<Vec<HighlightSegment>>>,
    stats: CacheStats,
}

impl SuggestionCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            views: LruTtl::new(config.max_entries, config.ttl()),
            segments: LruTtl::new(config.max_entries, config.ttl()),
            config,
            stats: CacheStats::default(),
        }
    }

    /// Validated view of `suggestions` against `content`
    pub fn get(&mut self, suggestions: &[Suggestion], content: &Arc<str>, now: Instant) -> CachedView {
        let key = ViewKey::new(suggestions, content);

        match self.views.get(&key, now) {
            Lookup::Hit(view) => {
                self.stats.hits += 1;
                return view;
            }
            Lookup::Expired => self.stats.expirations += 1,
            Lookup::Miss => {}
        }

        self.stats.misses += 1;
        let view = CachedView::build(suggestions, content, self.config.drop_drifted);
        self.stats.dropped_ranges += view.dropped.len() as u64;
        self.stats.evictions += self.views.insert(key, view.clone(), now) as u64;
        view
    }

    /// Memoized segment map for `key`, computed with `compute` on a miss
    pub fn segments<F>(&mut self, key: SegmentKey, now: Instant, compute: F) -> Arc<Vec<HighlightSegment>>
    where
        F: FnOnce() -> Vec<HighlightSegment>,
    {
        match self.segments.get(&key, now) {
            Lookup::Hit(segments) => {
                self.stats.hits += 1;
                return segments;
            }
            Lookup::Expired => self.stats.expirations += 1,
            Lookup::Miss => {}
        }

        self.stats.misses += 1;
        let segments = Arc::new(compute());
        self.stats.evictions += self.segments.insert(key, Arc::clone(&segments), now) as u64;
        segments
    }

    /// Evict every expired entry; returns the number removed
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let removed = self.views.purge_expired(now) + self.segments.purge_expired(now);
        self.stats.expirations += removed as u64;
        if removed > 0 {
            debug!(removed, "Purged expired cache entries");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of cached views and segment maps
    pub fn len(&self) -> usize {
        self.views.len() + self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.views.clear();
        self.segments.clear();
    }
}
