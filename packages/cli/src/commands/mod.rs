pub mod init;
pub mod review;
pub mod segment;

pub use init::{init, InitArgs};
pub use review::{review, ReviewArgs};
pub use segment::{segment, SegmentArgs};

use anyhow::{Context, Result};
use draftlens_engine::SuggestionStore;
use std::fs;
use std::path::Path;

/// Read a document and its suggestion JSON into a store
pub(crate) fn load_store(content: &Path, suggestions: &Path) -> Result<SuggestionStore> {
    let text = fs::read_to_string(content)
        .with_context(|| format!("Failed to read {}", content.display()))?;
    let json = fs::read_to_string(suggestions)
        .with_context(|| format!("Failed to read {}", suggestions.display()))?;

    SuggestionStore::from_json(text, &json)
        .with_context(|| format!("Invalid suggestions in {}", suggestions.display()))
}
