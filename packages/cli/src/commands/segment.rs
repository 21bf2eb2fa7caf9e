use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use draftlens_engine::{CachedView, EngineConfig, HighlightEngine, HighlightSegment, SuggestionType};
use std::collections::HashSet;
use std::path::PathBuf;

use super::load_store;

#[derive(Args, Debug)]
pub struct SegmentArgs {
    /// Document text file
    pub content: PathBuf,

    /// Suggestions JSON array
    pub suggestions: PathBuf,

    /// Render this suggestion as the active one
    #[arg(short, long)]
    pub active: Option<String>,

    /// Suggestion ids to treat as on screen (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub visible: Vec<String>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub fn segment(args: SegmentArgs, config: &EngineConfig) -> Result<()> {
    let store = load_store(&args.content, &args.suggestions)?;
    let view = CachedView::build(store.suggestions(), store.content(), config.cache.drop_drifted);
    let engine = HighlightEngine::new(config.highlight.clone());
    let visible: HashSet<String> = args.visible.into_iter().collect();

    let output = engine.render(store.content(), &view.available, args.active.as_deref(), &visible);

    match args.format.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&output.segments)?;
            println!("{}", json);
        }
        "text" => {
            println!("{}", "🖍  Segmentation".bright_blue().bold());
            println!();
            println!("{}", render_inline(&output.segments));
            println!();

            for segment in output.segments.iter().filter(|s| s.is_highlight()) {
                let marker = if segment.is_active { "▶".green() } else { "•".normal() };
                println!(
                    "  {} [{}..{}) {} {}",
                    marker,
                    segment.start_offset,
                    segment.end_offset,
                    segment.suggestion_id.as_deref().unwrap_or("?").bright_white(),
                    format!("({})", segment.suggestion_type.map(SuggestionType::as_str).unwrap_or("?")).dimmed()
                );
            }

            print_summary(&view, output.shadowed.len(), output.virtualized);
        }
        other => return Err(anyhow!("Unknown format: {}. Use: text or json", other)),
    }

    Ok(())
}

/// Content with highlights colored by suggestion type
fn render_inline(segments: &[HighlightSegment]) -> String {
    segments
        .iter()
        .map(|segment| {
            let painted = match segment.suggestion_type {
                None => return segment.text.clone(),
                Some(SuggestionType::Spelling) => segment.text.red(),
                Some(SuggestionType::Grammar) => segment.text.yellow(),
                Some(SuggestionType::Fact) => segment.text.magenta(),
                Some(SuggestionType::Brand) => segment.text.cyan(),
                Some(SuggestionType::Llm) | Some(SuggestionType::Unknown) => segment.text.blue(),
            };
            let painted = if segment.is_active { painted.bold().underline() } else { painted.underline() };
            painted.to_string()
        })
        .collect()
}

fn print_summary(view: &CachedView, shadowed: usize, virtualized: bool) {
    println!();
    println!("   Available: {}", view.available.len());
    if shadowed > 0 {
        println!("   Shadowed by overlaps: {}", shadowed);
    }
    if virtualized {
        println!("   {} rendering a bounded subset", "Virtualized:".yellow());
    }
    if !view.dropped.is_empty() {
        println!("   {} {}", "Dropped (invalid range):".yellow(), view.dropped.join(", "));
    }
    if !view.drifted.is_empty() {
        println!("   {} {}", "Drifted (text changed):".yellow(), view.drifted.join(", "));
    }
}
