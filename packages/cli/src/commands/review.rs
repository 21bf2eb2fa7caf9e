use anyhow::{anyhow, Context, Result};
use clap::Args;
use colored::Colorize;
use draftlens_engine::{
    apply_replacement, ActionKind, ApiErrorKind, EngineConfig, EngineEvent, ReviewSession,
    ScriptedApi, Suggestion,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::load_store;

#[derive(Args, Debug)]
pub struct ReviewArgs {
    /// Document text file
    pub content: PathBuf,

    /// Suggestions JSON array
    pub suggestions: PathBuf,

    /// Steps separated by ';' (accept:ID, reject:ID, edit:ID=TEXT, next, prev, wait)
    #[arg(short, long)]
    pub script: String,

    /// Make the simulated backend fail a suggestion N times (ID=N, repeatable)
    #[arg(long = "fail")]
    pub failures: Vec<String>,

    /// Simulated backend latency in milliseconds
    #[arg(long, default_value = "0")]
    pub latency_ms: u64,
}

/// One step of a review script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Accept(String),
    Reject(String),
    Edit { id: String, text: String },
    Next,
    Previous,
    /// Let all pending timers fire
    Wait,
}

impl Step {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (verb, rest) = match raw.split_once(':') {
            Some((verb, rest)) => (verb.trim(), Some(rest.trim())),
            None => (raw, None),
        };

        match (verb, rest) {
            ("next", None) => Ok(Step::Next),
            ("prev" | "previous", None) => Ok(Step::Previous),
            ("wait", None) => Ok(Step::Wait),
            ("accept", Some(id)) if !id.is_empty() => Ok(Step::Accept(id.to_string())),
            ("reject", Some(id)) if !id.is_empty() => Ok(Step::Reject(id.to_string())),
            ("edit", Some(rest)) => match rest.split_once('=') {
                Some((id, text)) if !id.trim().is_empty() => Ok(Step::Edit {
                    id: id.trim().to_string(),
                    text: text.to_string(),
                }),
                _ => Err(anyhow!("Invalid edit step: {} (expected edit:ID=TEXT)", raw)),
            },
            _ => Err(anyhow!("Invalid step: {}", raw)),
        }
    }
}

pub fn parse_script(script: &str) -> Result<Vec<Step>> {
    script
        .split(';')
        .filter(|s| !s.trim().is_empty())
        .map(Step::parse)
        .collect()
}

fn parse_failure(raw: &str) -> Result<(String, u32)> {
    let (id, times) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid --fail value: {} (expected ID=N)", raw))?;
    let times = times
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Invalid failure count in {}", raw))?;
    Ok((id.trim().to_string(), times))
}

pub fn review(args: ReviewArgs, config: &EngineConfig) -> Result<()> {
    let steps = parse_script(&args.script)?;
    let store = load_store(&args.content, &args.suggestions)?;

    let api = ScriptedApi::new().with_latency(Duration::from_millis(args.latency_ms));
    for raw in &args.failures {
        let (id, times) = parse_failure(raw)?;
        api.fail_times(id, times, ApiErrorKind::Network);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    let preview = runtime.block_on(run(store, api, config.clone(), steps))?;
    println!();
    println!("{}", preview);
    Ok(())
}

/// Replacements the backend confirmed, for the final preview
#[derive(Debug, Default)]
struct Confirmed {
    /// Accept/edit submissions by action id
    submitted: HashMap<String, (Suggestion, Option<String>)>,

    /// Latest confirmed replacement per suggestion id
    applied: HashMap<String, (Suggestion, Option<String>)>,
}

impl Confirmed {
    fn track(&mut self, action_id: String, suggestion: Suggestion, edited_text: Option<String>) {
        self.submitted.insert(action_id, (suggestion, edited_text));
    }

    fn observe(&mut self, event: &EngineEvent) {
        if let EngineEvent::ActionCompleted {
            action_id,
            suggestion_id,
            kind,
            ..
        } = event
        {
            match (kind, self.submitted.get(action_id)) {
                (ActionKind::Accept | ActionKind::Edit, Some(entry)) => {
                    self.applied.insert(suggestion_id.clone(), entry.clone());
                }
                _ => {
                    self.applied.remove(suggestion_id);
                }
            }
        }
    }

    /// Apply confirmed replacements back to front so earlier offsets stay valid
    fn apply(&self, original: &str) -> String {
        let mut replacements: Vec<_> = self.applied.values().collect();
        replacements.sort_by(|a, b| b.0.start_offset.cmp(&a.0.start_offset));
        replacements
            .into_iter()
            .fold(original.to_string(), |text, (suggestion, edited)| {
                apply_replacement(&text, suggestion, edited.as_deref())
            })
    }
}

async fn run(
    store: draftlens_engine::SuggestionStore,
    api: ScriptedApi,
    config: EngineConfig,
    steps: Vec<Step>,
) -> Result<String> {
    let original = store.content().to_string();
    let mut session = ReviewSession::new(store, api, config)?;

    println!("{}", "📝 Reviewing suggestions...".bright_blue().bold());
    println!("   Available: {}", session.available_suggestions().len());
    let mut confirmed = Confirmed::default();
    print_events(&mut session, &mut confirmed);

    for step in steps {
        debug!(step = ?step, "Running review step");
        println!("{} {:?}", "›".dimmed(), step);

        let target = match &step {
            Step::Accept(id) | Step::Reject(id) | Step::Edit { id, .. } => {
                session.available_suggestions().iter().find(|s| &s.id == id).cloned()
            }
            _ => None,
        };

        // Action id and edit text of an accept or edit submission
        let mut submitted: Option<(String, Option<String>)> = None;
        let applied = match &step {
            Step::Accept(id) => {
                submitted = session.accept_suggestion(id).map(|action| (action, None));
                submitted.is_some()
            }
            Step::Reject(id) => session.reject_suggestion(id).is_some(),
            Step::Edit { id, text } => {
                submitted = session
                    .edit_suggestion(id, text.as_str())
                    .map(|action| (action, Some(text.clone())));
                submitted.is_some()
            }
            Step::Next => session.navigate_next(),
            Step::Previous => session.navigate_previous(),
            Step::Wait => {
                session.run_until_idle().await;
                true
            }
        };

        if !applied {
            println!("  {} no effect", "⚠️".yellow());
        }
        if let (Some((action_id, edited)), Some(suggestion)) = (submitted, target) {
            confirmed.track(action_id, suggestion, edited);
        }

        session.run_due().await;
        print_events(&mut session, &mut confirmed);
    }

    session.run_until_idle().await;
    print_events(&mut session, &mut confirmed);

    let preview = confirmed.apply(&original);

    let stats = session.stats();
    println!();
    println!("{}", "✅ Review complete!".green().bold());
    println!("   Actions: {}", stats.total_actions);
    println!("   Completed: {}", stats.completed);
    if stats.failed > 0 {
        println!("   {} {}", "Failed:".red(), stats.failed);
    }
    println!("   Retries: {}", stats.retries);
    println!("   Batches: {}", stats.batches_processed);
    println!("   Success rate: {:.0}%", stats.success_rate() * 100.0);
    println!("   Average latency: {}ms", stats.average_latency().as_millis());
    println!("   Remaining: {}", session.available_suggestions().len());

    Ok(preview)
}

fn print_events(session: &mut ReviewSession<ScriptedApi>, confirmed: &mut Confirmed) {
    for event in session.take_events() {
        confirmed.observe(&event);
        match event {
            EngineEvent::ActiveChanged { current, .. } => {
                println!("  {} active: {}", "→".blue(), current.as_deref().unwrap_or("none"));
            }
            EngineEvent::AllSuggestionsResolved => {
                println!("  {} all suggestions resolved", "✓".green());
            }
            EngineEvent::BatchFlushed { batch_id, tier, size } => {
                println!("  {} batch {} ({:?}, {} actions)", "⇡".blue(), batch_id, tier, size);
            }
            EngineEvent::ActionCompleted {
                suggestion_id,
                kind,
                latency,
                ..
            } => {
                let verb = match kind {
                    ActionKind::Accept => "accepted",
                    ActionKind::Reject => "rejected",
                    ActionKind::Edit => "edited",
                };
                println!(
                    "  {} {} {} in {}ms",
                    "✓".green(),
                    suggestion_id,
                    verb,
                    latency.as_millis()
                );
            }
            EngineEvent::ActionReverted { suggestion_id, error, .. } => {
                println!("  {} {} reverted: {}", "↺".yellow(), suggestion_id, error);
            }
            EngineEvent::RetryScheduled {
                suggestion_id,
                attempt,
                delay,
                ..
            } => {
                println!(
                    "  {} retry #{} for {} in {}ms",
                    "⏱".dimmed(),
                    attempt,
                    suggestion_id,
                    delay.as_millis()
                );
            }
            EngineEvent::ActionFailed { suggestion_id, error, .. } => {
                println!("  {} {} failed: {}", "✗".red(), suggestion_id, error);
            }
        }
    }
}
