use anyhow::Result;
use clap::Args;
use colored::Colorize;
use draftlens_engine::{EngineConfig, DEFAULT_CONFIG_NAME};
use std::fs;
use std::path::Path;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Dispatch every action immediately instead of batching
    #[arg(long)]
    pub no_batching: bool,

    /// Delay before auto-advancing after a resolution (ms)
    #[arg(long, default_value = "0")]
    pub advance_delay_ms: u64,

    /// Force overwrite existing config
    #[arg(short, long)]
    pub force: bool,
}

pub fn init(args: InitArgs, cwd: &Path) -> Result<()> {
    let config_path = cwd.join(DEFAULT_CONFIG_NAME);

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    let mut config = EngineConfig::default();
    config.resolution.enable_batch_processing = !args.no_batching;
    config.navigation.auto_advance_delay_ms = args.advance_delay_ms;
    config.validate()?;

    let config_json = serde_json::to_string_pretty(&config)?;
    fs::write(&config_path, config_json)?;

    println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);
    println!();
    println!("Next steps:");
    println!("  1. Run: draftlens segment post.txt suggestions.json");
    println!("  2. Run: draftlens review post.txt suggestions.json --script \"accept:ID;next\"");

    Ok(())
}
