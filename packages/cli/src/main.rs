mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{init, review, segment, InitArgs, ReviewArgs, SegmentArgs};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Draftlens CLI - review AI writing suggestions from the terminal
#[derive(Parser, Debug)]
#[command(name = "draftlens")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine config file (defaults to ./draftlens.config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log engine internals at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config file
    Init(InitArgs),

    /// Print the highlight segmentation of a document
    Segment(SegmentArgs),

    /// Replay a review script against a simulated backend
    Review(ReviewArgs),
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli) {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;

    match cli.command {
        Command::Init(args) => init(args, &cwd),
        Command::Segment(args) => segment(args, &config::load(cli.config.as_deref(), &cwd)?),
        Command::Review(args) => review(args, &config::load(cli.config.as_deref(), &cwd)?),
    }
}
