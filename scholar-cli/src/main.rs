//! Scholar CLI: research a topic from the terminal.
//!
//! Runs the research and synthesis stages, prints the Markdown report and
//! writes Markdown and JSON exports.

mod commands;
mod run;

use clap::Parser;
use scholar_core::research::{Style, Tone};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Scholar: web research with cited, synthesized reports
#[derive(Parser, Debug)]
#[command(name = "scholar", version, about, long_about = None)]
struct Cli {
    /// Topic to research
    topic: Option<String>,

    /// Writing style: technical or layperson
    #[arg(long, default_value_t = Style::Layperson)]
    style: Style,

    /// Tone: neutral or advisory
    #[arg(long, default_value_t = Tone::Neutral)]
    tone: Tone,

    /// Maximum number of curated sources (default and upper bound: research.max_search_results)
    #[arg(long)]
    max_sources: Option<usize>,

    /// LLM model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Directory for the Markdown and JSON exports
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Print the report without writing export files
    #[arg(long)]
    no_export: bool,

    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress progress output and non-error logs
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default workspace config file
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    // Human-readable layer for stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging
    let log_dir = directories::ProjectDirs::from("dev", "scholar", "scholar")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "scholar.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Some(command) = cli.command {
        return commands::handle_command(command, &workspace).await;
    }

    let Some(topic) = cli.topic else {
        anyhow::bail!("No topic given. Usage: scholar <TOPIC> (see --help)");
    };

    let mut config = scholar_core::config::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Apply CLI overrides
    if let Some(model) = cli.model {
        config.llm.model = model;
    }
    if let Some(output_dir) = cli.output_dir {
        config.export.output_dir = output_dir;
    }

    let options = run::RunOptions {
        style: cli.style,
        tone: cli.tone,
        max_sources: cli.max_sources,
        export: !cli.no_export,
        quiet: cli.quiet,
    };
    run::run_research(&topic, options, config).await
}
