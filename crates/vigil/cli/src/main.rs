//! Vigil CLI - offline investigation replays and policy inspection
//!
//! This CLI lets operators:
//! - Replay a scripted incident against in-memory collaborators
//! - Inspect the compiled autonomy matrix and guardrail policies
//! - Validate and print the effective engine configuration

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vigil_engine::EngineConfig;
use vigil_observability::{init_tracing, TracingConfig};

mod commands;
mod output;
mod scenario;

use commands::{policy, run};

/// Vigil CLI application
#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Vigil - investigation reasoning engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    output: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted investigation
    Run(run::RunArgs),

    /// Show the compiled safety policy
    Policy(policy::PolicyArgs),

    /// Validate and print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let mut tracing_config = TracingConfig::new("vigil").with_log_level(if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    });
    if config.logging.json {
        tracing_config = tracing_config.with_json_format();
    }
    init_tracing(&tracing_config)?;

    match cli.command {
        Commands::Run(args) => run::execute(args, config, cli.output).await,
        Commands::Policy(args) => policy::execute(args, &config, cli.output),
        Commands::Config => {
            config.validate()?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
