//! Colloquy - terminal chat with durable history
//!
#![doc = "Main entry point for the Colloquy chat client."]

use anyhow::Result;
use colored::Colorize;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use colloquy::cli::{Cli, Commands};
use colloquy::commands;
use colloquy::config::Config;
use colloquy::error::ColloquyError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);

    if let Err(e) = run(cli).await {
        report_fatal(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load configuration
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()
            .ok_or_else(|| ColloquyError::Config("No home directory for config".to_string()))?,
    };
    let config = Config::load(&config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Fail on a missing key before the history lock is taken
    if cli.needs_api_key() {
        config.api_key()?;
    }

    match cli.command {
        Commands::Chat { model, resume } => {
            if let Some(m) = &model {
                tracing::debug!("Using model override: {}", m);
            }
            if let Some(r) = &resume {
                tracing::debug!("Resuming conversation: {}", r);
            }
            commands::chat::run_chat(config, resume).await
        }
        Commands::History { command } => {
            tracing::info!("Starting history command");
            commands::history::handle_history(command, &config)
        }
    }
}

fn report_fatal(e: &anyhow::Error) {
    match e.downcast_ref::<ColloquyError>() {
        Some(ColloquyError::MissingApiKey(var)) => {
            eprintln!("{} no API key configured.", "Error:".red().bold());
            eprintln!("Set the {} environment variable and try again.", var.cyan());
        }
        Some(ColloquyError::LockTimeout { .. }) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            eprintln!("Close the other colloquy session and try again.");
        }
        _ => eprintln!("{} {:#}", "Error:".red().bold(), e),
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so they never interleave with streamed replies.
fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose {
        "colloquy=debug"
    } else {
        "colloquy=warn"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
