//! Command-line interface definition for Colloquy
//!
//! This module defines the CLI structure using clap's derive API,
//! providing the interactive chat command and history management.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Colloquy - terminal chat with durable history
///
/// Chat with an OpenAI-compatible completion service. Every conversation
/// is titled automatically and kept in a local history store.
#[derive(Parser, Debug, Clone)]
#[command(name = "colloquy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "COLLOQUY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Directory holding the history store
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Colloquy
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Override the model from config
        #[arg(short, long)]
        model: Option<String>,

        /// Continue a stored conversation by title
        #[arg(short, long)]
        resume: Option<String>,
    },

    /// Inspect and manage stored conversations
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },
}

/// History management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List stored conversations, newest first
    List,

    /// Print one conversation
    Show {
        /// Conversation title
        title: String,
    },

    /// Rename a conversation
    Rename {
        /// Current title
        old: String,

        /// New title
        new: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation title
        title: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether the command talks to the completion service
    pub fn needs_api_key(&self) -> bool {
        matches!(self.command, Commands::Chat { .. })
    }
}
