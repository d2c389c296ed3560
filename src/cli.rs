//! Command-line interface definition for Suikou
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to proofread text, inspect or reset the current
//! session, serve the HTTP surface, and check the provider.

use clap::{Parser, Subcommand};

/// Suikou - AI proofreading with a shared, streaming session
///
/// Ask an AI for three rewrites of a piece of text, watch the answer
/// stream in, and keep asking follow-up questions about it.
#[derive(Parser, Debug, Clone)]
#[command(name = "suikou")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the provider from config (ollama, remote, command)
    #[arg(short, long, global = true)]
    pub provider: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Suikou
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Proofread text and chat about the result
    Proofread {
        /// Text to proofread
        #[arg(required_unless_present = "stdin", conflicts_with = "stdin")]
        text: Option<String>,

        /// Read the text from standard input
        #[arg(long)]
        stdin: bool,

        /// Exit once the rewrite is complete instead of asking follow-ups
        #[arg(long)]
        no_chat: bool,
    },

    /// Show the current session
    Show {
        /// Print the raw session record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear the current session
    Reset,

    /// Run the HTTP server
    Serve {
        /// Override the bind address from config
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Check that the configured provider is reachable
    Check,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
