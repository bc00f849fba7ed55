//! Command-line interface definition for the lookup bot
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for serving, console chat, one-off lookups, and
//! subscription administration.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lookup bot - phone number lookups with per-user daily quotas
#[derive(Parser, Debug, Clone)]
#[command(name = "lookup-bot")]
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

    /// Override the subscription store path
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP frontend (health, status, webhook, admin endpoints)
    Serve {
        /// Override the listen address from config
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Chat with the bot from the terminal as one user
    Console {
        /// User id to act as
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        user_id: i64,

        /// Chat handle to present
        #[arg(long)]
        username: Option<String>,

        /// Display name to present
        #[arg(long)]
        name: Option<String>,
    },

    /// Look up one number directly, bypassing quotas
    Lookup {
        /// Phone number in any common format
        number: String,
    },

    /// Grant or change a user's plan
    AddSubscription {
        /// Target user id
        #[arg(allow_negative_numbers = true)]
        user_id: i64,

        /// Plan name (free, single, lifetime)
        plan: String,

        /// Amount paid
        amount: u64,

        /// Chat handle to record
        #[arg(long)]
        username: Option<String>,

        /// Display name to record
        #[arg(long)]
        name: Option<String>,
    },

    /// List stored subscriptions
    Users {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Check that stored records match what the ledger holds
    Verify {
        /// Check only this user
        #[arg(allow_negative_numbers = true)]
        user_id: Option<i64>,
    },
}
