//! Lookup bot - chat-driven phone number lookups behind a subscription ledger
//!
//! This library provides the core of the lookup bot: a file-backed
//! subscription ledger with per-user daily quotas, a resilient client for the
//! external lookup API, and the chat and HTTP frontends that tie them
//! together.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `ledger`: Subscription records, lazy expiry and daily reset, persistence
//! - `lookup`: Lookup API client with retry and backoff, response formatting
//! - `number`: Phone number normalization
//! - `usage`: In-memory search history and counters
//! - `frontend`: Chat command handling and the axum HTTP frontend
//! - `config`: Configuration management and validation
//! - `clock`: Injectable time source
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: CLI command handlers
//!
//! # Example
//!
//! ```no_run
//! use lookup_bot::{Config, SubscriptionLedger};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::from_yaml("ledger:\n  path: subscriptions.json\n")?;
//!     config.validate()?;
//!
//!     let ledger = SubscriptionLedger::open(&config);
//!     let decision = ledger.reserve_search(42);
//!     println!("allowed: {}", decision.allowed);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod frontend;
pub mod ledger;
pub mod lookup;
pub mod number;
pub mod usage;

// Re-export commonly used types
pub use config::Config;
pub use error::{LookupBotError, Result};
pub use frontend::{BotFrontend, InboundMessage};
pub use ledger::{Plan, SubscriptionLedger, UserSubscription};
pub use lookup::{LookupClient, LookupOutcome};
pub use number::normalize_number;
pub use usage::UsageTracker;
