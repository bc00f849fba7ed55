//! Error types for the lookup bot
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for lookup bot operations
///
/// Runtime failures inside the ledger and the lookup client are reported as
/// values (`bool` from `save`, `LookupOutcome` from `lookup`). This enum covers
/// setup, parsing, and authorization failures that callers propagate with `?`.
#[derive(Error, Debug)]
pub enum LookupBotError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Subscription ledger errors (unreadable or unwritable store)
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Lookup API errors surfaced outside the retry loop
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Authentication errors (e.g., 401 Unauthorized from the lookup API)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// An admin-only operation was attempted by a non-admin caller
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Input could not be parsed as a phone number
    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    /// Unknown plan name
    #[error("Invalid plan: {0}. Must be one of: free, single, lifetime")]
    InvalidPlan(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for lookup bot operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
