//! User-facing surfaces
//!
//! - `commands`: chat command parsing
//! - `bot`: transport-agnostic message handling
//! - `web`: axum router for health checks, the webhook, and admin grants

pub mod bot;
pub mod commands;
pub mod web;

pub use bot::{BotFrontend, InboundMessage};
pub use commands::{parse_chat_command, ChatCommand, CommandError};
pub use web::{create_router, WebState};
