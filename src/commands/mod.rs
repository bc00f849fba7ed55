/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `serve`: HTTP frontend (health, status, webhook, admin grants)
- `console`: Interactive terminal chat acting as one user
- `lookup`: One-shot lookup straight against the API
- `subscriptions`: Admin tooling over the subscription store

The handlers are thin; the work happens in the ledger, lookup client, and
frontends.
*/

use crate::config::Config;
use crate::error::Result;
use crate::frontend::BotFrontend;
use crate::ledger::SubscriptionLedger;
use crate::lookup::LookupClient;
use crate::usage::UsageTracker;
use std::sync::Arc;

// Subscription administration (add, list, verify)
pub mod subscriptions;

/// Open the ledger and wire up a chat frontend from configuration
///
/// # Errors
///
/// Returns error if the lookup client cannot be created (for example when no
/// API key is configured)
pub fn build_frontend(config: &Config) -> Result<BotFrontend> {
    let lookup = LookupClient::new(config.api.clone())?;
    let ledger = Arc::new(SubscriptionLedger::open(config));
    tracing::info!(
        "Subscription ledger ready: {} user(s) from {}",
        ledger.len(),
        ledger.path().display()
    );

    Ok(
        BotFrontend::new(ledger, lookup, Arc::new(UsageTracker::new()))
            .with_refund_on_failure(config.search.refund_on_failure),
    )
}

// HTTP server command handler
pub mod serve {
    //! Runs the axum frontend until interrupted.

    use super::*;
    use crate::error::LookupBotError;
    use crate::frontend::web::{self, WebState};
    use std::net::SocketAddr;

    /// Start the HTTP frontend
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `bind` - Optional override for `server.bind`
    ///
    /// # Errors
    ///
    /// Returns error if the frontend cannot be built or the address cannot be
    /// bound
    pub async fn run_serve(config: Config, bind: Option<String>) -> Result<()> {
        let addr: SocketAddr = match bind {
            Some(bind) => bind.parse().map_err(|e| {
                LookupBotError::Config(format!("Invalid bind address '{}': {}", bind, e))
            })?,
            None => config.server.socket_addr()?,
        };

        if config.server.webhook_secret.is_none() {
            tracing::warn!("server.webhook_secret is not set; /webhook will reject all requests");
        }
        if config.server.admin_token.is_none() {
            tracing::warn!(
                "server.admin_token is not set; /admin/subscriptions will reject all requests"
            );
        }

        let bot = build_frontend(&config)?;
        let state = WebState::new(bot)
            .with_webhook_secret(config.server.webhook_secret.clone())
            .with_admin_token(config.server.admin_token.clone());
        web::serve(addr, Arc::new(state)).await
    }
}

// Interactive console handler
pub mod console {
    //! Terminal chat transport.
    //!
    //! Each line typed is delivered to the bot as a message from the
    //! configured user, and the reply is printed.

    use super::*;
    use crate::frontend::InboundMessage;
    use colored::Colorize;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;

    /// Identity the console presents to the bot
    #[derive(Debug, Clone)]
    pub struct ConsoleUser {
        pub user_id: i64,
        pub username: Option<String>,
        pub display_name: Option<String>,
    }

    impl ConsoleUser {
        fn message(&self, text: &str) -> InboundMessage {
            InboundMessage {
                user_id: self.user_id,
                username: self.username.clone(),
                display_name: self.display_name.clone(),
                text: text.to_string(),
            }
        }
    }

    /// Start the interactive console
    ///
    /// # Errors
    ///
    /// Returns error if the frontend cannot be built or the terminal cannot
    /// be read
    pub async fn run_console(config: Config, user: ConsoleUser) -> Result<()> {
        let bot = build_frontend(&config)?;
        let mut rl = DefaultEditor::new()?;

        println!(
            "{}",
            format!("Lookup bot console (user {})", user.user_id)
                .cyan()
                .bold()
        );
        println!("Type /help for commands, 'exit' to quit.\n");

        let prompt = format!("{} ", ">>".green());
        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit")
                    {
                        break;
                    }

                    rl.add_history_entry(trimmed)?;
                    let reply = bot.handle(&user.message(trimmed)).await;
                    println!("\n{}\n", reply);
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => {
                    tracing::error!("Console read error: {}", e);
                    return Err(e.into());
                }
            }
        }

        if !bot.ledger().save() {
            tracing::warn!("Final ledger save failed");
        }
        println!("Goodbye!");
        Ok(())
    }
}

// One-shot lookup handler
pub mod lookup {
    //! Calls the lookup API once, outside any quota.

    use super::*;
    use crate::error::LookupBotError;
    use crate::lookup::LookupOutcome;
    use crate::number::normalize_number;

    /// Look up one number and print the result
    ///
    /// # Errors
    ///
    /// Returns error if the number is invalid, no API key is configured, or
    /// the lookup fails
    pub async fn run_lookup(config: Config, number: &str) -> Result<()> {
        let normalized = normalize_number(number)
            .ok_or_else(|| LookupBotError::InvalidNumber(number.to_string()))?;

        let client = LookupClient::new(config.api.clone())?;
        let outcome = client.lookup(&normalized).await;
        match &outcome {
            LookupOutcome::AuthFailed => {
                return Err(LookupBotError::Authentication(outcome.text().to_string()).into())
            }
            LookupOutcome::Failed(message) => {
                return Err(LookupBotError::Lookup(message.clone()).into())
            }
            _ => {}
        }

        println!("{}", outcome.text());
        Ok(())
    }
}
