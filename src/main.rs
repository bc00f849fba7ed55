//! Lookup bot
//!
#![doc = "Main entry point for the lookup bot binary."]

use anyhow::Result;
use clap::Parser;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lookup_bot::cli::{Cli, Commands};
use lookup_bot::commands;
use lookup_bot::commands::console::ConsoleUser;
use lookup_bot::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!("Starting web frontend");
            commands::serve::run_serve(config, bind).await
        }
        Commands::Console {
            user_id,
            username,
            name,
        } => {
            tracing::info!("Starting console for user {}", user_id);
            let user = ConsoleUser {
                user_id,
                username,
                display_name: name,
            };
            commands::console::run_console(config, user).await
        }
        Commands::Lookup { number } => commands::lookup::run_lookup(config, &number).await,
        Commands::AddSubscription {
            user_id,
            plan,
            amount,
            username,
            name,
        } => commands::subscriptions::add_subscription(
            &config,
            user_id,
            &plan,
            amount,
            username.as_deref(),
            name.as_deref(),
        ),
        Commands::Users { json } => commands::subscriptions::list_users(&config, json),
        Commands::Verify { user_id } => commands::subscriptions::verify(&config, user_id),
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose {
        "lookup_bot=debug"
    } else {
        "lookup_bot=info"
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
