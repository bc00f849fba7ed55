//! Subscription administration commands
//!
//! Grant plans, list stored subscriptions, and check the store on disk
//! agrees with what the ledger loads.

use crate::config::Config;
use crate::error::{LookupBotError, Result};
use crate::ledger::{Plan, SubscriptionLedger, UserSubscription};
use chrono::Local;
use colored::Colorize;
use prettytable::{row, Table};

/// Grant or change a user's plan
///
/// # Arguments
///
/// * `config` - Configuration with the ledger path and plan table
/// * `user_id` - Target user
/// * `plan` - Plan name (free, single, lifetime)
/// * `amount` - Amount paid
/// * `username` - Optional handle to record
/// * `display_name` - Optional display name to record
///
/// # Errors
///
/// Returns `LookupBotError::InvalidPlan` for an unknown plan, or
/// `LookupBotError::Ledger` if the record did not reach the disk
///
/// # Examples
///
/// ```no_run
/// use lookup_bot::config::Config;
/// use lookup_bot::commands::subscriptions::add_subscription;
///
/// # fn example() -> anyhow::Result<()> {
/// add_subscription(&Config::default(), 123456789, "lifetime", 8000, None, None)?;
/// # Ok(())
/// # }
/// ```
pub fn add_subscription(
    config: &Config,
    user_id: i64,
    plan: &str,
    amount: u64,
    username: Option<&str>,
    display_name: Option<&str>,
) -> Result<()> {
    let plan: Plan = plan.parse()?;

    let ledger = SubscriptionLedger::open(config);
    let record = ledger.upsert_plan(user_id, plan, amount, username, display_name);

    if !ledger.verify_persistence(user_id) {
        return Err(LookupBotError::Ledger(format!(
            "Subscription for user {} was not persisted to {}",
            user_id,
            ledger.path().display()
        ))
        .into());
    }

    println!(
        "{} {}",
        "Subscription added:".green().bold(),
        format!("user {} -> {} plan", user_id, record.plan)
    );
    println!("  Amount:  ₹{}", record.payment_amount);
    println!("  Expires: {}", format_expiry(&record));

    output_users_table(&ledger.users());
    Ok(())
}

/// List stored subscriptions
///
/// Reads the store without writing to it.
///
/// # Errors
///
/// Returns error if JSON serialization fails
pub fn list_users(config: &Config, json: bool) -> Result<()> {
    let ledger = SubscriptionLedger::from_config(config);
    ledger.load();
    let users = ledger.users();

    if json {
        let json = serde_json::to_string_pretty(&users).map_err(LookupBotError::Serialization)?;
        println!("{}", json);
        return Ok(());
    }

    if users.is_empty() {
        println!("No subscriptions stored in {}", ledger.path().display());
        return Ok(());
    }

    output_users_table(&users);

    let counts = ledger.plan_counts();
    println!(
        "Total: {} (free {}, single {}, lifetime {}, expired {}, admins {})",
        counts.total, counts.free, counts.single, counts.lifetime, counts.expired, counts.admins
    );
    Ok(())
}

/// Check stored records against a fresh read of the store
///
/// # Errors
///
/// Returns `LookupBotError::Ledger` if any record fails verification
pub fn verify(config: &Config, user_id: Option<i64>) -> Result<()> {
    let ledger = SubscriptionLedger::from_config(config);
    ledger.load();

    let ids: Vec<i64> = match user_id {
        Some(id) => vec![id],
        None => ledger.users().iter().map(|record| record.user_id).collect(),
    };
    if ids.is_empty() {
        println!("No subscriptions stored in {}", ledger.path().display());
        return Ok(());
    }

    let failed: Vec<i64> = ids
        .iter()
        .copied()
        .filter(|id| !ledger.verify_persistence(*id))
        .collect();

    if failed.is_empty() {
        println!("{} {} record(s) verified", "OK".green().bold(), ids.len());
        return Ok(());
    }

    for id in &failed {
        println!("{} user {}", "FAILED".red().bold(), id);
    }
    Err(LookupBotError::Ledger(format!(
        "{} of {} record(s) failed verification",
        failed.len(),
        ids.len()
    ))
    .into())
}

fn format_expiry(record: &UserSubscription) -> String {
    record
        .expires_at
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// Output subscriptions in table format
fn output_users_table(users: &[UserSubscription]) {
    let mut table = Table::new();
    table.add_row(row![
        "User ID",
        "Username",
        "Name",
        "Plan",
        "Used Today",
        "Total",
        "Expires",
        "Admin"
    ]);

    for record in users {
        table.add_row(row![
            record.user_id,
            record.username.as_deref().unwrap_or("-"),
            record.display_name.as_deref().unwrap_or("-"),
            record.plan,
            record.searches_used_today,
            record.total_searches,
            format_expiry(record),
            if record.is_admin { "yes" } else { "" }
        ]);
    }

    println!();
    table.printstd();
    println!();
}
