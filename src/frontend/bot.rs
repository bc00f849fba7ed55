//! Transport-agnostic chat handler
//!
//! [`BotFrontend::handle`] takes one inbound message and produces the reply
//! text. The webhook endpoint and the interactive console both drive it.

use super::commands::{parse_chat_command, ChatCommand};
use crate::ledger::{Plan, SubscriptionLedger, UserSubscription};
use crate::lookup::{LookupClient, LookupOutcome};
use crate::number::{mask_number, normalize_number};
use crate::usage::UsageTracker;
use chrono::{Duration, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;

/// Users listed by `/users`
const USERS_LISTED: usize = 20;

/// Entries shown under "Recent activity" in `/mystats`
const RECENT_SHOWN: usize = 3;

/// An inbound chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub user_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "first_name")]
    pub display_name: Option<String>,
    pub text: String,
}

impl InboundMessage {
    pub fn new(user_id: i64, text: impl Into<String>) -> Self {
        Self {
            user_id,
            username: None,
            display_name: None,
            text: text.into(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

/// Chat frontend over the ledger, lookup client, and usage tracker
#[derive(Debug, Clone)]
pub struct BotFrontend {
    ledger: Arc<SubscriptionLedger>,
    lookup: LookupClient,
    usage: Arc<UsageTracker>,
    refund_on_failure: bool,
}

impl BotFrontend {
    pub fn new(
        ledger: Arc<SubscriptionLedger>,
        lookup: LookupClient,
        usage: Arc<UsageTracker>,
    ) -> Self {
        Self {
            ledger,
            lookup,
            usage,
            refund_on_failure: false,
        }
    }

    /// Give the credit back when a lookup fails
    pub fn with_refund_on_failure(mut self, enabled: bool) -> Self {
        self.refund_on_failure = enabled;
        self
    }

    pub fn ledger(&self) -> &Arc<SubscriptionLedger> {
        &self.ledger
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    /// Produce the reply for one inbound message
    pub async fn handle(&self, message: &InboundMessage) -> String {
        let command = match parse_chat_command(&message.text) {
            Ok(command) => command,
            Err(e) => return e.to_string(),
        };

        let username = message.username.as_deref();
        if command.requires_admin() && !self.ledger.is_admin(message.user_id, username) {
            tracing::warn!(
                "User {} attempted an admin command: {:?}",
                message.user_id,
                command
            );
            return "Access denied! This command is for the admin only.".to_string();
        }

        match command {
            ChatCommand::Start => self.welcome(message),
            ChatCommand::Help => help_text(),
            ChatCommand::Check(raw) => self.check(message, &raw).await,
            ChatCommand::MyStats => self.my_stats(message),
            ChatCommand::History => self.history(message.user_id),
            ChatCommand::ClearHistory => {
                if self.usage.clear_history(message.user_id) {
                    "History cleared! Your search history has been deleted.".to_string()
                } else {
                    "You don't have any search history to clear.".to_string()
                }
            }
            ChatCommand::Pricing => self.pricing(),
            ChatCommand::Status => self.status(),
            ChatCommand::Admin => self.admin_overview(),
            ChatCommand::Grant {
                user_id,
                plan,
                amount,
            } => self.grant(user_id, plan, amount),
            ChatCommand::Users => self.users_summary(),
            ChatCommand::Verify(target) => self.verify(target.unwrap_or(message.user_id)),
            ChatCommand::ResetStats => {
                self.usage.reset();
                "Usage statistics have been reset.".to_string()
            }
            ChatCommand::Text(_) => "Send a mobile number (10-15 digits) or use /check <number>.\n\
                 Send /help to see all commands."
                .to_string(),
        }
    }

    fn touch(&self, message: &InboundMessage) -> UserSubscription {
        self.ledger.get_or_create(
            message.user_id,
            message.username.as_deref(),
            message.display_name.as_deref(),
        )
    }

    async fn check(&self, message: &InboundMessage, raw: &str) -> String {
        let Some(number) = normalize_number(raw) else {
            return "Invalid mobile number! Send 10-15 digits, optionally starting with +."
                .to_string();
        };

        let user_id = message.user_id;
        self.touch(message);

        let decision = self.ledger.reserve_search(user_id);
        if !decision.allowed {
            tracing::info!("User {} is over quota", user_id);
            return decision.reason;
        }

        tracing::info!("User {} searching {}", user_id, mask_number(&number));
        let outcome = self.lookup.lookup(&number).await;

        if !outcome.is_success() && self.refund_on_failure {
            self.ledger.refund_credit(user_id);
        }
        self.usage
            .record_search(user_id, &number, outcome.has_result());

        let record = self.ledger.get_or_create(user_id, None, None);
        let body = match &outcome {
            LookupOutcome::AuthFailed | LookupOutcome::Failed(_) => {
                format!("Lookup failed: {}", outcome.text())
            }
            _ => outcome.text().to_string(),
        };
        format!("{}\n\n{}", body, self.footer(&record))
    }

    fn quota_line(&self, record: &UserSubscription) -> String {
        if record.is_admin {
            return "unlimited (admin)".to_string();
        }
        format!(
            "{}/{}",
            self.ledger.remaining(record),
            self.ledger.plans().quota(record.plan)
        )
    }

    fn footer(&self, record: &UserSubscription) -> String {
        let mut footer = format!("Searches remaining today: {}", self.quota_line(record));
        if matches!(record.plan, Plan::Free | Plan::Expired) && !record.is_admin {
            let plans = self.ledger.plans();
            let _ = write!(
                footer,
                "\n\nUpgrade: Single Search ₹{} | Lifetime ₹{} (send /pricing)",
                plans.single.price, plans.lifetime.price
            );
        }
        footer
    }

    fn welcome(&self, message: &InboundMessage) -> String {
        let record = self.touch(message);
        let name = record
            .display_name
            .as_deref()
            .or(record.username.as_deref())
            .unwrap_or("there");

        let mut text = format!(
            "Welcome, {}!\n\n\
             Send a mobile number (10-15 digits) to look it up.\n\n\
             Your plan: {}\n",
            name,
            record.plan.label()
        );
        let _ = writeln!(text, "Searches remaining today: {}", self.quota_line(&record));
        text.push_str("\nSend /help to see all commands.");
        text
    }

    fn my_stats(&self, message: &InboundMessage) -> String {
        let record = self.touch(message);
        let quota = if record.is_admin {
            "unlimited".to_string()
        } else {
            self.ledger.plans().quota(record.plan).to_string()
        };
        let expires = record
            .expires_at
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "never".to_string());

        let mut text = String::from("Your Personal Stats\n\n");
        let _ = writeln!(text, "Your ID: {}", record.user_id);
        let _ = writeln!(text, "Plan: {}", record.plan.label());
        let _ = writeln!(text, "Searches today: {}/{}", record.searches_used_today, quota);
        let _ = writeln!(text, "Total searches: {}", record.total_searches);
        let _ = writeln!(
            text,
            "Member since: {}",
            record.created_at.with_timezone(&Local).format("%Y-%m-%d")
        );
        let _ = writeln!(text, "Expires: {}", expires);
        text.push_str("\nRecent activity:");

        let recent = self.usage.recent(record.user_id, RECENT_SHOWN);
        if recent.is_empty() {
            text.push_str("\nNo searches yet!");
        }
        for (i, entry) in recent.iter().enumerate() {
            let _ = write!(
                text,
                "\n{}. [{}] {} - {}",
                i + 1,
                if entry.result_found { "found" } else { "no data" },
                entry.number,
                entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            );
        }
        text
    }

    fn history(&self, user_id: i64) -> String {
        let entries = self.usage.recent(user_id, usize::MAX);
        if entries.is_empty() {
            return "No search history yet.".to_string();
        }

        let mut text = format!("Your last {} search(es):\n", entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let _ = write!(
                text,
                "\n{}. [{}] {} - {}",
                i + 1,
                if entry.result_found { "found" } else { "no data" },
                entry.number,
                entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            );
        }
        text
    }

    fn pricing(&self) -> String {
        let plans = self.ledger.plans();
        format!(
            "Subscription Plans\n\n\
             Free: {} searches per day\n\
             Single Search: ₹{} for {} search, valid {} day(s)\n\
             Lifetime: ₹{} for up to {} searches per day\n\n\
             Contact the admin to upgrade.",
            plans.free.searches_per_day,
            plans.single.price,
            plans.single.searches_per_day,
            plans.single.duration_days,
            plans.lifetime.price,
            plans.lifetime.searches_per_day
        )
    }

    fn status(&self) -> String {
        format!(
            "Bot Status\n\n\
             Status: online\n\
             Uptime: {}\n\
             Total searches: {}\n\
             Active users: {}\n\
             Started: {}",
            format_uptime(self.usage.uptime()),
            self.usage.total_searches(),
            self.usage.active_users(),
            self.usage
                .started_at()
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
        )
    }

    fn admin_overview(&self) -> String {
        let counts = self.ledger.plan_counts();
        format!(
            "Admin Panel\n\n\
             Users: {} (free {}, single {}, lifetime {}, expired {})\n\
             Admins: {}\n\
             Searches since start: {}\n\
             Active users: {}\n\n\
             Commands: /grant <user_id> <plan> [amount], /users, /verify [user_id], /resetstats",
            counts.total,
            counts.free,
            counts.single,
            counts.lifetime,
            counts.expired,
            counts.admins,
            self.usage.total_searches(),
            self.usage.active_users()
        )
    }

    fn grant(&self, user_id: i64, plan: Plan, amount: Option<u64>) -> String {
        let amount = amount.unwrap_or_else(|| self.ledger.plans().price(plan));
        let record = self.ledger.upsert_plan(user_id, plan, amount, None, None);
        let expires = record
            .expires_at
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());

        let mut text = format!(
            "Subscription updated for user {}\n\nPlan: {}\nAmount: ₹{}\nExpires: {}",
            user_id,
            record.plan.label(),
            record.payment_amount,
            expires
        );
        if !self.ledger.verify_persistence(user_id) {
            text.push_str("\n\nWarning: the saved subscription could not be verified on disk.");
        }
        text
    }

    fn users_summary(&self) -> String {
        let users = self.ledger.users();
        if users.is_empty() {
            return "No users yet.".to_string();
        }

        let mut text = format!("Users ({} total)\n", users.len());
        for record in users.iter().take(USERS_LISTED) {
            let handle = record
                .username
                .as_deref()
                .map(|u| format!("@{}", u))
                .unwrap_or_else(|| "-".to_string());
            let _ = write!(
                text,
                "\n{} {} {} today {} total {}{}",
                record.user_id,
                handle,
                record.plan,
                record.searches_used_today,
                record.total_searches,
                if record.is_admin { " (admin)" } else { "" }
            );
        }
        if users.len() > USERS_LISTED {
            let _ = write!(text, "\n\n... and {} more", users.len() - USERS_LISTED);
        }
        text
    }

    fn verify(&self, user_id: i64) -> String {
        if self.ledger.verify_persistence(user_id) {
            format!("Subscription for user {} is saved correctly.", user_id)
        } else {
            format!(
                "Verification failed for user {}: no matching record on disk.",
                user_id
            )
        }
    }
}

fn help_text() -> String {
    "Commands\n\n\
     /check <number> - look up a mobile number (or just send the number)\n\
     /mystats - your plan and usage\n\
     /history - your recent searches\n\
     /clearhistory - delete your search history\n\
     /pricing - subscription plans\n\
     /status - bot status\n\
     /help - this message"
        .to_string()
}

/// Render an uptime as `1d 2h 3m 4s`, omitting a zero day count
pub fn format_uptime(uptime: Duration) -> String {
    let total = uptime.num_seconds().max(0);
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else {
        format!("{}h {}m {}s", hours, minutes, seconds)
    }
}
