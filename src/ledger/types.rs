//! Subscription ledger data types

use super::store::{date, opt_timestamp, timestamp};
use crate::error::LookupBotError;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// No searches without upgrading
    #[default]
    Free,
    /// One search, valid for one day
    Single,
    /// Effectively unlimited searches, effectively never expires
    Lifetime,
    /// Plan ran out; behaves like `Free`
    Expired,
}

impl Plan {
    /// Human-readable plan name
    pub fn label(&self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Single => "Single Search",
            Self::Lifetime => "Lifetime",
            Self::Expired => "Expired",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Single => write!(f, "single"),
            Self::Lifetime => write!(f, "lifetime"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for Plan {
    type Err = LookupBotError;

    /// Parses an assignable plan name (case-insensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "single" => Ok(Self::Single),
            "lifetime" => Ok(Self::Lifetime),
            _ => Err(LookupBotError::InvalidPlan(s.to_string())),
        }
    }
}

/// Subscription status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Expired,
}

/// One user's subscription record
///
/// Field names on disk match the historical `subscriptions.json` layout, so
/// files written by older tooling load unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSubscription {
    /// Chat user id, the primary key
    pub user_id: i64,

    /// Chat handle, last seen wins
    #[serde(default)]
    pub username: Option<String>,

    /// Display name, last seen wins
    #[serde(rename = "first_name", default)]
    pub display_name: Option<String>,

    pub plan: Plan,

    /// Informational amount paid for the current plan
    #[serde(default)]
    pub payment_amount: u64,

    #[serde(rename = "created_date", with = "timestamp")]
    pub created_at: DateTime<Utc>,

    /// `None` means no expiry
    #[serde(rename = "expires", default, with = "opt_timestamp")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(rename = "searches_used", default)]
    pub searches_used_today: u32,

    #[serde(rename = "last_reset", with = "date")]
    pub last_reset_date: NaiveDate,

    /// Lifetime search counter, never decreases
    #[serde(default)]
    pub total_searches: u64,

    #[serde(default)]
    pub is_admin: bool,

    #[serde(default)]
    pub status: SubscriptionStatus,
}

/// Quota, price and duration for one plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSpec {
    /// Searches allowed per local calendar day
    pub searches_per_day: u32,

    /// Price shown to users
    pub price: u64,

    /// Validity in days; 0 means no expiry
    pub duration_days: u32,
}

impl PlanSpec {
    /// Duration of the plan, `None` when it never expires
    pub fn duration(&self) -> Option<Duration> {
        (self.duration_days > 0).then(|| Duration::days(i64::from(self.duration_days)))
    }
}

/// Quota table for every plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTable {
    #[serde(default = "default_free_plan")]
    pub free: PlanSpec,

    #[serde(default = "default_single_plan")]
    pub single: PlanSpec,

    /// "Unlimited" is a large sentinel so remaining counts stay displayable
    #[serde(default = "default_lifetime_plan")]
    pub lifetime: PlanSpec,
}

fn default_free_plan() -> PlanSpec {
    PlanSpec {
        searches_per_day: 0,
        price: 0,
        duration_days: 0,
    }
}

fn default_single_plan() -> PlanSpec {
    PlanSpec {
        searches_per_day: 1,
        price: 100,
        duration_days: 1,
    }
}

fn default_lifetime_plan() -> PlanSpec {
    PlanSpec {
        searches_per_day: 999,
        price: 8000,
        duration_days: 36500,
    }
}

impl Default for PlanTable {
    fn default() -> Self {
        Self {
            free: default_free_plan(),
            single: default_single_plan(),
            lifetime: default_lifetime_plan(),
        }
    }
}

impl PlanTable {
    /// Spec for a plan; `Expired` uses the free spec
    pub fn spec(&self, plan: Plan) -> &PlanSpec {
        match plan {
            Plan::Free | Plan::Expired => &self.free,
            Plan::Single => &self.single,
            Plan::Lifetime => &self.lifetime,
        }
    }

    /// Daily search quota for a plan
    pub fn quota(&self, plan: Plan) -> u32 {
        self.spec(plan).searches_per_day
    }

    /// Price of a plan
    pub fn price(&self, plan: Plan) -> u64 {
        self.spec(plan).price
    }

    /// Validity of a newly granted plan
    pub fn duration(&self, plan: Plan) -> Option<Duration> {
        match plan {
            Plan::Free | Plan::Expired => None,
            _ => self.spec(plan).duration(),
        }
    }

    /// Searches left today for a record
    pub fn remaining(&self, record: &UserSubscription) -> u32 {
        self.quota(record.plan)
            .saturating_sub(record.searches_used_today)
    }
}

/// Configured admin identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminIdentity {
    /// Admin chat user id
    #[serde(default)]
    pub user_id: Option<i64>,

    /// Admin chat handle, matched case-insensitively
    #[serde(default)]
    pub username: Option<String>,
}

impl AdminIdentity {
    /// Whether the id or handle matches the configured admin
    pub fn matches(&self, user_id: i64, username: Option<&str>) -> bool {
        if self.user_id == Some(user_id) {
            return true;
        }
        match (self.username.as_deref(), username) {
            (Some(admin), Some(given)) => {
                let given = given.trim_start_matches('@');
                !given.is_empty() && admin.trim_start_matches('@').eq_ignore_ascii_case(given)
            }
            _ => false,
        }
    }
}

/// Result of asking whether a user may search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDecision {
    pub allowed: bool,
    /// Empty when allowed
    pub reason: String,
}

impl SearchDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Per-plan user counts for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCounts {
    pub total: usize,
    pub free: usize,
    pub single: usize,
    pub lifetime: usize,
    pub expired: usize,
    pub admins: usize,
}
