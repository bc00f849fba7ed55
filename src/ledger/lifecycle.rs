//! Pure record transitions
//!
//! Every ledger read and write runs a record through [`normalize`] before
//! looking at it. Expiry and daily reset are applied lazily here; there is no
//! background sweep.

use super::types::{Plan, PlanTable, SubscriptionStatus, UserSubscription};
use crate::clock::local_date;
use chrono::{DateTime, Utc};

/// Apply lazy expiry and daily reset as of `now`
///
/// 1. A record whose `expires_at` lies in the past is downgraded to
///    `Plan::Free` with `SubscriptionStatus::Expired` and no expiry.
/// 2. A record whose `last_reset_date` is not today's local date gets its
///    daily counter zeroed and the date moved to today.
///
/// Returns an identical record when neither applies.
pub fn normalize(record: &UserSubscription, now: DateTime<Utc>) -> UserSubscription {
    let mut next = record.clone();

    if let Some(expires_at) = next.expires_at {
        if now > expires_at {
            next.plan = Plan::Free;
            next.expires_at = None;
            next.status = SubscriptionStatus::Expired;
        }
    }

    let today = local_date(now);
    if next.last_reset_date != today {
        next.searches_used_today = 0;
        next.last_reset_date = today;
    }

    next
}

/// Build the record for a user seen for the first time
///
/// Admins start on a lifetime plan, everyone else on free.
pub fn new_record(
    user_id: i64,
    username: Option<&str>,
    display_name: Option<&str>,
    is_admin: bool,
    plans: &PlanTable,
    now: DateTime<Utc>,
) -> UserSubscription {
    let plan = if is_admin { Plan::Lifetime } else { Plan::Free };
    UserSubscription {
        user_id,
        username: username.map(str::to_string),
        display_name: display_name.map(str::to_string),
        plan,
        payment_amount: 0,
        created_at: now,
        expires_at: plans.duration(plan).map(|d| now + d),
        searches_used_today: 0,
        last_reset_date: local_date(now),
        total_searches: 0,
        is_admin,
        status: SubscriptionStatus::Active,
    }
}

/// Details of an admin plan grant
#[derive(Debug, Clone, Copy)]
pub struct PlanGrant<'a> {
    pub user_id: i64,
    pub plan: Plan,
    pub payment_amount: u64,
    pub username: Option<&'a str>,
    pub display_name: Option<&'a str>,
    pub is_admin: bool,
}

/// Apply an admin plan grant on top of an existing record (if any)
///
/// `created_at` and `total_searches` survive; the daily counter restarts and
/// the expiry is recomputed from the plan.
pub fn apply_grant(
    existing: Option<&UserSubscription>,
    grant: PlanGrant<'_>,
    plans: &PlanTable,
    now: DateTime<Utc>,
) -> UserSubscription {
    let mut record = match existing {
        Some(existing) => existing.clone(),
        None => new_record(
            grant.user_id,
            grant.username,
            grant.display_name,
            grant.is_admin,
            plans,
            now,
        ),
    };

    if let Some(username) = grant.username {
        record.username = Some(username.to_string());
    }
    if let Some(display_name) = grant.display_name {
        record.display_name = Some(display_name.to_string());
    }
    record.is_admin = record.is_admin || grant.is_admin;
    record.plan = grant.plan;
    record.payment_amount = grant.payment_amount;
    record.expires_at = plans.duration(grant.plan).map(|d| now + d);
    record.searches_used_today = 0;
    record.last_reset_date = local_date(now);
    record.status = if grant.plan == Plan::Expired {
        SubscriptionStatus::Expired
    } else {
        SubscriptionStatus::Active
    };

    record
}
