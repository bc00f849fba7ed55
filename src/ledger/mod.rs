//! Subscription ledger
//!
//! The ledger is the single source of truth for who may search and how many
//! searches remain. Records live in memory behind one mutex and are written
//! through to a JSON file after every mutation.
//!
//! Every mutating operation holds the lock for the whole
//! read-modify-write-persist sequence, including the file rename and write.
//! Reads that trigger lazy transitions (expiry, daily reset) mutate state too,
//! so they take the same lock. Reporting reads clone the records out under the
//! lock and iterate outside it.
//!
//! Network calls never happen while the lock is held; callers check quota,
//! release, call the lookup API, then come back.

pub mod lifecycle;
pub mod store;
pub mod types;

pub use lifecycle::{normalize, PlanGrant};
pub use types::{
    AdminIdentity, Plan, PlanCounts, PlanSpec, PlanTable, SearchDecision, SubscriptionStatus,
    UserSubscription,
};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

#[derive(Debug, Default)]
struct LedgerState {
    users: HashMap<i64, UserSubscription>,
    /// When the backing file was last read or written by this process
    last_loaded: Option<SystemTime>,
}

/// Thread-safe, file-backed subscription ledger
///
/// # Examples
///
/// ```no_run
/// use lookup_bot::ledger::{AdminIdentity, PlanTable, SubscriptionLedger};
///
/// let ledger = SubscriptionLedger::new("subscriptions.json", AdminIdentity::default(), PlanTable::default());
/// ledger.load();
///
/// let decision = ledger.can_search(42);
/// if decision.allowed {
///     ledger.consume_credit(42);
/// }
/// ```
#[derive(Debug)]
pub struct SubscriptionLedger {
    path: PathBuf,
    admin: AdminIdentity,
    plans: PlanTable,
    recover_from_backup: bool,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
}

impl SubscriptionLedger {
    /// Creates an empty ledger backed by `path`
    ///
    /// Nothing is read until [`load`](Self::load) or the first access.
    pub fn new(path: impl Into<PathBuf>, admin: AdminIdentity, plans: PlanTable) -> Self {
        Self {
            path: path.into(),
            admin,
            plans,
            recover_from_backup: false,
            clock: Arc::new(SystemClock),
            state: Mutex::new(LedgerState::default()),
        }
    }

    /// Creates a ledger from configuration without loading it
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.ledger.path,
            config.admin.clone(),
            config.plans,
        )
        .with_backup_recovery(config.ledger.recover_from_backup)
    }

    /// Creates, loads, and bootstraps the admin record
    pub fn open(config: &Config) -> Self {
        let ledger = Self::from_config(config);
        ledger.load();
        ledger.ensure_admin();
        ledger
    }

    /// Replaces the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Try the `.backup` file when the store is malformed
    pub fn with_backup_recovery(mut self, enabled: bool) -> Self {
        self.recover_from_backup = enabled;
        self
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Quota table in effect
    pub fn plans(&self) -> &PlanTable {
        &self.plans
    }

    /// Configured admin identity
    pub fn admin(&self) -> &AdminIdentity {
        &self.admin
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace in-memory state with the contents of the backing file
    ///
    /// A missing file yields an empty ledger. A malformed file is logged and
    /// also yields an empty ledger, unless backup recovery is enabled and the
    /// `.backup` file parses.
    pub fn load(&self) {
        let mut state = self.state();
        self.load_locked(&mut state);
    }

    fn load_locked(&self, state: &mut LedgerState) {
        if !self.path.exists() {
            tracing::info!(
                "No subscription file at {}, starting fresh",
                self.path.display()
            );
            state.users.clear();
            state.last_loaded = None;
            return;
        }

        state.users = match store::read_users(&self.path) {
            Ok(users) => {
                tracing::info!("Loaded {} user subscriptions", users.len());
                users
            }
            Err(e) => {
                tracing::error!(
                    "Error loading subscriptions from {}: {:#}",
                    self.path.display(),
                    e
                );
                self.read_backup().unwrap_or_default()
            }
        };
        state.last_loaded = Some(SystemTime::now());
    }

    fn read_backup(&self) -> Option<HashMap<i64, UserSubscription>> {
        if !self.recover_from_backup {
            tracing::warn!("Starting with an empty ledger; previous records are discarded");
            return None;
        }
        let backup = store::backup_path(&self.path);
        match store::read_users(&backup) {
            Ok(users) => {
                tracing::warn!(
                    "Recovered {} user subscriptions from {}",
                    users.len(),
                    backup.display()
                );
                Some(users)
            }
            Err(e) => {
                tracing::error!("Backup recovery failed: {:#}", e);
                None
            }
        }
    }

    /// Reload from disk if the backing file changed since the last load
    ///
    /// This is last-write-wins: in-memory state is discarded in favour of the
    /// file.
    pub fn reload_if_stale(&self) {
        let mut state = self.state();
        self.reload_if_stale_locked(&mut state);
    }

    fn reload_if_stale_locked(&self, state: &mut LedgerState) {
        let Some(modified) = store::modified_time(&self.path) else {
            return;
        };
        let stale = match state.last_loaded {
            None => true,
            Some(loaded) => modified > loaded,
        };
        if stale {
            tracing::info!("Subscription file modified, reloading");
            self.load_locked(state);
        }
    }

    /// Serialize every record to the backing file
    ///
    /// Returns `false` if the write failed. In-memory state stays
    /// authoritative either way.
    pub fn save(&self) -> bool {
        let mut state = self.state();
        self.persist_locked(&mut state)
    }

    fn persist_locked(&self, state: &mut LedgerState) -> bool {
        match store::write_users(&self.path, &state.users, self.clock.now()) {
            Ok(()) => {
                state.last_loaded = Some(SystemTime::now());
                tracing::info!("Saved {} user subscriptions", state.users.len());
                true
            }
            Err(e) => {
                tracing::error!("Error saving subscriptions: {:#}", e);
                false
            }
        }
    }

    fn store_locked(&self, state: &mut LedgerState, record: UserSubscription) -> bool {
        state.users.insert(record.user_id, record);
        self.persist_locked(state)
    }

    /// Current record for a user after lazy transitions, plus whether it
    /// differs from what is stored (or is new)
    fn current_locked(
        &self,
        state: &mut LedgerState,
        user_id: i64,
        username: Option<&str>,
        display_name: Option<&str>,
    ) -> (UserSubscription, bool) {
        self.reload_if_stale_locked(state);
        let now = self.clock.now();

        let Some(stored) = state.users.get(&user_id) else {
            let is_admin = self.admin.matches(user_id, username);
            if is_admin {
                tracing::info!("Creating admin subscription for {}", user_id);
            } else {
                tracing::info!("Creating free subscription for {}", user_id);
            }
            let record =
                lifecycle::new_record(user_id, username, display_name, is_admin, &self.plans, now);
            return (record, true);
        };

        let mut record = normalize(stored, now);
        if record.status == SubscriptionStatus::Expired && stored.expires_at.is_some() {
            tracing::warn!("Subscription expired for {}, downgrading to free", user_id);
        }
        if let Some(username) = username {
            if record.username.as_deref() != Some(username) {
                record.username = Some(username.to_string());
            }
        }
        if let Some(display_name) = display_name {
            if record.display_name.as_deref() != Some(display_name) {
                record.display_name = Some(display_name.to_string());
            }
        }

        let dirty = record != *stored;
        (record, dirty)
    }

    /// Return a user's record, creating it on first contact
    ///
    /// Lazy expiry and daily reset are applied, and display fields are
    /// refreshed from the supplied values. Any change is persisted before
    /// returning.
    pub fn get_or_create(
        &self,
        user_id: i64,
        username: Option<&str>,
        display_name: Option<&str>,
    ) -> UserSubscription {
        let mut state = self.state();
        let (record, dirty) = self.current_locked(&mut state, user_id, username, display_name);
        if dirty {
            self.store_locked(&mut state, record.clone());
        }
        record
    }

    fn decide(&self, record: &UserSubscription) -> SearchDecision {
        if record.is_admin {
            return SearchDecision::allow();
        }
        let quota = self.plans.quota(record.plan);
        if record.searches_used_today >= quota {
            return SearchDecision::deny(format!(
                "Daily limit reached! You've used {}/{} searches.\n\n\
                 Single Search: ₹{} for 1 search\n\
                 Lifetime: ₹{} for unlimited searches forever!",
                record.searches_used_today,
                quota,
                self.plans.single.price,
                self.plans.lifetime.price
            ));
        }
        SearchDecision::allow()
    }

    /// Whether the user may search right now
    ///
    /// Admins are always allowed; everyone else while
    /// `searches_used_today < quota(plan)`.
    pub fn can_search(&self, user_id: i64) -> SearchDecision {
        let mut state = self.state();
        let (record, dirty) = self.current_locked(&mut state, user_id, None, None);
        let decision = self.decide(&record);
        if dirty {
            self.store_locked(&mut state, record);
        }
        decision
    }

    fn charge(record: &mut UserSubscription) {
        if !record.is_admin {
            record.searches_used_today = record.searches_used_today.saturating_add(1);
        }
        record.total_searches = record.total_searches.saturating_add(1);
    }

    /// Record one search against the user's allowance
    ///
    /// Call only after [`can_search`](Self::can_search) allowed the same
    /// request. Admins never accrue daily usage but their lifetime counter
    /// still increments.
    pub fn consume_credit(&self, user_id: i64) -> UserSubscription {
        let mut state = self.state();
        let (mut record, _) = self.current_locked(&mut state, user_id, None, None);
        Self::charge(&mut record);
        tracing::info!(
            "User {} used search credit: {}/{}",
            user_id,
            record.searches_used_today,
            self.plans.quota(record.plan)
        );
        self.store_locked(&mut state, record.clone());
        record
    }

    /// Check quota and consume a credit under a single lock acquisition
    pub fn reserve_search(&self, user_id: i64) -> SearchDecision {
        let mut state = self.state();
        let (mut record, dirty) = self.current_locked(&mut state, user_id, None, None);
        let decision = self.decide(&record);
        if decision.allowed {
            Self::charge(&mut record);
            tracing::info!(
                "User {} reserved a search: {}/{}",
                user_id,
                record.searches_used_today,
                self.plans.quota(record.plan)
            );
            self.store_locked(&mut state, record);
        } else if dirty {
            self.store_locked(&mut state, record);
        }
        decision
    }

    /// Give back one daily credit after a failed lookup
    ///
    /// The lifetime counter is left alone.
    pub fn refund_credit(&self, user_id: i64) -> UserSubscription {
        let mut state = self.state();
        let (mut record, dirty) = self.current_locked(&mut state, user_id, None, None);
        if !record.is_admin && record.searches_used_today > 0 {
            record.searches_used_today -= 1;
            tracing::info!("Refunded a search credit to {}", user_id);
            self.store_locked(&mut state, record.clone());
        } else if dirty {
            self.store_locked(&mut state, record.clone());
        }
        record
    }

    /// Set a user's plan (admin operation)
    ///
    /// Computes the expiry from the plan, restarts the daily counter, marks
    /// the record active, and persists. Creates the record if needed.
    pub fn upsert_plan(
        &self,
        user_id: i64,
        plan: Plan,
        payment_amount: u64,
        username: Option<&str>,
        display_name: Option<&str>,
    ) -> UserSubscription {
        let mut state = self.state();
        self.reload_if_stale_locked(&mut state);
        let now = self.clock.now();

        let existing = state.users.get(&user_id).map(|r| normalize(r, now));
        let known_username = username.or_else(|| existing.as_ref()?.username.as_deref());
        let is_admin = self.admin.matches(user_id, known_username);

        let record = lifecycle::apply_grant(
            existing.as_ref(),
            PlanGrant {
                user_id,
                plan,
                payment_amount,
                username,
                display_name,
                is_admin,
            },
            &self.plans,
            now,
        );
        tracing::info!(
            "Added/Updated subscription for user {}: {} plan",
            user_id,
            plan
        );
        self.store_locked(&mut state, record.clone());
        record
    }

    /// Make sure the configured admin id holds an admin lifetime record
    pub fn ensure_admin(&self) {
        let Some(admin_id) = self.admin.user_id else {
            return;
        };
        let mut state = self.state();
        self.reload_if_stale_locked(&mut state);
        let now = self.clock.now();

        let record = match state.users.get(&admin_id) {
            None => {
                tracing::info!("Creating admin subscription for ID {}", admin_id);
                lifecycle::new_record(
                    admin_id,
                    self.admin.username.as_deref(),
                    Some("Admin"),
                    true,
                    &self.plans,
                    now,
                )
            }
            Some(existing) if existing.plan != Plan::Lifetime || !existing.is_admin => {
                tracing::info!("Updating admin subscription for ID {}", admin_id);
                let mut record = existing.clone();
                record.plan = Plan::Lifetime;
                record.is_admin = true;
                record.expires_at = self.plans.duration(Plan::Lifetime).map(|d| now + d);
                record.payment_amount = 0;
                record.status = SubscriptionStatus::Active;
                record
            }
            Some(_) => return,
        };
        self.store_locked(&mut state, record);
    }

    /// Whether a caller is an admin, by configured identity or stored flag
    pub fn is_admin(&self, user_id: i64, username: Option<&str>) -> bool {
        if self.admin.matches(user_id, username) {
            return true;
        }
        self.state()
            .users
            .get(&user_id)
            .is_some_and(|record| record.is_admin)
    }

    /// Stored record without applying transitions
    pub fn get(&self, user_id: i64) -> Option<UserSubscription> {
        self.state().users.get(&user_id).cloned()
    }

    /// Snapshot of every record, ordered by user id
    pub fn users(&self) -> Vec<UserSubscription> {
        let mut users: Vec<UserSubscription> = self.state().users.values().cloned().collect();
        users.sort_by_key(|record| record.user_id);
        users
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.state().users.len()
    }

    /// Whether the ledger holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When this process last read or wrote the backing file
    pub fn last_loaded(&self) -> Option<SystemTime> {
        self.state().last_loaded
    }

    /// Per-plan counts for dashboards
    pub fn plan_counts(&self) -> PlanCounts {
        let users = self.users();
        let mut counts = PlanCounts {
            total: users.len(),
            ..PlanCounts::default()
        };
        for record in &users {
            match record.plan {
                Plan::Free => counts.free += 1,
                Plan::Single => counts.single += 1,
                Plan::Lifetime => counts.lifetime += 1,
                Plan::Expired => counts.expired += 1,
            }
            if record.is_admin {
                counts.admins += 1;
            }
        }
        counts
    }

    /// Searches left today for a record
    pub fn remaining(&self, record: &UserSubscription) -> u32 {
        self.plans.remaining(record)
    }

    /// Check that a user's record on disk matches memory
    ///
    /// Re-reads the backing file without replacing in-memory state and
    /// compares user id and plan.
    pub fn verify_persistence(&self, user_id: i64) -> bool {
        let state = self.state();
        let Some(current) = state.users.get(&user_id) else {
            return false;
        };
        match store::read_users(&self.path) {
            Ok(stored) => match stored.get(&user_id) {
                Some(on_disk)
                    if on_disk.user_id == current.user_id && on_disk.plan == current.plan =>
                {
                    tracing::debug!("Subscription persistence verified for user {}", user_id);
                    true
                }
                Some(_) => {
                    tracing::error!("Subscription data mismatch for user {}", user_id);
                    false
                }
                None => {
                    tracing::error!("Subscription for user {} missing on disk", user_id);
                    false
                }
            },
            Err(e) => {
                tracing::error!("Error verifying subscription persistence: {:#}", e);
                false
            }
        }
    }
}
