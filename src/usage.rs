//! In-memory search history and counters
//!
//! Nothing here is persisted; a restart starts from zero.

use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Searches remembered per user; older entries are evicted
pub const HISTORY_LIMIT: usize = 10;

/// One remembered search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHistoryEntry {
    pub number: String,
    pub timestamp: DateTime<Utc>,
    pub result_found: bool,
}

/// Per-user history ring buffers plus process-wide counters
#[derive(Debug)]
pub struct UsageTracker {
    clock: Arc<dyn Clock>,
    history: Mutex<HashMap<i64, VecDeque<SearchHistoryEntry>>>,
    total_searches: AtomicU64,
    started_at: DateTime<Utc>,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let started_at = clock.now();
        Self {
            clock,
            history: Mutex::new(HashMap::new()),
            total_searches: AtomicU64::new(0),
            started_at,
        }
    }

    fn history_map(&self) -> MutexGuard<'_, HashMap<i64, VecDeque<SearchHistoryEntry>>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember a search and bump the global counter
    pub fn record_search(&self, user_id: i64, number: &str, result_found: bool) {
        let entry = SearchHistoryEntry {
            number: number.to_string(),
            timestamp: self.clock.now(),
            result_found,
        };

        {
            let mut map = self.history_map();
            let entries = map.entry(user_id).or_default();
            entries.push_back(entry);
            while entries.len() > HISTORY_LIMIT {
                entries.pop_front();
            }
        }

        self.total_searches.fetch_add(1, Ordering::Relaxed);
    }

    /// A user's history, oldest first
    pub fn history(&self, user_id: i64) -> Vec<SearchHistoryEntry> {
        self.history_map()
            .get(&user_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The `n` most recent searches, newest first
    pub fn recent(&self, user_id: i64, n: usize) -> Vec<SearchHistoryEntry> {
        self.history_map()
            .get(&user_id)
            .map(|entries| entries.iter().rev().take(n).cloned().collect())
            .unwrap_or_default()
    }

    /// Forget a user's history; `false` if there was none
    pub fn clear_history(&self, user_id: i64) -> bool {
        match self.history_map().get_mut(&user_id) {
            Some(entries) if !entries.is_empty() => {
                entries.clear();
                true
            }
            _ => false,
        }
    }

    /// Searches recorded since start or the last reset
    pub fn total_searches(&self) -> u64 {
        self.total_searches.load(Ordering::Relaxed)
    }

    /// Users who searched at least once since start or the last reset
    pub fn active_users(&self) -> usize {
        self.history_map().len()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.clock.now() - self.started_at
    }

    /// Drop all history and zero the counter
    pub fn reset(&self) {
        self.history_map().clear();
        self.total_searches.store(0, Ordering::Relaxed);
        tracing::info!("Usage statistics reset");
    }
}
