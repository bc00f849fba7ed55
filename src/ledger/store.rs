//! Backing-file persistence for the subscription ledger
//!
//! The store is a single JSON document:
//!
//! ```json
//! {
//!   "users": { "<user_id>": { ...record... } },
//!   "metadata": { "last_updated": "...", "total_users": 1, "version": "2.0" }
//! }
//! ```
//!
//! Saving renames the existing file to `<path>.backup` before writing the new
//! content.

use super::types::UserSubscription;
use crate::error::{LookupBotError, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Schema version written into the document metadata
pub const SCHEMA_VERSION: &str = "2.0";

/// Suffix appended to the store path for the previous version of the file
pub const BACKUP_SUFFIX: &str = ".backup";

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    users: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct Document<'a> {
    users: BTreeMap<String, &'a UserSubscription>,
    metadata: Metadata,
}

/// Document metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(with = "timestamp")]
    pub last_updated: DateTime<Utc>,
    pub total_users: usize,
    pub version: String,
}

/// Path of the backup file for a store path
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Last-modified time of the store, `None` if it cannot be determined
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Read every parseable user record from a store file
///
/// Entries whose key is not a numeric id or whose body does not parse are
/// skipped with a warning.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a JSON document.
pub fn read_users(path: &Path) -> Result<HashMap<i64, UserSubscription>> {
    let contents = fs::read_to_string(path).map_err(|e| {
        LookupBotError::Ledger(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_users(&contents)
}

/// Parse user records from store contents
pub fn parse_users(contents: &str) -> Result<HashMap<i64, UserSubscription>> {
    let raw: RawDocument = serde_json::from_str(contents)
        .map_err(|e| LookupBotError::Ledger(format!("Malformed ledger document: {}", e)))?;

    let mut users = HashMap::with_capacity(raw.users.len());
    for (key, value) in raw.users {
        let Ok(user_id) = key.parse::<i64>() else {
            tracing::warn!("Skipping ledger entry with non-numeric id {:?}", key);
            continue;
        };
        match serde_json::from_value::<UserSubscription>(value) {
            Ok(mut record) => {
                if record.user_id != user_id {
                    tracing::warn!(
                        "Ledger entry {} carries user_id {}, using the key",
                        user_id,
                        record.user_id
                    );
                    record.user_id = user_id;
                }
                users.insert(user_id, record);
            }
            Err(e) => {
                tracing::warn!("Skipping invalid ledger entry for {}: {}", user_id, e);
            }
        }
    }

    Ok(users)
}

/// Write all records to the store, keeping the previous file as a backup
///
/// A failed backup rename is logged and does not block the write. If the
/// write itself fails after the rename, the backup is moved back into place.
///
/// # Errors
///
/// Returns an error if serialization or the final write fails.
pub fn write_users(
    path: &Path,
    users: &HashMap<i64, UserSubscription>,
    now: DateTime<Utc>,
) -> Result<()> {
    let document = Document {
        users: users
            .iter()
            .map(|(id, record)| (id.to_string(), record))
            .collect(),
        metadata: Metadata {
            last_updated: now,
            total_users: users.len(),
            version: SCHEMA_VERSION.to_string(),
        },
    };
    let contents = serde_json::to_string_pretty(&document)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(LookupBotError::Io)?;
    }

    let backup = backup_path(path);
    let backed_up = if path.exists() {
        match rotate_backup(path, &backup) {
            Ok(()) => {
                tracing::debug!("Created backup: {}", backup.display());
                true
            }
            Err(e) => {
                tracing::warn!("Backup creation failed for {}: {}", path.display(), e);
                false
            }
        }
    } else {
        false
    };

    if let Err(e) = fs::write(path, contents) {
        if backed_up {
            if let Err(restore) = fs::rename(&backup, path) {
                tracing::error!(
                    "Could not restore {} from backup: {}",
                    path.display(),
                    restore
                );
            }
        }
        return Err(
            LookupBotError::Ledger(format!("Failed to write {}: {}", path.display(), e)).into(),
        );
    }

    Ok(())
}

fn rotate_backup(path: &Path, backup: &Path) -> std::io::Result<()> {
    if backup.exists() {
        fs::remove_file(backup)?;
    }
    fs::rename(path, backup)
}

/// Parse a timestamp written either as RFC 3339 or as a naive local datetime
pub fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
                .ok_or_else(|| format!("nonexistent local time: {}", value));
        }
    }
    Err(format!("unrecognized timestamp: {}", value))
}

/// Serde adapter for required timestamps
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(de::Error::custom)
    }
}

/// Serde adapter for optional timestamps (`null` means absent)
pub mod opt_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_str(&value.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => super::parse_timestamp(&raw)
                .map(Some)
                .map_err(de::Error::custom),
            None => Ok(None),
        }
    }
}

/// Serde adapter for plain calendar dates
///
/// Accepts `YYYY-MM-DD` or a datetime whose first ten characters are a date.
pub mod date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).map_err(de::Error::custom)
    }
}

fn parse_date(value: &str) -> std::result::Result<NaiveDate, String> {
    value
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .ok_or_else(|| format!("unrecognized date: {}", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::{Plan, SubscriptionStatus};
    use chrono::Duration;
    use tempfile::TempDir;

    fn record(user_id: i64) -> UserSubscription {
        let now = Utc::now();
        UserSubscription {
            user_id,
            username: Some("tester".to_string()),
            display_name: Some("Test User".to_string()),
            plan: Plan::Single,
            payment_amount: 100,
            created_at: now,
            expires_at: Some(now + Duration::days(1)),
            searches_used_today: 0,
            last_reset_date: now.date_naive(),
            total_searches: 3,
            is_admin: false,
            status: SubscriptionStatus::Active,
        }
    }

    #[test]
    fn test_backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("/tmp/subscriptions.json")),
            PathBuf::from("/tmp/subscriptions.json.backup")
        );
    }

    #[test]
    fn test_write_then_read_preserves_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subscriptions.json");
        let mut users = HashMap::new();
        users.insert(7, record(7));

        write_users(&path, &users, Utc::now()).unwrap();
        let loaded = read_users(&path).unwrap();

        let original = &users[&7];
        let reloaded = &loaded[&7];
        assert_eq!(reloaded.plan, original.plan);
        assert_eq!(reloaded.total_searches, original.total_searches);
        assert_eq!(
            reloaded.expires_at.map(|t| t.timestamp_micros()),
            original.expires_at.map(|t| t.timestamp_micros())
        );
    }

    #[test]
    fn test_write_creates_backup_of_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subscriptions.json");
        fs::write(&path, "{\"users\":{}}").unwrap();

        write_users(&path, &HashMap::new(), Utc::now()).unwrap();

        let backup = fs::read_to_string(backup_path(&path)).unwrap();
        assert_eq!(backup, "{\"users\":{}}");
    }

    #[test]
    fn test_write_includes_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("subscriptions.json");
        let mut users = HashMap::new();
        users.insert(1, record(1));
        users.insert(2, record(2));

        write_users(&path, &users, Utc::now()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["metadata"]["total_users"], 2);
        assert_eq!(value["metadata"]["version"], SCHEMA_VERSION);
        assert!(value["users"]["1"].is_object());
        assert_eq!(value["users"]["1"]["plan"], "single");
    }

    #[test]
    fn test_parse_users_skips_invalid_entries() {
        let contents = r#"{
            "users": {
                "abc": {"user_id": 1},
                "5": {"user_id": 5, "plan": "premium", "created_date": "2024-01-01T00:00:00", "last_reset": "2024-01-01"},
                "6": {"user_id": 6, "plan": "free", "created_date": "2024-01-01T00:00:00", "last_reset": "2024-01-01"}
            }
        }"#;
        let users = parse_users(contents).unwrap();
        assert_eq!(users.len(), 1);
        assert!(users.contains_key(&6));
    }

    #[test]
    fn test_parse_users_accepts_historical_format() {
        let contents = r#"{
            "users": {
                "123456789": {
                    "user_id": 123456789,
                    "username": "testuser",
                    "first_name": "Test User",
                    "plan": "single",
                    "payment_amount": 100,
                    "created_date": "2024-05-01T10:15:30.123456",
                    "expires": "2024-05-02T10:15:30.123456",
                    "searches_used": 1,
                    "last_reset": "2024-05-01",
                    "total_searches": 4,
                    "status": "active"
                }
            },
            "metadata": {"version": "1.0"}
        }"#;
        let users = parse_users(contents).unwrap();
        let record = &users[&123456789];
        assert_eq!(record.plan, Plan::Single);
        assert_eq!(record.display_name.as_deref(), Some("Test User"));
        assert_eq!(record.searches_used_today, 1);
        assert_eq!(record.total_searches, 4);
        assert!(!record.is_admin);
        assert_eq!(
            record.last_reset_date,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
        );
        assert!(record.expires_at.is_some());
    }

    #[test]
    fn test_parse_users_null_expiry() {
        let contents = r#"{"users": {"9": {
            "user_id": 9, "plan": "free", "created_date": "2024-01-01T00:00:00+00:00",
            "expires": null, "last_reset": "2024-01-01T08:00:00"
        }}}"#;
        let users = parse_users(contents).unwrap();
        assert_eq!(users[&9].expires_at, None);
        assert_eq!(
            users[&9].last_reset_date,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[test]
    fn test_parse_users_rejects_malformed_document() {
        assert!(parse_users("not json").is_err());
        assert!(parse_users("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-01T00:00:00Z").is_ok());
        assert!(parse_timestamp("2024-01-01T00:00:00.5").is_ok());
        assert!(parse_timestamp("2024-01-01 12:30:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
