use async_trait::async_trait;
use lookup_bot::config::{ApiConfig, Config};
use lookup_bot::ledger::{AdminIdentity, PlanTable, SubscriptionLedger};
use lookup_bot::lookup::{LookupClient, Sleeper};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[allow(dead_code)]
pub const ADMIN_ID: i64 = 1000;

/// Records requested backoff delays instead of sleeping
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

#[allow(dead_code)]
impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

#[allow(dead_code)]
pub fn temp_ledger_path() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let path = tmp.path().join("subscriptions.json");
    (tmp, path)
}

#[allow(dead_code)]
pub fn admin() -> AdminIdentity {
    AdminIdentity {
        user_id: Some(ADMIN_ID),
        username: Some("owner".to_string()),
    }
}

#[allow(dead_code)]
pub fn ledger_at(path: &Path) -> SubscriptionLedger {
    SubscriptionLedger::new(path, admin(), PlanTable::default())
}

#[allow(dead_code)]
pub fn api_config(base_url: &str) -> ApiConfig {
    ApiConfig {
        endpoint_template: format!("{}/info?api_key={{api_key}}&mobile={{number}}", base_url),
        api_key: "test-key".to_string(),
        timeout_seconds: 2,
        max_retries: 3,
        retry_delay_ms: 10,
    }
}

#[allow(dead_code)]
pub fn recording_client(base_url: &str) -> (LookupClient, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = LookupClient::new(api_config(base_url))
        .expect("failed to create lookup client")
        .with_sleeper(sleeper.clone());
    (client, sleeper)
}

#[allow(dead_code)]
pub fn test_config(ledger_path: &Path, base_url: &str) -> Config {
    let mut config = Config::default();
    config.admin = admin();
    config.api = api_config(base_url);
    config.ledger.path = ledger_path.to_path_buf();
    config
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
