//! Configuration management for the lookup bot
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{LookupBotError, Result};
use crate::ledger::{AdminIdentity, Plan, PlanTable};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
///
/// Every section has defaults, so an empty or missing file yields a working
/// configuration apart from the API key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Who may run admin operations
    #[serde(default)]
    pub admin: AdminIdentity,
    /// Lookup API settings
    #[serde(default)]
    pub api: ApiConfig,
    /// Backing store settings
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Quota, price and duration per plan
    #[serde(default)]
    pub plans: PlanTable,
    /// Search flow settings
    #[serde(default)]
    pub search: SearchConfig,
    /// HTTP frontend settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Lookup API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Request URL with `{number}` and optional `{api_key}` placeholders
    #[serde(default = "default_endpoint_template")]
    pub endpoint_template: String,

    /// API key substituted into the template
    #[serde(default)]
    pub api_key: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Attempts per lookup, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_endpoint_template() -> String {
    "https://api.example.com/INFO.php?api_key={api_key}&mobile={number}".to_string()
}

fn default_timeout_seconds() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint_template: default_endpoint_template(),
            api_key: String::new(),
            timeout_seconds: default_timeout_seconds(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Backing store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path of the JSON store
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,

    /// Load `<path>.backup` when the store is malformed
    #[serde(default)]
    pub recover_from_backup: bool,
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("subscriptions.json")
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            recover_from_backup: false,
        }
    }
}

/// Search flow configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Give back the search credit when the lookup fails
    #[serde(default)]
    pub refund_on_failure: bool,
}

/// HTTP frontend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Shared secret expected in the `X-Webhook-Secret` header on `/webhook`
    #[serde(default)]
    pub webhook_secret: Option<String>,

    /// Bearer token required on `/admin/subscriptions`
    #[serde(default)]
    pub admin_token: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            webhook_secret: None,
            admin_token: None,
        }
    }
}

impl ServerConfig {
    /// Parsed listen address
    ///
    /// # Errors
    ///
    /// Returns error if `bind` is not a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind.parse().map_err(|e| {
            LookupBotError::Config(format!("Invalid server.bind '{}': {}", self.bind, e)).into()
        })
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| LookupBotError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns error if the YAML does not match the configuration schema
    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_str(contents).map_err(LookupBotError::Yaml)?;
        Ok(config)
    }

    fn apply_env_vars(&mut self) {
        if let Ok(api_key) = std::env::var("LOOKUP_BOT_API_KEY") {
            self.api.api_key = api_key;
        }

        if let Ok(template) = std::env::var("LOOKUP_BOT_API_TEMPLATE") {
            self.api.endpoint_template = template;
        }

        if let Ok(max_retries) = std::env::var("LOOKUP_BOT_MAX_RETRIES") {
            if let Ok(value) = max_retries.parse() {
                self.api.max_retries = value;
            } else {
                tracing::warn!("Invalid LOOKUP_BOT_MAX_RETRIES: {}", max_retries);
            }
        }

        if let Ok(user_id) = std::env::var("LOOKUP_BOT_ADMIN_USER_ID") {
            if let Ok(value) = user_id.parse() {
                self.admin.user_id = Some(value);
            } else {
                tracing::warn!("Invalid LOOKUP_BOT_ADMIN_USER_ID: {}", user_id);
            }
        }

        if let Ok(username) = std::env::var("LOOKUP_BOT_ADMIN_USERNAME") {
            self.admin.username = Some(username);
        }

        if let Ok(path) = std::env::var("LOOKUP_BOT_LEDGER_PATH") {
            self.ledger.path = PathBuf::from(path);
        }

        if let Ok(bind) = std::env::var("LOOKUP_BOT_BIND") {
            self.server.bind = bind;
        }

        if let Ok(secret) = std::env::var("LOOKUP_BOT_WEBHOOK_SECRET") {
            self.server.webhook_secret = Some(secret);
        }

        if let Ok(token) = std::env::var("LOOKUP_BOT_ADMIN_TOKEN") {
            self.server.admin_token = Some(token);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(path) = &cli.ledger {
            self.ledger.path = path.clone();
        }

        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set. The API key is checked
    /// when a lookup client is created instead.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let template = &self.api.endpoint_template;
        if !template.contains("{number}") {
            return Err(LookupBotError::Config(
                "api.endpoint_template must contain {number}".to_string(),
            )
            .into());
        }

        let sample = template
            .replace("{api_key}", "key")
            .replace("{number}", "9876543210");
        if let Err(e) = url::Url::parse(&sample) {
            return Err(LookupBotError::Config(format!(
                "api.endpoint_template is not a valid URL: {}",
                e
            ))
            .into());
        }

        if self.api.max_retries == 0 || self.api.max_retries > 10 {
            return Err(LookupBotError::Config(
                "api.max_retries must be between 1 and 10".to_string(),
            )
            .into());
        }

        if self.api.timeout_seconds == 0 {
            return Err(LookupBotError::Config(
                "api.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        for plan in [Plan::Single, Plan::Lifetime] {
            if self.plans.quota(plan) == 0 {
                return Err(LookupBotError::Config(format!(
                    "plans.{}.searches_per_day must be greater than 0",
                    plan
                ))
                .into());
            }
        }

        self.server.socket_addr()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use serial_test::serial;

    fn cli() -> Cli {
        Cli {
            config: None,
            verbose: false,
            json_logs: false,
            ledger: None,
            command: Commands::Verify { user_id: None },
        }
    }

    const ENV_VARS: [&str; 9] = [
        "LOOKUP_BOT_API_KEY",
        "LOOKUP_BOT_API_TEMPLATE",
        "LOOKUP_BOT_ADMIN_USER_ID",
        "LOOKUP_BOT_ADMIN_USERNAME",
        "LOOKUP_BOT_LEDGER_PATH",
        "LOOKUP_BOT_BIND",
        "LOOKUP_BOT_MAX_RETRIES",
        "LOOKUP_BOT_WEBHOOK_SECRET",
        "LOOKUP_BOT_ADMIN_TOKEN",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.timeout_seconds, 15);
        assert_eq!(config.api.max_retries, 3);
        assert_eq!(config.api.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.ledger.path, PathBuf::from("subscriptions.json"));
        assert!(!config.ledger.recover_from_backup);
        assert!(!config.search.refund_on_failure);
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.plans, PlanTable::default());
        assert_eq!(config.admin, AdminIdentity::default());
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_template_without_number() {
        let mut config = Config::default();
        config.api.endpoint_template = "https://api.example.com/lookup".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_template_not_a_url() {
        let mut config = Config::default();
        config.api.endpoint_template = "not a url {number}".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_retry_bounds() {
        let mut config = Config::default();
        config.api.max_retries = 0;
        assert!(config.validate().is_err());
        config.api.max_retries = 11;
        assert!(config.validate().is_err());
        config.api.max_retries = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.api.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_paid_quota() {
        let mut config = Config::default();
        config.plans.single.searches_per_day = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("plans.single"));
    }

    #[test]
    fn test_config_validation_bad_bind() {
        let mut config = Config::default();
        config.server.bind = "localhost".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
admin:
  user_id: 7490634345
  username: PanelOwner
api:
  endpoint_template: "http://localhost:8080/info?key={api_key}&mobile={number}"
  api_key: secret
  max_retries: 5
ledger:
  path: /var/lib/lookup-bot/subscriptions.json
  recover_from_backup: true
plans:
  lifetime:
    searches_per_day: 500
    price: 5000
    duration_days: 3650
search:
  refund_on_failure: true
server:
  admin_token: panel-token
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.admin.user_id, Some(7490634345));
        assert_eq!(config.admin.username.as_deref(), Some("PanelOwner"));
        assert_eq!(config.api.api_key, "secret");
        assert_eq!(config.api.max_retries, 5);
        assert_eq!(config.api.timeout_seconds, 15);
        assert!(config.ledger.recover_from_backup);
        assert_eq!(config.plans.quota(Plan::Lifetime), 500);
        assert_eq!(config.plans.price(Plan::Single), 100);
        assert!(config.search.refund_on_failure);
        assert_eq!(config.server.admin_token.as_deref(), Some("panel-token"));
        assert_eq!(config.server.webhook_secret, None);
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_empty_yaml() {
        let config = Config::from_yaml("  \n").unwrap();
        assert_eq!(config.api.max_retries, 3);
    }

    #[test]
    fn test_config_from_invalid_yaml() {
        let err = Config::from_yaml("api: [1, 2").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LookupBotError>(),
            Some(LookupBotError::Yaml(_))
        ));
        assert!(Config::from_yaml("api:\n  max_retries: many\n").is_err());
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        clear_env();
        let config = Config::load("nonexistent.yaml", &cli()).unwrap();
        assert_eq!(config.api.max_retries, 3);
        assert!(config.api.api_key.is_empty());
    }

    #[test]
    #[serial]
    fn test_cli_ledger_override() {
        clear_env();
        let mut cli = cli();
        cli.ledger = Some(PathBuf::from("/tmp/override.json"));
        let config = Config::load("nonexistent.yaml", &cli).unwrap();
        assert_eq!(config.ledger.path, PathBuf::from("/tmp/override.json"));
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_overrides_fields() {
        clear_env();
        std::env::set_var("LOOKUP_BOT_API_KEY", "from-env");
        std::env::set_var("LOOKUP_BOT_ADMIN_USER_ID", "99");
        std::env::set_var("LOOKUP_BOT_ADMIN_USERNAME", "envadmin");
        std::env::set_var("LOOKUP_BOT_LEDGER_PATH", "/tmp/env-ledger.json");
        std::env::set_var("LOOKUP_BOT_BIND", "127.0.0.1:8080");
        std::env::set_var("LOOKUP_BOT_MAX_RETRIES", "7");
        std::env::set_var("LOOKUP_BOT_WEBHOOK_SECRET", "hook-secret");
        std::env::set_var("LOOKUP_BOT_ADMIN_TOKEN", "admin-token");

        let mut config = Config::default();
        config.apply_env_vars();
        clear_env();

        assert_eq!(config.api.api_key, "from-env");
        assert_eq!(config.admin.user_id, Some(99));
        assert_eq!(config.admin.username.as_deref(), Some("envadmin"));
        assert_eq!(config.ledger.path, PathBuf::from("/tmp/env-ledger.json"));
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.api.max_retries, 7);
        assert_eq!(config.server.webhook_secret.as_deref(), Some("hook-secret"));
        assert_eq!(config.server.admin_token.as_deref(), Some("admin-token"));
    }

    #[test]
    #[serial]
    fn test_apply_env_vars_ignores_unparseable_numbers() {
        clear_env();
        std::env::set_var("LOOKUP_BOT_MAX_RETRIES", "lots");
        std::env::set_var("LOOKUP_BOT_ADMIN_USER_ID", "admin");

        let mut config = Config::default();
        config.apply_env_vars();
        clear_env();

        assert_eq!(config.api.max_retries, 3);
        assert_eq!(config.admin.user_id, None);
    }
}
