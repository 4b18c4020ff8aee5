//! Database configuration.
//!
//! [`DatabaseConfig::load()`] reads the `[database]` section of
//! `config/config.toml` and overlays `LUCID__DATABASE__*` environment
//! variables (for example `LUCID__DATABASE__URL=app.db`).

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "config/config.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Database location; `:memory:` opens a private in-memory database
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Keep every executed statement in the connection's query log
    #[serde(default)]
    pub log_queries: bool,
    /// Statements slower than this are logged at warn level
    #[serde(default = "default_slow_query_threshold_ms")]
    pub slow_query_threshold_ms: u64,
}

fn default_db_url() -> String {
    ":memory:".to_string()
}

fn default_slow_query_threshold_ms() -> u64 {
    500
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            log_queries: false,
            slow_query_threshold_ms: default_slow_query_threshold_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Load the database configuration from `config/config.toml`, falling back to env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix("LUCID").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // An unreadable file falls back to the environment alone
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!("failed to load {CONFIG_FILE}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix("LUCID").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        match settings.get::<DatabaseConfig>("database") {
            Ok(cfg) => Ok(cfg),
            // No [database] section anywhere: every field has a default
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Database configuration could not be loaded from file or environment: {e}"
            ))),
        }
    }

    pub fn slow_query_threshold(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.slow_query_threshold_ms)
    }
}
