//! Configuration loading
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `ACMAP_CONFIG` environment variable
//! 3. `<config dir>/acmap/config.toml`
//! 4. Compiled defaults (fallback)
//!
//! A missing file at priority 3 is not an error. A file named explicitly at priority 1
//! or 2 must exist.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::resolver::ResolutionPolicy;
use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "ACMAP_CONFIG";

/// Environment variables that override CouchDB credentials from the file
pub const COUCHDB_USERNAME_ENV_VAR: &str = "ACMAP_COUCHDB_USERNAME";
pub const COUCHDB_PASSWORD_ENV_VAR: &str = "ACMAP_COUCHDB_PASSWORD";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub policy: PolicyConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Logging settings; `RUST_LOG` takes precedence when set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Which alias store backend to open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process-local, lost on exit
    Memory,
    /// SQLite database file
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
    /// Remote CouchDB database
    #[serde(rename = "couchdb")]
    CouchDb(CouchConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

/// CouchDB connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouchConfig {
    pub url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for CouchConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5984/".to_string(),
            database: "user_aliases".to_string(),
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

/// Resolution policy per entry point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Policy behind `POST /users`
    pub api: ResolutionPolicy,
    /// Policy behind CSV ingestion
    pub ingest: ResolutionPolicy,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            api: ResolutionPolicy::StrictUniqueness,
            ingest: ResolutionPolicy::MergeWithHistory,
        }
    }
}

/// Get OS-dependent default SQLite database path
fn default_sqlite_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("acmap").join("acmap.db"))
        .unwrap_or_else(|| PathBuf::from("./acmap_data/acmap.db"))
}

/// Locate the config file, `None` when no file is configured or present
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file, only if it exists
    dirs::config_dir()
        .map(|d| d.join("acmap").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load configuration following the resolution priority above
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match resolve_config_path(cli_arg) {
        Some(path) => {
            let config = load_config_file(&path)?;
            info!("Loaded configuration from {}", path.display());
            config
        }
        None => {
            info!("No configuration file found, using defaults");
            TomlConfig::default()
        }
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse one TOML config file
pub fn load_config_file(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    parse_config(&content)
}

/// Parse TOML config text
pub fn parse_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

fn apply_env_overrides(config: &mut TomlConfig) {
    if let StoreConfig::CouchDb(couch) = &mut config.store {
        if let Ok(user) = std::env::var(COUCHDB_USERNAME_ENV_VAR) {
            couch.username = Some(user);
        }
        if let Ok(password) = std::env::var(COUCHDB_PASSWORD_ENV_VAR) {
            couch.password = Some(password);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.policy.api, ResolutionPolicy::StrictUniqueness);
        assert_eq!(config.policy.ingest, ResolutionPolicy::MergeWithHistory);
    }

    #[test]
    fn test_couchdb_section() {
        let config = parse_config(
            r#"
            [store]
            backend = "couchdb"
            url = "http://db.internal:5984/"
            username = "admin"
            "#,
        )
        .unwrap();

        match config.store {
            StoreConfig::CouchDb(couch) => {
                assert_eq!(couch.url, "http://db.internal:5984/");
                assert_eq!(couch.database, "user_aliases");
                assert_eq!(couch.username.as_deref(), Some("admin"));
                assert_eq!(couch.timeout_secs, 30);
            }
            other => panic!("expected couchdb store, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let err = parse_config("[store]\nbackend = \"redis\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_policy_names() {
        let config = parse_config("[policy]\napi = \"merge\"\ningest = \"strict\"\n").unwrap();
        assert_eq!(config.policy.api, ResolutionPolicy::MergeWithHistory);
        assert_eq!(config.policy.ingest, ResolutionPolicy::StrictUniqueness);
    }
}
