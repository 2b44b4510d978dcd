use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MnemoConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
    pub http_host: String,
    pub http_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Upper bound for `auth.lockout_seconds` (30 days).
pub const MAX_LOCKOUT_SECONDS: i64 = 30 * 86_400;

/// Credential store knobs. Values outside their valid range fall back to the
/// defaults in [`MnemoConfig::validate`].
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// Consecutive wrong-key attempts before an agent is locked.
    pub max_failed_attempts: u32,
    /// Length of the lockout window.
    pub lockout_seconds: i64,
    /// Lifetime of a newly issued or rotated key.
    pub key_expiry_days: u32,
    /// Key the stdio MCP server authenticates as. `None` means legacy caller.
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueryConfig {
    /// Upper bound on the number of project identifiers one query expands to.
    pub max_project_aliases: usize,
    /// Over-fetch multiplier for direct-children folder queries.
    pub folder_overfetch_factor: usize,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            http_host: "127.0.0.1".into(),
            http_port: 37777,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_mnemo_dir()
            .join("mnemo.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_seconds: 300,
            key_expiry_days: 90,
            api_key: None,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_project_aliases: 100,
            folder_overfetch_factor: 3,
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// Returns `~/.mnemo/`
pub fn default_mnemo_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mnemo")
}

/// Returns the default config file path: `~/.mnemo/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mnemo_dir().join("config.toml")
}

impl MnemoConfig {
    /// Load config from TOML file (if it exists), apply env var overrides, then validate.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MnemoConfig::default()
        };

        config.apply_env_overrides();
        config.validate();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MNEMO_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MNEMO_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("MNEMO_API_KEY") {
            self.auth.api_key = Some(val).filter(|k| !k.is_empty());
        }
        env_parse_or_keep("MNEMO_MAX_FAILED_ATTEMPTS", &mut self.auth.max_failed_attempts);
        env_parse_or_keep("MNEMO_LOCKOUT_SECONDS", &mut self.auth.lockout_seconds);
        env_parse_or_keep("MNEMO_KEY_EXPIRY_DAYS", &mut self.auth.key_expiry_days);
        env_parse_or_keep("MNEMO_HTTP_PORT", &mut self.server.http_port);
    }

    /// Replace out-of-range values with their defaults.
    pub fn validate(&mut self) {
        let auth = AuthConfig::default();
        if self.auth.max_failed_attempts == 0 {
            warn!(default = auth.max_failed_attempts, "auth.max_failed_attempts must be >= 1");
            self.auth.max_failed_attempts = auth.max_failed_attempts;
        }
        if self.auth.lockout_seconds <= 0 || self.auth.lockout_seconds > MAX_LOCKOUT_SECONDS {
            warn!(
                default = auth.lockout_seconds,
                max = MAX_LOCKOUT_SECONDS,
                "auth.lockout_seconds must be within 1..=max"
            );
            self.auth.lockout_seconds = auth.lockout_seconds;
        }
        if self.auth.key_expiry_days == 0 {
            warn!(default = auth.key_expiry_days, "auth.key_expiry_days must be >= 1");
            self.auth.key_expiry_days = auth.key_expiry_days;
        }

        let query = QueryConfig::default();
        if self.query.max_project_aliases == 0 {
            warn!(default = query.max_project_aliases, "query.max_project_aliases must be >= 1");
            self.query.max_project_aliases = query.max_project_aliases;
        }
        if self.query.folder_overfetch_factor == 0 {
            warn!(default = query.folder_overfetch_factor, "query.folder_overfetch_factor must be >= 1");
            self.query.folder_overfetch_factor = query.folder_overfetch_factor;
        }
        if self.query.max_limit == 0 {
            self.query.max_limit = query.max_limit;
        }
        if self.query.default_limit == 0 || self.query.default_limit > self.query.max_limit {
            warn!(
                default = query.default_limit.min(self.query.max_limit),
                "query.default_limit must be within 1..=max_limit"
            );
            self.query.default_limit = query.default_limit.min(self.query.max_limit);
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

impl QueryConfig {
    /// Clamp a caller-supplied page size into `1..=max_limit`.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

/// Overwrite `target` with the parsed env var, keeping the current value when the
/// variable is unset or unparsable.
fn env_parse_or_keep<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        match raw.trim().parse::<T>() {
            Ok(val) => *target = val,
            Err(_) => warn!(var = name, value = %raw, "ignoring unparsable environment override"),
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
