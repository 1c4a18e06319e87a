//! # Configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file,
//! then `POTTY_*` environment variables, then CLI flags (applied by the
//! `cli` module).
//!
//! ```toml
//! database = "/var/lib/pottytrainer/journal.redb"
//! table_prefix = "prod"
//! request_timeout_ms = 5000
//! token_ttl_days = 90
//! ```

use pottytrainer_core::{
    Namespace, PottyError,
    primitives::{DEFAULT_NAMESPACE, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_TOKEN_TTL_DAYS},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// CONFIG
// =============================================================================

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path of the redb database file.
    pub database: PathBuf,
    /// Namespace prefix for every physical table.
    pub table_prefix: String,
    /// Per-request deadline for store work.
    pub request_timeout_ms: u64,
    /// Lifetime of newly issued tokens. `0` issues tokens that never expire.
    pub token_ttl_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("pottytrainer.redb"),
            table_prefix: DEFAULT_NAMESPACE.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            token_ttl_days: DEFAULT_TOKEN_TTL_DAYS,
        }
    }
}

impl Config {
    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, PottyError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            PottyError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(PottyError::Config(format!(
                "{} is {} bytes, maximum is {} bytes",
                path.display(),
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            PottyError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| PottyError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self, PottyError> {
        let config: Self = toml::from_str(text).map_err(|e| PottyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overlaid by `path` (if given) and then the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, PottyError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the server unusable.
    ///
    /// A zero request timeout expires every request before it starts.
    pub fn validate(&self) -> Result<(), PottyError> {
        if self.request_timeout_ms == 0 {
            return Err(PottyError::Config(
                "request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlay `POTTY_*` variables read through `lookup`.
    ///
    /// Empty values are ignored. Values that do not parse are errors.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), PottyError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(database) = var("POTTY_DATABASE") {
            self.database = PathBuf::from(database);
        }
        if let Some(prefix) = var("POTTY_TABLE_PREFIX") {
            self.table_prefix = prefix;
        }
        if let Some(timeout) = var("POTTY_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_env("POTTY_REQUEST_TIMEOUT_MS", &timeout)?;
        }
        if let Some(ttl) = var("POTTY_TOKEN_TTL_DAYS") {
            self.token_ttl_days = parse_env("POTTY_TOKEN_TTL_DAYS", &ttl)?;
        }
        Ok(())
    }

    /// The validated table namespace.
    pub fn namespace(&self) -> Result<Namespace, PottyError> {
        Namespace::new(&self.table_prefix)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Lifetime for new tokens, `None` when they never expire.
    #[must_use]
    pub fn token_ttl(&self) -> Option<chrono::Duration> {
        ttl_from_days(self.token_ttl_days)
    }
}

/// Token lifetime for a day count; `0` means the token never expires.
#[must_use]
pub fn ttl_from_days(days: u32) -> Option<chrono::Duration> {
    (days > 0).then(|| chrono::Duration::days(i64::from(days)))
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, PottyError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| PottyError::Config(format!("{key}={value:?}: {e}")))
}

// =============================================================================
// TESTS
// =============================================================================
