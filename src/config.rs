//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_TTL;
use crate::zephyr::DEFAULT_BASE_URL;
use crate::{Error, Result};

/// Prefix of environment overrides (`SAAS_ADAPTERS_BUGSNAG__AUTH_TOKEN=...`)
pub const ENV_PREFIX: &str = "SAAS_ADAPTERS_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before credentials are resolved.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Outbound HTTP settings shared by both backends
    pub http: HttpConfig,
    /// Project context cache
    pub cache: CacheConfig,
    /// Error monitoring backend; disabled when absent
    pub bugsnag: Option<BugsnagConfig>,
    /// Test management backend; disabled when absent
    pub zephyr: Option<ZephyrConfig>,
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// User-Agent header
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("saas-adapters/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Project context cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of cached projects and event fields
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

/// Error monitoring backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BugsnagConfig {
    /// Personal auth token (supports `env:VAR_NAME`)
    pub auth_token: String,
    /// Notifier API key of the project to pin (fixed-project mode)
    pub project_api_key: Option<String>,
    /// Endpoint override, e.g. for an on-premise installation
    pub endpoint: Option<String>,
}

impl BugsnagConfig {
    /// Resolve the auth token
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when the token is empty or names an unset variable.
    pub fn auth_token(&self) -> Result<String> {
        resolve_secret("bugsnag.auth_token", &self.auth_token)
    }
}

/// Test management backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZephyrConfig {
    /// API access token (supports `env:VAR_NAME`)
    pub api_token: String,
    /// API root
    pub base_url: String,
    /// `projectKey` filter applied when the caller gives none
    pub default_project_key: Option<String>,
}

impl Default for ZephyrConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_project_key: None,
        }
    }
}

impl ZephyrConfig {
    /// Resolve the API token
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when the token is empty or names an unset variable.
    pub fn api_token(&self) -> Result<String> {
        resolve_secret("zephyr.api_token", &self.api_token)
    }
}

/// Resolve a literal or `env:VAR_NAME` secret. The value never appears in
/// the error.
fn resolve_secret(field: &str, raw: &str) -> Result<String> {
    let value = match raw.trim().strip_prefix("env:") {
        Some(var) => env::var(var)
            .map_err(|_| Error::Config(format!("{field}: environment variable {var} is not set")))?,
        None => raw.trim().to_string(),
    };
    if value.is_empty() {
        return Err(Error::Config(format!("{field} is empty")));
    }
    Ok(value)
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // before any env: secret is resolved
        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
                (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
                _ => path_str.clone(),
            };

            let path = Path::new(&expanded);
            if !path.exists() {
                tracing::debug!("Env file not found (skipped): {expanded}");
                continue;
            }
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        }
    }

    /// Names of the configured backends
    pub fn enabled_backends(&self) -> impl Iterator<Item = &'static str> {
        [
            self.bugsnag.is_some().then_some(crate::bugsnag::BACKEND),
            self.zephyr.is_some().then_some(crate::zephyr::BACKEND),
        ]
        .into_iter()
        .flatten()
    }
}

/// Human-readable durations (`"30s"`, `"5m"`, `"100ms"`, bare seconds)
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize as whole seconds (`"30s"`), or milliseconds when sub-second
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize `"30s"`, `"5m"`, `"100ms"` or a bare number of seconds
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the value cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(u64),
            Text(String),
        }

        let s = match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => return Ok(Duration::from_secs(secs)),
            Raw::Text(s) => s,
        };
        let s = s.trim();

        // "ms" before "s"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(serde::de::Error::custom)
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
