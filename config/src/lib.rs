//! Configuration for fetchd.
//!
//! Loaded from `$FETCHD_CONFIG` or `~/.fetchd/config.toml`. A missing file
//! yields the defaults; an unreadable or malformed one is an error the
//! binary reports before starting the service.

use serde::Deserialize;
use std::{env, fs, path::Path, path::PathBuf};
use thiserror::Error;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "FETCHD_CONFIG";

/// Default ceiling on in-flight keepalive requests across all origins.
pub const DEFAULT_KEEPALIVE_TOTAL_LIMIT: u32 = 2048;
/// Default ceiling on in-flight keepalive requests for one origin.
pub const DEFAULT_KEEPALIVE_PER_ORIGIN_LIMIT: u32 = 256;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_REDIRECTS: usize = 20;

const fn default_total_limit() -> u32 {
    DEFAULT_KEEPALIVE_TOTAL_LIMIT
}

const fn default_per_origin_limit() -> u32 {
    DEFAULT_KEEPALIVE_PER_ORIGIN_LIMIT
}

const fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

const fn default_max_redirects() -> usize {
    DEFAULT_MAX_REDIRECTS
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchdConfig {
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Keepalive admission ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct KeepaliveConfig {
    #[serde(default = "default_total_limit")]
    pub total_request_limit: u32,
    #[serde(default = "default_per_origin_limit")]
    pub request_limit_per_origin: u32,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            total_request_limit: DEFAULT_KEEPALIVE_TOTAL_LIMIT,
            request_limit_per_origin: DEFAULT_KEEPALIVE_PER_ORIGIN_LIMIT,
        }
    }
}

/// Settings for the HTTP execution driver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header. `${VAR}` references are expanded.
    pub user_agent: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Whole-request timeout. None means no timeout.
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            timeout_secs: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

impl HttpConfig {
    /// User agent with environment references expanded.
    #[must_use]
    pub fn resolved_user_agent(&self) -> Option<String> {
        self.user_agent
            .as_deref()
            .map(expand_env_vars)
            .filter(|ua| !ua.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

/// Replace `${VAR}` with the value of `VAR` (empty when unset).
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl FetchdConfig {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".fetchd").join("config.toml"))
}
