use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use url::Url;

use kiln_providers::{HttpGeneratorConfig, RetryConfig};
use kiln_store::Store;

use crate::explore::ExploreSettings;

/// Contents of `~/.kiln/config.toml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct KilnConfig {
    pub store: Option<StoreConfig>,
    pub generator: Option<GeneratorConfig>,
    pub explore: Option<ExploreConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid config value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid { .. } => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    /// Database file. `~` and `${VAR}` are expanded.
    pub path: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GeneratorConfig {
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    /// Empty string disables the header.
    pub referer: Option<String>,
    /// Per-attempt HTTP timeout.
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    /// Upper bound on one combination's generator call, retries included.
    pub deadline_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExploreConfig {
    pub interval_ms: Option<u64>,
    pub max_consecutive_failures: Option<u32>,
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Expand `${VAR}` references, then a leading `~/`.
pub fn expand_path(value: &str) -> PathBuf {
    let expanded = expand_env_vars(value);
    if expanded == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = expanded.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(expanded)
}

impl KilnConfig {
    /// Load from the default location. A missing file is not an error.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }
}

/// `~/.kiln`, home of the config file, default database, and logs.
#[must_use]
pub fn kiln_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kiln"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    kiln_dir().map(|dir| dir.join("config.toml"))
}

/// Every setting with defaults applied.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub db_path: PathBuf,
    pub busy_timeout: Duration,
    pub generator: HttpGeneratorConfig,
    pub compute_deadline: Duration,
    pub explore: ExploreSettings,
}

impl ResolvedConfig {
    pub const DEFAULT_DB_FILE: &'static str = "kiln.db";
    pub const DEFAULT_COMPUTE_DEADLINE: Duration = Duration::from_secs(60);

    pub fn from_config(config: Option<&KilnConfig>) -> Result<Self, ConfigError> {
        let store = config.and_then(|c| c.store.as_ref());
        let generator = config.and_then(|c| c.generator.as_ref());
        let explore = config.and_then(|c| c.explore.as_ref());

        let db_path = match store.and_then(|s| s.path.as_deref()) {
            Some(path) => expand_path(path),
            None => kiln_dir()
                .map(|dir| dir.join(Self::DEFAULT_DB_FILE))
                .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DB_FILE)),
        };
        let busy_timeout = store
            .and_then(|s| s.busy_timeout_ms)
            .map_or(Store::DEFAULT_BUSY_TIMEOUT, Duration::from_millis);

        let mut http = HttpGeneratorConfig::default();
        if let Some(generator) = generator {
            if let Some(raw) = &generator.base_url {
                let raw = expand_env_vars(raw);
                http.base_url = Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                    field: "generator.base_url",
                    message: format!("{raw:?}: {e}"),
                })?;
            }
            if let Some(user_agent) = &generator.user_agent {
                http.user_agent = expand_env_vars(user_agent);
            }
            if let Some(referer) = &generator.referer {
                let referer = expand_env_vars(referer);
                http.referer = (!referer.is_empty()).then_some(referer);
            }
            if let Some(secs) = generator.timeout_seconds {
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        field: "generator.timeout_seconds",
                        message: "must be at least 1".to_string(),
                    });
                }
                http.timeout = Duration::from_secs(secs);
            }
            if let Some(max_retries) = generator.max_retries {
                http.retry = RetryConfig {
                    max_retries,
                    ..RetryConfig::default()
                };
            }
        }
        let compute_deadline = generator
            .and_then(|g| g.deadline_seconds)
            .map_or(Self::DEFAULT_COMPUTE_DEADLINE, Duration::from_secs);

        let mut explore_settings = ExploreSettings::default();
        if let Some(explore) = explore {
            if let Some(ms) = explore.interval_ms {
                explore_settings.interval = Duration::from_millis(ms);
            }
            if let Some(max) = explore.max_consecutive_failures {
                if max == 0 {
                    return Err(ConfigError::Invalid {
                        field: "explore.max_consecutive_failures",
                        message: "must be at least 1".to_string(),
                    });
                }
                explore_settings.max_consecutive_failures = max;
            }
        }

        Ok(Self {
            db_path,
            busy_timeout,
            generator: http,
            compute_deadline,
            explore: explore_settings,
        })
    }
}
