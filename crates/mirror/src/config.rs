use std::path::PathBuf;
use std::str::FromStr;

use galsync_client::gallery::DEFAULT_PAGE_SIZE;
use galsync_client::lookup::DEFAULT_METADATA_ENDPOINT;
use galsync_core::backoff::BackoffConfig;
use galsync_sync::SyncOptions;
use tracing::Level;

const DEFAULT_TOKEN_FILE: &str = "auth_token.txt";
const DEFAULT_LOG_DEST: &str = "logs";
const DEFAULT_MIN_BACKOFF: f64 = 0.5;
const DEFAULT_MAX_BACKOFF: f64 = 15.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Mirror configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub gallery_url: String,
    pub page_size: u32,
    /// Zero-based page to start from, for resuming an interrupted run.
    pub start_page: u64,
    /// Token from the environment.  When absent the token file and then an
    /// interactive prompt are tried.
    pub auth_token: Option<String>,
    pub auth_token_file: PathBuf,
    pub download_dest: PathBuf,
    pub model_metadata_dest: PathBuf,
    pub model_metadata_url: String,
    pub log_dest: PathBuf,
    pub log_level: Level,
    pub min_backoff: f64,
    pub max_backoff: f64,
    pub resave_metadata: bool,
}

impl MirrorConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var               | Required | Default                  |
    /// |-----------------------|----------|--------------------------|
    /// | `GALLERY_URL`         | yes      | --                       |
    /// | `GALLERY_PAGE_SIZE`   | no       | `30`                     |
    /// | `GALLERY_START_PAGE`  | no       | `0`                      |
    /// | `AUTH_TOKEN`          | no       | --                       |
    /// | `AUTH_TOKEN_FILE`     | no       | `auth_token.txt`         |
    /// | `DOWNLOAD_DEST`       | yes      | --                       |
    /// | `MODEL_METADATA_DEST` | yes      | --                       |
    /// | `MODEL_METADATA_URL`  | no       | public metadata endpoint |
    /// | `LOG_DEST`            | no       | `logs`                   |
    /// | `LOG_LEVEL`           | no       | `info`                   |
    /// | `MIN_BACKOFF`         | no       | `0.5`                    |
    /// | `MAX_BACKOFF`         | no       | `15`                     |
    /// | `RESAVE_METADATA`     | no       | `false`                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        let page_size: u32 = parse_or(get("GALLERY_PAGE_SIZE"), "GALLERY_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 {
            return Err(invalid("GALLERY_PAGE_SIZE", "0", "must be greater than zero"));
        }

        let min_backoff = parse_secs(get("MIN_BACKOFF"), "MIN_BACKOFF", DEFAULT_MIN_BACKOFF)?;
        let max_backoff = parse_secs(get("MAX_BACKOFF"), "MAX_BACKOFF", DEFAULT_MAX_BACKOFF)?;
        if min_backoff > max_backoff {
            return Err(invalid(
                "MIN_BACKOFF",
                &min_backoff.to_string(),
                &format!("must not exceed MAX_BACKOFF ({max_backoff})"),
            ));
        }

        let log_level = match get("LOG_LEVEL") {
            Some(raw) => parse_level(&raw)?,
            None => Level::INFO,
        };

        let resave_metadata = match get("RESAVE_METADATA") {
            Some(raw) => parse_bool("RESAVE_METADATA", &raw)?,
            None => false,
        };

        Ok(Self {
            gallery_url: require("GALLERY_URL")?,
            page_size,
            start_page: parse_or(get("GALLERY_START_PAGE"), "GALLERY_START_PAGE", 0)?,
            auth_token: get("AUTH_TOKEN"),
            auth_token_file: get("AUTH_TOKEN_FILE")
                .unwrap_or_else(|| DEFAULT_TOKEN_FILE.into())
                .into(),
            download_dest: require("DOWNLOAD_DEST")?.into(),
            model_metadata_dest: require("MODEL_METADATA_DEST")?.into(),
            model_metadata_url: get("MODEL_METADATA_URL")
                .unwrap_or_else(|| DEFAULT_METADATA_ENDPOINT.into()),
            log_dest: get("LOG_DEST").unwrap_or_else(|| DEFAULT_LOG_DEST.into()).into(),
            log_level,
            min_backoff,
            max_backoff,
            resave_metadata,
        })
    }

    pub fn backoff(&self) -> BackoffConfig {
        BackoffConfig::with_bounds(self.min_backoff, self.max_backoff)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            resave_metadata: self.resave_metadata,
        }
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| invalid(var, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn parse_secs(raw: Option<String>, var: &'static str, default: f64) -> Result<f64, ConfigError> {
    let secs: f64 = parse_or(raw, var, default)?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid(var, &secs.to_string(), "must be a positive number of seconds"));
    }
    Ok(secs)
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(var, raw, "expected true/false, 1/0 or yes/no")),
    }
}

fn parse_level(raw: &str) -> Result<Level, ConfigError> {
    let normalized = match raw.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        other => other.to_string(),
    };
    normalized
        .parse()
        .map_err(|_| invalid("LOG_LEVEL", raw, "expected trace, debug, info, warn or error"))
}
