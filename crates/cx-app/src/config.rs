use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use directories::ProjectDirs;
use tracing::debug;

use crate::error::AppError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub api_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub session_file: PathBuf,
}

/// Values given on the command line. They win over the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn load(overrides: &Overrides) -> Result<Self, AppError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => debug!("ignoring .env: {}", e),
        }

        Self::from_lookup(|key| env::var(key).ok(), overrides)
    }

    pub fn from_lookup<F>(lookup: F, overrides: &Overrides) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = overrides
            .api_url
            .clone()
            .or_else(|| lookup("CHARTEX_API_URL"))
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let interval_ms = match overrides.interval_ms {
            Some(ms) => ms,
            None => parse_var(&lookup, "CHARTEX_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
        };
        if interval_ms == 0 {
            return Err(AppError::Config {
                key: "CHARTEX_POLL_INTERVAL_MS",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let timeout_secs = match overrides.timeout_secs {
            Some(secs) => secs,
            None => parse_var(&lookup, "CHARTEX_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
        };
        if timeout_secs == 0 {
            return Err(AppError::Config {
                key: "CHARTEX_REQUEST_TIMEOUT_SECS",
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let session_file = match lookup("CHARTEX_SESSION_FILE").filter(|p| !p.trim().is_empty()) {
            Some(path) => PathBuf::from(path),
            None => default_session_file()?,
        };

        Ok(Self {
            api_url,
            poll_interval: Duration::from_millis(interval_ms),
            request_timeout: Duration::from_secs(timeout_secs),
            session_file,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| AppError::Config {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn default_session_file() -> Result<PathBuf, AppError> {
    let dirs = ProjectDirs::from("", "", "chartex").ok_or(AppError::NoConfigDir)?;
    Ok(dirs.config_dir().join("session.json"))
}
