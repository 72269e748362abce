use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "http://localhost:5000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

const API_URL_VAR: &str = "SIMDASH_API_URL";
const EVENTS_URL_VAR: &str = "SIMDASH_EVENTS_URL";
const TIMEOUT_VAR: &str = "SIMDASH_REQUEST_TIMEOUT_SECS";
const DOWNLOAD_DIR_VAR: &str = "SIMDASH_DOWNLOAD_DIR";
const RECONNECT_VAR: &str = "SIMDASH_STREAM_RECONNECT";
const LOG_STDOUT_VAR: &str = "SIMDASH_LOG_STDOUT";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{source_name} is not a valid URL ('{value}'): {reason}")]
    InvalidUrl {
        source_name: &'static str,
        value: String,
        reason: String,
    },
    #[error("{source_name} must use {expected}, got '{scheme}'")]
    UnsupportedScheme {
        source_name: &'static str,
        expected: &'static str,
        scheme: String,
    },
    #[error("{source_name} must be a whole number of seconds greater than 0, got '{value}'")]
    InvalidTimeout {
        source_name: &'static str,
        value: String,
    },
    #[error("{source_name} must be one of 1/0, true/false, yes/no, on/off, got '{value}'")]
    InvalidFlag {
        source_name: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: Url,
    pub events_url: Url,
    pub request_timeout: Duration,
    pub download_dir: PathBuf,
    pub stream_reconnect: bool,
    pub log_stdout: bool,
}

/// Values given on the command line. Each one wins over its environment
/// variable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub api_url: Option<String>,
    pub events_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub download_dir: Option<PathBuf>,
    pub stream_reconnect: Option<bool>,
}

impl ClientConfig {
    pub fn load(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve(|key| std::env::var(key).ok(), overrides)
    }

    pub fn resolve<F>(lookup: F, overrides: &ConfigOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_url = match (&overrides.api_url, env(API_URL_VAR)) {
            (Some(raw), _) => parse_http_url("--api-url", raw)?,
            (None, Some(raw)) => parse_http_url(API_URL_VAR, &raw)?,
            (None, None) => parse_http_url("default API URL", DEFAULT_API_URL)?,
        };

        let events_url = match (&overrides.events_url, env(EVENTS_URL_VAR)) {
            (Some(raw), _) => parse_ws_url("--events-url", raw)?,
            (None, Some(raw)) => parse_ws_url(EVENTS_URL_VAR, &raw)?,
            (None, None) => derive_events_url(&api_url)?,
        };

        let request_timeout = match (overrides.request_timeout_secs, env(TIMEOUT_VAR)) {
            (Some(0), _) => {
                return Err(ConfigError::InvalidTimeout {
                    source_name: "--timeout-secs",
                    value: "0".to_string(),
                })
            }
            (Some(secs), _) => Duration::from_secs(secs),
            (None, Some(raw)) => parse_timeout(TIMEOUT_VAR, &raw)?,
            (None, None) => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };

        let download_dir = overrides
            .download_dir
            .clone()
            .or_else(|| env(DOWNLOAD_DIR_VAR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));

        let stream_reconnect = match (overrides.stream_reconnect, env(RECONNECT_VAR)) {
            (Some(flag), _) => flag,
            (None, Some(raw)) => flag_value(RECONNECT_VAR, &raw)?,
            (None, None) => false,
        };

        let log_stdout = env(LOG_STDOUT_VAR)
            .map(|raw| flag_value(LOG_STDOUT_VAR, &raw))
            .transpose()?
            .unwrap_or(false);

        Ok(Self {
            api_url,
            events_url,
            request_timeout,
            download_dir,
            stream_reconnect,
            log_stdout,
        })
    }
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn flag_value(source_name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    parse_bool_flag(raw).ok_or_else(|| ConfigError::InvalidFlag {
        source_name,
        value: raw.trim().to_string(),
    })
}

fn parse_timeout(source_name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidTimeout {
            source_name,
            value: raw.trim().to_string(),
        })
}

fn parse_url(source_name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidUrl {
        source_name,
        value: raw.trim().to_string(),
        reason: err.to_string(),
    })
}

fn parse_http_url(source_name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = parse_url(source_name, raw)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme {
            source_name,
            expected: "http or https",
            scheme: other.to_string(),
        }),
    }
}

fn parse_ws_url(source_name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = parse_url(source_name, raw)?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme {
            source_name,
            expected: "ws or wss",
            scheme: other.to_string(),
        }),
    }
}

/// Socket.IO endpoint served next to the REST API.
pub fn derive_events_url(api_url: &Url) -> Result<Url, ConfigError> {
    let scheme = if api_url.scheme() == "https" { "wss" } else { "ws" };
    let host = api_url.host_str().unwrap_or("localhost");
    let authority = match api_url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    parse_ws_url(
        "derived events URL",
        &format!("{scheme}://{authority}/socket.io/?EIO=4&transport=websocket"),
    )
}
