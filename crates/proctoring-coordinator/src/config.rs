use std::env;
use std::time::Duration;

use proctoring_attempt_client::{AttemptClientConfig, DEFAULT_TIMEOUT_MS};
use serde_json::Value;
use thiserror::Error;

use crate::unload::DEFAULT_UNLOAD_WARNING;

pub const DEFAULT_WORKER_PING_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub base_url: Option<String>,
    pub http_timeout_ms: u64,
    pub csrf_token: Option<String>,
    /// Unset or blank disables the worker path entirely.
    pub worker_entry_point: Option<String>,
    pub worker_response_timeout: Option<Duration>,
    pub worker_ping_timeout: Duration,
    pub worker_options: Option<Value>,
    pub unload_warning: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid PROCTORING_HTTP_TIMEOUT_MS: {0}")]
    InvalidHttpTimeoutMs(String),
    #[error("invalid PROCTORING_WORKER_RESPONSE_TIMEOUT_MS: {0}")]
    InvalidWorkerResponseTimeoutMs(String),
    #[error("invalid PROCTORING_WORKER_PING_TIMEOUT_MS: {0}")]
    InvalidWorkerPingTimeoutMs(String),
    #[error("invalid PROCTORING_WORKER_OPTIONS: {0}")]
    InvalidWorkerOptions(String),
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            http_timeout_ms: DEFAULT_TIMEOUT_MS,
            csrf_token: None,
            worker_entry_point: None,
            worker_response_timeout: None,
            worker_ping_timeout: Duration::from_millis(DEFAULT_WORKER_PING_TIMEOUT_MS),
            worker_options: None,
            unload_warning: DEFAULT_UNLOAD_WARNING.to_string(),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        parse_config_from_env(|key| env::var(key).ok())
    }

    #[must_use]
    pub fn attempt_client_config(&self) -> AttemptClientConfig {
        AttemptClientConfig {
            base_url: self.base_url.clone(),
            timeout_ms: self.http_timeout_ms,
            csrf_token: self.csrf_token.clone(),
        }
    }
}

fn parse_config_from_env(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<CoordinatorConfig, ConfigError> {
    let defaults = CoordinatorConfig::default();

    let http_timeout_ms = parse_with_lookup(
        &lookup,
        "PROCTORING_HTTP_TIMEOUT_MS",
        defaults.http_timeout_ms,
        |raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|error| ConfigError::InvalidHttpTimeoutMs(error.to_string()))
        },
    )?;
    let worker_response_timeout = parse_with_lookup(
        &lookup,
        "PROCTORING_WORKER_RESPONSE_TIMEOUT_MS",
        None,
        |raw| {
            let raw = raw.trim();
            if raw.is_empty() {
                return Ok(None);
            }
            raw.parse::<u64>()
                .map(|ms| Some(Duration::from_millis(ms)))
                .map_err(|error| ConfigError::InvalidWorkerResponseTimeoutMs(error.to_string()))
        },
    )?;
    let worker_ping_timeout = parse_with_lookup(
        &lookup,
        "PROCTORING_WORKER_PING_TIMEOUT_MS",
        defaults.worker_ping_timeout,
        |raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|error| ConfigError::InvalidWorkerPingTimeoutMs(error.to_string()))
        },
    )?;
    let worker_options = parse_with_lookup(&lookup, "PROCTORING_WORKER_OPTIONS", None, |raw| {
        if raw.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(&raw) {
            Ok(value @ Value::Object(_)) => Ok(Some(value)),
            Ok(_) => Err(ConfigError::InvalidWorkerOptions(
                "expected a JSON object".to_string(),
            )),
            Err(error) => Err(ConfigError::InvalidWorkerOptions(error.to_string())),
        }
    })?;

    Ok(CoordinatorConfig {
        base_url: non_blank(lookup("PROCTORING_BASE_URL")),
        http_timeout_ms,
        csrf_token: non_blank(lookup("PROCTORING_CSRF_TOKEN")),
        worker_entry_point: non_blank(lookup("PROCTORING_WORKER_ENTRY_POINT")),
        worker_response_timeout,
        worker_ping_timeout,
        worker_options,
        unload_warning: non_blank(lookup("PROCTORING_UNLOAD_WARNING"))
            .unwrap_or(defaults.unload_warning),
    })
}

fn parse_with_lookup<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    parser: impl FnOnce(String) -> Result<T, ConfigError>,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => parser(raw),
        None => Ok(default),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
