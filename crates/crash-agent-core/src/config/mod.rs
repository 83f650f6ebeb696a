use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

mod env;

pub const ENDPOINT_ENV: &str = "CRASH_AGENT_ENDPOINT";
pub const DAMAGE_THRESHOLD_ENV: &str = "CRASH_AGENT_DAMAGE_THRESHOLD";
pub const TICK_INTERVAL_MS_ENV: &str = "CRASH_AGENT_TICK_INTERVAL_MS";
pub const HTTP_TIMEOUT_MS_ENV: &str = "CRASH_AGENT_HTTP_TIMEOUT_MS";
pub const MAX_ATTEMPTS_ENV: &str = "CRASH_AGENT_MAX_ATTEMPTS";
pub const RETRY_DELAY_MS_ENV: &str = "CRASH_AGENT_RETRY_DELAY_MS";
pub const COOLDOWN_MS_ENV: &str = "CRASH_AGENT_COOLDOWN_MS";
pub const MAX_PENDING_ENV: &str = "CRASH_AGENT_MAX_PENDING";
pub const MAX_IN_FLIGHT_ENV: &str = "CRASH_AGENT_MAX_IN_FLIGHT";
pub const HOST_VERSION_ENV: &str = "CRASH_AGENT_HOST_VERSION";
pub const DISPATCH_ENV: &str = "CRASH_AGENT_DISPATCH";

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/api/v1/beamng/crash-event";
const DEFAULT_DAMAGE_THRESHOLD: f64 = 0.05;
const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
const DEFAULT_COOLDOWN_MS: u64 = 2_000;
const DEFAULT_MAX_PENDING: usize = 64;
const DEFAULT_MAX_IN_FLIGHT: usize = 4;
const DEFAULT_HOST_VERSION: &str = "unknown";

/// How the delivery queue runs a transport send relative to the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Each send runs on a detached worker; the tick only polls for its result.
    #[default]
    Background,
    /// The send runs in the drain call. Only for transports that never block.
    Inline,
}

impl DispatchMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "background" => Some(Self::Background),
            "inline" => Some(Self::Inline),
            _ => None,
        }
    }
}

/// Static agent configuration, loaded once when the agent starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub endpoint: String,
    pub damage_threshold: f64,
    pub tick_interval_ms: u64,
    pub http_timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub cooldown_ms: u64,
    pub max_pending: usize,
    pub max_in_flight: usize,
    pub host_version: String,
    pub dispatch: DispatchMode,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            damage_threshold: DEFAULT_DAMAGE_THRESHOLD,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            max_pending: DEFAULT_MAX_PENDING,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            host_version: DEFAULT_HOST_VERSION.to_string(),
            dispatch: DispatchMode::default(),
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config = toml::from_str::<Self>(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Layers `CRASH_AGENT_*` variables over the current values.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(endpoint) = env::read_non_empty_env(ENDPOINT_ENV) {
            self.endpoint = endpoint;
        }
        if let Some(threshold) = env::read_env_f64(DAMAGE_THRESHOLD_ENV) {
            self.damage_threshold = threshold;
        }
        if let Some(value) = env::read_env_u64(TICK_INTERVAL_MS_ENV) {
            self.tick_interval_ms = value;
        }
        if let Some(value) = env::read_env_u64(HTTP_TIMEOUT_MS_ENV) {
            self.http_timeout_ms = value;
        }
        if let Some(value) = env::read_env_u32(MAX_ATTEMPTS_ENV) {
            self.max_attempts = value;
        }
        if let Some(value) = env::read_env_u64(RETRY_DELAY_MS_ENV) {
            self.retry_delay_ms = value;
        }
        if let Some(value) = env::read_env_u64(COOLDOWN_MS_ENV) {
            self.cooldown_ms = value;
        }
        if let Some(value) = env::read_env_usize(MAX_PENDING_ENV) {
            self.max_pending = value;
        }
        if let Some(value) = env::read_env_usize(MAX_IN_FLIGHT_ENV) {
            self.max_in_flight = value;
        }
        if let Some(version) = env::read_non_empty_env(HOST_VERSION_ENV) {
            self.host_version = version;
        }
        if let Some(raw) = env::read_non_empty_env(DISPATCH_ENV) {
            self.dispatch = DispatchMode::parse(&raw).ok_or_else(|| {
                AgentError::Config(format!("unsupported {DISPATCH_ENV} value: {raw}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        parse_endpoint(&self.endpoint)?;
        if !self.damage_threshold.is_finite()
            || self.damage_threshold <= 0.0
            || self.damage_threshold > 1.0
        {
            return Err(AgentError::Config(format!(
                "damage_threshold must be within (0.0, 1.0], got {}",
                self.damage_threshold
            )));
        }
        if self.http_timeout_ms == 0 {
            return Err(AgentError::Config(
                "http_timeout_ms must be >= 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(AgentError::Config("max_attempts must be >= 1".to_string()));
        }
        if self.max_pending == 0 {
            return Err(AgentError::Config("max_pending must be >= 1".to_string()));
        }
        if self.max_in_flight == 0 {
            return Err(AgentError::Config(
                "max_in_flight must be >= 1".to_string(),
            ));
        }
        if self.max_in_flight > self.max_pending {
            return Err(AgentError::Config(format!(
                "max_in_flight ({}) must not exceed max_pending ({})",
                self.max_in_flight, self.max_pending
            )));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Tick length a host should assume when it cannot report its own `dt`.
    pub fn tick_interval_secs(&self) -> f64 {
        millis_to_secs(self.tick_interval_ms)
    }

    pub fn retry_delay_secs(&self) -> f64 {
        millis_to_secs(self.retry_delay_ms)
    }

    pub fn cooldown_secs(&self) -> f64 {
        millis_to_secs(self.cooldown_ms)
    }
}

pub fn parse_endpoint(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|err| AgentError::Config(format!("invalid endpoint: {err}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(AgentError::Config(format!(
                "unsupported endpoint scheme: {other}"
            )));
        }
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(AgentError::Config(
            "endpoint must not include credentials".to_string(),
        ));
    }
    if url.host_str().is_none() {
        return Err(AgentError::Config("endpoint host is missing".to_string()));
    }
    Ok(url)
}

#[allow(
    clippy::cast_precision_loss,
    reason = "configured millisecond intervals are far below f64 mantissa range"
)]
fn millis_to_secs(millis: u64) -> f64 {
    millis as f64 / 1000.0
}
