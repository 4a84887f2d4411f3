//! Resolved client configuration.
//!
//! The core never reads the environment. The CLI gathers flags and
//! environment variables into a `ClientConfig` and hands it over as a value.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.linkedin.com/rest";
pub const DEFAULT_LINKEDIN_VERSION: &str = "202406";
pub const DEFAULT_RESTLI_PROTOCOL_VERSION: &str = "2.0.0";

/// GET URLs longer than this many bytes are tunneled in `Auto` mode.
pub const DEFAULT_URL_LENGTH_THRESHOLD: usize = 3800;

/// When to rewrite a query-only request as a tunneled POST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TunnelMode {
    /// Tunnel only when the URL exceeds the length threshold.
    #[default]
    Auto,
    Always,
    Never,
}

impl FromStr for TunnelMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "auto" => Ok(TunnelMode::Auto),
            "always" => Ok(TunnelMode::Always),
            "never" => Ok(TunnelMode::Never),
            other => Err(Error::Configuration(format!(
                "invalid tunnel mode {other} (expected auto|always|never)"
            ))),
        }
    }
}

/// Bounded exponential backoff for transport failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A policy that retries without sleeping. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before the attempt following attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Clone)]
pub struct ClientConfig {
    pub access_token: String,
    pub linkedin_version: String,
    pub base_url: String,
    pub restli_protocol_version: String,
    pub tunnel_mode: TunnelMode,
    pub url_length_threshold: usize,
    pub retry: RetryPolicy,
    pub timeout: Option<Duration>,
    pub default_ad_account_id: Option<String>,
    pub default_asset_id: Option<String>,
}

impl ClientConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            linkedin_version: DEFAULT_LINKEDIN_VERSION.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            restli_protocol_version: DEFAULT_RESTLI_PROTOCOL_VERSION.to_string(),
            tunnel_mode: TunnelMode::default(),
            url_length_threshold: DEFAULT_URL_LENGTH_THRESHOLD,
            retry: RetryPolicy::default(),
            timeout: None,
            default_ad_account_id: None,
            default_asset_id: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(Error::Configuration(
                "access token missing (set LINKEDIN_ACCESS_TOKEN or --access-token)".to_string(),
            ));
        }
        let url = Url::parse(&self.base_url).map_err(|e| {
            Error::Configuration(format!("invalid base URL {}: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "base URL must be http or https: {}",
                self.base_url
            )));
        }
        if self.linkedin_version.trim().is_empty() {
            return Err(Error::Configuration("LinkedIn API version is empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Configuration(
                "retry budget must allow at least one attempt".to_string(),
            ));
        }
        Ok(())
    }

    /// Absolute URL for an API path. Absolute inputs are returned unchanged.
    pub fn endpoint(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("access_token", &"<redacted>")
            .field("linkedin_version", &self.linkedin_version)
            .field("base_url", &self.base_url)
            .field("restli_protocol_version", &self.restli_protocol_version)
            .field("tunnel_mode", &self.tunnel_mode)
            .field("url_length_threshold", &self.url_length_threshold)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish()
    }
}
