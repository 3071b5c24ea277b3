//! Pipeline configuration management

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::services::logging::{LogFormat, LoggingConfig};
use crate::services::rate_limiter::RateLimiterConfig;
use crate::services::request::{BypassConfig, RequestClientConfig};

/// Pipeline configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Base64 encoded 256-bit key for encrypted source fields.
    /// Optional at load time; the field codec refuses to start without it.
    pub source_security_key: Option<String>,

    /// Anti-bot bypass backend (FlareSolverr), only when enabled and a URL is set
    pub bypass: Option<BypassConfig>,

    /// Outbound request defaults
    pub request: RequestClientConfig,

    /// Adaptive rate limiter tuning and state directory
    pub rate_limiter: RateLimiterConfig,

    /// Subscriber output settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load `.env` (if present) and then read the environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let source_security_key = env::var("SOURCE_SECURITY_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let bypass_enabled = env::var("ENABLE_FLARESOLVERR")
            .map(|v| parse_bool(&v))
            .unwrap_or(false);

        let bypass = match (bypass_enabled, env::var("FLARESOLVERR_URL").ok()) {
            (true, Some(url)) if !url.trim().is_empty() => Some(BypassConfig {
                url: url.trim().trim_end_matches('/').to_string(),
                max_timeout_ms: env::var("FLARESOLVERR_MAX_TIMEOUT_MS")
                    .unwrap_or_else(|_| "60000".to_string())
                    .parse()
                    .context("Invalid FLARESOLVERR_MAX_TIMEOUT_MS")?,
            }),
            (true, _) => {
                tracing::warn!("ENABLE_FLARESOLVERR is set but FLARESOLVERR_URL is missing, bypass disabled");
                None
            }
            _ => None,
        };

        let request = RequestClientConfig {
            timeout_ms: env::var("REQUEST_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .context("Invalid REQUEST_TIMEOUT_MS")?,
            ..RequestClientConfig::default()
        };

        let defaults = RateLimiterConfig::default();
        let rate_limiter = RateLimiterConfig {
            state_dir: env::var("RATE_LIMIT_STATE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            initial_window_ms: env::var("RATE_LIMIT_INITIAL_WINDOW_MS")
                .ok()
                .map(|v| v.parse().context("Invalid RATE_LIMIT_INITIAL_WINDOW_MS"))
                .transpose()?
                .unwrap_or(defaults.initial_window_ms),
            initial_limit: env::var("RATE_LIMIT_INITIAL_LIMIT")
                .ok()
                .map(|v| v.parse().context("Invalid RATE_LIMIT_INITIAL_LIMIT"))
                .transpose()?
                .unwrap_or(defaults.initial_limit),
        };

        let logging = LoggingConfig {
            format: env::var("LOG_FORMAT")
                .ok()
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(LogFormat::Json),
            default_filter: env::var("RUST_LOG").unwrap_or_else(|_| "scout=info".to_string()),
        };

        Ok(Self {
            source_security_key,
            bypass,
            request,
            rate_limiter,
            logging,
        })
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("1"));
        assert!(parse_bool(" TRUE "));
        assert!(!parse_bool("false"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn test_default_config_is_memory_only_without_bypass() {
        let config = Config::default();
        assert!(config.bypass.is_none());
        assert!(config.rate_limiter.state_dir.is_none());
        assert!(config.source_security_key.is_none());
    }
}
