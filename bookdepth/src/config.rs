use std::time::Duration;

use url::Url;

use crate::backoff::ReconnectPolicy;
use crate::error::{BookError, Result};
use crate::types::Market;

/// Maximum depth the REST endpoints will return.
pub const DEPTH_LIMIT: u16 = 5000;

/// Environment variables that override the default endpoints.
pub const ENV_SPOT_REST_URL: &str = "DEPTHSCOPE_SPOT_REST_URL";
pub const ENV_FUTURES_REST_URL: &str = "DEPTHSCOPE_FUTURES_REST_URL";
pub const ENV_SPOT_WS_URL: &str = "DEPTHSCOPE_SPOT_WS_URL";
pub const ENV_FUTURES_WS_URL: &str = "DEPTHSCOPE_FUTURES_WS_URL";

/// Endpoints and request limits shared by the fetcher and the stream.
#[derive(Debug, Clone)]
pub struct BookConfig {
    /// Full URL of the spot depth endpoint.
    pub spot_rest_url: String,
    /// Full URL of the futures depth endpoint.
    pub futures_rest_url: String,
    /// Base URL for spot raw streams (`<base>/<symbol>@depth`).
    pub spot_ws_url: String,
    /// Base URL for futures raw streams.
    pub futures_ws_url: String,
    /// `limit` query parameter for depth snapshots.
    pub depth_limit: u16,
    /// Upper bound for a single REST call.
    pub request_timeout: Duration,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            spot_rest_url: "https://api.binance.com/api/v3/depth".into(),
            futures_rest_url: "https://fapi.binance.com/fapi/v1/depth".into(),
            spot_ws_url: "wss://stream.binance.com:9443/ws".into(),
            futures_ws_url: "wss://fstream.binance.com/ws".into(),
            depth_limit: DEPTH_LIMIT,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl BookConfig {
    /// Defaults with any `DEPTHSCOPE_*_URL` environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        let overrides = [
            (ENV_SPOT_REST_URL, &mut config.spot_rest_url),
            (ENV_FUTURES_REST_URL, &mut config.futures_rest_url),
            (ENV_SPOT_WS_URL, &mut config.spot_ws_url),
            (ENV_FUTURES_WS_URL, &mut config.futures_ws_url),
        ];
        for (var, slot) in overrides {
            if let Ok(value) = std::env::var(var) {
                *slot = value;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Check that every endpoint parses and uses the expected scheme.
    pub fn validate(&self) -> Result<()> {
        check_url(&self.spot_rest_url, &["http", "https"])?;
        check_url(&self.futures_rest_url, &["http", "https"])?;
        check_url(&self.spot_ws_url, &["ws", "wss"])?;
        check_url(&self.futures_ws_url, &["ws", "wss"])?;
        if self.depth_limit == 0 {
            return Err(BookError::Config("depth limit must be positive".into()));
        }
        Ok(())
    }

    pub fn rest_url(&self, market: Market) -> &str {
        match market {
            Market::Spot => &self.spot_rest_url,
            Market::Futures => &self.futures_rest_url,
        }
    }

    /// Raw diff stream URL for a lower-case stream name.
    pub fn stream_url(&self, market: Market, stream_name: &str) -> String {
        let base = match market {
            Market::Spot => &self.spot_ws_url,
            Market::Futures => &self.futures_ws_url,
        };
        format!("{}/{stream_name}@depth", base.trim_end_matches('/'))
    }
}

/// Settings for one streaming session.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Bound of the raw-message handoff queue. Overflow drops the oldest
    /// message.
    pub queue_capacity: usize,
    /// Seed the store from a REST snapshot and validate diff sequence ids.
    pub seed_from_snapshot: bool,
    pub reconnect: ReconnectPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            seed_from_snapshot: true,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

fn check_url(raw: &str, schemes: &[&str]) -> Result<()> {
    let parsed = Url::parse(raw).map_err(|e| BookError::Config(format!("{raw}: {e}")))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(BookError::Config(format!(
            "{raw}: expected scheme {}",
            schemes.join(" or ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const URL_VARS: [&str; 4] = [
        ENV_SPOT_REST_URL,
        ENV_FUTURES_REST_URL,
        ENV_SPOT_WS_URL,
        ENV_FUTURES_WS_URL,
    ];

    fn clear_url_vars() {
        for var in URL_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn default_config_is_valid() {
        BookConfig::default().validate().unwrap();
    }

    #[test]
    fn stream_url_appends_depth_stream() {
        let config = BookConfig::default();
        assert_eq!(
            config.stream_url(Market::Futures, "btcusdt"),
            "wss://fstream.binance.com/ws/btcusdt@depth"
        );
        assert_eq!(
            config.stream_url(Market::Spot, "ethusdt"),
            "wss://stream.binance.com:9443/ws/ethusdt@depth"
        );
    }

    #[test]
    fn validate_rejects_wrong_scheme() {
        let config = BookConfig {
            spot_ws_url: "https://stream.binance.com".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BookError::Config(_))));
    }

    #[test]
    fn validate_rejects_garbage_url() {
        let config = BookConfig {
            futures_rest_url: "not a url".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn from_env_applies_url_overrides() {
        clear_url_vars();
        std::env::set_var(ENV_FUTURES_REST_URL, "http://127.0.0.1:8080/fapi/v1/depth");
        std::env::set_var(ENV_SPOT_WS_URL, "ws://127.0.0.1:9000/ws");
        let config = BookConfig::from_env();
        clear_url_vars();

        let config = config.unwrap();
        let defaults = BookConfig::default();
        assert_eq!(config.futures_rest_url, "http://127.0.0.1:8080/fapi/v1/depth");
        assert_eq!(config.spot_ws_url, "ws://127.0.0.1:9000/ws");
        assert_eq!(config.spot_rest_url, defaults.spot_rest_url);
        assert_eq!(config.futures_ws_url, defaults.futures_ws_url);
    }

    #[test]
    #[serial]
    fn from_env_rejects_bad_override() {
        clear_url_vars();
        std::env::set_var(ENV_FUTURES_WS_URL, "https://fstream.binance.com/ws");
        let result = BookConfig::from_env();
        clear_url_vars();

        assert!(matches!(result, Err(BookError::Config(_))));
    }

    #[test]
    #[serial]
    fn from_env_without_overrides_is_default() {
        clear_url_vars();
        let config = BookConfig::from_env().unwrap();
        assert_eq!(config.spot_rest_url, BookConfig::default().spot_rest_url);
        assert_eq!(config.depth_limit, DEPTH_LIMIT);
    }
}
