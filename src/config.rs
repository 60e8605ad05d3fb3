//! Configuration module for the market maker

use rust_decimal::Decimal;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{MarketMakerError, Result};

/// Exchange environment, selects the default endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Staging,
}

impl Environment {
    fn rest_endpoint(self) -> &'static str {
        match self {
            Environment::Production => "https://api.woo.org",
            Environment::Staging => "https://api.staging.woo.org",
        }
    }

    fn ws_public_endpoint(self, application_id: &str) -> String {
        match self {
            Environment::Production => format!("wss://wss.woo.org/ws/stream/{}", application_id),
            Environment::Staging => {
                format!("wss://wss.staging.woo.org/ws/stream/{}", application_id)
            }
        }
    }

    fn ws_private_endpoint(self, application_id: &str) -> String {
        match self {
            Environment::Production => {
                format!("wss://wss.woo.org/v2/ws/private/stream/{}", application_id)
            }
            Environment::Staging => format!(
                "wss://wss.staging.woo.org/v2/ws/private/stream/{}",
                application_id
            ),
        }
    }
}

impl FromStr for Environment {
    type Err = MarketMakerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            other => Err(MarketMakerError::ConfigError(format!(
                "unknown environment '{}'",
                other
            ))),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,

    /// Application id, templated into the WebSocket endpoints
    pub application_id: String,

    /// Traded symbol (e.g., "PERP_BTC_USDT")
    pub symbol: String,

    /// REST API base endpoint
    pub rest_endpoint: String,

    /// Public market data WebSocket endpoint
    pub ws_public_endpoint: String,

    /// Private account WebSocket endpoint
    pub ws_private_endpoint: String,

    /// Levels requested per side for the REST order book snapshot
    pub snapshot_depth: usize,

    /// Orders placed on each side of the ladder
    pub quote_count: u32,

    /// Order size in base currency
    pub quote_size: Decimal,

    /// Spread between the best price and each ladder rung, compounded
    pub quote_spread: Decimal,

    pub tick_interval_ms: u64,
    pub readiness_poll_ms: u64,

    /// Reconnection settings
    pub reconnect_delay_ms: u64,
    pub recv_timeout_secs: u64,

    /// Upper bound on concurrently in-flight order submissions
    pub max_inflight_orders: usize,

    /// Port of the health check server
    pub health_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment: Environment = env_or("ENVIRONMENT", Environment::Production)?;
        let application_id = env::var("APPLICATION_ID").unwrap_or_default();

        let config = Self {
            environment,
            symbol: env::var("SYMBOL")
                .unwrap_or_else(|_| "PERP_BTC_USDT".to_string())
                .trim()
                .to_uppercase(),
            rest_endpoint: env::var("REST_ENDPOINT")
                .unwrap_or_else(|_| environment.rest_endpoint().to_string()),
            ws_public_endpoint: env::var("WS_PUBLIC_ENDPOINT")
                .unwrap_or_else(|_| environment.ws_public_endpoint(&application_id)),
            ws_private_endpoint: env::var("WS_PRIVATE_ENDPOINT")
                .unwrap_or_else(|_| environment.ws_private_endpoint(&application_id)),
            application_id,
            snapshot_depth: env_or("SNAPSHOT_DEPTH", 100)?,
            quote_count: env_or("QUOTE_COUNT", 2)?,
            quote_size: env_or("QUOTE_SIZE", Decimal::new(1, 3))?,
            quote_spread: env_or("QUOTE_SPREAD", Decimal::new(1, 3))?,
            tick_interval_ms: env_or("TICK_INTERVAL_MS", 1000)?,
            readiness_poll_ms: env_or("READINESS_POLL_MS", 1000)?,
            reconnect_delay_ms: env_or("RECONNECT_DELAY_MS", 1000)?,
            recv_timeout_secs: env_or("RECV_TIMEOUT_SECS", 45)?,
            max_inflight_orders: env_or("MAX_INFLIGHT_ORDERS", 8)?,
            health_port: env_or("HEALTH_PORT", 9090)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.quote_spread <= Decimal::ZERO {
            return Err(MarketMakerError::ConfigError(
                "QUOTE_SPREAD must be positive".to_string(),
            ));
        }
        if self.quote_size <= Decimal::ZERO {
            return Err(MarketMakerError::ConfigError(
                "QUOTE_SIZE must be positive".to_string(),
            ));
        }
        if self.max_inflight_orders == 0 {
            return Err(MarketMakerError::ConfigError(
                "MAX_INFLIGHT_ORDERS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn readiness_poll(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_secs(self.recv_timeout_secs)
    }
}

/// Read and parse an environment variable, falling back to `default` when
/// it is unset. A value that is set but unparsable is an error.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e| {
            MarketMakerError::ConfigError(format!("invalid {} '{}': {}", name, raw, e))
        }),
        Err(_) => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        let environment = Environment::Production;
        Self {
            environment,
            application_id: String::new(),
            symbol: "PERP_BTC_USDT".to_string(),
            rest_endpoint: environment.rest_endpoint().to_string(),
            ws_public_endpoint: environment.ws_public_endpoint(""),
            ws_private_endpoint: environment.ws_private_endpoint(""),
            snapshot_depth: 100,
            quote_count: 2,
            quote_size: Decimal::new(1, 3),
            quote_spread: Decimal::new(1, 3),
            tick_interval_ms: 1000,
            readiness_poll_ms: 1000,
            reconnect_delay_ms: 1000,
            recv_timeout_secs: 45,
            max_inflight_orders: 8,
            health_port: 9090,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_endpoints() {
        assert_eq!(
            Environment::Staging.ws_public_endpoint("app"),
            "wss://wss.staging.woo.org/ws/stream/app"
        );
        assert_eq!(
            Environment::Production.ws_private_endpoint("app"),
            "wss://wss.woo.org/v2/ws/private/stream/app"
        );
        assert_eq!("Staging".parse::<Environment>().unwrap(), Environment::Staging);
        assert!("mainnet".parse::<Environment>().is_err());
    }

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quote_spread, Decimal::new(1, 3));
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_validate_rejects_zero_spread() {
        let config = Config {
            quote_spread: Decimal::ZERO,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MarketMakerError::ConfigError(_))
        ));
    }
}
