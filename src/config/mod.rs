//! Layered settings: built-in defaults, then `.env` and the flat
//! deployment variables, then `CINEMA__SECTION__KEY` overrides.

use serde::Deserialize;
use std::collections::HashMap;
use std::env;

// Top-level configuration, one section per concern
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub payment: PaymentConfig,
    pub booking: BookingConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// `production` switches logging to JSON.
    pub environment: String,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub rust_log: String,
    /// Shared secret operators send in `x-admin-token`. Empty disables
    /// every operator route.
    pub admin_token: String,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    /// Upper bound on pooled Postgres connections.
    pub pool_size: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// Lifetime of a cached seat map; writes also invalidate it.
    pub seat_map_ttl_secs: u64,
}

// Payment gateway (PayPal REST API)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub gateway_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Currency the gateway charges in.
    pub currency: String,
    /// Local currency units per one unit of `currency`.
    pub fx_rate: f64,
    /// Where the gateway sends the buyer after approval.
    pub return_url: String,
    pub cancel_url: String,
    /// Per-request bound; a timeout counts as a gateway failure.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    /// How long a pending booking holds its seats.
    pub hold_minutes: i64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Open period before a trial call, and the longest a trial may run.
    pub timeout_seconds: u64,
}

// Flat environment variables kept for compatibility with the deployment scripts
const ENV_KEYS: &[(&str, &str)] = &[
    ("HOST", "app.host"),
    ("PORT", "app.port"),
    ("ENVIRONMENT", "app.environment"),
    ("RUST_LOG", "app.rust_log"),
    ("ADMIN_TOKEN", "app.admin_token"),
    ("DATABASE_URL", "database.url"),
    ("DB_POOL_SIZE", "database.pool_size"),
    ("REDIS_URL", "redis.url"),
    ("SEAT_MAP_TTL_SECS", "redis.seat_map_ttl_secs"),
    ("PAYPAL_API_URL", "payment.gateway_url"),
    ("PAYPAL_CLIENT_ID", "payment.client_id"),
    ("PAYPAL_CLIENT_SECRET", "payment.client_secret"),
    ("PAYMENT_CURRENCY", "payment.currency"),
    ("PAYMENT_FX_RATE", "payment.fx_rate"),
    ("PAYMENT_RETURN_URL", "payment.return_url"),
    ("PAYMENT_CANCEL_URL", "payment.cancel_url"),
    ("BOOKING_HOLD_MINUTES", "booking.hold_minutes"),
    ("SWEEP_INTERVAL_SECS", "booking.sweep_interval_secs"),
    ("CIRCUIT_BREAKER_FAILURE_THRESHOLD", "circuit_breaker.failure_threshold"),
    ("CIRCUIT_BREAKER_TIMEOUT_SECONDS", "circuit_breaker.timeout_seconds"),
];

impl Config {
    /// Loads defaults, then flat env vars, then `CINEMA__SECTION__KEY` overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        let flat: HashMap<String, String> = ENV_KEYS
            .iter()
            .filter_map(|(var, _)| env::var(var).ok().map(|value| (var.to_string(), value)))
            .collect();
        Self::from_sources(&flat, None)
    }

    /// `prefixed` stands in for the process environment of the `CINEMA__`
    /// layer when given.
    fn from_sources(
        flat: &HashMap<String, String>,
        prefixed: Option<config::Map<String, String>>,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 8000)?
            .set_default("app.environment", "development")?
            .set_default("app.rust_log", "cinema_booking=debug,tower_http=debug")?
            .set_default("app.admin_token", "")?
            .set_default("database.pool_size", 20)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("redis.seat_map_ttl_secs", 30)?
            .set_default("payment.gateway_url", "https://api-m.sandbox.paypal.com")?
            .set_default("payment.client_id", "")?
            .set_default("payment.client_secret", "")?
            .set_default("payment.currency", "USD")?
            .set_default("payment.fx_rate", 25_000.0)?
            .set_default("payment.return_url", "http://localhost:8000/api/payments/return")?
            .set_default("payment.cancel_url", "http://localhost:8000/api/payments/cancel")?
            .set_default("payment.request_timeout_secs", 15)?
            .set_default("booking.hold_minutes", 120)?
            .set_default("booking.sweep_interval_secs", 60)?
            .set_default("circuit_breaker.failure_threshold", 5)?
            .set_default("circuit_breaker.timeout_seconds", 60)?;

        // Flat vars replace defaults but stay below every source
        for (var, key) in ENV_KEYS {
            if let Some(value) = flat.get(*var) {
                builder = builder.set_default(*key, value.as_str())?;
            }
        }

        let cfg: Config = builder
            .add_source(
                config::Environment::with_prefix("CINEMA")
                    .separator("__")
                    .try_parsing(true)
                    .source(prefixed),
            )
            .build()?
            .try_deserialize()?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.database.url.is_empty() {
            return Err(config::ConfigError::NotFound("database.url".into()));
        }
        if !(self.payment.fx_rate.is_finite() && self.payment.fx_rate > 0.0) {
            return Err(config::ConfigError::Message(
                "payment.fx_rate must be a positive number".into(),
            ));
        }
        if self.booking.hold_minutes <= 0 {
            return Err(config::ConfigError::Message(
                "booking.hold_minutes must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn flat_vars_replace_defaults() {
        let flat = vars(&[("DATABASE_URL", "postgres://db/cinema"), ("PORT", "9000")]);
        let cfg = Config::from_sources(&flat, Some(config::Map::new())).unwrap();
        assert_eq!(cfg.app.port, 9000);
        assert_eq!(cfg.database.url, "postgres://db/cinema");
        assert_eq!(cfg.booking.hold_minutes, 120);
        assert!(cfg.app.admin_token.is_empty());
    }

    #[test]
    fn prefixed_vars_win_over_flat_ones() {
        let flat = vars(&[
            ("DATABASE_URL", "postgres://db/cinema"),
            ("PORT", "9000"),
            ("ADMIN_TOKEN", "from-flat"),
        ]);
        let prefixed = vars(&[
            ("CINEMA__APP__PORT", "9100"),
            ("CINEMA__APP__ADMIN_TOKEN", "from-prefixed"),
        ]);
        let cfg = Config::from_sources(&flat, Some(prefixed)).unwrap();
        assert_eq!(cfg.app.port, 9100);
        assert_eq!(cfg.app.admin_token, "from-prefixed");
    }

    #[test]
    fn rejects_a_non_positive_hold() {
        let flat = vars(&[
            ("DATABASE_URL", "postgres://db/cinema"),
            ("BOOKING_HOLD_MINUTES", "0"),
        ]);
        assert!(Config::from_sources(&flat, Some(config::Map::new())).is_err());
    }
}
