//! Application configuration loaded from environment variables.

use common::Money;
use payments::SettlementConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON log lines, anything else for text
/// - `DATABASE_URL`: PostgreSQL connection string; in-memory stores when unset
/// - `WEBHOOK_SECRET`: shared secret for webhook signatures (default: `"whsec_test"`)
/// - `WEBHOOK_TOLERANCE_SECS`: maximum signature age (default: `300`)
/// - `MIN_CHARGE_CENTS`: smallest chargeable amount (default: `50`)
/// - `CURRENCY`: currency sent to the gateway (default: `"myr"`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub json_logs: bool,
    pub database_url: Option<String>,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub min_charge_cents: i64,
    pub currency: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            json_logs: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            webhook_secret: lookup("WEBHOOK_SECRET").unwrap_or(defaults.webhook_secret),
            webhook_tolerance_secs: lookup("WEBHOOK_TOLERANCE_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.webhook_tolerance_secs),
            min_charge_cents: lookup("MIN_CHARGE_CENTS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_charge_cents),
            currency: lookup("CURRENCY")
                .map(|c| c.to_ascii_lowercase())
                .unwrap_or(defaults.currency),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Charge settings for the settlement processor.
    pub fn settlement(&self) -> SettlementConfig {
        SettlementConfig {
            currency: self.currency.clone(),
            min_charge: Money::from_cents(self.min_charge_cents),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            json_logs: false,
            database_url: None,
            webhook_secret: "whsec_test".to_string(),
            webhook_tolerance_secs: 300,
            min_charge_cents: 50,
            currency: "myr".to_string(),
        }
    }
}
