//! Configuration module for loading and parsing TOML configuration files.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse TOML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// Invalid configuration value.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Optional PostgreSQL journal.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// API key and rate limit settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Order store retention.
    #[serde(default)]
    pub orders: OrdersConfig,
    /// Markets registered with the matching engines at startup.
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port number to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string.
    pub url: String,
    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Raw admin API key registered at startup.
    #[serde(default)]
    pub admin_key: Option<String>,
    /// Requests per minute for anonymous clients.
    #[serde(default = "default_rate_limit")]
    pub default_rate_limit: u32,
}

fn default_rate_limit() -> u32 {
    100
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_key: None,
            default_rate_limit: default_rate_limit(),
        }
    }
}

/// Retention settings for closed orders.
#[derive(Debug, Clone, Deserialize)]
pub struct OrdersConfig {
    /// How often to run cleanup (in seconds).
    pub cleanup_interval_secs: u64,
    /// Age threshold for closed/canceled orders to be removed (in seconds).
    pub max_age_secs: i64,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 300,
            max_age_secs: 86_400,
        }
    }
}

/// Market family.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    /// Spot market settled in ECO wallets.
    Ecosystem,
    /// Margin market settled in FUTURES wallets.
    Futures,
}

impl MarketKind {
    /// Lowercase name used in routes and journal rows.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::Ecosystem => "ecosystem",
            MarketKind::Futures => "futures",
        }
    }
}

/// Market configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Market family.
    pub kind: MarketKind,
    /// Base currency (e.g., "BTC").
    pub currency: String,
    /// Quote currency (e.g., "USDT").
    pub pair: String,
    /// Taker fee rate (0.001 = 0.1%).
    #[serde(default)]
    pub taker_fee: Decimal,
    /// Maker fee rate.
    #[serde(default)]
    pub maker_fee: Decimal,
    /// Minimum order amount in base units.
    #[serde(default)]
    pub min_amount: Decimal,
    /// Maximum leverage (futures only).
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
}

fn default_max_leverage() -> u32 {
    1
}

impl MarketConfig {
    /// Returns the market symbol in `CURRENCY/PAIR` form.
    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.currency, self.pair)
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Returns error if content cannot be parsed.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `HOST`, `PORT` and `DATABASE_URL` overrides from the environment.
    ///
    /// # Errors
    /// Returns error if `PORT` is not a valid port number.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("PORT must be a number: {}", port)))?;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            let max_connections = self
                .database
                .as_ref()
                .map_or_else(default_max_connections, |db| db.max_connections);
            self.database = Some(DatabaseConfig {
                url,
                max_connections,
            });
        }
        self.validate()
    }

    /// Validates the configuration values.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue(
                "server port must be non-zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for market in &self.markets {
            if market.currency.is_empty() || market.pair.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "market currency and pair cannot be empty".to_string(),
                ));
            }
            if market.taker_fee.is_sign_negative() || market.maker_fee.is_sign_negative() {
                return Err(ConfigError::InvalidValue(format!(
                    "market {} fees must not be negative",
                    market.symbol()
                )));
            }
            if market.max_leverage == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "market {} max_leverage must be positive",
                    market.symbol()
                )));
            }
            if !seen.insert((market.kind == MarketKind::Futures, market.symbol())) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate market {}",
                    market.symbol()
                )));
            }
        }

        Ok(())
    }
}
