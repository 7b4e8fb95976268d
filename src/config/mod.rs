//! Application configuration module
//!
//! Type-safe configuration loaded with the `config` and `dotenvy` crates.
//! Sources, lowest precedence first:
//!
//! 1. `.env` (development)
//! 2. An optional file `billing-ledger.{toml,yaml,json}`, or the path in
//!    `BILLING_LEDGER_CONFIG`
//! 3. Environment variables with the `BILLING_LEDGER` prefix, `__` between
//!    nested keys
//!
//! # Example
//!
//! ```no_run
//! use billing_ledger::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod billing;
mod database;
mod email;
mod error;
mod payment;
mod server;

pub use billing::{BillingConfig, BundleEntry, PriceEntry, TierAllotment};
pub use database::DatabaseConfig;
pub use email::EmailConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_VAR: &str = "BILLING_LEDGER_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "billing-ledger";

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    /// Stripe webhook verification
    pub payment: PaymentConfig,

    /// Notification email delivery
    #[serde(default)]
    pub email: EmailConfig,

    /// Bundle, price and tier catalog
    #[serde(default)]
    pub billing: BillingConfig,
}

impl AppConfig {
    /// Load configuration from the file and environment sources.
    ///
    /// # Environment Variable Format
    ///
    /// - `BILLING_LEDGER__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `BILLING_LEDGER__PAYMENT__STRIPE_WEBHOOK_SECRET=whsec_...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required values are missing or cannot be
    /// parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let file = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => config::File::with_name(&path).required(true),
            Err(_) => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::default()
                    .prefix("BILLING_LEDGER")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration sections.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate()?;
        self.email.validate()?;
        self.billing.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
