//! Runtime configuration for the exchange pipeline.
//!
//! These are validated runtime types; file parsing and defaults live in the
//! server binary.

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use crate::entities::{BuyMethod, CoinType};
use crate::utils::math::{self, MAX_DROPLET_PRECISION};

/// Errors produced by configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} invalid: {source}")]
    InvalidRate {
        field: &'static str,
        source: math::RateError,
    },
    #[error("max_decimals is larger than the droplet precision limit {MAX_DROPLET_PRECISION}")]
    MaxDecimalsTooLarge,
    #[error("c2cx.{0} must be set for buy_method passthrough")]
    MissingC2cxCredential(&'static str),
    #[error("c2cx.btc_minimum_volume must be greater than zero")]
    NonPositiveMinimumVolume,
}

/// Tuning for the passthrough market client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct C2cxConfig {
    pub key: String,
    pub secret: String,
    /// Pause before retrying after a generic request failure.
    pub request_failure_wait: Duration,
    /// Pause before retrying after the exchange rate-limits us.
    pub ratelimit_wait: Duration,
    /// Poll period while waiting for an order to finalize.
    pub check_order_wait: Duration,
    /// Smallest order the exchange accepts, in BTC.
    pub btc_minimum_volume: Decimal,
}

impl Default for C2cxConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            secret: String::new(),
            request_failure_wait: Duration::from_secs(10),
            ratelimit_wait: Duration::from_secs(30),
            check_order_wait: Duration::from_secs(2),
            btc_minimum_volume: Decimal::new(5, 3),
        }
    }
}

/// Configuration of the deposit-process-send pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// SKY/BTC rate: integer, decimal, or rational "num/den".
    pub sky_btc_exchange_rate: String,
    pub sky_eth_exchange_rate: String,
    pub sky_sky_exchange_rate: String,
    /// Decimal places the computed SKY amount is truncated to.
    pub max_decimals: u32,
    /// Poll period for outgoing transaction confirmation.
    pub tx_confirmation_check_wait: Duration,
    /// Pause before retrying a failed wallet submit.
    pub send_retry_wait: Duration,
    /// When false the sender accepts work but never submits.
    pub send_enabled: bool,
    pub buy_method: BuyMethod,
    /// Max deposit addresses bound per sky address; 0 means unlimited.
    pub max_bound_addrs: u32,
    pub c2cx: C2cxConfig,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            sky_btc_exchange_rate: "1".to_string(),
            sky_eth_exchange_rate: "1".to_string(),
            sky_sky_exchange_rate: "1".to_string(),
            max_decimals: 3,
            tx_confirmation_check_wait: Duration::from_secs(5),
            send_retry_wait: Duration::from_secs(3),
            send_enabled: true,
            buy_method: BuyMethod::Direct,
            max_bound_addrs: 0,
            c2cx: C2cxConfig::default(),
        }
    }
}

impl ExchangeConfig {
    /// The configured rate for a source coin.
    pub fn rate_for(&self, coin_type: CoinType) -> &str {
        match coin_type {
            CoinType::Btc => &self.sky_btc_exchange_rate,
            CoinType::Eth => &self.sky_eth_exchange_rate,
            CoinType::Sky => &self.sky_sky_exchange_rate,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = [
            ("sky_btc_exchange_rate", &self.sky_btc_exchange_rate),
            ("sky_eth_exchange_rate", &self.sky_eth_exchange_rate),
            ("sky_sky_exchange_rate", &self.sky_sky_exchange_rate),
        ];
        for (field, rate) in rates {
            math::parse_rate(rate).map_err(|source| ConfigError::InvalidRate { field, source })?;
        }

        if self.max_decimals > MAX_DROPLET_PRECISION {
            return Err(ConfigError::MaxDecimalsTooLarge);
        }

        if self.buy_method == BuyMethod::Passthrough {
            if self.c2cx.key.is_empty() {
                return Err(ConfigError::MissingC2cxCredential("key"));
            }
            if self.c2cx.secret.is_empty() {
                return Err(ConfigError::MissingC2cxCredential("secret"));
            }
            if self.c2cx.btc_minimum_volume <= Decimal::ZERO {
                return Err(ConfigError::NonPositiveMinimumVolume);
            }
        }

        Ok(())
    }
}
