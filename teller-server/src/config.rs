//! TOML file configuration for the teller daemon.
//!
//! The file structs map the config file directly; `into_runtime` validates
//! them and produces the core [`ExchangeConfig`] plus the server's own
//! settings. Waits are given in seconds.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use teller_core::config::{C2cxConfig, ExchangeConfig};
use teller_core::entities::BuyMethod;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Exchange(#[from] teller_core::config::ConfigError),
}

/// Root configuration as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Where the database file lives.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub teller: TellerSection,

    #[serde(default)]
    pub web: WebSection,

    #[serde(default)]
    pub sky_rpc: SkyRpcSection,

    pub sky_exchanger: SkyExchangerSection,

    #[serde(default)]
    pub dummy: DummySection,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("teller.db")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TellerSection {
    /// Max deposit addresses one sky address may bind; 0 is unlimited.
    #[serde(default = "default_max_bound_addrs")]
    pub max_bound_addrs: u32,
    /// Whether the bind API accepts new bindings.
    #[serde(default = "default_true")]
    pub bind_enabled: bool,
}

impl Default for TellerSection {
    fn default() -> Self {
        Self {
            max_bound_addrs: default_max_bound_addrs(),
            bind_enabled: true,
        }
    }
}

fn default_max_bound_addrs() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSection {
    /// Address the HTTP status API listens on.
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    match "127.0.0.1:7071".parse() {
        Ok(addr) => addr,
        Err(_) => unreachable!("static default listen address parses"),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkyRpcSection {
    /// API root of the skycoin node holding the hot wallet.
    #[serde(default = "default_sky_rpc_address")]
    pub address: String,
}

impl Default for SkyRpcSection {
    fn default() -> Self {
        Self {
            address: default_sky_rpc_address(),
        }
    }
}

fn default_sky_rpc_address() -> String {
    "http://127.0.0.1:6420".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkyExchangerSection {
    /// Wallet file id on the node, e.g. "teller.wlt".
    pub wallet_id: String,
    pub sky_btc_exchange_rate: String,
    pub sky_eth_exchange_rate: String,
    #[serde(default = "default_rate")]
    pub sky_sky_exchange_rate: String,
    #[serde(default = "default_max_decimals")]
    pub max_decimals: u32,
    #[serde(default = "default_confirmation_wait_secs")]
    pub tx_confirmation_check_wait_secs: u64,
    #[serde(default = "default_send_retry_wait_secs")]
    pub send_retry_wait_secs: u64,
    #[serde(default = "default_true")]
    pub send_enabled: bool,
    #[serde(default)]
    pub buy_method: BuyMethod,
    #[serde(default)]
    pub c2cx: C2cxSection,
}

fn default_rate() -> String {
    "1".to_string()
}

fn default_max_decimals() -> u32 {
    3
}

fn default_confirmation_wait_secs() -> u64 {
    5
}

fn default_send_retry_wait_secs() -> u64 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct C2cxSection {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_request_failure_wait_secs")]
    pub request_failure_wait_secs: u64,
    #[serde(default = "default_ratelimit_wait_secs")]
    pub ratelimit_wait_secs: u64,
    #[serde(default = "default_check_order_wait_secs")]
    pub check_order_wait_secs: u64,
    /// Smallest order the exchange accepts, in BTC, as a decimal string.
    #[serde(default = "default_btc_minimum_volume")]
    pub btc_minimum_volume: String,
}

impl Default for C2cxSection {
    fn default() -> Self {
        Self {
            key: String::new(),
            secret: String::new(),
            request_failure_wait_secs: default_request_failure_wait_secs(),
            ratelimit_wait_secs: default_ratelimit_wait_secs(),
            check_order_wait_secs: default_check_order_wait_secs(),
            btc_minimum_volume: default_btc_minimum_volume(),
        }
    }
}

fn default_request_failure_wait_secs() -> u64 {
    10
}

fn default_ratelimit_wait_secs() -> u64 {
    30
}

fn default_check_order_wait_secs() -> u64 {
    2
}

fn default_btc_minimum_volume() -> String {
    "0.005".to_string()
}

/// Fake-collaborator switches for local development.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DummySection {
    /// Register fake scanners and expose deposit injection on the API.
    #[serde(default)]
    pub scanner: bool,
    /// Use a fake wallet sender that auto-confirms transactions.
    #[serde(default)]
    pub sender: bool,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    pub listen: SocketAddr,
    pub bind_enabled: bool,
    pub max_bound_addrs: u32,
    pub sky_rpc_address: String,
    pub wallet_id: String,
    pub dummy_scanner: bool,
    pub dummy_sender: bool,
    pub exchange: ExchangeConfig,
}

impl FileConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Validate and convert into the runtime configuration.
    pub fn into_runtime(self, listen_override: Option<SocketAddr>) -> Result<RuntimeConfig, ConfigError> {
        let ex = &self.sky_exchanger;

        if ex.wallet_id.is_empty() && !self.dummy.sender {
            return Err(ConfigError::Validation(
                "sky_exchanger.wallet_id missing".to_string(),
            ));
        }

        let btc_minimum_volume = ex
            .c2cx
            .btc_minimum_volume
            .parse()
            .map_err(|e| {
                ConfigError::Validation(format!("c2cx.btc_minimum_volume invalid: {e}"))
            })?;

        let exchange = ExchangeConfig {
            sky_btc_exchange_rate: ex.sky_btc_exchange_rate.clone(),
            sky_eth_exchange_rate: ex.sky_eth_exchange_rate.clone(),
            sky_sky_exchange_rate: ex.sky_sky_exchange_rate.clone(),
            max_decimals: ex.max_decimals,
            tx_confirmation_check_wait: Duration::from_secs(ex.tx_confirmation_check_wait_secs),
            send_retry_wait: Duration::from_secs(ex.send_retry_wait_secs),
            send_enabled: ex.send_enabled,
            buy_method: ex.buy_method,
            max_bound_addrs: self.teller.max_bound_addrs,
            c2cx: C2cxConfig {
                key: ex.c2cx.key.clone(),
                secret: ex.c2cx.secret.clone(),
                request_failure_wait: Duration::from_secs(ex.c2cx.request_failure_wait_secs),
                ratelimit_wait: Duration::from_secs(ex.c2cx.ratelimit_wait_secs),
                check_order_wait: Duration::from_secs(ex.c2cx.check_order_wait_secs),
                btc_minimum_volume,
            },
        };

        exchange.validate()?;

        Ok(RuntimeConfig {
            db_path: self.db_path,
            listen: listen_override.unwrap_or(self.web.listen),
            bind_enabled: self.teller.bind_enabled,
            max_bound_addrs: self.teller.max_bound_addrs,
            sky_rpc_address: self.sky_rpc.address,
            wallet_id: self.sky_exchanger.wallet_id,
            dummy_scanner: self.dummy.scanner,
            dummy_sender: self.dummy.sender,
            exchange,
        })
    }

    /// A copy safe for logging, credentials hidden.
    pub fn redacted(&self) -> Self {
        let mut redacted = self.clone();
        if !redacted.sky_exchanger.c2cx.key.is_empty() {
            redacted.sky_exchanger.c2cx.key = "<redacted>".to_string();
        }
        if !redacted.sky_exchanger.c2cx.secret.is_empty() {
            redacted.sky_exchanger.c2cx.secret = "<redacted>".to_string();
        }
        redacted
    }
}
