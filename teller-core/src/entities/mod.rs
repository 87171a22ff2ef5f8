pub mod deposit;
pub mod status;

pub use deposit::{BoundAddress, Deposit, DepositInfo, DepositStats, OrderSnapshot, PassthroughData};
pub use status::DepositStatus;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a coin type string names no supported source chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported coin type")]
pub struct UnsupportedCoinType;

/// Returned when a buy method string is neither "direct" nor "passthrough".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid buy method")]
pub struct InvalidBuyMethod;

/// Source chains a deposit can be observed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoinType {
    #[default]
    #[serde(rename = "BTC")]
    Btc,
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "SKY")]
    Sky,
}

impl CoinType {
    pub const ALL: [CoinType; 3] = [CoinType::Btc, CoinType::Eth, CoinType::Sky];

    pub fn as_str(&self) -> &'static str {
        match self {
            CoinType::Btc => "BTC",
            CoinType::Eth => "ETH",
            CoinType::Sky => "SKY",
        }
    }

    /// Decimal exponent of the chain's smallest unit relative to one coin.
    ///
    /// ETH deposit values are carried in gwei so they fit in an i64.
    pub fn unit_exponent(&self) -> u32 {
        match self {
            CoinType::Btc => 8,
            CoinType::Eth => 9,
            CoinType::Sky => 6,
        }
    }
}

impl std::fmt::Display for CoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CoinType {
    type Err = UnsupportedCoinType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BTC" => Ok(CoinType::Btc),
            "ETH" => Ok(CoinType::Eth),
            "SKY" => Ok(CoinType::Sky),
            _ => Err(UnsupportedCoinType),
        }
    }
}

/// How deposited value is converted into coins to send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuyMethod {
    /// Sell directly from the local hot wallet at the configured rate.
    #[default]
    Direct,
    /// Buy from an external exchange first, then send the amount bought.
    Passthrough,
}

impl BuyMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuyMethod::Direct => "direct",
            BuyMethod::Passthrough => "passthrough",
        }
    }
}

impl std::fmt::Display for BuyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuyMethod {
    type Err = InvalidBuyMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(BuyMethod::Direct),
            "passthrough" => Ok(BuyMethod::Passthrough),
            _ => Err(InvalidBuyMethod),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn coin_type_round_trip() {
        for coin in CoinType::ALL {
            assert_eq!(CoinType::from_str(coin.as_str()), Ok(coin));
        }
        assert_eq!(CoinType::from_str("DOGE"), Err(UnsupportedCoinType));
        assert_eq!(CoinType::from_str("btc"), Err(UnsupportedCoinType));
    }

    #[test]
    fn buy_method_round_trip() {
        assert_eq!(BuyMethod::from_str("direct"), Ok(BuyMethod::Direct));
        assert_eq!(BuyMethod::from_str("passthrough"), Ok(BuyMethod::Passthrough));
        assert_eq!(BuyMethod::from_str("margin"), Err(InvalidBuyMethod));
    }
}
