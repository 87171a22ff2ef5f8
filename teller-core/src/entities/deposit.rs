//! Deposit records and their satellite types.
//!
//! `DepositInfo` is the central entity: one record per observed deposit,
//! keyed by `tx:n`. Records are persisted as version-tolerant documents, so
//! every field defaults when absent.

use serde::{Deserialize, Serialize};

use super::status::DepositStatus;
use super::{BuyMethod, CoinType};
use crate::clients::market::Order;

/// A raw deposit event as delivered by a chain scanner.
///
/// `value` is in the chain's smallest unit (satoshis for BTC, gwei for ETH,
/// droplets for SKY-source).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    #[serde(default)]
    pub coin_type: CoinType,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub value: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub tx: String,
    #[serde(default)]
    pub n: u32,
}

impl Deposit {
    /// Stable record key, `tx + ":" + n`.
    pub fn deposit_id(&self) -> String {
        format!("{}:{}", self.tx, self.n)
    }
}

/// A destination address bound to a source-chain deposit address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundAddress {
    pub sky_address: String,
    pub deposit_address: String,
    pub coin_type: CoinType,
    pub buy_method: BuyMethod,
}

/// Exchange-order bookkeeping for a passthrough deposit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Order reference sent to the exchange; always the deposit id.
    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub status: String,
    /// True once the order reached a final status and was recorded.
    #[serde(default, rename = "final")]
    pub finalized: bool,
    #[serde(default)]
    pub completed_amount: String,
    #[serde(default)]
    pub price: String,
    /// The order as last returned by the exchange, kept for auditing.
    #[serde(default)]
    pub original: Option<Order>,
}

/// Passthrough sub-record of a deposit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassthroughData {
    #[serde(default)]
    pub exchange_name: String,
    /// Source-currency amount requested on the exchange, as a decimal string.
    #[serde(default)]
    pub requested_amount: String,
    /// Source smallest units actually spent once the order completed.
    #[serde(default)]
    pub deposit_value_spent: i64,
    /// Droplets bought once the order completed.
    #[serde(default)]
    pub sky_bought: u64,
    #[serde(default)]
    pub order: OrderSnapshot,
}

/// One deposit's full processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositInfo {
    #[serde(default)]
    pub seq: u64,
    /// Epoch seconds of the last mutation; strictly increases per record.
    #[serde(default)]
    pub updated_at: i64,
    pub status: DepositStatus,
    #[serde(default)]
    pub coin_type: CoinType,
    #[serde(default)]
    pub sky_address: String,
    #[serde(default)]
    pub deposit_address: String,
    #[serde(default)]
    pub deposit_id: String,
    #[serde(default)]
    pub deposit: Deposit,
    /// Source->SKY rate snapshotted at creation; integer, decimal or "num/den".
    #[serde(default)]
    pub conversion_rate: String,
    /// Droplets sent (or to send); filled at send time.
    #[serde(default)]
    pub sky_sent: u64,
    /// Outgoing transaction id, set exactly when WaitConfirm or Done.
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub passthrough: PassthroughData,
    /// Non-empty marks the record terminally errored.
    #[serde(default)]
    pub error: String,
}

impl DepositInfo {
    /// Sanity-check fields required by the record's current status.
    pub fn validate_for_status(&self) -> Result<(), String> {
        use DepositStatus::*;

        if self.deposit_id.is_empty() {
            return Err("deposit id is empty".into());
        }
        if self.sky_address.is_empty() {
            return Err("sky address is empty".into());
        }

        match self.status {
            WaitPassthrough | WaitPassthroughOrderComplete => {
                if self.passthrough.order.customer_id != self.deposit_id {
                    return Err("passthrough customer id does not match deposit id".into());
                }
                if self.status == WaitPassthroughOrderComplete
                    && self.passthrough.order.order_id.is_empty()
                {
                    return Err("passthrough order id is not set".into());
                }
                Ok(())
            }
            WaitConfirm | Done => {
                if self.txid.is_empty() {
                    return Err("txid is not set".into());
                }
                Ok(())
            }
            WaitDeposit | WaitDecide | WaitSend => Ok(()),
        }
    }
}

/// Aggregate counters, maintained in the same transaction that finishes a
/// deposit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositStats {
    pub total_btc_received: i64,
    pub total_eth_received: i64,
    pub total_sky_received: i64,
    pub total_sky_sent: i64,
}
