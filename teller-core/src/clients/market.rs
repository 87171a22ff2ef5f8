//! Exchange-market contract consumed by the passthrough processor.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of an order on the exchange.
pub type OrderId = i64;

/// A tradeable pair. Passthrough is hard-wired to BTC->SKY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradePair {
    #[serde(rename = "BTC_SKY")]
    BtcSky,
}

impl TradePair {
    pub fn symbol(&self) -> &'static str {
        match self {
            TradePair::BtcSky => "BTC_SKY",
        }
    }

    /// Decimal places the exchange accepts for amounts on this pair.
    pub fn price_precision(&self) -> u32 {
        match self {
            TradePair::BtcSky => 6,
        }
    }
}

impl std::fmt::Display for TradePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Exchange-side order state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Query filter matching every status.
    All,
    Pending,
    Active,
    Partial,
    Completed,
    Cancelled,
    Expired,
    Suspended,
    TriggerPending,
    StopLossPending,
}

impl OrderStatus {
    /// Whether the order is still being worked by the exchange and should
    /// be polled again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            OrderStatus::Partial
                | OrderStatus::Pending
                | OrderStatus::Active
                | OrderStatus::Suspended
                | OrderStatus::TriggerPending
                | OrderStatus::StopLossPending
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::All => "all",
            OrderStatus::Pending => "pending",
            OrderStatus::Active => "active",
            OrderStatus::Partial => "partial",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
            OrderStatus::Suspended => "suspended",
            OrderStatus::TriggerPending => "trigger_pending",
            OrderStatus::StopLossPending => "stop_loss_pending",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    /// Client order reference; teller sets this to the deposit id.
    #[serde(default)]
    pub customer_id: Option<String>,
    pub status: OrderStatus,
    /// Amount originally requested, in the source currency.
    #[serde(default)]
    pub amount: Decimal,
    /// Limit price, zero for market orders.
    #[serde(default)]
    pub price: Decimal,
    /// Average fill price.
    #[serde(default)]
    pub avg_price: Decimal,
    /// Whole coins bought so far.
    #[serde(default)]
    pub completed_amount: Decimal,
}

/// Errors from the exchange client, classified for the retry policy.
#[derive(Debug, Error)]
pub enum MarketError {
    /// The exchange answered with an application-level error.
    #[error("exchange API error: {message}")]
    Api { message: String },

    /// The exchange rate-limited the request.
    #[error("rate limited by the exchange")]
    RateLimited,

    /// The request never produced a usable response.
    #[error("exchange request failed: {0}")]
    Network(String),

    /// The response could not be decoded.
    #[error("exchange response parse error: {0}")]
    Parse(String),
}

/// Market operations the passthrough processor depends on.
#[async_trait]
pub trait ExchangeMarket: Send + Sync {
    /// Place a market buy spending `amount` of the source currency,
    /// tagged with the caller's `customer_id`. Returns the order id.
    async fn market_buy(
        &self,
        pair: TradePair,
        amount: Decimal,
        customer_id: &str,
    ) -> Result<OrderId, MarketError>;

    /// Fetch one order by id.
    async fn get_order_info(&self, pair: TradePair, order_id: OrderId)
        -> Result<Order, MarketError>;

    /// List orders on the pair matching a status filter.
    async fn get_orders_by_status(
        &self,
        pair: TradePair,
        status: OrderStatus,
    ) -> Result<Vec<Order>, MarketError>;
}
