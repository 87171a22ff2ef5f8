//! C2CX REST client implementing the exchange-market contract.
//!
//! Requests are form-encoded with an `apiKey` parameter and an HMAC-SHA256
//! signature over the alphabetically sorted parameters. Application errors
//! arrive in a `{code, message, data}` envelope; HTTP 429 is reported as
//! [`MarketError::RateLimited`] so the retry policy can act on the variant.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::str::FromStr;

use super::market::{ExchangeMarket, MarketError, Order, OrderId, OrderStatus, TradePair};

const C2CX_API_URL: &str = "https://api.c2cx.com/v2";

/// Signed HTTP client for the C2CX trade API.
pub struct C2cxClient {
    key: String,
    secret: String,
    base_url: String,
    http_client: reqwest::Client,
}

impl C2cxClient {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
            base_url: C2CX_API_URL.to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Point the client at a different endpoint, for testing.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<T, MarketError> {
        params.push(("apiKey", self.key.clone()));
        params.sort_by(|a, b| a.0.cmp(b.0));

        let sign = sign_params(&self.secret, &params)?;
        params.push(("sign", sign));

        let response = self
            .http_client
            .post(format!("{}/{}", self.base_url, endpoint))
            .form(&params)
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketError::RateLimited);
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| MarketError::Parse(e.to_string()))?;

        if envelope.code != 200 {
            return Err(MarketError::Api {
                message: envelope.message,
            });
        }

        envelope
            .data
            .ok_or_else(|| MarketError::Parse("response envelope has no data".to_string()))
    }
}

#[async_trait]
impl ExchangeMarket for C2cxClient {
    async fn market_buy(
        &self,
        pair: TradePair,
        amount: Decimal,
        customer_id: &str,
    ) -> Result<OrderId, MarketError> {
        let data: CreateOrderData = self
            .call(
                "createOrder",
                vec![
                    ("symbol", pair.symbol().to_string()),
                    ("side", "buy".to_string()),
                    ("orderType", "market".to_string()),
                    ("amount", amount.to_string()),
                    ("cid", customer_id.to_string()),
                ],
            )
            .await?;

        Ok(data.order_id)
    }

    async fn get_order_info(
        &self,
        pair: TradePair,
        order_id: OrderId,
    ) -> Result<Order, MarketError> {
        let order: C2cxOrder = self
            .call(
                "getOrderInfo",
                vec![
                    ("symbol", pair.symbol().to_string()),
                    ("orderId", order_id.to_string()),
                ],
            )
            .await?;

        order.try_into()
    }

    async fn get_orders_by_status(
        &self,
        pair: TradePair,
        status: OrderStatus,
    ) -> Result<Vec<Order>, MarketError> {
        let orders: Vec<C2cxOrder> = self
            .call(
                "getOrderByStatus",
                vec![
                    ("symbol", pair.symbol().to_string()),
                    ("status", order_status_code(status).to_string()),
                ],
            )
            .await?;

        orders.into_iter().map(Order::try_from).collect()
    }
}

fn sign_params(secret: &str, params: &[(&'static str, String)]) -> Result<String, MarketError> {
    let payload = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| MarketError::Network("invalid signing key".to_string()))?;
    mac.update(payload.as_bytes());

    let digest = mac.finalize().into_bytes();
    Ok(digest.iter().map(|b| format!("{b:02X}")).collect())
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderData {
    order_id: OrderId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct C2cxOrder {
    order_id: OrderId,
    #[serde(default)]
    cid: Option<String>,
    status: i32,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    avg_price: String,
    #[serde(default)]
    completed_amount: String,
}

impl TryFrom<C2cxOrder> for Order {
    type Error = MarketError;

    fn try_from(order: C2cxOrder) -> Result<Self, MarketError> {
        Ok(Order {
            order_id: order.order_id,
            customer_id: order.cid,
            status: order_status_from_code(order.status)?,
            amount: parse_amount(&order.amount)?,
            price: parse_amount(&order.price)?,
            avg_price: parse_amount(&order.avg_price)?,
            completed_amount: parse_amount(&order.completed_amount)?,
        })
    }
}

fn parse_amount(s: &str) -> Result<Decimal, MarketError> {
    if s.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(s).map_err(|e| MarketError::Parse(format!("invalid amount {s:?}: {e}")))
}

fn order_status_code(status: OrderStatus) -> i32 {
    match status {
        OrderStatus::All => 0,
        OrderStatus::Pending => 1,
        OrderStatus::Active => 2,
        OrderStatus::Partial => 3,
        OrderStatus::Completed => 4,
        OrderStatus::Cancelled => 5,
        OrderStatus::Expired => 6,
        OrderStatus::Suspended => 7,
        OrderStatus::TriggerPending => 8,
        OrderStatus::StopLossPending => 9,
    }
}

fn order_status_from_code(code: i32) -> Result<OrderStatus, MarketError> {
    Ok(match code {
        0 => OrderStatus::All,
        1 => OrderStatus::Pending,
        2 => OrderStatus::Active,
        3 => OrderStatus::Partial,
        4 => OrderStatus::Completed,
        5 => OrderStatus::Cancelled,
        6 => OrderStatus::Expired,
        7 => OrderStatus::Suspended,
        8 => OrderStatus::TriggerPending,
        9 => OrderStatus::StopLossPending,
        other => {
            return Err(MarketError::Parse(format!("unknown order status {other}")));
        }
    })
}
