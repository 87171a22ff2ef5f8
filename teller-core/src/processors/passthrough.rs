//! Passthrough processor.
//!
//! For each deposit it places a market buy on the exchange and waits for
//! the fill, advancing the record
//! `waiting_decide -> waiting_passthrough -> waiting_passthrough_order_complete
//! -> waiting_send`. Market orders spend an amount of BTC rather than
//! naming a SKY volume, so the amount bought is only known once the order
//! completes.
//!
//! The deposit id doubles as the exchange-side customer id. That makes a
//! lost database write recoverable: on startup the exchange's order list is
//! matched by customer id against records still at `waiting_passthrough`,
//! so an order is never placed twice for one deposit.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clients::market::{ExchangeMarket, MarketError, OrderId, OrderStatus, TradePair};
use crate::config::ExchangeConfig;
use crate::entities::{CoinType, DepositInfo, DepositStatus};
use crate::events::{DepositInfoReceiver, DepositInfoSender};
use crate::store::{Store, StoreError};
use crate::utils::math::{
    calculate_btc_spent, calculate_requested_amount, calculate_sky_bought, ConvertError,
};

use super::{mark_deposit_errored, sleep_or_shutdown, StatusHandle};

/// Exchange name recorded on passthrough deposits.
pub const EXCHANGE_NAME_C2CX: &str = "c2cx";

/// Errors raised while advancing a passthrough deposit.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Market(#[from] MarketError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("only BTC deposits are accepted for passthrough")]
    UnsupportedCoinType,

    #[error("deposit status cannot be handled: {0}")]
    DepositStatusInvalid(DepositStatus),

    #[error("deposit record is invalid: {0}")]
    InvalidDeposit(String),

    #[error("exchange reported order id {actual}, expected {stored}")]
    OrderIdMismatch { actual: OrderId, stored: String },

    #[error("exchange reported customer id {actual:?}, expected {stored}")]
    CustomerIdMismatch {
        actual: Option<String>,
        stored: String,
    },

    #[error("shutting down")]
    Quit,
}

/// What to do about a processing error. Derived from the error kind alone;
/// this function is the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    /// Wait `request_failure_wait`, then retry the same deposit.
    Retry,
    /// Wait `ratelimit_wait`, then retry the same deposit.
    RetryRateLimited,
    /// Give up on the deposit and record its error marker.
    Fail,
    /// Stop processing without touching the deposit.
    Quit,
}

/// Classify an error for the per-deposit retry loop.
///
/// Exchange API errors are retried, except the order-volume rejection
/// ("limit value:" prefix) which is fatal. Rate limiting, whether reported
/// as HTTP 429 or as a "Too Many Requests" API message, retries on the
/// rate-limit pause. Network and parse failures are retried. Everything
/// else fails the deposit.
pub fn classify(err: &ProcessError) -> TradeAction {
    match err {
        ProcessError::Market(MarketError::Api { message }) => {
            if message.starts_with("limit value:") {
                TradeAction::Fail
            } else if message == "Too Many Requests" {
                TradeAction::RetryRateLimited
            } else {
                TradeAction::Retry
            }
        }
        ProcessError::Market(MarketError::RateLimited) => TradeAction::RetryRateLimited,
        ProcessError::Market(_) => TradeAction::Retry,
        ProcessError::Quit => TradeAction::Quit,
        _ => TradeAction::Fail,
    }
}

pub struct Passthrough {
    cfg: ExchangeConfig,
    store: Arc<Store>,
    market: Arc<dyn ExchangeMarket>,
    deposits_rx: DepositInfoReceiver,
    out_tx: DepositInfoSender,
    shutdown_rx: watch::Receiver<bool>,
    status: StatusHandle,
}

impl Passthrough {
    pub(crate) fn new(
        cfg: ExchangeConfig,
        store: Arc<Store>,
        market: Arc<dyn ExchangeMarket>,
        deposits_rx: DepositInfoReceiver,
        out_tx: DepositInfoSender,
        shutdown_rx: watch::Receiver<bool>,
        status: StatusHandle,
    ) -> Self {
        Self {
            cfg,
            store,
            market,
            deposits_rx,
            out_tx,
            shutdown_rx,
            status,
        }
    }

    pub async fn run(mut self) {
        info!("passthrough processor started");

        // Orders may have been placed without the order id reaching the
        // database. Recover those before doing anything else, so the
        // backlog below cannot place a second order for the same deposit.
        match self.fix_unrecorded_orders().await {
            Ok(recovered) if !recovered.is_empty() => {
                info!(recovered = recovered.len(), "recovered unrecorded orders for deposits");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "order recovery sweep failed");
                self.status.set_err(&e);
                return;
            }
        }

        if !self.process_backlog().await {
            info!("passthrough processor shutdown complete");
            return;
        }

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("passthrough processor received shutdown signal");
                        break;
                    }
                }

                di = self.deposits_rx.recv() => {
                    match di {
                        Some(di) => {
                            if !self.dispatch(di).await {
                                break;
                            }
                        }
                        None => {
                            info!("receiver hand-off channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("passthrough processor shutdown complete");
    }

    /// Reload deposits interrupted mid-passthrough. Returns false when
    /// shutdown interrupted the drain.
    async fn process_backlog(&mut self) -> bool {
        let statuses = [
            DepositStatus::WaitPassthroughOrderComplete,
            DepositStatus::WaitPassthrough,
        ];

        for status in statuses {
            let backlog = match self
                .store
                .get_deposit_info_array(|di| di.status == status && di.error.is_empty())
                .await
            {
                Ok(backlog) => backlog,
                Err(e) => {
                    error!(error = %e, status = %status, "failed to load passthrough backlog");
                    return true;
                }
            };

            if !backlog.is_empty() {
                info!(deposits = backlog.len(), status = %status, "resuming passthrough deposits");
            }

            for di in backlog {
                if *self.shutdown_rx.borrow() {
                    return false;
                }
                if !self.dispatch(di).await {
                    return false;
                }
            }
        }

        true
    }

    /// Drive one incoming record. Returns false when the pipeline is done.
    async fn dispatch(&self, di: DepositInfo) -> bool {
        match di.status {
            DepositStatus::WaitDecide
            | DepositStatus::WaitPassthrough
            | DepositStatus::WaitPassthroughOrderComplete => {
                if let Some(done) = self.process_deposit(di).await {
                    info!(deposit_id = %done.deposit_id, "deposit processed");
                    if self.out_tx.send(done).await.is_err() {
                        info!("sender hand-off channel closed");
                        return false;
                    }
                }
                true
            }
            DepositStatus::WaitSend => self.out_tx.send(di).await.is_ok(),
            other => {
                warn!(status = %other, "ignoring deposit in unexpected status");
                true
            }
        }
    }

    /// Advance a single deposit until it reaches `waiting_send` or fails.
    ///
    /// Transient exchange failures loop on the same deposit with the
    /// configured pauses; nothing is advanced between attempts.
    async fn process_deposit(&self, mut di: DepositInfo) -> Option<DepositInfo> {
        let mut shutdown_rx = self.shutdown_rx.clone();

        info!(deposit_id = %di.deposit_id, status = %di.status, "processing passthrough deposit");

        loop {
            if *shutdown_rx.borrow() {
                return None;
            }

            match self.handle_deposit_info_state(di.clone()).await {
                Ok(next) => {
                    di = next;
                    self.status.set_ok();
                    if di.status == DepositStatus::WaitSend {
                        return Some(di);
                    }
                }
                Err(err) => {
                    self.status.set_err(&err);
                    let action = classify(&err);

                    if !matches!(err, ProcessError::Quit) {
                        error!(
                            deposit_id = %di.deposit_id,
                            action = ?action,
                            error = %err,
                            "handling deposit state failed"
                        );
                    }

                    match action {
                        TradeAction::Retry => {
                            if !sleep_or_shutdown(&mut shutdown_rx, self.cfg.c2cx.request_failure_wait)
                                .await
                            {
                                return None;
                            }
                        }
                        TradeAction::RetryRateLimited => {
                            if !sleep_or_shutdown(&mut shutdown_rx, self.cfg.c2cx.ratelimit_wait)
                                .await
                            {
                                return None;
                            }
                        }
                        TradeAction::Fail => {
                            error!(
                                deposit_id = %di.deposit_id,
                                "deposit failed; it will not be reprocessed until teller is restarted"
                            );
                            mark_deposit_errored(&self.store, &di.deposit_id, &err.to_string())
                                .await;
                            return None;
                        }
                        TradeAction::Quit => return None,
                    }
                }
            }
        }
    }

    /// One step of the per-deposit state machine.
    async fn handle_deposit_info_state(
        &self,
        di: DepositInfo,
    ) -> Result<DepositInfo, ProcessError> {
        di.validate_for_status()
            .map_err(ProcessError::InvalidDeposit)?;

        if di.coin_type != CoinType::Btc {
            return Err(ProcessError::UnsupportedCoinType);
        }

        match di.status {
            DepositStatus::WaitDecide => {
                let requested = calculate_requested_amount(
                    di.deposit.value,
                    TradePair::BtcSky.price_precision(),
                );

                let updated = self
                    .store
                    .update_deposit_info(&di.deposit_id, move |mut d| {
                        d.status = DepositStatus::WaitPassthrough;
                        d.passthrough.exchange_name = EXCHANGE_NAME_C2CX.to_string();
                        d.passthrough.requested_amount = requested.to_string();
                        d.passthrough.order.customer_id = d.deposit_id.clone();
                        d
                    })
                    .await?;

                info!(deposit_id = %updated.deposit_id, "deposit ready for order placement");
                Ok(updated)
            }

            DepositStatus::WaitPassthrough => {
                // If the balance on the exchange is too low the order stays
                // suspended until it recovers; the polling stage waits it out.
                let order_id = self.place_order(&di).await?;

                info!(deposit_id = %di.deposit_id, order_id, "placed market order");

                // If this write fails, the order exists without a record of
                // its id; the startup sweep recovers it by customer id.
                let updated = self
                    .store
                    .update_deposit_info(&di.deposit_id, move |mut d| {
                        d.status = DepositStatus::WaitPassthroughOrderComplete;
                        d.passthrough.order.order_id = order_id.to_string();
                        d
                    })
                    .await?;

                Ok(updated)
            }

            DepositStatus::WaitPassthroughOrderComplete => {
                let new_di = self.wait_order_complete(di).await?;

                let deposit_id = new_di.deposit_id.clone();
                let updated = self
                    .store
                    .update_deposit_info(&deposit_id, move |_| {
                        let mut d = new_di;
                        d.status = DepositStatus::WaitSend;
                        d
                    })
                    .await?;

                info!(deposit_id = %updated.deposit_id, "deposit ready to send");
                Ok(updated)
            }

            other => Err(ProcessError::DepositStatusInvalid(other)),
        }
    }

    async fn place_order(&self, di: &DepositInfo) -> Result<OrderId, ProcessError> {
        let customer_id = &di.passthrough.order.customer_id;
        if customer_id.is_empty() {
            return Err(ProcessError::InvalidDeposit(
                "customer id is not set".to_string(),
            ));
        }

        let amount = Decimal::from_str(&di.passthrough.requested_amount).map_err(|e| {
            ProcessError::InvalidDeposit(format!(
                "requested amount {:?} is not a decimal: {e}",
                di.passthrough.requested_amount
            ))
        })?;

        Ok(self
            .market
            .market_buy(TradePair::BtcSky, amount, customer_id)
            .await?)
    }

    /// Poll the order until it reaches a final status, recording the
    /// outcome on the deposit.
    ///
    /// A fatal final status is recorded too and the deposit continues to
    /// `waiting_send` with nothing bought; the sender rejects the empty
    /// send and marks the record errored.
    async fn wait_order_complete(&self, mut di: DepositInfo) -> Result<DepositInfo, ProcessError> {
        let order_id: OrderId = di.passthrough.order.order_id.parse().map_err(|_| {
            ProcessError::InvalidDeposit(format!(
                "order id {:?} is not numeric",
                di.passthrough.order.order_id
            ))
        })?;

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if !sleep_or_shutdown(&mut shutdown_rx, self.cfg.c2cx.check_order_wait).await {
                return Err(ProcessError::Quit);
            }

            let order = self.market.get_order_info(TradePair::BtcSky, order_id).await?;

            debug!(deposit_id = %di.deposit_id, order_status = %order.status, "polled order");

            // Don't trust the exchange API.
            if order.order_id != order_id {
                return Err(ProcessError::OrderIdMismatch {
                    actual: order.order_id,
                    stored: di.passthrough.order.order_id.clone(),
                });
            }
            if order.customer_id.as_deref() != Some(di.passthrough.order.customer_id.as_str()) {
                return Err(ProcessError::CustomerIdMismatch {
                    actual: order.customer_id.clone(),
                    stored: di.passthrough.order.customer_id.clone(),
                });
            }

            if order.status.is_transient() {
                debug!(deposit_id = %di.deposit_id, "order status has not finalized");
                continue;
            }

            if order.status == OrderStatus::Completed {
                info!(deposit_id = %di.deposit_id, order_id, "order completed");

                // The completed amount is not adjusted for the exchange
                // commission, which the API does not report; the fee is
                // eaten.
                let sky_bought = match calculate_sky_bought(order.completed_amount) {
                    Ok(v) => v,
                    Err(e) => {
                        error!(
                            deposit_id = %di.deposit_id,
                            error = %e,
                            "calculating the amount bought failed, no coins will be sent"
                        );
                        0
                    }
                };

                let btc_spent =
                    calculate_btc_spent(order.completed_amount, order.avg_price).unwrap_or(0);

                di.passthrough.sky_bought = sky_bought;
                di.passthrough.deposit_value_spent = btc_spent;
                record_final_order(&mut di, &order);

                return Ok(di);
            }

            // Any other final status is fatal for the order; record it and
            // let the deposit continue with nothing bought.
            error!(
                deposit_id = %di.deposit_id,
                order_status = %order.status,
                "fatal order status encountered"
            );
            record_final_order(&mut di, &order);

            return Ok(di);
        }
    }

    /// Match exchange orders against deposits whose order placement was
    /// never recorded, and bring the records up to date.
    ///
    /// Orders cannot be looked up by customer id, so the full order list is
    /// scanned for customer ids matching a `waiting_passthrough` deposit.
    async fn fix_unrecorded_orders(&self) -> Result<Vec<DepositInfo>, ProcessError> {
        let deposits = self
            .store
            .get_deposit_info_array(|di| {
                di.status == DepositStatus::WaitPassthrough && di.error.is_empty()
            })
            .await?;

        if deposits.is_empty() {
            info!("no waiting_passthrough deposits found");
            return Ok(Vec::new());
        }

        info!(deposits = deposits.len(), "found waiting_passthrough deposits");

        let mut by_customer_id: HashMap<String, DepositInfo> =
            HashMap::with_capacity(deposits.len());
        for di in deposits {
            if di.passthrough.order.customer_id.is_empty() {
                return Err(ProcessError::InvalidDeposit(
                    "waiting_passthrough deposit unexpectedly has no customer id".to_string(),
                ));
            }
            by_customer_id.insert(di.passthrough.order.customer_id.clone(), di);
        }

        info!("listing exchange orders to recover placed orders");
        let orders = self
            .market
            .get_orders_by_status(TradePair::BtcSky, OrderStatus::All)
            .await?;

        let mut updates = Vec::new();
        for order in orders {
            let Some(cid) = &order.customer_id else {
                continue;
            };
            let Some(di) = by_customer_id.remove(cid) else {
                continue;
            };

            let order_id = order.order_id;
            let updated = self
                .store
                .update_deposit_info(&di.deposit_id, move |mut d| {
                    d.status = DepositStatus::WaitPassthroughOrderComplete;
                    d.passthrough.order.order_id = order_id.to_string();
                    d
                })
                .await?;

            info!(deposit_id = %updated.deposit_id, order_id, "recovered order for deposit");
            updates.push(updated);
        }

        Ok(updates)
    }
}

fn record_final_order(di: &mut DepositInfo, order: &crate::clients::market::Order) {
    di.passthrough.order.status = order.status.to_string();
    di.passthrough.order.finalized = true;
    di.passthrough.order.completed_amount = order.completed_amount.to_string();
    di.passthrough.order.price = order.avg_price.to_string();
    di.passthrough.order.original = Some(order.clone());
}
