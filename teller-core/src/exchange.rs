//! Exchange service: owns the deposit-process-send pipeline.
//!
//! Construction wires the hand-off channels, spawns the three workers, and
//! returns a handle exposing address binding and the query surface.
//! `shutdown` broadcasts the stop signal and waits for every worker to
//! drain its current operation.

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use std::sync::{Arc, Mutex, PoisonError};

use crate::clients::market::ExchangeMarket;
use crate::clients::scanner::{Multiplexer, ScannerError};
use crate::clients::wallet::{Balance, SendError, WalletSender};
use crate::config::{ConfigError, ExchangeConfig};
use crate::entities::{BoundAddress, BuyMethod, CoinType, DepositInfo, DepositStats, DepositStatus};
use crate::events::{deposit_info_channel, DepositNoteReceiver};
use crate::processors::{DirectBuy, Passthrough, Receiver, Sender, StatusHandle};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("exchange requires buy method {expected}, configuration says {actual}")]
    WrongBuyMethod {
        expected: BuyMethod,
        actual: BuyMethod,
    },
}

#[derive(Debug, Error)]
pub enum BindError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scanner(#[from] ScannerError),
}

/// Per-deposit status row exposed by the status API.
#[derive(Debug, Clone, Serialize)]
pub struct DepositStatusSummary {
    pub seq: u64,
    pub updated_at: i64,
    pub status: DepositStatus,
    pub coin_type: CoinType,
}

/// Handle to a running exchange pipeline.
pub struct Exchange {
    cfg: ExchangeConfig,
    store: Arc<Store>,
    multiplexer: Arc<Multiplexer>,
    wallet: Arc<dyn WalletSender>,
    processor_status: StatusHandle,
    sender_status: StatusHandle,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Exchange {
    /// Start a direct-buy exchange: deposits are paid from the hot wallet
    /// at the configured rate.
    pub fn direct(
        cfg: ExchangeConfig,
        store: Arc<Store>,
        multiplexer: Arc<Multiplexer>,
        notes_rx: DepositNoteReceiver,
        wallet: Arc<dyn WalletSender>,
    ) -> Result<Self, ExchangeError> {
        cfg.validate()?;
        if cfg.buy_method != BuyMethod::Direct {
            return Err(ExchangeError::WrongBuyMethod {
                expected: BuyMethod::Direct,
                actual: cfg.buy_method,
            });
        }

        Ok(Self::start(cfg, store, multiplexer, notes_rx, wallet, None))
    }

    /// Start a passthrough exchange: deposits are first bought on the
    /// market, then paid from the hot wallet.
    pub fn passthrough(
        cfg: ExchangeConfig,
        store: Arc<Store>,
        multiplexer: Arc<Multiplexer>,
        notes_rx: DepositNoteReceiver,
        wallet: Arc<dyn WalletSender>,
        market: Arc<dyn ExchangeMarket>,
    ) -> Result<Self, ExchangeError> {
        cfg.validate()?;
        if cfg.buy_method != BuyMethod::Passthrough {
            return Err(ExchangeError::WrongBuyMethod {
                expected: BuyMethod::Passthrough,
                actual: cfg.buy_method,
            });
        }

        Ok(Self::start(cfg, store, multiplexer, notes_rx, wallet, Some(market)))
    }

    fn start(
        cfg: ExchangeConfig,
        store: Arc<Store>,
        multiplexer: Arc<Multiplexer>,
        notes_rx: DepositNoteReceiver,
        wallet: Arc<dyn WalletSender>,
        market: Option<Arc<dyn ExchangeMarket>>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (received_tx, received_rx) = deposit_info_channel();
        let (processed_tx, processed_rx) = deposit_info_channel();

        let processor_status = StatusHandle::new();
        let sender_status = StatusHandle::new();

        let receiver = Receiver::new(
            cfg.clone(),
            store.clone(),
            notes_rx,
            received_tx,
            shutdown_rx.clone(),
        );
        let mut handles = vec![tokio::spawn(receiver.run())];

        match market {
            None => {
                let processor = DirectBuy::new(
                    received_rx,
                    processed_tx,
                    shutdown_rx.clone(),
                    processor_status.clone(),
                );
                handles.push(tokio::spawn(processor.run()));
            }
            Some(market) => {
                let processor = Passthrough::new(
                    cfg.clone(),
                    store.clone(),
                    market,
                    received_rx,
                    processed_tx,
                    shutdown_rx.clone(),
                    processor_status.clone(),
                );
                handles.push(tokio::spawn(processor.run()));
            }
        }

        let sender = Sender::new(
            cfg.clone(),
            store.clone(),
            wallet.clone(),
            processed_rx,
            shutdown_rx,
            sender_status.clone(),
        );
        handles.push(tokio::spawn(sender.run()));

        info!(buy_method = %cfg.buy_method, "exchange service started");

        Self {
            cfg,
            store,
            multiplexer,
            wallet,
            processor_status,
            sender_status,
            shutdown_tx,
            handles: Mutex::new(handles),
        }
    }

    /// Stop the pipeline and wait for all workers to finish.
    pub async fn shutdown(&self) {
        info!("shutting down exchange service");
        let _ = self.shutdown_tx.send(true);

        let handles = std::mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            let _ = handle.await;
        }
        info!("exchange service shutdown complete");
    }

    /// Bind a deposit address to a sky address and start watching it.
    ///
    /// The coin type must have a registered scanner; the binding is
    /// persisted before the address is handed to the scanner.
    pub async fn bind_address(
        &self,
        sky_address: &str,
        deposit_address: &str,
        coin_type: CoinType,
    ) -> Result<BoundAddress, BindError> {
        if !self.multiplexer.supports(coin_type) {
            return Err(ScannerError::UnsupportedCoinType(coin_type).into());
        }

        let bound = self
            .store
            .bind_address(sky_address, deposit_address, coin_type, self.cfg.buy_method)
            .await?;

        self.multiplexer.add_scan_address(coin_type, deposit_address)?;

        info!(
            sky_address,
            deposit_address,
            coin_type = %coin_type,
            buy_method = %self.cfg.buy_method,
            "bound deposit address"
        );

        Ok(bound)
    }

    /// Status rows for every deposit destined for a sky address.
    pub async fn deposit_statuses(
        &self,
        sky_address: &str,
    ) -> Result<Vec<DepositStatusSummary>, StoreError> {
        let deposits = self.store.get_deposit_info_of_sky_address(sky_address).await?;
        Ok(deposits
            .into_iter()
            .map(|di| DepositStatusSummary {
                seq: di.seq,
                updated_at: di.updated_at,
                status: di.status,
                coin_type: di.coin_type,
            })
            .collect())
    }

    /// All deposits matching a predicate.
    pub async fn deposits<F>(&self, filter: F) -> Result<Vec<DepositInfo>, StoreError>
    where
        F: Fn(&DepositInfo) -> bool,
    {
        self.store.get_deposit_info_array(filter).await
    }

    /// Deposits that entered a terminal error state.
    pub async fn errored_deposits(&self) -> Result<Vec<DepositInfo>, StoreError> {
        self.store
            .get_deposit_info_array(|di| !di.error.is_empty())
            .await
    }

    /// Number of deposit addresses bound to a sky address.
    pub async fn bind_num(&self, sky_address: &str) -> Result<usize, StoreError> {
        Ok(self.store.get_sky_bind_addresses(sky_address).await?.len())
    }

    /// Aggregate deposit counters.
    pub async fn deposit_stats(&self) -> Result<DepositStats, StoreError> {
        self.store.get_deposit_stats().await
    }

    /// Coins left in the hot wallet.
    pub async fn balance(&self) -> Result<Balance, SendError> {
        self.wallet.balance().await
    }

    /// Last processing error of the processor, if any.
    pub fn processor_status(&self) -> Option<String> {
        self.processor_status.get()
    }

    /// Last processing error of the sender, if any.
    pub fn sender_status(&self) -> Option<String> {
        self.sender_status.get()
    }
}
