//! Sender: moves `waiting_send` records through `waiting_confirm` to `done`.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clients::wallet::WalletSender;
use crate::config::ExchangeConfig;
use crate::entities::{BuyMethod, DepositInfo, DepositStatus};
use crate::events::DepositInfoReceiver;
use crate::store::Store;
use crate::utils::math::calculate_sky_value;

use super::{mark_deposit_errored, sleep_or_shutdown, StatusHandle};

/// Submits outgoing transactions for processed deposits and polls for their
/// confirmation.
///
/// On startup the store is rescanned for `waiting_send` and
/// `waiting_confirm` records, which is how work interrupted by a crash is
/// resumed. Records are re-fetched before processing, so a record queued
/// twice is only worked once.
pub struct Sender {
    cfg: ExchangeConfig,
    store: Arc<Store>,
    wallet: Arc<dyn WalletSender>,
    deposits_rx: DepositInfoReceiver,
    shutdown_rx: watch::Receiver<bool>,
    status: StatusHandle,
}

impl Sender {
    pub(crate) fn new(
        cfg: ExchangeConfig,
        store: Arc<Store>,
        wallet: Arc<dyn WalletSender>,
        deposits_rx: DepositInfoReceiver,
        shutdown_rx: watch::Receiver<bool>,
        status: StatusHandle,
    ) -> Self {
        Self {
            cfg,
            store,
            wallet,
            deposits_rx,
            shutdown_rx,
            status,
        }
    }

    pub async fn run(mut self) {
        info!("sender started");

        self.process_backlog().await;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("sender received shutdown signal");
                        break;
                    }
                }

                di = self.deposits_rx.recv() => {
                    match di {
                        Some(di) => self.process_deposit(di).await,
                        None => {
                            info!("processor hand-off channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("sender shutdown complete");
    }

    /// Resume unsent and unconfirmed deposits from the store.
    async fn process_backlog(&self) {
        let backlog = match self
            .store
            .get_deposit_info_array(|di| {
                matches!(
                    di.status,
                    DepositStatus::WaitSend | DepositStatus::WaitConfirm
                ) && di.error.is_empty()
            })
            .await
        {
            Ok(backlog) => backlog,
            Err(e) => {
                error!(error = %e, "failed to load send backlog");
                return;
            }
        };

        if backlog.is_empty() {
            return;
        }

        info!(deposits = backlog.len(), "resuming unsent and unconfirmed deposits");
        for di in backlog {
            if *self.shutdown_rx.borrow() {
                return;
            }
            self.process_deposit(di).await;
        }
    }

    async fn process_deposit(&self, di: DepositInfo) {
        // Re-fetch: the record may have advanced since it was queued.
        let di = match self.store.get_deposit_info(&di.deposit_id).await {
            Ok(di) => di,
            Err(e) => {
                error!(deposit_id = %di.deposit_id, error = %e, "failed to load deposit");
                return;
            }
        };

        if !di.error.is_empty() {
            debug!(deposit_id = %di.deposit_id, "skipping errored deposit");
            return;
        }

        let di = match di.status {
            DepositStatus::WaitSend => match self.process_wait_send(di).await {
                Some(di) => di,
                None => return,
            },
            DepositStatus::WaitConfirm => di,
            DepositStatus::Done => {
                debug!(deposit_id = %di.deposit_id, "deposit already finished");
                return;
            }
            other => {
                warn!(deposit_id = %di.deposit_id, status = %other, "sender received deposit in unexpected status");
                return;
            }
        };

        self.process_wait_confirm(di).await;
    }

    /// Submit the outgoing transaction. Returns the updated record at
    /// `waiting_confirm`, or None when processing of this deposit stops.
    async fn process_wait_send(&self, di: DepositInfo) -> Option<DepositInfo> {
        let droplets = if di.sky_sent > 0 {
            di.sky_sent
        } else {
            match self.cfg.buy_method {
                BuyMethod::Direct => {
                    match calculate_sky_value(
                        di.deposit.value,
                        di.coin_type,
                        &di.conversion_rate,
                        self.cfg.max_decimals,
                    ) {
                        Ok(droplets) => droplets,
                        Err(e) => {
                            error!(deposit_id = %di.deposit_id, error = %e, "sky value calculation failed");
                            self.status.set_err(&e);
                            mark_deposit_errored(&self.store, &di.deposit_id, &e.to_string()).await;
                            return None;
                        }
                    }
                }
                BuyMethod::Passthrough => di.passthrough.sky_bought,
            }
        };

        if droplets == 0 {
            let msg = "empty send amount";
            error!(deposit_id = %di.deposit_id, "{msg}");
            self.status.set_err(&msg);
            mark_deposit_errored(&self.store, &di.deposit_id, msg).await;
            return None;
        }

        if !self.cfg.send_enabled {
            info!(deposit_id = %di.deposit_id, "sending is disabled, deposit remains at waiting_send");
            return None;
        }

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if *shutdown_rx.borrow() {
                return None;
            }

            match self.wallet.send(&di.sky_address, droplets).await {
                Ok(txid) => {
                    info!(
                        deposit_id = %di.deposit_id,
                        txid = %txid,
                        droplets,
                        "transaction submitted"
                    );

                    let update = self
                        .store
                        .update_deposit_info(&di.deposit_id, move |mut d| {
                            d.status = DepositStatus::WaitConfirm;
                            d.txid = txid;
                            d.sky_sent = droplets;
                            d
                        })
                        .await;

                    match update {
                        Ok(updated) => {
                            self.status.set_ok();
                            return Some(updated);
                        }
                        Err(e) => {
                            error!(
                                deposit_id = %di.deposit_id,
                                error = %e,
                                "recording the sent transaction failed; this deposit will not be reprocessed until teller is restarted"
                            );
                            self.status.set_err(&e);
                            return None;
                        }
                    }
                }
                Err(e) => {
                    // The wallet layer is idempotent for a deposit's send,
                    // so retrying here is unconditional.
                    self.status.set_err(&e);
                    warn!(deposit_id = %di.deposit_id, error = %e, "wallet send failed, retrying");
                    if !sleep_or_shutdown(&mut shutdown_rx, self.cfg.send_retry_wait).await {
                        return None;
                    }
                }
            }
        }
    }

    /// Poll until the transaction confirms, then finish the deposit.
    async fn process_wait_confirm(&self, di: DepositInfo) {
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            match self.wallet.is_tx_confirmed(&di.txid).await {
                Ok(true) => {
                    let update = self
                        .store
                        .update_deposit_info(&di.deposit_id, |mut d| {
                            d.status = DepositStatus::Done;
                            d
                        })
                        .await;

                    match update {
                        Ok(updated) => {
                            self.status.set_ok();
                            info!(
                                deposit_id = %updated.deposit_id,
                                txid = %updated.txid,
                                sky_sent = updated.sky_sent,
                                "deposit confirmed"
                            );
                        }
                        Err(e) => {
                            error!(
                                deposit_id = %di.deposit_id,
                                error = %e,
                                "recording the confirmed deposit failed; this deposit will not be reprocessed until teller is restarted"
                            );
                            self.status.set_err(&e);
                        }
                    }
                    return;
                }
                Ok(false) => {
                    debug!(deposit_id = %di.deposit_id, txid = %di.txid, "transaction not confirmed yet");
                }
                Err(e) if e.is_terminal() => {
                    error!(deposit_id = %di.deposit_id, error = %e, "transaction failed permanently");
                    self.status.set_err(&e);
                    mark_deposit_errored(&self.store, &di.deposit_id, &e.to_string()).await;
                    return;
                }
                Err(e) => {
                    self.status.set_err(&e);
                    warn!(deposit_id = %di.deposit_id, error = %e, "confirmation check failed, retrying");
                }
            }

            if !sleep_or_shutdown(&mut shutdown_rx, self.cfg.tx_confirmation_check_wait).await {
                return;
            }
        }
    }
}
