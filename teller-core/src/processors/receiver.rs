//! Receiver: turns scanner deposit notes into persisted deposit records.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::ExchangeConfig;
use crate::entities::{BuyMethod, DepositInfo, DepositStatus};
use crate::events::{DepositInfoSender, DepositNoteReceiver};
use crate::clients::scanner::DepositNote;
use crate::store::Store;

/// Consumes the multiplexed scanner stream, creates deposit records, and
/// hands them to the processor.
///
/// The ack channel of each note carries the persistence outcome back to the
/// scanner; a failed save is not retried in-process and needs a restart to
/// be reprocessed.
pub struct Receiver {
    cfg: ExchangeConfig,
    store: Arc<Store>,
    notes_rx: DepositNoteReceiver,
    deposits_tx: DepositInfoSender,
    shutdown_rx: watch::Receiver<bool>,
}

impl Receiver {
    pub(crate) fn new(
        cfg: ExchangeConfig,
        store: Arc<Store>,
        notes_rx: DepositNoteReceiver,
        deposits_tx: DepositInfoSender,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            cfg,
            store,
            notes_rx,
            deposits_tx,
            shutdown_rx,
        }
    }

    /// Initial status of records on the configured buy path.
    fn initial_status(&self) -> DepositStatus {
        match self.cfg.buy_method {
            BuyMethod::Direct => DepositStatus::WaitSend,
            BuyMethod::Passthrough => DepositStatus::WaitDecide,
        }
    }

    pub async fn run(mut self) {
        info!("receiver started");

        self.emit_backlog().await;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("receiver received shutdown signal");
                        break;
                    }
                }

                note = self.notes_rx.recv() => {
                    match note {
                        Some(note) => self.process_note(note).await,
                        None => {
                            info!("deposit note channel closed");
                            break;
                        }
                    }
                }
            }
        }

        info!("receiver shutdown complete");
    }

    /// Re-emit records interrupted before the processor picked them up.
    async fn emit_backlog(&mut self) {
        let initial = self.initial_status();
        let backlog = match self
            .store
            .get_deposit_info_array(|di| di.status == initial && di.error.is_empty())
            .await
        {
            Ok(backlog) => backlog,
            Err(e) => {
                error!(error = %e, "failed to load deposit backlog");
                return;
            }
        };

        if backlog.is_empty() {
            return;
        }

        info!(deposits = backlog.len(), "re-emitting unprocessed deposits");
        for di in backlog {
            if !self.forward(di).await {
                return;
            }
        }
    }

    async fn process_note(&mut self, note: DepositNote) {
        let DepositNote { deposit, ack } = note;
        debug!(deposit_id = %deposit.deposit_id(), "received deposit from scanner");

        let rate = self.cfg.rate_for(deposit.coin_type).to_string();
        match self.store.get_or_create_deposit_info(&deposit, &rate).await {
            Ok(di) => {
                let _ = ack.send(Ok(()));
                self.forward(di).await;
            }
            Err(e) => {
                error!(
                    deposit = ?deposit,
                    error = %e,
                    "failed to save incoming deposit; it will not be reprocessed until teller is restarted"
                );
                let _ = ack.send(Err(e));
            }
        }
    }

    /// Send a record downstream, returning false if shutdown interrupted.
    async fn forward(&mut self, di: DepositInfo) -> bool {
        tokio::select! {
            biased;

            _ = self.shutdown_rx.changed() => false,

            result = self.deposits_tx.send(di) => {
                if result.is_err() {
                    error!("deposit hand-off channel closed");
                    return false;
                }
                true
            }
        }
    }
}
