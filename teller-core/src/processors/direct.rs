//! Direct-buy processor.
//!
//! Direct buy needs no decision stage: records arrive at `waiting_send` and
//! the sender owns the rest of the progression, so this worker only moves
//! records from the receiver's queue to the sender's.

use tokio::sync::watch;
use tracing::{debug, info};

use crate::events::{DepositInfoReceiver, DepositInfoSender};

use super::StatusHandle;

pub struct DirectBuy {
    deposits_rx: DepositInfoReceiver,
    out_tx: DepositInfoSender,
    shutdown_rx: watch::Receiver<bool>,
    status: StatusHandle,
}

impl DirectBuy {
    pub(crate) fn new(
        deposits_rx: DepositInfoReceiver,
        out_tx: DepositInfoSender,
        shutdown_rx: watch::Receiver<bool>,
        status: StatusHandle,
    ) -> Self {
        Self {
            deposits_rx,
            out_tx,
            shutdown_rx,
            status,
        }
    }

    pub async fn run(mut self) {
        info!("direct-buy processor started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("direct-buy processor received shutdown signal");
                        break;
                    }
                }

                di = self.deposits_rx.recv() => {
                    match di {
                        Some(di) => {
                            debug!(deposit_id = %di.deposit_id, "forwarding deposit to sender");
                            self.status.set_ok();
                            if self.out_tx.send(di).await.is_err() {
                                info!("sender hand-off channel closed");
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

        info!("direct-buy processor shutdown complete");
    }
}
