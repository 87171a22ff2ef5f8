//! Fake collaborators for local development.
//!
//! With `dummy.scanner` enabled, fake scanners are registered for BTC and
//! ETH and deposits are injected through the HTTP API instead of being
//! observed on chain. With `dummy.sender` enabled, sends are acknowledged
//! with generated txids and confirm immediately, so no node or hot wallet
//! is needed.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use teller_core::clients::scanner::{Scanner, ScannerError};
use teller_core::clients::wallet::{Balance, ConfirmError, SendError, WalletSender};

/// Accepts every address and never produces deposits on its own.
pub struct DummyScanner;

impl Scanner for DummyScanner {
    fn add_scan_address(&self, address: &str) -> Result<(), ScannerError> {
        debug!(address, "dummy scanner watching address");
        Ok(())
    }
}

/// Wallet sender that fakes broadcasts and confirms instantly.
#[derive(Default)]
pub struct DummyWallet {
    txid_seq: AtomicU64,
}

impl DummyWallet {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletSender for DummyWallet {
    async fn send(&self, dest_address: &str, droplets: u64) -> Result<String, SendError> {
        let txid = format!("dummy-txid-{}", self.txid_seq.fetch_add(1, Ordering::Relaxed));
        info!(dest_address, droplets, txid = %txid, "dummy wallet send");
        Ok(txid)
    }

    async fn is_tx_confirmed(&self, _txid: &str) -> Result<bool, ConfirmError> {
        Ok(true)
    }

    async fn balance(&self) -> Result<Balance, SendError> {
        Ok(Balance {
            coins: u64::MAX / 2,
            hours: 1_000_000,
        })
    }

    async fn status(&self) -> Result<(), SendError> {
        Ok(())
    }
}
