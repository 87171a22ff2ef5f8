//! Scanner contract and the multiplexer that merges per-chain streams.
//!
//! A scanner watches one source chain. It accepts addresses to watch and
//! pushes `DepositNote`s into the multiplexed stream; the note's ack channel
//! carries the persistence outcome back so the scanner can advance its own
//! cursor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::entities::{CoinType, Deposit};
use crate::events::{deposit_note_channel, DepositNoteReceiver, DepositNoteSender};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("no scanner registered for coin type {0}")]
    UnsupportedCoinType(CoinType),

    #[error("scanner already registered for coin type {0}")]
    DuplicateScanner(CoinType),

    #[error("scanner rejected address: {0}")]
    AddAddress(String),
}

/// One source-chain scanner, registered with the [`Multiplexer`].
pub trait Scanner: Send + Sync {
    /// Start watching an address for deposits.
    fn add_scan_address(&self, address: &str) -> Result<(), ScannerError>;
}

/// A deposit event paired with its acknowledgement channel.
///
/// The receiver writes the store outcome to `ack`; an error means the
/// deposit was not recorded and will not be reprocessed until restart.
#[derive(Debug)]
pub struct DepositNote {
    pub deposit: Deposit,
    pub ack: oneshot::Sender<Result<(), StoreError>>,
}

impl DepositNote {
    /// Pair a deposit with a fresh ack channel.
    pub fn new(deposit: Deposit) -> (Self, oneshot::Receiver<Result<(), StoreError>>) {
        let (ack, ack_rx) = oneshot::channel();
        (Self { deposit, ack }, ack_rx)
    }
}

/// Routes address registrations to per-chain scanners and owns the merged
/// deposit-note stream they feed.
pub struct Multiplexer {
    scanners: Mutex<HashMap<CoinType, Arc<dyn Scanner>>>,
    notes_tx: DepositNoteSender,
}

impl Multiplexer {
    /// Create a multiplexer and the receiving end of its merged stream.
    pub fn new() -> (Self, DepositNoteReceiver) {
        let (notes_tx, notes_rx) = deposit_note_channel();
        (
            Self {
                scanners: Mutex::new(HashMap::new()),
                notes_tx,
            },
            notes_rx,
        )
    }

    /// Register the scanner for a coin type. One scanner per coin.
    pub fn add_scanner(
        &self,
        coin_type: CoinType,
        scanner: Arc<dyn Scanner>,
    ) -> Result<(), ScannerError> {
        let mut scanners = self.lock_scanners();
        if scanners.contains_key(&coin_type) {
            return Err(ScannerError::DuplicateScanner(coin_type));
        }
        scanners.insert(coin_type, scanner);
        Ok(())
    }

    /// Whether a scanner is registered for the coin type.
    pub fn supports(&self, coin_type: CoinType) -> bool {
        self.lock_scanners().contains_key(&coin_type)
    }

    /// Route an address registration to the scanner for its chain.
    pub fn add_scan_address(&self, coin_type: CoinType, address: &str) -> Result<(), ScannerError> {
        let scanner = self
            .lock_scanners()
            .get(&coin_type)
            .cloned()
            .ok_or(ScannerError::UnsupportedCoinType(coin_type))?;
        scanner.add_scan_address(address)
    }

    /// Sender half of the merged stream, for scanners to push notes into.
    pub fn notes_sender(&self) -> DepositNoteSender {
        self.notes_tx.clone()
    }

    fn lock_scanners(&self) -> std::sync::MutexGuard<'_, HashMap<CoinType, Arc<dyn Scanner>>> {
        self.scanners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingScanner {
        addrs: StdMutex<Vec<String>>,
    }

    impl Scanner for RecordingScanner {
        fn add_scan_address(&self, address: &str) -> Result<(), ScannerError> {
            self.addrs.lock().unwrap().push(address.to_string());
            Ok(())
        }
    }

    #[test]
    fn routes_to_registered_scanner() {
        let (mux, _notes_rx) = Multiplexer::new();
        let scanner = Arc::new(RecordingScanner::default());
        mux.add_scanner(CoinType::Btc, scanner.clone()).unwrap();

        assert!(mux.supports(CoinType::Btc));
        assert!(!mux.supports(CoinType::Eth));

        mux.add_scan_address(CoinType::Btc, "btc-a").unwrap();
        assert_eq!(*scanner.addrs.lock().unwrap(), vec!["btc-a".to_string()]);

        let err = mux.add_scan_address(CoinType::Eth, "eth-a").unwrap_err();
        assert!(matches!(err, ScannerError::UnsupportedCoinType(CoinType::Eth)));
    }

    #[test]
    fn rejects_duplicate_scanner() {
        let (mux, _notes_rx) = Multiplexer::new();
        mux.add_scanner(CoinType::Btc, Arc::new(RecordingScanner::default()))
            .unwrap();
        let err = mux
            .add_scanner(CoinType::Btc, Arc::new(RecordingScanner::default()))
            .unwrap_err();
        assert!(matches!(err, ScannerError::DuplicateScanner(CoinType::Btc)));
    }
}
