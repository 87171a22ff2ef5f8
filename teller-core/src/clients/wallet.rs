//! Wallet-sender contract consumed by the send pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hot wallet balance, in droplets and coin hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub coins: u64,
    pub hours: u64,
}

/// Errors from submitting a transaction or querying the wallet.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("wallet request failed: {0}")]
    Request(String),

    #[error("wallet rejected the send: {0}")]
    Rejected(String),

    #[error("no response from the send service")]
    NoResponse,
}

/// Errors from a confirmation check.
///
/// The sender retries transient failures forever; a terminal failure marks
/// the deposit errored.
#[derive(Debug, Error)]
pub enum ConfirmError {
    #[error("confirmation check failed: {0}")]
    Transient(String),

    #[error("transaction failed permanently: {0}")]
    Terminal(String),
}

impl ConfirmError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConfirmError::Terminal(_))
    }
}

/// Creates and broadcasts outgoing coin transactions.
///
/// Submitting the same deposit's amount twice must be idempotent at the
/// wallet layer; the send pipeline retries unconditionally on failure.
#[async_trait]
pub trait WalletSender: Send + Sync {
    /// Create and broadcast a transaction, returning its txid.
    async fn send(&self, dest_address: &str, droplets: u64) -> Result<String, SendError>;

    /// Whether the transaction has been confirmed on chain.
    async fn is_tx_confirmed(&self, txid: &str) -> Result<bool, ConfirmError>;

    /// Spendable balance of the hot wallet.
    async fn balance(&self) -> Result<Balance, SendError>;

    /// Reachability / readiness of the wallet backend.
    async fn status(&self) -> Result<(), SendError>;
}
