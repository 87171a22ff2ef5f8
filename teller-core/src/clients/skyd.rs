//! Wallet sender backed by a skycoin node's REST API.

use async_trait::async_trait;
use serde::Deserialize;

use super::wallet::{Balance, ConfirmError, SendError, WalletSender};

/// `WalletSender` talking to a skycoin node that holds the hot wallet.
pub struct SkyNodeSender {
    base_url: String,
    wallet_id: String,
    http_client: reqwest::Client,
}

impl SkyNodeSender {
    /// `base_url` is the node's API root (e.g. `http://127.0.0.1:6420`);
    /// `wallet_id` names the hot wallet file loaded by the node.
    pub fn new(base_url: impl Into<String>, wallet_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            wallet_id: wallet_id.into(),
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WalletSender for SkyNodeSender {
    async fn send(&self, dest_address: &str, droplets: u64) -> Result<String, SendError> {
        let response = self
            .http_client
            .post(format!("{}/api/v1/wallet/spend", self.base_url))
            .form(&[
                ("id", self.wallet_id.as_str()),
                ("dst", dest_address),
                ("coins", &droplets.to_string()),
            ])
            .send()
            .await
            .map_err(|e| SendError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected(body));
        }

        let spend: SpendResponse = response
            .json()
            .await
            .map_err(|e| SendError::Request(e.to_string()))?;

        Ok(spend.txn.txid)
    }

    async fn is_tx_confirmed(&self, txid: &str) -> Result<bool, ConfirmError> {
        let response = self
            .http_client
            .get(format!("{}/api/v1/transaction", self.base_url))
            .query(&[("txid", txid)])
            .send()
            .await
            .map_err(|e| ConfirmError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConfirmError::Terminal(format!("{status}: {body}")));
        }
        if !status.is_success() {
            return Err(ConfirmError::Transient(status.to_string()));
        }

        let txn: TransactionResponse = response
            .json()
            .await
            .map_err(|e| ConfirmError::Transient(e.to_string()))?;

        Ok(txn.status.confirmed)
    }

    async fn balance(&self) -> Result<Balance, SendError> {
        let response = self
            .http_client
            .get(format!("{}/api/v1/wallet/balance", self.base_url))
            .query(&[("id", self.wallet_id.as_str())])
            .send()
            .await
            .map_err(|e| SendError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Request(body));
        }

        let balance: BalanceResponse = response
            .json()
            .await
            .map_err(|e| SendError::Request(e.to_string()))?;

        Ok(Balance {
            coins: balance.confirmed.coins,
            hours: balance.confirmed.hours,
        })
    }

    async fn status(&self) -> Result<(), SendError> {
        let response = self
            .http_client
            .get(format!("{}/api/v1/health", self.base_url))
            .send()
            .await
            .map_err(|e| SendError::Request(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SendError::Request(response.status().to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpendResponse {
    txn: SpendTxn,
}

#[derive(Debug, Deserialize)]
struct SpendTxn {
    txid: String,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    status: TransactionStatus,
}

#[derive(Debug, Deserialize)]
struct TransactionStatus {
    #[serde(default)]
    confirmed: bool,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    confirmed: BalancePair,
}

#[derive(Debug, Deserialize)]
struct BalancePair {
    #[serde(default)]
    coins: u64,
    #[serde(default)]
    hours: u64,
}
