//! Persistent store for bindings and deposit records.
//!
//! One SQLite file holds everything. The pool is limited to a single
//! connection so writers are serialised and the file is owned by one
//! process. Deposit records are stored as version-tolerant JSON documents
//! with the key fields lifted into columns for lookups; all multi-step
//! updates happen inside one transaction.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqliteLockingMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{SqliteConnection, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::entities::status::InvalidTransition;
use crate::entities::{
    BoundAddress, BuyMethod, CoinType, Deposit, DepositInfo, DepositStats, DepositStatus,
};

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("deposit address is already bound")]
    AddressAlreadyBound,

    #[error("max bound addresses for this sky address reached")]
    MaxBoundAddresses,

    #[error("deposit has no bound sky address")]
    NoBoundAddress,

    #[error("deposit not found: {0}")]
    DepositNotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS deposit_info (
        deposit_id TEXT PRIMARY KEY NOT NULL,
        seq INTEGER NOT NULL UNIQUE,
        status TEXT NOT NULL,
        sky_address TEXT NOT NULL,
        doc TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_deposit_info_status ON deposit_info (status)",
    "CREATE INDEX IF NOT EXISTS idx_deposit_info_sky_address ON deposit_info (sky_address)",
    "CREATE TABLE IF NOT EXISTS bind_address (
        deposit_address TEXT PRIMARY KEY NOT NULL,
        sky_address TEXT NOT NULL,
        coin_type TEXT NOT NULL,
        buy_method TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_bind_address_sky_address ON bind_address (sky_address)",
    "CREATE TABLE IF NOT EXISTS deposit_info_seq (
        id INTEGER PRIMARY KEY CHECK (id = 0),
        seq INTEGER NOT NULL
    )",
    "INSERT OR IGNORE INTO deposit_info_seq (id, seq) VALUES (0, 0)",
    "CREATE TABLE IF NOT EXISTS deposit_stats (
        id INTEGER PRIMARY KEY CHECK (id = 0),
        total_btc_received INTEGER NOT NULL DEFAULT 0,
        total_eth_received INTEGER NOT NULL DEFAULT 0,
        total_sky_received INTEGER NOT NULL DEFAULT 0,
        total_sky_sent INTEGER NOT NULL DEFAULT 0
    )",
    "INSERT OR IGNORE INTO deposit_stats (id) VALUES (0)",
];

/// Transactional store backed by one SQLite file.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    max_bound_addrs: u32,
}

impl Store {
    /// Open (or create) the database file and prepare the schema.
    ///
    /// `max_bound_addrs` caps deposit addresses per sky address; 0 is
    /// unlimited.
    pub async fn open(path: impl AsRef<Path>, max_bound_addrs: u32) -> Result<Self, StoreError> {
        // One connection, exclusive locking: a single teller process owns
        // the file, and all writers are serialised.
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .locking_mode(SqliteLockingMode::Exclusive)
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await?;
        }

        Ok(Self {
            pool,
            max_bound_addrs,
        })
    }

    /// Close the underlying pool, flushing outstanding writes.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Bind a deposit address to a sky address.
    ///
    /// Fails if the deposit address is already bound or the sky address has
    /// reached the binding cap.
    pub async fn bind_address(
        &self,
        sky_address: &str,
        deposit_address: &str,
        coin_type: CoinType,
        buy_method: BuyMethod,
    ) -> Result<BoundAddress, StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT sky_address FROM bind_address WHERE deposit_address = ?")
                .bind(deposit_address)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(StoreError::AddressAlreadyBound);
        }

        if self.max_bound_addrs > 0 {
            let (count,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM bind_address WHERE sky_address = ?")
                    .bind(sky_address)
                    .fetch_one(&mut *tx)
                    .await?;
            if count >= i64::from(self.max_bound_addrs) {
                return Err(StoreError::MaxBoundAddresses);
            }
        }

        sqlx::query(
            "INSERT INTO bind_address (deposit_address, sky_address, coin_type, buy_method)
             VALUES (?, ?, ?, ?)",
        )
        .bind(deposit_address)
        .bind(sky_address)
        .bind(coin_type.as_str())
        .bind(buy_method.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(BoundAddress {
            sky_address: sky_address.to_string(),
            deposit_address: deposit_address.to_string(),
            coin_type,
            buy_method,
        })
    }

    /// Look up the binding for a deposit address.
    pub async fn get_bind_address(
        &self,
        deposit_address: &str,
    ) -> Result<Option<BoundAddress>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_bind_address(&mut conn, deposit_address).await
    }

    /// All deposit addresses bound to a sky address.
    pub async fn get_sky_bind_addresses(
        &self,
        sky_address: &str,
    ) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT deposit_address FROM bind_address WHERE sky_address = ? ORDER BY deposit_address",
        )
        .bind(sky_address)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(addr,)| addr).collect())
    }

    /// Fetch the record for a deposit, creating it on first sight.
    ///
    /// Creation resolves the deposit address binding (failing with
    /// [`StoreError::NoBoundAddress`] if absent), allocates the next seq
    /// inside the same transaction, snapshots the conversion rate, and sets
    /// the initial status for the binding's buy method. Calling again with
    /// the same deposit returns the stored record unchanged.
    pub async fn get_or_create_deposit_info(
        &self,
        deposit: &Deposit,
        rate: &str,
    ) -> Result<DepositInfo, StoreError> {
        let deposit_id = deposit.deposit_id();

        let mut tx = self.pool.begin().await?;

        if let Some(existing) = fetch_deposit(&mut tx, &deposit_id).await? {
            return Ok(existing);
        }

        let bound = fetch_bind_address(&mut tx, &deposit.address)
            .await?
            .ok_or(StoreError::NoBoundAddress)?;

        let seq: i64 =
            sqlx::query_scalar("UPDATE deposit_info_seq SET seq = seq + 1 WHERE id = 0 RETURNING seq")
                .fetch_one(&mut *tx)
                .await?;

        let status = match bound.buy_method {
            BuyMethod::Direct => DepositStatus::WaitSend,
            BuyMethod::Passthrough => DepositStatus::WaitDecide,
        };

        let di = DepositInfo {
            seq: seq as u64,
            updated_at: now_timestamp(),
            status,
            coin_type: deposit.coin_type,
            sky_address: bound.sky_address,
            deposit_address: deposit.address.clone(),
            deposit_id: deposit_id.clone(),
            deposit: deposit.clone(),
            conversion_rate: rate.to_string(),
            sky_sent: 0,
            txid: String::new(),
            passthrough: Default::default(),
            error: String::new(),
        };

        insert_deposit(&mut tx, &di).await?;
        tx.commit().await?;

        Ok(di)
    }

    /// Load a record, apply a pure mutator, validate the status transition,
    /// and persist — all in one transaction.
    ///
    /// Illegal transitions are rejected without writing. The record's key
    /// fields (`deposit_id`, `seq`, `deposit`) cannot be changed by the
    /// mutator, and `updated_at` is bumped so it strictly increases.
    pub async fn update_deposit_info<F>(
        &self,
        deposit_id: &str,
        mutator: F,
    ) -> Result<DepositInfo, StoreError>
    where
        F: FnOnce(DepositInfo) -> DepositInfo,
    {
        let mut tx = self.pool.begin().await?;

        let old = fetch_deposit(&mut tx, deposit_id)
            .await?
            .ok_or_else(|| StoreError::DepositNotFound(deposit_id.to_string()))?;

        let mut updated = mutator(old.clone());

        old.status.validate_transition(updated.status)?;

        updated.deposit_id = old.deposit_id.clone();
        updated.seq = old.seq;
        updated.deposit = old.deposit.clone();

        let now = now_timestamp();
        updated.updated_at = if now > old.updated_at {
            now
        } else {
            old.updated_at + 1
        };

        let doc = serde_json::to_string(&updated)?;
        sqlx::query(
            "UPDATE deposit_info SET status = ?, sky_address = ?, doc = ? WHERE deposit_id = ?",
        )
        .bind(updated.status.as_str())
        .bind(&updated.sky_address)
        .bind(&doc)
        .bind(deposit_id)
        .execute(&mut *tx)
        .await?;

        if updated.status == DepositStatus::Done && old.status != DepositStatus::Done {
            bump_stats(&mut tx, &updated).await?;
        }

        tx.commit().await?;

        Ok(updated)
    }

    /// Insert a fully-formed record, for seeding and recovery tooling.
    ///
    /// Unlike [`Store::get_or_create_deposit_info`] this does not touch the
    /// seq counter; the caller owns the record's fields.
    pub async fn add_deposit_info(&self, di: &DepositInfo) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_deposit(&mut tx, di).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Fetch one record by deposit id.
    pub async fn get_deposit_info(&self, deposit_id: &str) -> Result<DepositInfo, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_deposit(&mut conn, deposit_id)
            .await?
            .ok_or_else(|| StoreError::DepositNotFound(deposit_id.to_string()))
    }

    /// Scan all records and keep those matching the predicate, in seq order.
    pub async fn get_deposit_info_array<F>(&self, filter: F) -> Result<Vec<DepositInfo>, StoreError>
    where
        F: Fn(&DepositInfo) -> bool,
    {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT doc FROM deposit_info ORDER BY seq")
                .fetch_all(&self.pool)
                .await?;

        let mut out = Vec::new();
        for (doc,) in rows {
            let di: DepositInfo = serde_json::from_str(&doc)?;
            if filter(&di) {
                out.push(di);
            }
        }

        Ok(out)
    }

    /// All records whose destination is the given sky address, in seq order.
    pub async fn get_deposit_info_of_sky_address(
        &self,
        sky_address: &str,
    ) -> Result<Vec<DepositInfo>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT doc FROM deposit_info WHERE sky_address = ? ORDER BY seq")
                .bind(sky_address)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(doc,)| serde_json::from_str(&doc).map_err(StoreError::from))
            .collect()
    }

    /// Aggregate counters across finished deposits.
    pub async fn get_deposit_stats(&self) -> Result<DepositStats, StoreError> {
        let (total_btc_received, total_eth_received, total_sky_received, total_sky_sent): (
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            "SELECT total_btc_received, total_eth_received, total_sky_received, total_sky_sent
             FROM deposit_stats WHERE id = 0",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DepositStats {
            total_btc_received,
            total_eth_received,
            total_sky_received,
            total_sky_sent,
        })
    }
}

async fn fetch_deposit(
    conn: &mut SqliteConnection,
    deposit_id: &str,
) -> Result<Option<DepositInfo>, StoreError> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT doc FROM deposit_info WHERE deposit_id = ?")
            .bind(deposit_id)
            .fetch_optional(&mut *conn)
            .await?;

    row.map(|(doc,)| serde_json::from_str(&doc))
        .transpose()
        .map_err(Into::into)
}

async fn fetch_bind_address(
    conn: &mut SqliteConnection,
    deposit_address: &str,
) -> Result<Option<BoundAddress>, StoreError> {
    let row: Option<(String, String, String)> = sqlx::query_as(
        "SELECT sky_address, coin_type, buy_method FROM bind_address WHERE deposit_address = ?",
    )
    .bind(deposit_address)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|(sky_address, coin_type, buy_method)| {
        let coin_type = CoinType::from_str(&coin_type)
            .map_err(|_| StoreError::Corrupt(format!("coin type {coin_type}")))?;
        let buy_method = BuyMethod::from_str(&buy_method)
            .map_err(|_| StoreError::Corrupt(format!("buy method {buy_method}")))?;
        Ok(BoundAddress {
            sky_address,
            deposit_address: deposit_address.to_string(),
            coin_type,
            buy_method,
        })
    })
    .transpose()
}

async fn insert_deposit(conn: &mut SqliteConnection, di: &DepositInfo) -> Result<(), StoreError> {
    let doc = serde_json::to_string(di)?;
    sqlx::query(
        "INSERT INTO deposit_info (deposit_id, seq, status, sky_address, doc)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&di.deposit_id)
    .bind(di.seq as i64)
    .bind(di.status.as_str())
    .bind(&di.sky_address)
    .bind(&doc)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn bump_stats(conn: &mut SqliteConnection, di: &DepositInfo) -> Result<(), StoreError> {
    let (btc, eth, sky) = match di.coin_type {
        CoinType::Btc => (di.deposit.value, 0, 0),
        CoinType::Eth => (0, di.deposit.value, 0),
        CoinType::Sky => (0, 0, di.deposit.value),
    };

    sqlx::query(
        "UPDATE deposit_stats SET
            total_btc_received = total_btc_received + ?,
            total_eth_received = total_eth_received + ?,
            total_sky_received = total_sky_received + ?,
            total_sky_sent = total_sky_sent + ?
         WHERE id = 0",
    )
    .bind(btc)
    .bind(eth)
    .bind(sky)
    .bind(di.sky_sent as i64)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn now_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn new_store() -> (Store, tempfile::TempDir) {
        new_store_with_cap(0).await
    }

    async fn new_store_with_cap(cap: u32) -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("teller.db"), cap).await.unwrap();
        (store, dir)
    }

    fn test_deposit(tx: &str, n: u32, address: &str) -> Deposit {
        Deposit {
            coin_type: CoinType::Btc,
            address: address.to_string(),
            value: 100_000_000,
            height: 20,
            tx: tx.to_string(),
            n,
        }
    }

    #[tokio::test]
    async fn bind_address_round_trip() {
        let (store, _dir) = new_store().await;

        let bound = store
            .bind_address("sky-a", "btc-a", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();
        assert_eq!(bound.sky_address, "sky-a");
        assert_eq!(bound.deposit_address, "btc-a");

        let fetched = store.get_bind_address("btc-a").await.unwrap().unwrap();
        assert_eq!(fetched, bound);

        assert_eq!(store.get_bind_address("btc-b").await.unwrap(), None);

        store
            .bind_address("sky-a", "btc-b", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();
        let addrs = store.get_sky_bind_addresses("sky-a").await.unwrap();
        assert_eq!(addrs, vec!["btc-a".to_string(), "btc-b".to_string()]);
    }

    #[tokio::test]
    async fn bind_address_rejects_duplicates() {
        let (store, _dir) = new_store().await;

        store
            .bind_address("sky-a", "btc-a", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();

        let err = store
            .bind_address("sky-b", "btc-a", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AddressAlreadyBound));
    }

    #[tokio::test]
    async fn bind_address_enforces_cap() {
        let (store, _dir) = new_store_with_cap(2).await;

        store
            .bind_address("sky-a", "btc-1", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();
        store
            .bind_address("sky-a", "btc-2", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();

        let err = store
            .bind_address("sky-a", "btc-3", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MaxBoundAddresses));

        // The cap is per sky address.
        store
            .bind_address("sky-b", "btc-3", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_requires_binding() {
        let (store, _dir) = new_store().await;

        let err = store
            .get_or_create_deposit_info(&test_deposit("t", 0, "btc-a"), "100")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NoBoundAddress));
    }

    #[tokio::test]
    async fn create_is_idempotent_and_allocates_seq() {
        let (store, _dir) = new_store().await;

        store
            .bind_address("sky-a", "btc-a", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();

        let deposit = test_deposit("t", 2, "btc-a");
        let di = store.get_or_create_deposit_info(&deposit, "100").await.unwrap();
        assert_eq!(di.seq, 1);
        assert_eq!(di.status, DepositStatus::WaitSend);
        assert_eq!(di.sky_address, "sky-a");
        assert_eq!(di.deposit_id, "t:2");
        assert_eq!(di.conversion_rate, "100");
        assert!(di.updated_at > 0);

        // Second call returns the stored record and does not allocate a seq.
        let again = store.get_or_create_deposit_info(&deposit, "999").await.unwrap();
        assert_eq!(again, di);

        let second = store
            .get_or_create_deposit_info(&test_deposit("t", 3, "btc-a"), "100")
            .await
            .unwrap();
        assert_eq!(second.seq, 2);
    }

    #[tokio::test]
    async fn create_uses_buy_method_initial_status() {
        let (store, _dir) = new_store().await;

        store
            .bind_address("sky-a", "btc-a", CoinType::Btc, BuyMethod::Passthrough)
            .await
            .unwrap();

        let di = store
            .get_or_create_deposit_info(&test_deposit("t", 0, "btc-a"), "100")
            .await
            .unwrap();
        assert_eq!(di.status, DepositStatus::WaitDecide);
    }

    #[tokio::test]
    async fn update_validates_transitions() {
        let (store, _dir) = new_store().await;

        store
            .bind_address("sky-a", "btc-a", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();
        let di = store
            .get_or_create_deposit_info(&test_deposit("t", 0, "btc-a"), "100")
            .await
            .unwrap();

        // Illegal: WaitSend -> Done. Nothing is written.
        let err = store
            .update_deposit_info(&di.deposit_id, |mut d| {
                d.status = DepositStatus::Done;
                d
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
        let unchanged = store.get_deposit_info(&di.deposit_id).await.unwrap();
        assert_eq!(unchanged, di);

        // Legal: WaitSend -> WaitConfirm.
        let updated = store
            .update_deposit_info(&di.deposit_id, |mut d| {
                d.status = DepositStatus::WaitConfirm;
                d.txid = "txid".to_string();
                d.sky_sent = 100_000_000;
                d
            })
            .await
            .unwrap();
        assert_eq!(updated.status, DepositStatus::WaitConfirm);
        assert!(updated.updated_at > di.updated_at);
    }

    #[tokio::test]
    async fn identity_update_only_bumps_updated_at() {
        let (store, _dir) = new_store().await;

        store
            .bind_address("sky-a", "btc-a", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();
        let di = store
            .get_or_create_deposit_info(&test_deposit("t", 0, "btc-a"), "100")
            .await
            .unwrap();

        let updated = store.update_deposit_info(&di.deposit_id, |d| d).await.unwrap();
        assert!(updated.updated_at > di.updated_at);

        let mut expected = di.clone();
        expected.updated_at = updated.updated_at;
        assert_eq!(updated, expected);
    }

    #[tokio::test]
    async fn update_preserves_immutable_fields() {
        let (store, _dir) = new_store().await;

        store
            .bind_address("sky-a", "btc-a", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();
        let di = store
            .get_or_create_deposit_info(&test_deposit("t", 0, "btc-a"), "100")
            .await
            .unwrap();

        let updated = store
            .update_deposit_info(&di.deposit_id, |mut d| {
                d.seq = 999;
                d.deposit_id = "other:0".to_string();
                d.deposit.value = 1;
                d
            })
            .await
            .unwrap();
        assert_eq!(updated.seq, di.seq);
        assert_eq!(updated.deposit_id, di.deposit_id);
        assert_eq!(updated.deposit, di.deposit);
    }

    #[tokio::test]
    async fn update_missing_deposit_fails() {
        let (store, _dir) = new_store().await;
        let err = store.update_deposit_info("nope:0", |d| d).await.unwrap_err();
        assert!(matches!(err, StoreError::DepositNotFound(_)));
    }

    #[tokio::test]
    async fn stats_updated_when_deposit_finishes() {
        let (store, _dir) = new_store().await;

        store
            .bind_address("sky-a", "btc-a", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();
        let di = store
            .get_or_create_deposit_info(&test_deposit("t", 0, "btc-a"), "100")
            .await
            .unwrap();

        assert_eq!(store.get_deposit_stats().await.unwrap(), DepositStats::default());

        store
            .update_deposit_info(&di.deposit_id, |mut d| {
                d.status = DepositStatus::WaitConfirm;
                d.txid = "txid".to_string();
                d.sky_sent = 100_000_000;
                d
            })
            .await
            .unwrap();
        store
            .update_deposit_info(&di.deposit_id, |mut d| {
                d.status = DepositStatus::Done;
                d
            })
            .await
            .unwrap();

        let stats = store.get_deposit_stats().await.unwrap();
        assert_eq!(stats.total_btc_received, 100_000_000);
        assert_eq!(stats.total_sky_sent, 100_000_000);
        assert_eq!(stats.total_eth_received, 0);

        // Finishing is counted once; identity updates at Done do not double.
        store.update_deposit_info(&di.deposit_id, |d| d).await.unwrap();
        let stats = store.get_deposit_stats().await.unwrap();
        assert_eq!(stats.total_btc_received, 100_000_000);
    }

    #[tokio::test]
    async fn scans_and_filters() {
        let (store, _dir) = new_store().await;

        store
            .bind_address("sky-a", "btc-a", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();
        store
            .bind_address("sky-b", "btc-b", CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();

        let a = store
            .get_or_create_deposit_info(&test_deposit("t1", 0, "btc-a"), "100")
            .await
            .unwrap();
        let b = store
            .get_or_create_deposit_info(&test_deposit("t2", 0, "btc-b"), "100")
            .await
            .unwrap();

        let all = store.get_deposit_info_array(|_| true).await.unwrap();
        assert_eq!(all, vec![a.clone(), b.clone()]);

        let of_a = store.get_deposit_info_of_sky_address("sky-a").await.unwrap();
        assert_eq!(of_a, vec![a.clone()]);

        store
            .update_deposit_info(&b.deposit_id, |mut d| {
                d.error = "fatal order status".to_string();
                d
            })
            .await
            .unwrap();

        let errored = store
            .get_deposit_info_array(|di| !di.error.is_empty())
            .await
            .unwrap();
        assert_eq!(errored.len(), 1);
        assert_eq!(errored[0].deposit_id, b.deposit_id);
    }
}
