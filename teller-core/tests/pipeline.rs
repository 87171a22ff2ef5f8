//! End-to-end pipeline tests with dummy scanner, wallet, and market
//! doubles: deposits flow from scanner note to `done`, and interrupted
//! work resumes from whatever state is durable.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use teller_core::clients::market::{
    ExchangeMarket, MarketError, Order, OrderId, OrderStatus, TradePair,
};
use teller_core::clients::scanner::{DepositNote, Multiplexer, Scanner, ScannerError};
use teller_core::clients::wallet::{Balance, ConfirmError, SendError, WalletSender};
use teller_core::config::ExchangeConfig;
use teller_core::entities::{BuyMethod, CoinType, Deposit, DepositInfo, DepositStatus};
use teller_core::exchange::{BindError, Exchange};
use teller_core::store::Store;

#[derive(Default)]
struct DummyScanner {
    addrs: Mutex<Vec<String>>,
}

impl Scanner for DummyScanner {
    fn add_scan_address(&self, address: &str) -> Result<(), ScannerError> {
        self.addrs.lock().unwrap().push(address.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct DummyWallet {
    txids: Mutex<VecDeque<String>>,
    send_fails: Mutex<bool>,
    confirmed: Mutex<HashMap<String, bool>>,
}

impl DummyWallet {
    fn add_txid(&self, txid: &str) {
        self.txids.lock().unwrap().push_back(txid.to_string());
    }

    fn set_confirmed(&self, txid: &str) {
        self.confirmed.lock().unwrap().insert(txid.to_string(), true);
    }
}

#[async_trait]
impl WalletSender for DummyWallet {
    async fn send(&self, _dest_address: &str, _droplets: u64) -> Result<String, SendError> {
        if *self.send_fails.lock().unwrap() {
            return Err(SendError::Request("fake send error".to_string()));
        }
        self.txids
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(SendError::NoResponse)
    }

    async fn is_tx_confirmed(&self, txid: &str) -> Result<bool, ConfirmError> {
        Ok(*self.confirmed.lock().unwrap().get(txid).unwrap_or(&false))
    }

    async fn balance(&self) -> Result<Balance, SendError> {
        Ok(Balance {
            coins: 1_000_000_000,
            hours: 100,
        })
    }

    async fn status(&self) -> Result<(), SendError> {
        Ok(())
    }
}

#[derive(Default)]
struct DummyMarket {
    orders: Mutex<HashMap<OrderId, Order>>,
    all_orders: Mutex<Vec<Order>>,
}

#[async_trait]
impl ExchangeMarket for DummyMarket {
    async fn market_buy(
        &self,
        _pair: TradePair,
        _amount: Decimal,
        _customer_id: &str,
    ) -> Result<OrderId, MarketError> {
        Err(MarketError::Api {
            message: "unexpected market buy".to_string(),
        })
    }

    async fn get_order_info(
        &self,
        _pair: TradePair,
        order_id: OrderId,
    ) -> Result<Order, MarketError> {
        self.orders
            .lock()
            .unwrap()
            .get(&order_id)
            .cloned()
            .ok_or_else(|| MarketError::Api {
                message: format!("unknown order {order_id}"),
            })
    }

    async fn get_orders_by_status(
        &self,
        _pair: TradePair,
        _status: OrderStatus,
    ) -> Result<Vec<Order>, MarketError> {
        Ok(self.all_orders.lock().unwrap().clone())
    }
}

fn test_config(buy_method: BuyMethod) -> ExchangeConfig {
    let mut cfg = ExchangeConfig {
        sky_btc_exchange_rate: "100".to_string(),
        tx_confirmation_check_wait: Duration::from_millis(10),
        send_retry_wait: Duration::from_millis(10),
        buy_method,
        ..Default::default()
    };
    cfg.c2cx.key = "key".to_string();
    cfg.c2cx.secret = "secret".to_string();
    cfg.c2cx.check_order_wait = Duration::from_millis(10);
    cfg.c2cx.request_failure_wait = Duration::from_millis(10);
    cfg.c2cx.ratelimit_wait = Duration::from_millis(10);
    cfg
}

struct Harness {
    store: Arc<Store>,
    multiplexer: Arc<Multiplexer>,
    scanner: Arc<DummyScanner>,
    wallet: Arc<DummyWallet>,
    _dir: tempfile::TempDir,
}

async fn new_harness() -> (Harness, teller_core::events::DepositNoteReceiver) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("teller.db"), 0).await.unwrap());

    let (multiplexer, notes_rx) = Multiplexer::new();
    let multiplexer = Arc::new(multiplexer);
    let scanner = Arc::new(DummyScanner::default());
    multiplexer
        .add_scanner(CoinType::Btc, scanner.clone())
        .unwrap();

    let harness = Harness {
        store,
        multiplexer,
        scanner,
        wallet: Arc::new(DummyWallet::default()),
        _dir: dir,
    };

    (harness, notes_rx)
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

async fn send_note(harness: &Harness, deposit: Deposit) -> Result<(), String> {
    let (note, ack_rx) = DepositNote::new(deposit);
    harness
        .multiplexer
        .notes_sender()
        .send(note)
        .await
        .map_err(|e| e.to_string())?;
    tokio::time::timeout(Duration::from_secs(5), ack_rx)
        .await
        .map_err(|_| "timed out waiting for ack".to_string())?
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

async fn wait_for_status(store: &Store, deposit_id: &str, status: DepositStatus) -> DepositInfo {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(di) = store.get_deposit_info(deposit_id).await {
            if di.status == status {
                return di;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {deposit_id} to reach {status}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn run_and_shutdown() {
    let (harness, notes_rx) = new_harness().await;
    let exchange = Exchange::direct(
        test_config(BuyMethod::Direct),
        harness.store.clone(),
        harness.multiplexer.clone(),
        notes_rx,
        harness.wallet.clone(),
    )
    .unwrap();

    exchange.shutdown().await;
}

#[tokio::test]
async fn wrong_buy_method_is_rejected() {
    let (harness, notes_rx) = new_harness().await;
    let err = Exchange::direct(
        test_config(BuyMethod::Passthrough),
        harness.store.clone(),
        harness.multiplexer.clone(),
        notes_rx,
        harness.wallet.clone(),
    )
    .err()
    .unwrap();
    assert!(err.to_string().contains("buy method"));
}

#[tokio::test]
async fn direct_happy_path() {
    let (harness, notes_rx) = new_harness().await;
    let exchange = Exchange::direct(
        test_config(BuyMethod::Direct),
        harness.store.clone(),
        harness.multiplexer.clone(),
        notes_rx,
        harness.wallet.clone(),
    )
    .unwrap();

    exchange
        .bind_address("sky-a", "btc-a", CoinType::Btc)
        .await
        .unwrap();
    assert_eq!(*harness.scanner.addrs.lock().unwrap(), vec!["btc-a".to_string()]);

    harness.wallet.add_txid("sky-txid");

    let deposit = test_deposit("foo-tx", 2, "btc-a");
    send_note(&harness, deposit.clone()).await.unwrap();

    // The deposit is sent, then waits for confirmation.
    let di = wait_for_status(&harness.store, "foo-tx:2", DepositStatus::WaitConfirm).await;
    assert_eq!(di.seq, 1);
    assert_eq!(di.sky_address, "sky-a");
    assert_eq!(di.deposit_address, "btc-a");
    assert_eq!(di.txid, "sky-txid");
    assert_eq!(di.sky_sent, 100_000_000);
    assert_eq!(di.conversion_rate, "100");
    assert_eq!(di.deposit, deposit);
    assert!(di.updated_at > 0);

    // Confirm the transaction; the deposit finishes.
    harness.wallet.set_confirmed("sky-txid");
    let di = wait_for_status(&harness.store, "foo-tx:2", DepositStatus::Done).await;
    assert_eq!(di.sky_sent, 100_000_000);
    assert_eq!(di.txid, "sky-txid");

    let statuses = exchange.deposit_statuses("sky-a").await.unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].seq, 1);

    let stats = exchange.deposit_stats().await.unwrap();
    assert_eq!(stats.total_btc_received, 100_000_000);
    assert_eq!(stats.total_sky_sent, 100_000_000);

    exchange.shutdown().await;
}

#[tokio::test]
async fn send_failure_keeps_rate_and_wait_send() {
    let (harness, notes_rx) = new_harness().await;
    let exchange = Exchange::direct(
        test_config(BuyMethod::Direct),
        harness.store.clone(),
        harness.multiplexer.clone(),
        notes_rx,
        harness.wallet.clone(),
    )
    .unwrap();

    exchange
        .bind_address("sky-a", "btc-a", CoinType::Btc)
        .await
        .unwrap();

    *harness.wallet.send_fails.lock().unwrap() = true;

    send_note(&harness, test_deposit("foo-tx", 2, "btc-a"))
        .await
        .unwrap();

    // The rate was snapshotted at creation even though sending fails.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let di = harness.store.get_deposit_info("foo-tx:2").await.unwrap();
    assert_eq!(di.status, DepositStatus::WaitSend);
    assert_eq!(di.conversion_rate, "100");
    assert!(di.txid.is_empty());
    assert_eq!(di.sky_sent, 0);
    assert!(di.updated_at > 0);
    assert!(exchange.sender_status().is_some());

    exchange.shutdown().await;
}

#[tokio::test]
async fn binding_unknown_coin_fails() {
    let (harness, notes_rx) = new_harness().await;
    let exchange = Exchange::direct(
        test_config(BuyMethod::Direct),
        harness.store.clone(),
        harness.multiplexer.clone(),
        notes_rx,
        harness.wallet.clone(),
    )
    .unwrap();

    let err = exchange
        .bind_address("sky-a", "eth-a", CoinType::Eth)
        .await
        .unwrap_err();
    assert!(matches!(err, BindError::Scanner(_)));
    // Nothing was persisted for the failed bind.
    assert_eq!(exchange.bind_num("sky-a").await.unwrap(), 0);

    exchange.shutdown().await;
}

fn seeded_deposit_info(
    seq: u64,
    status: DepositStatus,
    sky_addr: &str,
    btc_addr: &str,
    tx: &str,
    n: u32,
    txid: &str,
    sky_sent: u64,
) -> DepositInfo {
    let deposit = test_deposit(tx, n, btc_addr);
    DepositInfo {
        seq,
        updated_at: 1,
        status,
        coin_type: CoinType::Btc,
        sky_address: sky_addr.to_string(),
        deposit_address: btc_addr.to_string(),
        deposit_id: deposit.deposit_id(),
        deposit,
        conversion_rate: "100".to_string(),
        sky_sent,
        txid: txid.to_string(),
        passthrough: Default::default(),
        error: String::new(),
    }
}

#[tokio::test]
async fn restart_resumes_wait_confirm_backlog() {
    let (harness, notes_rx) = new_harness().await;

    // Two deposits were sent but not yet confirmed when the process died.
    for (seq, tx) in [(1, "foo-tx-1"), (2, "foo-tx-2")] {
        let di = seeded_deposit_info(
            seq,
            DepositStatus::WaitConfirm,
            &format!("sky-{seq}"),
            &format!("btc-{seq}"),
            tx,
            seq as u32,
            &format!("sky-txid-{seq}"),
            100_000_000,
        );
        harness.store.add_deposit_info(&di).await.unwrap();
        harness.wallet.set_confirmed(&di.txid);
    }

    let exchange = Exchange::direct(
        test_config(BuyMethod::Direct),
        harness.store.clone(),
        harness.multiplexer.clone(),
        notes_rx,
        harness.wallet.clone(),
    )
    .unwrap();

    // Both reach done without any scanner event.
    wait_for_status(&harness.store, "foo-tx-1:1", DepositStatus::Done).await;
    wait_for_status(&harness.store, "foo-tx-2:2", DepositStatus::Done).await;

    exchange.shutdown().await;
}

#[tokio::test]
async fn restart_resumes_wait_send_backlog() {
    let (harness, notes_rx) = new_harness().await;

    for (seq, tx) in [(1, "foo-tx-1"), (2, "foo-tx-2")] {
        let sky = format!("sky-{seq}");
        let btc = format!("btc-{seq}");
        harness
            .store
            .bind_address(&sky, &btc, CoinType::Btc, BuyMethod::Direct)
            .await
            .unwrap();

        let di = seeded_deposit_info(
            seq,
            DepositStatus::WaitSend,
            &sky,
            &btc,
            tx,
            seq as u32,
            "",
            0,
        );
        harness.store.add_deposit_info(&di).await.unwrap();

        let txid = format!("sky-txid-{seq}");
        harness.wallet.add_txid(&txid);
        harness.wallet.set_confirmed(&txid);
    }

    let exchange = Exchange::direct(
        test_config(BuyMethod::Direct),
        harness.store.clone(),
        harness.multiplexer.clone(),
        notes_rx,
        harness.wallet.clone(),
    )
    .unwrap();

    // Both are sent with the seeded rate applied, then confirmed.
    let one = wait_for_status(&harness.store, "foo-tx-1:1", DepositStatus::Done).await;
    let two = wait_for_status(&harness.store, "foo-tx-2:2", DepositStatus::Done).await;
    assert_eq!(one.sky_sent, 100_000_000);
    assert_eq!(two.sky_sent, 100_000_000);
    assert!(!one.txid.is_empty());

    exchange.shutdown().await;
}

#[tokio::test]
async fn passthrough_recovers_unrecorded_order() {
    let (harness, notes_rx) = new_harness().await;

    // A crash lost the order id: the record is still waiting_passthrough
    // with its customer id set.
    harness
        .store
        .bind_address("sky-a", "btc-a", CoinType::Btc, BuyMethod::Passthrough)
        .await
        .unwrap();
    let created = harness
        .store
        .get_or_create_deposit_info(&test_deposit("foo-tx", 1, "btc-a"), "100")
        .await
        .unwrap();
    harness
        .store
        .update_deposit_info(&created.deposit_id, |mut d| {
            d.status = DepositStatus::WaitPassthrough;
            d.passthrough.exchange_name = "c2cx".to_string();
            d.passthrough.requested_amount = "1".to_string();
            d.passthrough.order.customer_id = d.deposit_id.clone();
            d
        })
        .await
        .unwrap();

    // The exchange knows the order under our customer id.
    let market = Arc::new(DummyMarket::default());
    let order = Order {
        order_id: 42,
        customer_id: Some("foo-tx:1".to_string()),
        status: OrderStatus::Completed,
        amount: Decimal::ONE,
        price: Decimal::ZERO,
        avg_price: Decimal::new(2, 3),
        completed_amount: Decimal::from(50),
    };
    market.all_orders.lock().unwrap().push(order.clone());
    market.orders.lock().unwrap().insert(42, order);

    harness.wallet.add_txid("sky-txid");
    harness.wallet.set_confirmed("sky-txid");

    let exchange = Exchange::passthrough(
        test_config(BuyMethod::Passthrough),
        harness.store.clone(),
        harness.multiplexer.clone(),
        notes_rx,
        harness.wallet.clone(),
        market,
    )
    .unwrap();

    // Recovery finds order 42, the order completes, and the bought amount
    // is sent and confirmed.
    let di = wait_for_status(&harness.store, "foo-tx:1", DepositStatus::Done).await;
    assert_eq!(di.passthrough.order.order_id, "42");
    assert!(di.passthrough.order.finalized);
    assert_eq!(di.passthrough.sky_bought, 50_000_000);
    assert_eq!(di.sky_sent, 50_000_000);
    assert_eq!(di.txid, "sky-txid");

    exchange.shutdown().await;
}
