//! Teller daemon.
//!
//! Binds deposit addresses to destination addresses, processes observed
//! deposits through the exchange pipeline, and serves the HTTP status API.

mod api;
mod config;
mod dummy;
mod shutdown;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use teller_core::clients::c2cx::C2cxClient;
use teller_core::clients::scanner::Multiplexer;
use teller_core::clients::skyd::SkyNodeSender;
use teller_core::clients::wallet::WalletSender;
use teller_core::entities::{BuyMethod, CoinType};
use teller_core::exchange::Exchange;
use teller_core::store::Store;

use api::AppState;
use config::FileConfig;
use dummy::{DummyScanner, DummyWallet};

/// Teller - cryptocurrency deposit gateway
#[derive(Parser, Debug)]
#[command(name = "teller")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./teller.toml")]
    config: PathBuf,

    /// Override the HTTP listen address (e.g. 0.0.0.0:7071)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("starting teller v{}", env!("CARGO_PKG_VERSION"));

    let file_config = FileConfig::load(&args.config).map_err(|e| {
        tracing::error!(path = %args.config.display(), error = %e, "failed to load configuration");
        e
    })?;
    tracing::info!(config = ?file_config.redacted(), "configuration loaded");

    let runtime = file_config.into_runtime(args.listen)?;

    let store = Arc::new(
        Store::open(&runtime.db_path, runtime.max_bound_addrs)
            .await
            .map_err(|e| {
                tracing::error!(path = %runtime.db_path.display(), error = %e, "failed to open store");
                e
            })?,
    );
    tracing::info!(path = %runtime.db_path.display(), "store opened");

    // Chain scanners are external collaborators; in dummy mode fake ones
    // are registered and deposits come in through the API.
    let (multiplexer, notes_rx) = Multiplexer::new();
    let multiplexer = Arc::new(multiplexer);

    let mut deposit_injector = None;
    if runtime.dummy_scanner {
        multiplexer.add_scanner(CoinType::Btc, Arc::new(DummyScanner))?;
        multiplexer.add_scanner(CoinType::Eth, Arc::new(DummyScanner))?;
        deposit_injector = Some(multiplexer.notes_sender());
        tracing::warn!("dummy scanner enabled; deposits are injected via /api/dummy/deposit");
    } else {
        tracing::warn!("no chain scanners configured; the bind API will reject new bindings");
    }

    let wallet: Arc<dyn WalletSender> = if runtime.dummy_sender {
        tracing::warn!("dummy sender enabled; no coins will actually be sent");
        Arc::new(DummyWallet::new())
    } else {
        Arc::new(SkyNodeSender::new(
            runtime.sky_rpc_address.clone(),
            runtime.wallet_id.clone(),
        ))
    };

    let exchange = match runtime.exchange.buy_method {
        BuyMethod::Direct => Exchange::direct(
            runtime.exchange.clone(),
            store.clone(),
            multiplexer.clone(),
            notes_rx,
            wallet,
        )?,
        BuyMethod::Passthrough => {
            let market = Arc::new(C2cxClient::new(
                runtime.exchange.c2cx.key.clone(),
                runtime.exchange.c2cx.secret.clone(),
            ));
            Exchange::passthrough(
                runtime.exchange.clone(),
                store.clone(),
                multiplexer.clone(),
                notes_rx,
                wallet,
                market,
            )?
        }
    };
    let exchange = Arc::new(exchange);

    let state = AppState {
        exchange: exchange.clone(),
        bind_enabled: runtime.bind_enabled,
        deposit_injector,
    };
    let router = api::build_router(state);

    let listener = TcpListener::bind(runtime.listen).await.map_err(|e| {
        tracing::error!(listen = %runtime.listen, error = %e, "failed to bind listen address");
        e
    })?;
    tracing::info!(listen = %runtime.listen, "http server listening");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await;

    tracing::info!("http server stopped");

    exchange.shutdown().await;
    store.close().await;

    tracing::info!("teller shutdown complete");

    result.map_err(Into::into)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
