//! Pipeline components.
//!
//! Three long-running workers hand deposit records forward over bounded
//! channels:
//!
//! - `Receiver`: consumes scanner deposit notes, creates records, forwards
//!   them to the processor.
//! - `DirectBuy` or `Passthrough`: advances records to `waiting_send`.
//! - `Sender`: submits the outgoing transaction and confirms it.
//!
//! Every worker multiplexes its queue with the shared shutdown watch
//! channel and never terminates on a per-deposit error.

pub mod direct;
pub mod passthrough;
pub mod receiver;
pub mod sender;

pub use direct::DirectBuy;
pub use passthrough::{classify, Passthrough, ProcessError, TradeAction};
pub use receiver::Receiver;
pub use sender::Sender;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::error;

use crate::store::Store;

/// Sleep, waking early on shutdown. Returns false when shutting down.
pub(crate) async fn sleep_or_shutdown(
    shutdown_rx: &mut watch::Receiver<bool>,
    duration: Duration,
) -> bool {
    tokio::select! {
        biased;

        _ = shutdown_rx.changed() => !*shutdown_rx.borrow(),

        _ = tokio::time::sleep(duration) => true,
    }
}

/// Set a deposit's error marker, leaving its status in place.
///
/// A failure to record the marker is logged and swallowed; the deposit is
/// already outside the happy path.
pub(crate) async fn mark_deposit_errored(store: &Store, deposit_id: &str, message: &str) {
    let message = message.to_string();
    if let Err(e) = store
        .update_deposit_info(deposit_id, move |mut di| {
            di.error = message;
            di
        })
        .await
    {
        error!(deposit_id, error = %e, "failed to record deposit error marker");
    }
}

/// Shared view of a worker's last processing error.
///
/// Cloned out of a worker before it is spawned so the exchange can expose
/// component health while the worker owns itself.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<Mutex<Option<String>>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful processing pass.
    pub fn set_ok(&self) {
        *self.lock() = None;
    }

    /// Record the most recent failure.
    pub fn set_err(&self, err: &impl std::fmt::Display) {
        *self.lock() = Some(err.to_string());
    }

    /// The last recorded failure, if the most recent pass failed.
    pub fn get(&self) -> Option<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
