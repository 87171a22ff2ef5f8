//! Hand-off channels between pipeline components.
//!
//! Records flow Receiver -> Processor -> Sender over bounded queues; every
//! consumer loop multiplexes its queue with the shared shutdown signal.

use tokio::sync::mpsc;

use crate::clients::scanner::DepositNote;
use crate::entities::DepositInfo;

/// Buffer size for pipeline hand-off channels.
pub const DEFAULT_CHANNEL_BUFFER: usize = 100;

/// Sender handle for deposit-record hand-offs.
pub type DepositInfoSender = mpsc::Sender<DepositInfo>;
/// Receiver handle for deposit-record hand-offs.
pub type DepositInfoReceiver = mpsc::Receiver<DepositInfo>;

/// Sender handle for scanner deposit notes.
pub type DepositNoteSender = mpsc::Sender<DepositNote>;
/// Receiver handle for scanner deposit notes.
pub type DepositNoteReceiver = mpsc::Receiver<DepositNote>;

/// Create a bounded channel carrying deposit records between components.
pub fn deposit_info_channel() -> (DepositInfoSender, DepositInfoReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Create a bounded channel carrying scanner deposit notes.
pub fn deposit_note_channel() -> (DepositNoteSender, DepositNoteReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
