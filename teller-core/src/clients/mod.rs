//! Contracts for the external collaborators the pipeline consumes, plus
//! their HTTP implementations.
//!
//! The pipeline depends only on the traits; test doubles implement them
//! directly.

pub mod c2cx;
pub mod market;
pub mod scanner;
pub mod skyd;
pub mod wallet;

pub use c2cx::C2cxClient;
pub use market::{ExchangeMarket, MarketError, Order, OrderId, OrderStatus, TradePair};
pub use scanner::{DepositNote, Multiplexer, Scanner, ScannerError};
pub use skyd::SkyNodeSender;
pub use wallet::{Balance, ConfirmError, SendError, WalletSender};
