//! Library entrypoint for the theft-address monitor. The API process embeds
//! [`MonitorService`] for its control surface; `main.rs` runs the same
//! orchestrator as a standalone scheduled binary.

pub mod alert;
pub mod chain;
pub mod client;
mod pipeline;
pub mod resolver;
pub mod rpc;
pub mod scheduler;
pub mod watchlist;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use alert::{format_alert, Alert, AlertDispatcher, LogDispatcher, MailerSendDispatcher};
pub use chain::{ChainAdapter, ChainRegistry, EsploraAdapter, EthereumRpcAdapter};
pub use resolver::{resolve_first_known, DestinationResolver, UnknownResolver, WalletLabelsResolver};
pub use scheduler::{MonitorService, MonitorStatus, StartOutcome, StopOutcome};
pub use watchlist::{ingest, FlaggedAddressFeed, HttpFlaggedFeed};
pub use worker::{build_monitor, Monitor, MonitorError, MonitorSettings, StopHandle, StopSignal};
