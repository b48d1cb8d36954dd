//! Relay Hub - interchain coordination core
//!
//! Accepts cross-chain packets from registered appchains, enforces their
//! per-route ordering and authenticity, coordinates multi-chain
//! transactions and arbitrates two-party asset exchanges.

pub mod api;
pub mod config;
pub mod crypto;
pub mod directory;
pub mod error;
pub mod events;
pub mod exchange;
pub mod hub;
pub mod interchain;
pub mod ledger;
pub mod metrics;
pub mod transaction;

pub use error::{HubError, HubResult};
pub use hub::{Hub, HubCall, Receipt};
