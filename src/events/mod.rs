//! Events emitted by hub operations
//!
//! Events are buffered on the invocation and only returned to the caller
//! when the operation commits, so a rejected call never leaks an event.

use crate::exchange::AssetExchangeStatus;
use crate::interchain::IbtpType;
use crate::transaction::TransactionStatus;

use serde::{Deserialize, Serialize};

/// Events produced by the hub state machines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HubEvent {
    /// Packet accepted and indexed; relays pick these up for delivery
    Interchain {
        ibtp_id: String,
        from: String,
        to: String,
        index: u64,
        ibtp_type: IbtpType,
        tx_hash: String,
    },

    /// Route metadata created for a chain
    InterchainRegistered { chain_id: String },

    /// Single or multi-participant transaction opened
    TransactionBegun {
        id: String,
        children: Vec<String>,
    },

    /// A single or child transaction reported its outcome
    TransactionReported {
        id: String,
        global_id: Option<String>,
        status: TransactionStatus,
    },

    /// Global transaction reached a terminal state
    GlobalTransactionFinished {
        global_id: String,
        status: TransactionStatus,
    },

    /// Asset exchange record created or transitioned
    AssetExchangeUpdated {
        id: String,
        status: AssetExchangeStatus,
    },
}

impl HubEvent {
    /// Get event name for metrics
    pub fn name(&self) -> &'static str {
        match self {
            HubEvent::Interchain { .. } => "interchain",
            HubEvent::InterchainRegistered { .. } => "interchain_registered",
            HubEvent::TransactionBegun { .. } => "transaction_begun",
            HubEvent::TransactionReported { .. } => "transaction_reported",
            HubEvent::GlobalTransactionFinished { .. } => "global_transaction_finished",
            HubEvent::AssetExchangeUpdated { .. } => "asset_exchange_updated",
        }
    }

    /// Whether a relay has to forward this event to another chain
    pub fn requires_relay(&self) -> bool {
        matches!(self, HubEvent::Interchain { .. })
    }
}
