//! Per-chain route counters

use super::ibtp::Ibtp;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ledger key of a chain's route metadata
pub fn interchain_key(chain_id: &str) -> String {
    format!("interchain-{}", chain_id)
}

/// Route metadata owned by one source chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interchain {
    pub id: String,
    /// destination -> last request index sent
    pub interchain_counter: BTreeMap<String, u64>,
    /// destination -> last receipt index processed
    pub receipt_counter: BTreeMap<String, u64>,
    /// source -> last receipt for one of our own requests
    pub source_receipt_counter: BTreeMap<String, u64>,
}

impl Interchain {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    /// Index the next packet on `ibtp`'s route must carry.
    ///
    /// Requests are ordered by the outbound counter and receipts by the
    /// receipt counter, both keyed by destination.
    pub fn expected_index(&self, ibtp: &Ibtp) -> u64 {
        let counter = if ibtp.ibtp_type.is_receipt() {
            &self.receipt_counter
        } else {
            &self.interchain_counter
        };
        counter
            .get(&ibtp.to)
            .copied()
            .unwrap_or(0)
            .saturating_add(1)
    }

    /// Record `ibtp` as the latest accepted packet on its route.
    pub fn advance(&mut self, ibtp: &Ibtp) {
        let counter = if ibtp.ibtp_type.is_receipt() {
            &mut self.receipt_counter
        } else {
            &mut self.interchain_counter
        };
        counter.insert(ibtp.to.clone(), ibtp.index);
    }
}
