//! Appchain directory
//!
//! Chain registration, auditing and role management live outside the hub.
//! The hub only needs three read operations from them, gathered in the
//! [`ChainDirectory`] capability:
//! - look up a chain record by id
//! - decide whether an address is a hub admin
//! - resolve the validation rule that applies to a chain

mod registry;

pub use registry::StaticDirectory;

use crate::crypto::Address;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Lifecycle status of a registered appchain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainStatus {
    Registered,
    Available,
    Frozen,
    Logout,
}

impl fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChainStatus::Registered => "registered",
            ChainStatus::Available => "available",
            ChainStatus::Frozen => "frozen",
            ChainStatus::Logout => "logout",
        };
        write!(f, "{}", s)
    }
}

/// Directory record of one appchain (or relay chain)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appchain {
    pub id: String,
    pub name: String,
    pub chain_type: String,
    pub status: ChainStatus,
    /// Base64-encoded secp256k1 public key of the chain's gateway
    pub public_key: String,
    /// Validator addresses; only relay chains use these
    #[serde(default)]
    pub validators: Vec<String>,
}

impl Appchain {
    /// Address bound to this chain's registered key.
    pub fn caller_address(&self) -> crate::error::HubResult<Address> {
        Address::from_base64_public_key(&self.public_key)
    }

    /// Parsed validator addresses. Entries that are not addresses are
    /// skipped and never count towards a quorum.
    pub fn validator_addresses(&self) -> Vec<Address> {
        let mut out = Vec::with_capacity(self.validators.len());
        for raw in &self.validators {
            match raw.parse::<Address>() {
                Ok(addr) => out.push(addr),
                Err(e) => warn!("Chain {} has malformed validator {}: {}", self.id, raw, e),
            }
        }
        out
    }
}

/// Read access to the collaborator registries
#[cfg_attr(test, mockall::automock)]
pub trait ChainDirectory: Send + Sync {
    /// Chain record by id
    fn get_chain(&self, chain_id: &str) -> Option<Appchain>;

    fn is_admin(&self, address: &Address) -> bool;

    /// Address of the validation rule for a chain, falling back to the
    /// default rule for its chain type.
    fn get_rule_address(&self, chain_id: &str, chain_type: &str) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_caller_address_matches_key() {
        let key = KeyPair::from_seed("chain-a").unwrap();
        let chain = Appchain {
            id: "did:bitxhub:appchain1:.".to_string(),
            name: "A".to_string(),
            chain_type: "fabric".to_string(),
            status: ChainStatus::Available,
            public_key: key.public_key_base64(),
            validators: vec![],
        };
        assert_eq!(chain.caller_address().unwrap(), key.address());
    }

    #[test]
    fn test_malformed_validators_are_skipped() {
        let v = KeyPair::from_seed("v0").unwrap();
        let chain = Appchain {
            id: "did:bitxhub:relay:.".to_string(),
            name: "relay".to_string(),
            chain_type: "relaychain".to_string(),
            status: ChainStatus::Available,
            public_key: String::new(),
            validators: vec![v.address().to_string(), "garbage".to_string()],
        };
        assert_eq!(chain.validator_addresses(), vec![v.address()]);
    }

    #[test]
    fn test_status_serde() {
        let s: ChainStatus = serde_json::from_str("\"frozen\"").unwrap();
        assert_eq!(s, ChainStatus::Frozen);
        assert_eq!(s.to_string(), "frozen");
    }
}
