//! In-process directory built from genesis configuration

use super::{Appchain, ChainDirectory};
use crate::config::Settings;
use crate::crypto::Address;

use std::collections::{BTreeMap, BTreeSet};

/// Directory whose contents are fixed at construction time.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    chains: BTreeMap<String, Appchain>,
    admins: BTreeSet<Address>,
    rules: BTreeMap<String, String>,
    default_rules: BTreeMap<String, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(mut self, chain: Appchain) -> Self {
        self.chains.insert(chain.id.clone(), chain);
        self
    }

    pub fn with_admin(mut self, admin: Address) -> Self {
        self.admins.insert(admin);
        self
    }

    /// Rule registered for one chain
    pub fn with_rule(mut self, chain_id: &str, address: &str) -> Self {
        self.rules.insert(chain_id.to_string(), address.to_string());
        self
    }

    /// Rule used for every chain of `chain_type` without its own rule
    pub fn with_default_rule(mut self, chain_type: &str, address: &str) -> Self {
        self.default_rules
            .insert(chain_type.to_string(), address.to_string());
        self
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut directory = Self::new();
        for chain in &settings.appchains {
            directory = directory.with_chain(chain.clone());
        }
        for admin in &settings.admins {
            directory = directory.with_admin(*admin);
        }
        for rule in &settings.rules {
            directory = match (&rule.chain_id, &rule.chain_type) {
                (Some(chain_id), _) => directory.with_rule(chain_id, &rule.address),
                (None, Some(chain_type)) => directory.with_default_rule(chain_type, &rule.address),
                (None, None) => directory,
            };
        }
        directory
    }

    pub fn chain_count(&self) -> usize {
        self.chains.len()
    }
}

impl ChainDirectory for StaticDirectory {
    fn get_chain(&self, chain_id: &str) -> Option<Appchain> {
        self.chains.get(chain_id).cloned()
    }

    fn is_admin(&self, address: &Address) -> bool {
        self.admins.contains(address)
    }

    fn get_rule_address(&self, chain_id: &str, chain_type: &str) -> Option<String> {
        self.rules
            .get(chain_id)
            .or_else(|| self.default_rules.get(chain_type))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::directory::ChainStatus;

    fn chain(id: &str) -> Appchain {
        Appchain {
            id: id.to_string(),
            name: id.to_string(),
            chain_type: "fabric".to_string(),
            status: ChainStatus::Available,
            public_key: String::new(),
            validators: vec![],
        }
    }

    #[test]
    fn test_lookup_and_admins() {
        let admin = KeyPair::from_seed("admin").unwrap().address();
        let directory = StaticDirectory::new()
            .with_chain(chain("did:bitxhub:appchain1:."))
            .with_admin(admin);

        assert!(directory.get_chain("did:bitxhub:appchain1:.").is_some());
        assert!(directory.get_chain("did:bitxhub:appchain2:.").is_none());
        assert!(directory.is_admin(&admin));
        assert!(!directory.is_admin(&KeyPair::from_seed("x").unwrap().address()));
    }

    #[test]
    fn test_rule_falls_back_to_chain_type_default() {
        let directory = StaticDirectory::new()
            .with_rule("did:bitxhub:appchain1:.", "0x123")
            .with_default_rule("fabric", "0xfab");

        assert_eq!(
            directory.get_rule_address("did:bitxhub:appchain1:.", "fabric"),
            Some("0x123".to_string())
        );
        assert_eq!(
            directory.get_rule_address("did:bitxhub:appchain2:.", "fabric"),
            Some("0xfab".to_string())
        );
        assert_eq!(
            directory.get_rule_address("did:bitxhub:appchain2:.", "hyperchain"),
            None
        );
    }
}
