//! Per-call execution context

use super::overlay::{ChangeSet, Overlay, Snapshot};
use super::Ledger;
use crate::crypto::Address;
use crate::directory::ChainDirectory;
use crate::events::HubEvent;
use crate::interchain::{ProofVerifier, QuorumPolicy};

use serde::{Deserialize, Serialize};

/// Identity of the ledger transaction an operation runs inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxContext {
    /// Address that signed the submission
    pub caller: Address,
    /// Hex hash of the submission
    pub tx_hash: String,
    /// Position of the submission in the hub's ordering
    pub tx_index: u64,
}

impl TxContext {
    pub fn new(caller: Address, tx_hash: impl Into<String>, tx_index: u64) -> Self {
        Self {
            caller,
            tx_hash: tx_hash.into(),
            tx_index,
        }
    }
}

/// Everything one operation may read or write.
///
/// Storage writes land in an [`Overlay`] and events are buffered; both are
/// handed back by [`Invocation::finish`] so the caller decides whether they
/// take effect.
pub struct Invocation<'a> {
    state: Overlay<'a>,
    tx: &'a TxContext,
    directory: &'a dyn ChainDirectory,
    verifier: Option<&'a dyn ProofVerifier>,
    quorum: QuorumPolicy,
    events: Vec<HubEvent>,
}

/// Point an invocation can roll back to
pub struct Savepoint {
    state: Snapshot,
    events: usize,
}

impl<'a> Invocation<'a> {
    pub fn new(
        ledger: &'a dyn Ledger,
        tx: &'a TxContext,
        directory: &'a dyn ChainDirectory,
        quorum: QuorumPolicy,
    ) -> Self {
        Self {
            state: Overlay::new(ledger),
            tx,
            directory,
            verifier: None,
            quorum,
            events: Vec::new(),
        }
    }

    /// Install the dispatcher used for rule-based proof validation
    pub fn with_verifier(mut self, verifier: Option<&'a dyn ProofVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn caller(&self) -> &Address {
        &self.tx.caller
    }

    pub fn tx_hash(&self) -> &str {
        &self.tx.tx_hash
    }

    pub fn tx_index(&self) -> u64 {
        self.tx.tx_index
    }

    pub fn directory(&self) -> &'a dyn ChainDirectory {
        self.directory
    }

    pub fn verifier(&self) -> Option<&'a dyn ProofVerifier> {
        self.verifier
    }

    pub fn quorum(&self) -> QuorumPolicy {
        self.quorum
    }

    pub fn emit(&mut self, event: HubEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[HubEvent] {
        &self.events
    }

    pub fn savepoint(&self) -> Savepoint {
        Savepoint {
            state: self.state.snapshot(),
            events: self.events.len(),
        }
    }

    /// Undo every write and event since `savepoint`.
    pub fn rollback_to(&mut self, savepoint: Savepoint) {
        self.state.restore(savepoint.state);
        self.events.truncate(savepoint.events);
    }

    /// Release the ledger borrow, returning pending writes and events.
    pub fn finish(self) -> (ChangeSet, Vec<HubEvent>) {
        (self.state.into_changes(), self.events)
    }
}

impl Ledger for Invocation<'_> {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state.get(key)
    }

    fn set(&mut self, key: &str, value: Vec<u8>) {
        self.state.set(key, value)
    }

    fn has(&self, key: &str) -> bool {
        self.state.has(key)
    }

    fn delete(&mut self, key: &str) {
        self.state.delete(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::directory::StaticDirectory;
    use crate::ledger::{LedgerExt, MemoryLedger};

    #[test]
    fn test_rollback_discards_writes_and_events() {
        let ledger = MemoryLedger::new();
        let directory = StaticDirectory::new();
        let tx = TxContext::new(KeyPair::from_seed("c").unwrap().address(), "0xab", 7);
        let mut inv = Invocation::new(&ledger, &tx, &directory, QuorumPolicy::default());

        inv.set_object("k1", &1u64).unwrap();
        inv.emit(HubEvent::InterchainRegistered {
            chain_id: "a".to_string(),
        });
        let savepoint = inv.savepoint();
        inv.set_object("k2", &2u64).unwrap();
        inv.emit(HubEvent::InterchainRegistered {
            chain_id: "b".to_string(),
        });
        inv.rollback_to(savepoint);

        assert_eq!(inv.tx_index(), 7);
        assert_eq!(inv.tx_hash(), "0xab");
        let (changes, events) = inv.finish();
        assert_eq!(changes.len(), 1);
        assert_eq!(events.len(), 1);
    }
}
