//! Cross-chain transaction coordination
//!
//! The coordinator tracks whether a logical cross-chain operation finished:
//! 1. `begin` opens a single transaction, `begin_multi` a global one with
//!    independently reported children
//! 2. Participants `report` success or failure exactly once
//! 3. A failing child fails its global transaction immediately; the global
//!    transaction succeeds once every child has succeeded

mod status;

pub use status::{GlobalTransaction, TransactionStatus, TxOutcome};

use crate::error::{HubError, HubResult, Missing};
use crate::events::HubEvent;
use crate::ledger::{Invocation, Ledger, LedgerExt};

use tracing::{debug, info, warn};

fn single_key(id: &str) -> String {
    format!("tx-{}", id)
}

fn global_key(global_id: &str) -> String {
    format!("global-tx-{}", global_id)
}

fn child_key(child_id: &str) -> String {
    format!("child-tx-{}", child_id)
}

/// Transaction coordinator over one invocation
pub struct TransactionManager<'i, 'a> {
    inv: &'i mut Invocation<'a>,
}

impl<'i, 'a> TransactionManager<'i, 'a> {
    pub fn new(inv: &'i mut Invocation<'a>) -> Self {
        Self { inv }
    }

    /// Open a single transaction
    pub fn begin(&mut self, id: &str) -> HubResult<()> {
        self.ensure_unused(id)?;
        self.inv.set_object(&single_key(id), &TransactionStatus::Begin)?;

        debug!("Transaction {} begun", id);
        self.inv.emit(HubEvent::TransactionBegun {
            id: id.to_string(),
            children: Vec::new(),
        });
        Ok(())
    }

    /// Open a global transaction whose outcome aggregates `children`
    pub fn begin_multi(&mut self, global_id: &str, children: &[String]) -> HubResult<()> {
        self.ensure_unused(global_id)?;
        if children.is_empty() {
            return Err(HubError::InvalidBatch(format!(
                "global transaction {} has no children",
                global_id
            )));
        }

        let global = GlobalTransaction::new(children);
        self.inv.set_object(&global_key(global_id), &global)?;
        for child in children {
            let key = child_key(child);
            if let Some(previous) = self.inv.get_object::<String>(&key)? {
                warn!(
                    "Child {} moves from global transaction {} to {}",
                    child, previous, global_id
                );
            }
            self.inv.set_object(&key, &global_id.to_string())?;
        }

        info!(
            "Global transaction {} begun with {} children",
            global_id,
            global.child_status.len()
        );
        self.inv.emit(HubEvent::TransactionBegun {
            id: global_id.to_string(),
            children: children.to_vec(),
        });
        Ok(())
    }

    /// Record the outcome of a single or child transaction
    pub fn report(&mut self, id: &str, outcome: TxOutcome) -> HubResult<()> {
        let status = TransactionStatus::from(outcome);

        let key = single_key(id);
        if let Some(current) = self.inv.get_object::<TransactionStatus>(&key)? {
            if current.is_terminal() {
                return Err(HubError::AlreadyTerminal {
                    id: id.to_string(),
                    global: false,
                });
            }
            self.inv.set_object(&key, &status)?;

            info!("Transaction {} finished with {}", id, status);
            self.inv.emit(HubEvent::TransactionReported {
                id: id.to_string(),
                global_id: None,
                status,
            });
            return Ok(());
        }

        self.report_child(id, status)
    }

    fn report_child(&mut self, id: &str, status: TransactionStatus) -> HubResult<()> {
        let global_id: String = self
            .inv
            .get_object(&child_key(id))?
            .ok_or_else(|| HubError::UnknownChild { id: id.to_string() })?;

        let key = global_key(&global_id);
        let mut global: GlobalTransaction = self
            .inv
            .get_object(&key)?
            .ok_or_else(|| HubError::NotFound(Missing::GlobalOfChild(global_id.clone())))?;

        if global.global_state.is_terminal() {
            return Err(HubError::AlreadyTerminal {
                id: global_id,
                global: true,
            });
        }
        let child = global
            .child_status
            .get_mut(id)
            .ok_or_else(|| HubError::NotAChild {
                id: id.to_string(),
                global_id: global_id.clone(),
            })?;
        if child.is_terminal() {
            return Err(HubError::AlreadyReported { id: id.to_string() });
        }
        *child = status;

        match status {
            TransactionStatus::Failure => global.global_state = TransactionStatus::Failure,
            _ if global.all_succeeded() => global.global_state = TransactionStatus::Success,
            _ => {}
        }
        self.inv.set_object(&key, &global)?;

        debug!("Child {} of {} reported {}", id, global_id, status);
        self.inv.emit(HubEvent::TransactionReported {
            id: id.to_string(),
            global_id: Some(global_id.clone()),
            status,
        });
        if global.global_state.is_terminal() {
            info!(
                "Global transaction {} finished with {}",
                global_id, global.global_state
            );
            self.inv.emit(HubEvent::GlobalTransactionFinished {
                global_id,
                status: global.global_state,
            });
        }
        Ok(())
    }

    /// Status of a single transaction, a global transaction, or the global
    /// transaction a child belongs to.
    pub fn get_status(&self, id: &str) -> HubResult<TransactionStatus> {
        if let Some(status) = self.inv.get_object::<TransactionStatus>(&single_key(id))? {
            return Ok(status);
        }
        if let Some(global) = self.inv.get_object::<GlobalTransaction>(&global_key(id))? {
            return Ok(global.global_state);
        }

        let global_id: String = self
            .inv
            .get_object(&child_key(id))?
            .ok_or_else(|| HubError::NotFound(Missing::Transaction(id.to_string())))?;
        let global: GlobalTransaction = self
            .inv
            .get_object(&global_key(&global_id))?
            .ok_or(HubError::NotFound(Missing::GlobalTransaction(global_id)))?;
        Ok(global.global_state)
    }

    fn ensure_unused(&self, id: &str) -> HubResult<()> {
        if self.inv.has(&single_key(id)) || self.inv.has(&global_key(id)) {
            return Err(HubError::AlreadyExists("transaction id"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::directory::StaticDirectory;
    use crate::interchain::QuorumPolicy;
    use crate::ledger::{MemoryLedger, TxContext};

    fn with_manager<T>(ledger: &MemoryLedger, f: impl FnOnce(&mut TransactionManager) -> T) -> T {
        let directory = StaticDirectory::new();
        let tx = TxContext::new(KeyPair::from_seed("caller").unwrap().address(), "0x00", 1);
        let mut inv = Invocation::new(ledger, &tx, &directory, QuorumPolicy::default());
        f(&mut TransactionManager::new(&mut inv))
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_transaction() {
        let ledger = MemoryLedger::new();
        with_manager(&ledger, |tm| {
            tm.begin("id0").unwrap();
            assert_eq!(tm.get_status("id0").unwrap(), TransactionStatus::Begin);
            assert!(matches!(tm.begin("id0"), Err(HubError::AlreadyExists(_))));

            tm.report("id0", TxOutcome::Success).unwrap();
            assert_eq!(tm.get_status("id0").unwrap(), TransactionStatus::Success);

            let err = tm.report("id0", TxOutcome::Failure).unwrap_err();
            assert_eq!(err.to_string(), "transaction with Id id0 is finished");
            assert_eq!(tm.get_status("id0").unwrap(), TransactionStatus::Success);
        });
    }

    #[test]
    fn test_multi_transaction_success_after_last_child() {
        let ledger = MemoryLedger::new();
        with_manager(&ledger, |tm| {
            tm.begin_multi("g1", &ids(&["c1", "c2"])).unwrap();

            tm.report("c1", TxOutcome::Success).unwrap();
            assert_eq!(tm.get_status("g1").unwrap(), TransactionStatus::Begin);

            tm.report("c2", TxOutcome::Success).unwrap();
            assert_eq!(tm.get_status("g1").unwrap(), TransactionStatus::Success);
            assert_eq!(tm.get_status("c1").unwrap(), TransactionStatus::Success);
        });
    }

    #[test]
    fn test_multi_transaction_success_in_reverse_order() {
        let ledger = MemoryLedger::new();
        with_manager(&ledger, |tm| {
            tm.begin_multi("g5", &ids(&["e1", "e2"])).unwrap();

            tm.report("e2", TxOutcome::Success).unwrap();
            assert_eq!(tm.get_status("g5").unwrap(), TransactionStatus::Begin);
            assert_eq!(tm.get_status("e1").unwrap(), TransactionStatus::Begin);
            assert_eq!(tm.get_status("e2").unwrap(), TransactionStatus::Begin);

            tm.report("e1", TxOutcome::Success).unwrap();
            assert_eq!(tm.get_status("g5").unwrap(), TransactionStatus::Success);
            assert_eq!(tm.get_status("e1").unwrap(), TransactionStatus::Success);
            assert_eq!(tm.get_status("e2").unwrap(), TransactionStatus::Success);
        });
    }

    #[test]
    fn test_global_transaction_needs_children() {
        let ledger = MemoryLedger::new();
        with_manager(&ledger, |tm| {
            let err = tm.begin_multi("g6", &[]).unwrap_err();
            assert!(matches!(err, HubError::InvalidBatch(_)));
            assert!(!tm.inv.has(&global_key("g6")));
            tm.begin("g6").unwrap();
        });
    }

    #[test]
    fn test_multi_transaction_fails_fast() {
        let ledger = MemoryLedger::new();
        with_manager(&ledger, |tm| {
            tm.begin_multi("g2", &ids(&["c3", "c4"])).unwrap();
            tm.report("c4", TxOutcome::Failure).unwrap();
            assert_eq!(tm.get_status("g2").unwrap(), TransactionStatus::Failure);

            let global: GlobalTransaction = tm.inv.get_object(&global_key("g2")).unwrap().unwrap();
            assert_eq!(global.child_status["c3"], TransactionStatus::Begin);
            assert_eq!(global.child_status["c4"], TransactionStatus::Failure);

            let err = tm.report("c3", TxOutcome::Success).unwrap_err();
            assert_eq!(err.to_string(), "transaction with global Id g2 is finished");
        });
    }

    #[test]
    fn test_child_report_errors() {
        let ledger = MemoryLedger::new();
        with_manager(&ledger, |tm| {
            let err = tm.report("nobody", TxOutcome::Success).unwrap_err();
            assert_eq!(err.to_string(), "cannot get global id of child tx id nobody");

            tm.begin_multi("g3", &ids(&["c5", "c6"])).unwrap();
            tm.report("c5", TxOutcome::Success).unwrap();
            let err = tm.report("c5", TxOutcome::Success).unwrap_err();
            assert_eq!(err.to_string(), "c5 has already reported result");

            // reverse index pointing at a global record that lacks the child
            tm.inv.set_object(&child_key("c7"), &"g3".to_string()).unwrap();
            let err = tm.report("c7", TxOutcome::Success).unwrap_err();
            assert_eq!(err.to_string(), "c7 is not in transaction g3");

            tm.inv.set_object(&child_key("c8"), &"g9".to_string()).unwrap();
            let err = tm.report("c8", TxOutcome::Success).unwrap_err();
            assert_eq!(err.to_string(), "transaction global id g9 does not exist");
            assert_eq!(
                tm.get_status("c8").unwrap_err().to_string(),
                "transaction info for global id g9 does not exist"
            );
        });
    }

    #[test]
    fn test_ids_are_unique_across_forms() {
        let ledger = MemoryLedger::new();
        with_manager(&ledger, |tm| {
            tm.begin("t1").unwrap();
            assert!(matches!(
                tm.begin_multi("t1", &ids(&["x"])),
                Err(HubError::AlreadyExists(_))
            ));
            tm.begin_multi("g4", &ids(&["y"])).unwrap();
            let err = tm.begin("g4").unwrap_err();
            assert_eq!(err.to_string(), "transaction id already exists");

            assert!(matches!(
                tm.get_status("missing"),
                Err(HubError::NotFound(Missing::Transaction(_)))
            ));
        });
    }
}
