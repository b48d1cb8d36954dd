//! Hub facade
//!
//! Runs one call at a time against the ledger. A call either commits all of
//! its writes and returns its events, or fails and leaves the ledger as it
//! was.

use crate::crypto::Address;
use crate::directory::ChainDirectory;
use crate::error::{HubError, HubResult};
use crate::events::HubEvent;
use crate::exchange::AssetExchange;
use crate::interchain::{
    Ibtp, Interchain, InterchainManager, PacketRecord, ProofVerifier, QuorumPolicy,
};
use crate::ledger::{Invocation, Ledger, LedgerExt, TxContext};
use crate::metrics;
use crate::transaction::{TransactionManager, TransactionStatus, TxOutcome};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default upper bound on packets per batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 256;

fn nonce_key(caller: &Address) -> String {
    format!("nonce-{}", caller)
}

/// Every state-changing operation the hub exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum HubCall {
    HandleIbtp {
        ibtp: Ibtp,
    },
    HandleIbtps {
        ibtps: Vec<Ibtp>,
    },
    HandleUnionIbtp {
        ibtp: Ibtp,
    },
    Register {
        chain_id: String,
    },
    BeginTransaction {
        id: String,
    },
    BeginMultiTransactions {
        global_id: String,
        children: Vec<String>,
    },
    /// `result` is 0 for success and 1 for failure
    ReportTransaction {
        id: String,
        result: i32,
    },
    AssetExchangeInit {
        chain0: String,
        chain1: String,
        #[serde(with = "hex::serde")]
        info: Vec<u8>,
    },
    AssetExchangeRedeem {
        chain0: String,
        chain1: String,
        id: String,
    },
    AssetExchangeRefund {
        chain0: String,
        chain1: String,
        id: String,
    },
}

impl HubCall {
    /// Get method name for metrics
    pub fn method(&self) -> &'static str {
        match self {
            HubCall::HandleIbtp { .. } => "handle_ibtp",
            HubCall::HandleIbtps { .. } => "handle_ibtps",
            HubCall::HandleUnionIbtp { .. } => "handle_union_ibtp",
            HubCall::Register { .. } => "register",
            HubCall::BeginTransaction { .. } => "begin_transaction",
            HubCall::BeginMultiTransactions { .. } => "begin_multi_transactions",
            HubCall::ReportTransaction { .. } => "report_transaction",
            HubCall::AssetExchangeInit { .. } => "asset_exchange_init",
            HubCall::AssetExchangeRedeem { .. } => "asset_exchange_redeem",
            HubCall::AssetExchangeRefund { .. } => "asset_exchange_refund",
        }
    }
}

/// Result of a committed call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub tx_index: u64,
    pub output: serde_json::Value,
    pub events: Vec<HubEvent>,
}

/// The relay hub state machine
pub struct Hub<L: Ledger> {
    ledger: L,
    directory: Arc<dyn ChainDirectory>,
    verifier: Option<Box<dyn ProofVerifier>>,
    quorum: QuorumPolicy,
    max_batch_size: usize,
    tx_count: u64,
}

impl<L: Ledger> Hub<L> {
    pub fn new(ledger: L, directory: Arc<dyn ChainDirectory>, quorum: QuorumPolicy) -> Self {
        Self {
            ledger,
            directory,
            verifier: None,
            quorum,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            tx_count: 0,
        }
    }

    pub fn with_verifier(mut self, verifier: Box<dyn ProofVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Number of submissions ordered so far
    pub fn tx_count(&self) -> u64 {
        self.tx_count
    }

    /// Order a submission and run it. The submission consumes an index
    /// whether or not it succeeds.
    pub fn submit(&mut self, caller: Address, tx_hash: String, call: HubCall) -> HubResult<Receipt> {
        self.tx_count += 1;
        let tx = TxContext::new(caller, tx_hash, self.tx_count);
        self.dispatch(&tx, call)
    }

    /// Order a signed submission. `nonce` must be greater than every nonce
    /// `caller` used before; an accepted nonce stays used even if the call
    /// itself fails.
    pub fn submit_signed(
        &mut self,
        caller: Address,
        nonce: u64,
        tx_hash: String,
        call: HubCall,
    ) -> HubResult<Receipt> {
        let key = nonce_key(&caller);
        if let Some(last) = self.ledger.get_object::<u64>(&key)? {
            if nonce <= last {
                let err = HubError::NonceReused { nonce, last };
                warn!("{} from {} rejected: {}", call.method(), caller, err);
                metrics::record_rejection(call.method(), &err);
                return Err(err);
            }
        }
        self.ledger.set_object(&key, &nonce)?;
        self.submit(caller, tx_hash, call)
    }

    /// Last nonce `caller` submitted with, if any
    pub fn last_nonce(&self, caller: &Address) -> HubResult<Option<u64>> {
        self.ledger.get_object(&nonce_key(caller))
    }

    /// Run one call atomically inside `tx`.
    pub fn dispatch(&mut self, tx: &TxContext, call: HubCall) -> HubResult<Receipt> {
        let method = call.method();
        let max_batch_size = self.max_batch_size;

        let result = self.execute(tx, |inv| -> HubResult<serde_json::Value> {
            match call {
                HubCall::HandleIbtp { ibtp } => {
                    InterchainManager::new(inv).handle_ibtp(&ibtp)?;
                    Ok(serde_json::Value::Null)
                }
                HubCall::HandleIbtps { ibtps } => {
                    let report = InterchainManager::new(inv).handle_ibtps(&ibtps, max_batch_size)?;
                    metrics::record_batch(&report);
                    Ok(serde_json::to_value(report)?)
                }
                HubCall::HandleUnionIbtp { ibtp } => {
                    InterchainManager::new(inv).handle_union_ibtp(&ibtp)?;
                    Ok(serde_json::Value::Null)
                }
                HubCall::Register { chain_id } => {
                    let meta = InterchainManager::new(inv).register(&chain_id)?;
                    Ok(serde_json::to_value(meta)?)
                }
                HubCall::BeginTransaction { id } => {
                    TransactionManager::new(inv).begin(&id)?;
                    Ok(serde_json::Value::Null)
                }
                HubCall::BeginMultiTransactions {
                    global_id,
                    children,
                } => {
                    TransactionManager::new(inv).begin_multi(&global_id, &children)?;
                    Ok(serde_json::Value::Null)
                }
                HubCall::ReportTransaction { id, result } => {
                    let outcome = TxOutcome::try_from(result)?;
                    TransactionManager::new(inv).report(&id, outcome)?;
                    Ok(serde_json::Value::Null)
                }
                HubCall::AssetExchangeInit {
                    chain0,
                    chain1,
                    info,
                } => {
                    AssetExchange::new(inv).init(&chain0, &chain1, &info)?;
                    Ok(serde_json::Value::Null)
                }
                HubCall::AssetExchangeRedeem { chain0, chain1, id } => {
                    AssetExchange::new(inv).redeem(&chain0, &chain1, id.as_bytes())?;
                    Ok(serde_json::Value::Null)
                }
                HubCall::AssetExchangeRefund { chain0, chain1, id } => {
                    AssetExchange::new(inv).refund(&chain0, &chain1, id.as_bytes())?;
                    Ok(serde_json::Value::Null)
                }
            }
        });

        match result {
            Ok((output, events)) => {
                debug!("{} committed with {} events", method, events.len());
                for event in &events {
                    metrics::record_event(event);
                }
                Ok(Receipt {
                    tx_hash: tx.tx_hash.clone(),
                    tx_index: tx.tx_index,
                    output,
                    events,
                })
            }
            Err(e) => {
                warn!("{} from {} rejected: {}", method, tx.caller, e);
                metrics::record_rejection(method, &e);
                Err(e)
            }
        }
    }

    pub fn get_ibtp_by_id(&self, id: &str) -> HubResult<PacketRecord> {
        self.query(|inv| InterchainManager::new(inv).get_ibtp_by_id(id))
    }

    pub fn get_receipt_by_id(&self, id: &str) -> HubResult<PacketRecord> {
        self.query(|inv| InterchainManager::new(inv).get_receipt_by_id(id))
    }

    pub fn get_interchain(&self, chain_id: &str) -> HubResult<Interchain> {
        self.query(|inv| InterchainManager::new(inv).get_interchain(chain_id))
    }

    pub fn get_transaction_status(&self, id: &str) -> HubResult<TransactionStatus> {
        self.query(|inv| TransactionManager::new(inv).get_status(id))
    }

    /// Numeric status code of an asset exchange
    pub fn get_asset_exchange_status(&self, id: &str) -> HubResult<u8> {
        self.query(|inv| AssetExchange::new(inv).get_status(id))
    }

    fn execute<T>(
        &mut self,
        tx: &TxContext,
        op: impl FnOnce(&mut Invocation) -> HubResult<T>,
    ) -> HubResult<(T, Vec<HubEvent>)> {
        let (result, changes, events) = {
            let mut inv = self.invocation(tx);
            let result = op(&mut inv);
            let (changes, events) = inv.finish();
            (result, changes, events)
        };

        let value = result?;
        changes.commit(&mut self.ledger);
        Ok((value, events))
    }

    /// Run a read-only operation; its writes, if any, are dropped.
    fn query<T>(&self, op: impl FnOnce(&mut Invocation) -> HubResult<T>) -> HubResult<T> {
        let tx = TxContext::new(Address::default(), String::new(), self.tx_count);
        let mut inv = self.invocation(&tx);
        op(&mut inv)
    }

    fn invocation<'a>(&'a self, tx: &'a TxContext) -> Invocation<'a> {
        let verifier = self.verifier.as_ref().map(|v| v.as_ref() as &dyn ProofVerifier);
        Invocation::new(&self.ledger, tx, self.directory.as_ref(), self.quorum).with_verifier(verifier)
    }
}
