//! Packet validation, ordering and indexing

use super::ibtp::{
    parse_ibtp_id, parse_relay_pair, Ibtp, IbtpType, MultiSignature, PacketRecord, Payload,
};
use super::meta::{interchain_key, Interchain};
use crate::crypto::{self, Address};
use crate::directory::{Appchain, ChainStatus};
use crate::error::{HubError, HubResult, Missing, RouteSide};
use crate::events::HubEvent;
use crate::exchange::AssetExchange;
use crate::ledger::{Invocation, LedgerExt};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

fn request_key(ibtp_id: &str) -> String {
    format!("index-tx-{}", ibtp_id)
}

fn receipt_key(ibtp_id: &str) -> String {
    format!("index-receipt-tx-{}", ibtp_id)
}

/// Outcome of one packet inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketOutcome {
    pub ibtp_id: String,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-packet results of a batch submission, in submission order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<PacketOutcome>,
}

impl BatchReport {
    pub fn accepted(&self) -> usize {
        self.outcomes.iter().filter(|o| o.accepted).count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes.len() - self.accepted()
    }
}

/// Interchain packet engine over one invocation
pub struct InterchainManager<'i, 'a> {
    inv: &'i mut Invocation<'a>,
}

impl<'i, 'a> InterchainManager<'i, 'a> {
    pub fn new(inv: &'i mut Invocation<'a>) -> Self {
        Self { inv }
    }

    /// Create route metadata for a chain if it has none. Admin only.
    pub fn register(&mut self, chain_id: &str) -> HubResult<Interchain> {
        if !self.inv.directory().is_admin(self.inv.caller()) {
            return Err(HubError::PermissionDenied);
        }
        if let Some(meta) = self.load_meta(chain_id)? {
            return Ok(meta);
        }

        let meta = Interchain::new(chain_id);
        self.inv.set_object(&interchain_key(chain_id), &meta)?;
        info!("Registered interchain metadata for {}", chain_id);
        self.inv.emit(HubEvent::InterchainRegistered {
            chain_id: chain_id.to_string(),
        });
        Ok(meta)
    }

    pub fn get_interchain(&self, chain_id: &str) -> HubResult<Interchain> {
        self.load_meta(chain_id)?
            .ok_or_else(|| HubError::NotFound(Missing::Interchain(chain_id.to_string())))
    }

    /// Validate and apply a packet submitted by an appchain gateway.
    pub fn handle_ibtp(&mut self, ibtp: &Ibtp) -> HubResult<()> {
        let directory = self.inv.directory();

        let from_chain = directory
            .get_chain(&ibtp.from)
            .ok_or_else(|| HubError::ChainNotFound {
                chain_id: ibtp.from.clone(),
            })?;
        if ibtp.to.is_empty() {
            return Err(HubError::EmptyDestination);
        }

        let (side, authority) = if ibtp.ibtp_type.is_receipt() {
            let to_chain = directory
                .get_chain(&ibtp.to)
                .ok_or_else(|| HubError::ChainNotFound {
                    chain_id: ibtp.to.clone(),
                })?;
            (RouteSide::To, to_chain)
        } else {
            if directory.get_chain(&ibtp.to).is_none() {
                warn!("Packet {} targets unregistered chain {}", ibtp.id(), ibtp.to);
            }
            (RouteSide::From, from_chain)
        };

        ensure_available(&authority)?;
        self.check_caller(&authority, side)?;
        self.check_proof(ibtp, &authority)?;

        let meta = self.load_meta(&ibtp.from)?.unwrap_or_else(|| Interchain::new(&ibtp.from));
        check_index(&meta, ibtp)?;

        self.apply_exchange(ibtp)?;
        self.process(ibtp, meta)
    }

    /// Apply every packet of a batch that is valid when its turn comes.
    ///
    /// Each packet is atomic on its own: a rejected packet leaves no trace
    /// and does not undo the packets accepted before it.
    pub fn handle_ibtps(&mut self, ibtps: &[Ibtp], max_batch_size: usize) -> HubResult<BatchReport> {
        if ibtps.is_empty() {
            return Err(HubError::InvalidBatch("empty batch".to_string()));
        }
        if ibtps.len() > max_batch_size {
            return Err(HubError::InvalidBatch(format!(
                "{} packets exceed the limit of {}",
                ibtps.len(),
                max_batch_size
            )));
        }

        let mut report = BatchReport::default();
        for ibtp in ibtps {
            let savepoint = self.inv.savepoint();
            let outcome = match self.handle_ibtp(ibtp) {
                Ok(()) => PacketOutcome {
                    ibtp_id: ibtp.id(),
                    accepted: true,
                    error: None,
                },
                Err(e) => {
                    self.inv.rollback_to(savepoint);
                    debug!("Batch packet {} rejected: {}", ibtp.id(), e);
                    PacketOutcome {
                        ibtp_id: ibtp.id(),
                        accepted: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        info!(
            "Batch of {} packets: {} accepted, {} rejected",
            ibtps.len(),
            report.accepted(),
            report.rejected()
        );
        Ok(report)
    }

    /// Apply a packet forwarded by another relay hub.
    ///
    /// `from` is `<relay>-<relay>`; the packet is authorised by a quorum of
    /// the relay chain's validators instead of the caller.
    pub fn handle_union_ibtp(&mut self, ibtp: &Ibtp) -> HubResult<()> {
        let relay_id = parse_relay_pair(&ibtp.from)?;
        if ibtp.to.is_empty() {
            return Err(HubError::EmptyDestination);
        }

        let meta = self.load_meta(&ibtp.from)?.unwrap_or_else(|| Interchain::new(&ibtp.from));
        check_index(&meta, ibtp)?;

        let relay = self
            .inv
            .directory()
            .get_chain(&relay_id)
            .ok_or(HubError::ChainNotFound { chain_id: relay_id })?;
        ensure_available(&relay)?;
        self.check_quorum(ibtp, &relay)?;

        self.process(ibtp, meta)
    }

    /// Stored request packet by id
    pub fn get_ibtp_by_id(&self, id: &str) -> HubResult<PacketRecord> {
        parse_ibtp_id(id)?;
        self.inv
            .get_object(&request_key(id))?
            .ok_or(HubError::NotFound(Missing::Ibtp))
    }

    /// Stored receipt packet by id
    pub fn get_receipt_by_id(&self, id: &str) -> HubResult<PacketRecord> {
        parse_ibtp_id(id)?;
        self.inv
            .get_object(&receipt_key(id))?
            .ok_or(HubError::NotFound(Missing::Receipt))
    }

    fn check_caller(&self, authority: &Appchain, side: RouteSide) -> HubResult<()> {
        match authority.caller_address() {
            Ok(bound) if bound == *self.inv.caller() => Ok(()),
            Ok(bound) => {
                debug!(
                    "Caller {} is not {} bound to {}",
                    self.inv.caller(),
                    bound,
                    authority.id
                );
                Err(HubError::CallerNotBound { side })
            }
            Err(e) => {
                warn!("Chain {} has an unusable public key: {}", authority.id, e);
                Err(HubError::CallerNotBound { side })
            }
        }
    }

    /// Hand a non-empty proof to the chain's validation rule.
    fn check_proof(&self, ibtp: &Ibtp, authority: &Appchain) -> HubResult<()> {
        if ibtp.proof.is_empty() {
            return Ok(());
        }
        let Some(verifier) = self.inv.verifier() else {
            debug!("No proof verifier installed, skipping proof of {}", ibtp.id());
            return Ok(());
        };

        let rule_address = self
            .inv
            .directory()
            .get_rule_address(&authority.id, &authority.chain_type)
            .ok_or_else(|| HubError::RuleNotFound {
                chain_id: authority.id.clone(),
            })?;

        let valid = verifier.validate(
            &rule_address,
            &authority.id,
            &ibtp.proof,
            &ibtp.payload,
            &authority.validators,
        )?;
        if !valid {
            return Err(HubError::ProofRejected {
                ibtp_id: ibtp.id(),
                rule_address,
            });
        }
        Ok(())
    }

    fn check_quorum(&self, ibtp: &Ibtp, relay: &Appchain) -> HubResult<()> {
        let validators: BTreeSet<Address> = relay.validator_addresses().into_iter().collect();
        let policy = self.inv.quorum();
        let required = policy.required(validators.len());

        let proof = match MultiSignature::decode(&ibtp.proof) {
            Ok(proof) => proof,
            Err(e) => {
                warn!("Undecodable multi-signature on {}: {}", ibtp.id(), e);
                MultiSignature::new()
            }
        };

        let digest = ibtp.hash();
        let mut signers = BTreeSet::new();
        for (claimed, signature) in &proof.signatures {
            let Ok(address) = claimed.parse::<Address>() else {
                continue;
            };
            if !validators.contains(&address) {
                debug!("Ignoring signature of non-validator {}", claimed);
                continue;
            }
            let Ok(signature) = hex::decode(signature.trim_start_matches("0x")) else {
                continue;
            };
            if crypto::verify(&digest, &signature, &address) {
                signers.insert(address);
            }
        }

        if !policy.is_met(signers.len(), validators.len()) {
            warn!(
                "Union packet {} has {} of {} required signatures",
                ibtp.id(),
                signers.len(),
                required
            );
            return Err(HubError::QuorumNotMet {
                counter: signers.len(),
                required,
            });
        }
        Ok(())
    }

    /// Run the asset exchange transition an exchange packet carries.
    fn apply_exchange(&mut self, ibtp: &Ibtp) -> HubResult<()> {
        let transition = match ibtp.ibtp_type {
            IbtpType::AssetExchangeInit
            | IbtpType::AssetExchangeRedeem
            | IbtpType::AssetExchangeRefund => ibtp.ibtp_type,
            _ => return Ok(()),
        };

        let payload = Payload::decode(&ibtp.payload)?;
        if payload.encrypted {
            return Err(HubError::InvalidPayload(
                "encrypted payload cannot drive an asset exchange".to_string(),
            ));
        }
        let arg = payload.arg(0)?;

        let mut exchange = AssetExchange::new(&mut *self.inv);
        match transition {
            IbtpType::AssetExchangeInit => exchange.init(&ibtp.from, &ibtp.to, &arg),
            IbtpType::AssetExchangeRedeem => exchange.redeem(&ibtp.from, &ibtp.to, &arg),
            _ => exchange.refund(&ibtp.from, &ibtp.to, &arg),
        }
    }

    /// Advance the route counters and index an accepted packet.
    fn process(&mut self, ibtp: &Ibtp, mut meta: Interchain) -> HubResult<()> {
        let ibtp_id = ibtp.id();
        meta.advance(ibtp);
        self.inv.set_object(&interchain_key(&ibtp.from), &meta)?;

        let key = if ibtp.ibtp_type.is_receipt() {
            let mut dst = self.load_meta(&ibtp.to)?.unwrap_or_else(|| Interchain::new(&ibtp.to));
            dst.source_receipt_counter
                .insert(ibtp.from.clone(), ibtp.index);
            self.inv.set_object(&interchain_key(&ibtp.to), &dst)?;
            receipt_key(&ibtp_id)
        } else {
            request_key(&ibtp_id)
        };

        let record = PacketRecord {
            tx_hash: self.inv.tx_hash().to_string(),
            tx_index: self.inv.tx_index(),
            ibtp: ibtp.clone(),
        };
        self.inv.set_object(&key, &record)?;

        info!("Accepted {} packet {}", ibtp.ibtp_type, ibtp_id);
        self.inv.emit(HubEvent::Interchain {
            ibtp_id,
            from: ibtp.from.clone(),
            to: ibtp.to.clone(),
            index: ibtp.index,
            ibtp_type: ibtp.ibtp_type,
            tx_hash: record.tx_hash,
        });
        Ok(())
    }

    fn load_meta(&self, chain_id: &str) -> HubResult<Option<Interchain>> {
        self.inv.get_object(&interchain_key(chain_id))
    }
}

fn ensure_available(chain: &Appchain) -> HubResult<()> {
    if chain.status != ChainStatus::Available {
        return Err(HubError::ChainUnavailable {
            chain_id: chain.id.clone(),
            status: chain.status.to_string(),
        });
    }
    Ok(())
}

fn check_index(meta: &Interchain, ibtp: &Ibtp) -> HubResult<()> {
    let expected = meta.expected_index(ibtp);
    if ibtp.index != expected {
        debug!(
            "Packet {} out of order, expected index {}",
            ibtp.id(),
            expected
        );
        return Err(HubError::SequenceMismatch {
            expected,
            got: ibtp.index,
        });
    }
    Ok(())
}
