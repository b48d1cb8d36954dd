//! Two-party asset swaps
//!
//! An exchange is opened by `init` and closed exactly once, either by
//! `redeem` (both legs delivered) or `refund` (the swap is abandoned).

mod record;

pub use record::{exchange_key, AssetExchangeInfo, AssetExchangeRecord, AssetExchangeStatus};

use crate::error::{HubError, HubResult, Missing};
use crate::events::HubEvent;
use crate::ledger::{Invocation, Ledger, LedgerExt};

use tracing::{debug, info};

/// Asset exchange state machine over one invocation
pub struct AssetExchange<'i, 'a> {
    inv: &'i mut Invocation<'a>,
}

impl<'i, 'a> AssetExchange<'i, 'a> {
    pub fn new(inv: &'i mut Invocation<'a>) -> Self {
        Self { inv }
    }

    /// Open an exchange between `chain0` and `chain1` from JSON-encoded terms.
    pub fn init(&mut self, chain0: &str, chain1: &str, info: &[u8]) -> HubResult<()> {
        let info: AssetExchangeInfo = serde_json::from_slice(info)?;

        let key = exchange_key(&info.id);
        if self.inv.has(&key) {
            return Err(HubError::AlreadyExists("asset exchange id"));
        }
        if !info.is_valid() {
            debug!("Rejecting asset exchange terms {:?}", info);
            return Err(HubError::IllegalInfo);
        }

        let record = AssetExchangeRecord {
            chain0: chain0.to_string(),
            chain1: chain1.to_string(),
            status: AssetExchangeStatus::Init,
            info,
        };
        self.inv.set_object(&key, &record)?;

        info!(
            "Asset exchange {} opened between {} and {}",
            record.info.id, chain0, chain1
        );
        self.inv.emit(HubEvent::AssetExchangeUpdated {
            id: record.info.id,
            status: AssetExchangeStatus::Init,
        });
        Ok(())
    }

    pub fn redeem(&mut self, chain0: &str, chain1: &str, id: &[u8]) -> HubResult<()> {
        self.close(chain0, chain1, id, AssetExchangeStatus::Redeem)
    }

    pub fn refund(&mut self, chain0: &str, chain1: &str, id: &[u8]) -> HubResult<()> {
        self.close(chain0, chain1, id, AssetExchangeStatus::Refund)
    }

    fn close(
        &mut self,
        chain0: &str,
        chain1: &str,
        id: &[u8],
        status: AssetExchangeStatus,
    ) -> HubResult<()> {
        let id = String::from_utf8(id.to_vec()).map_err(|_| {
            HubError::InvalidPayload("asset exchange id is not valid UTF-8".to_string())
        })?;
        let key = exchange_key(&id);
        let mut record = self.load(&id)?;

        if record.status != AssetExchangeStatus::Init {
            return Err(HubError::WrongState);
        }
        if record.chain0 != chain0 || record.chain1 != chain1 {
            return Err(HubError::ParticipantMismatch { id });
        }

        record.status = status;
        self.inv.set_object(&key, &record)?;

        info!("Asset exchange {} closed with {}", id, status);
        self.inv.emit(HubEvent::AssetExchangeUpdated { id, status });
        Ok(())
    }

    /// Numeric status code of an exchange
    pub fn get_status(&self, id: &str) -> HubResult<u8> {
        Ok(self.load(id)?.status.code())
    }

    pub fn get_record(&self, id: &str) -> HubResult<AssetExchangeRecord> {
        self.load(id)
    }

    fn load(&self, id: &str) -> HubResult<AssetExchangeRecord> {
        self.inv
            .get_object(&exchange_key(id))?
            .ok_or(HubError::NotFound(Missing::AssetExchange))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::directory::StaticDirectory;
    use crate::interchain::QuorumPolicy;
    use crate::ledger::{MemoryLedger, TxContext};

    const CHAIN0: &str = "did:bitxhub:appchain1:.";
    const CHAIN1: &str = "did:bitxhub:appchain2:.";

    fn terms(id: &str, asset_on_dst: u64) -> Vec<u8> {
        let info = AssetExchangeInfo {
            id: id.to_string(),
            sender_on_src: "alice".to_string(),
            receiver_on_src: "bob".to_string(),
            asset_on_src: 10,
            sender_on_dst: "bob".to_string(),
            receiver_on_dst: "alice".to_string(),
            asset_on_dst,
        };
        serde_json::to_vec(&info).unwrap()
    }

    fn with_exchange<T>(ledger: &MemoryLedger, f: impl FnOnce(&mut AssetExchange) -> T) -> T {
        let directory = StaticDirectory::new();
        let tx = TxContext::new(KeyPair::from_seed("caller").unwrap().address(), "0x00", 1);
        let mut inv = Invocation::new(ledger, &tx, &directory, QuorumPolicy::default());
        f(&mut AssetExchange::new(&mut inv))
    }

    #[test]
    fn test_init_validation() {
        let ledger = MemoryLedger::new();
        with_exchange(&ledger, |ex| {
            let err = ex.init(CHAIN0, CHAIN1, &terms("ex-1", 0)).unwrap_err();
            assert_eq!(err.to_string(), "illegal asset exchange info");

            let mut missing_party: AssetExchangeInfo =
                serde_json::from_slice(&terms("ex-1", 5)).unwrap();
            missing_party.receiver_on_dst.clear();
            let raw = serde_json::to_vec(&missing_party).unwrap();
            assert!(matches!(ex.init(CHAIN0, CHAIN1, &raw), Err(HubError::IllegalInfo)));

            assert!(matches!(ex.init(CHAIN0, CHAIN1, b"{"), Err(HubError::Codec(_))));

            ex.init(CHAIN0, CHAIN1, &terms("ex-1", 5)).unwrap();
            let err = ex.init(CHAIN0, CHAIN1, &terms("ex-1", 5)).unwrap_err();
            assert_eq!(err.to_string(), "asset exchange id already exists");
            // the existence check comes first
            let err = ex.init(CHAIN0, CHAIN1, &terms("ex-1", 0)).unwrap_err();
            assert!(matches!(err, HubError::AlreadyExists(_)));
        });
    }

    #[test]
    fn test_redeem_and_refund_transitions() {
        let ledger = MemoryLedger::new();
        with_exchange(&ledger, |ex| {
            assert_eq!(
                ex.redeem(CHAIN0, CHAIN1, b"ex-1").unwrap_err().to_string(),
                "asset exchange record does not exist"
            );

            ex.init(CHAIN0, CHAIN1, &terms("ex-1", 5)).unwrap();
            assert_eq!(ex.get_status("ex-1").unwrap(), 0);

            let err = ex.redeem(CHAIN1, CHAIN0, b"ex-1").unwrap_err();
            assert_eq!(
                err.to_string(),
                "invalid participant of asset exchange id ex-1"
            );

            ex.redeem(CHAIN0, CHAIN1, b"ex-1").unwrap();
            assert_eq!(ex.get_status("ex-1").unwrap(), 1);

            let err = ex.refund(CHAIN0, CHAIN1, b"ex-1").unwrap_err();
            assert_eq!(
                err.to_string(),
                "asset exchange status for this id is not 'Init'"
            );

            ex.init(CHAIN0, CHAIN1, &terms("ex-2", 5)).unwrap();
            ex.refund(CHAIN0, CHAIN1, b"ex-2").unwrap();
            assert_eq!(ex.get_status("ex-2").unwrap(), 2);
            assert!(matches!(
                ex.redeem(CHAIN0, CHAIN1, b"ex-2"),
                Err(HubError::WrongState)
            ));
        });
    }

    #[test]
    fn test_non_utf8_id_is_rejected() {
        let ledger = MemoryLedger::new();
        with_exchange(&ledger, |ex| {
            ex.init(CHAIN0, CHAIN1, &terms("\u{fffd}", 5)).unwrap();
            let err = ex.redeem(CHAIN0, CHAIN1, &[0xff]).unwrap_err();
            assert!(matches!(err, HubError::InvalidPayload(_)));
            assert_eq!(ex.get_status("\u{fffd}").unwrap(), 0);
        });
    }

    #[test]
    fn test_record_keeps_participant_order() {
        let ledger = MemoryLedger::new();
        with_exchange(&ledger, |ex| {
            ex.init(CHAIN1, CHAIN0, &terms("ex-3", 7)).unwrap();
            let record = ex.get_record("ex-3").unwrap();
            assert_eq!(record.chain0, CHAIN1);
            assert_eq!(record.chain1, CHAIN0);
            assert_eq!(record.info.asset_on_dst, 7);
        });
    }
}
