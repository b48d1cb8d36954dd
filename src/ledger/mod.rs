//! Ledger access
//!
//! The hub does not own a storage engine. It reads and writes an
//! address-keyed byte store through the [`Ledger`] trait and never touches
//! the store directly while an operation is running: all writes go through
//! an [`Overlay`] and reach the ledger only when the operation succeeds.

mod context;
mod overlay;

pub use context::{Invocation, TxContext};
pub use overlay::{ChangeSet, Overlay, Snapshot};

use crate::error::HubResult;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Raw key/value access to the replicated ledger
pub trait Ledger {
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    fn set(&mut self, key: &str, value: Vec<u8>);

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn delete(&mut self, key: &str);
}

/// Typed object access on top of [`Ledger`].
///
/// Objects are stored as JSON. Every persisted map is a `BTreeMap`, so the
/// encoded bytes depend only on content.
pub trait LedgerExt: Ledger {
    fn get_object<T: DeserializeOwned>(&self, key: &str) -> HubResult<Option<T>> {
        match self.get(key) {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_object<T: Serialize>(&mut self, key: &str, value: &T) -> HubResult<()> {
        let raw = serde_json::to_vec(value)?;
        self.set(key, raw);
        Ok(())
    }
}

impl<L: Ledger + ?Sized> LedgerExt for L {}

/// In-memory ledger with ordered keys
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys starting with `prefix`, in order.
    pub fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .range(prefix.to_string()..)
            .map(|(k, _)| k.as_str())
            .take_while(move |k| k.starts_with(prefix))
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Vec<u8>) {
        self.entries.insert(key.to_string(), value);
    }

    fn has(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        counters: BTreeMap<String, u64>,
    }

    #[test]
    fn test_object_roundtrip() {
        let mut ledger = MemoryLedger::new();
        let mut counters = BTreeMap::new();
        counters.insert("b".to_string(), 2);
        counters.insert("a".to_string(), 1);
        let sample = Sample {
            name: "x".to_string(),
            counters,
        };

        ledger.set_object("sample", &sample).unwrap();
        let loaded: Option<Sample> = ledger.get_object("sample").unwrap();
        assert_eq!(loaded, Some(sample));
        assert_eq!(
            ledger.get("sample").unwrap(),
            br#"{"name":"x","counters":{"a":1,"b":2}}"#.to_vec()
        );
    }

    #[test]
    fn test_missing_and_corrupt_objects() {
        let mut ledger = MemoryLedger::new();
        assert!(ledger.get_object::<Sample>("absent").unwrap().is_none());

        ledger.set("corrupt", b"not json".to_vec());
        assert!(ledger.get_object::<Sample>("corrupt").is_err());
    }

    #[test]
    fn test_prefix_scan() {
        let mut ledger = MemoryLedger::new();
        ledger.set("tx-1", vec![1]);
        ledger.set("tx-2", vec![2]);
        ledger.set("ty-1", vec![3]);
        ledger.set("global-tx-1", vec![4]);

        let keys: Vec<_> = ledger.keys_with_prefix("tx-").collect();
        assert_eq!(keys, vec!["tx-1", "tx-2"]);

        ledger.delete("tx-1");
        assert!(!ledger.has("tx-1"));
        assert_eq!(ledger.len(), 3);
    }
}
