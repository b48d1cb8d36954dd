//! Buffered writes over a read-only ledger

use super::Ledger;

use std::collections::BTreeMap;

/// Pending change to one key
#[derive(Debug, Clone, PartialEq, Eq)]
enum Delta {
    Set(Vec<u8>),
    Delete,
}

/// Reads fall through to the backing ledger unless the key was written
/// locally. Nothing reaches the backing ledger until the overlay is turned
/// into a [`ChangeSet`] and committed; dropping the overlay discards it.
pub struct Overlay<'a> {
    base: &'a dyn Ledger,
    local: BTreeMap<String, Delta>,
}

impl<'a> Overlay<'a> {
    pub fn new(base: &'a dyn Ledger) -> Self {
        Self {
            base,
            local: BTreeMap::new(),
        }
    }

    /// Release the borrow on the backing ledger, keeping the pending writes.
    pub fn into_changes(self) -> ChangeSet {
        ChangeSet { ops: self.local }
    }

    /// Number of keys written so far
    pub fn pending(&self) -> usize {
        self.local.len()
    }

    /// Capture the pending writes so a later failure can be undone.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.local.clone())
    }

    /// Drop every write made since `snapshot` was taken.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.local = snapshot.0;
    }
}

/// Pending writes of an [`Overlay`] at some earlier point
#[derive(Debug, Clone)]
pub struct Snapshot(BTreeMap<String, Delta>);

impl Ledger for Overlay<'_> {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.local.get(key) {
            Some(Delta::Set(value)) => Some(value.clone()),
            Some(Delta::Delete) => None,
            None => self.base.get(key),
        }
    }

    fn set(&mut self, key: &str, value: Vec<u8>) {
        self.local.insert(key.to_string(), Delta::Set(value));
    }

    fn has(&self, key: &str) -> bool {
        match self.local.get(key) {
            Some(Delta::Set(_)) => true,
            Some(Delta::Delete) => false,
            None => self.base.has(key),
        }
    }

    fn delete(&mut self, key: &str) {
        self.local.insert(key.to_string(), Delta::Delete);
    }
}

/// Writes collected by an [`Overlay`], applied in key order.
#[derive(Debug, Default)]
pub struct ChangeSet {
    ops: BTreeMap<String, Delta>,
}

impl ChangeSet {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn commit(self, ledger: &mut dyn Ledger) {
        for (key, delta) in self.ops {
            match delta {
                Delta::Set(value) => ledger.set(&key, value),
                Delta::Delete => ledger.delete(&key),
            }
        }
    }
}
