//! Transaction states and reported outcomes

use crate::error::HubError;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Begin,
    Success,
    Failure,
}

impl TransactionStatus {
    pub fn code(&self) -> u8 {
        match self {
            TransactionStatus::Begin => 0,
            TransactionStatus::Success => 1,
            TransactionStatus::Failure => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self != TransactionStatus::Begin
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Begin => "begin",
            TransactionStatus::Success => "success",
            TransactionStatus::Failure => "failure",
        };
        write!(f, "{}", s)
    }
}

/// Result a participant reports; `0` is success and `1` failure on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxOutcome {
    Success,
    Failure,
}

impl TryFrom<i32> for TxOutcome {
    type Error = HubError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TxOutcome::Success),
            1 => Ok(TxOutcome::Failure),
            other => Err(HubError::InvalidOutcome(other)),
        }
    }
}

impl From<TxOutcome> for TransactionStatus {
    fn from(outcome: TxOutcome) -> Self {
        match outcome {
            TxOutcome::Success => TransactionStatus::Success,
            TxOutcome::Failure => TransactionStatus::Failure,
        }
    }
}

/// Aggregate record of a multi-participant transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalTransaction {
    pub global_state: TransactionStatus,
    pub child_status: BTreeMap<String, TransactionStatus>,
}

impl GlobalTransaction {
    pub fn new<'c>(children: impl IntoIterator<Item = &'c String>) -> Self {
        Self {
            global_state: TransactionStatus::Begin,
            child_status: children
                .into_iter()
                .map(|c| (c.clone(), TransactionStatus::Begin))
                .collect(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.child_status
            .values()
            .all(|s| *s == TransactionStatus::Success)
    }
}
