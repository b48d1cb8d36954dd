//! Error types for the relay hub
//!
//! Every variant renders the diagnostic text callers match on, so the
//! `Display` strings below are part of the public contract.

use thiserror::Error;

/// Which end of a packet route an identity check was made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSide {
    From,
    To,
}

impl std::fmt::Display for RouteSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteSide::From => write!(f, "from"),
            RouteSide::To => write!(f, "to"),
        }
    }
}

/// The two ways a packet id can fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedId {
    /// Not exactly three non-empty `from-to-index` segments.
    Shape,
    /// A chain segment is not a `did:<scheme>:<method>:<suffix>` identifier.
    ChainMethod,
}

/// A record an operation looked for and did not find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Ibtp,
    Receipt,
    Interchain(String),
    Transaction(String),
    GlobalTransaction(String),
    /// Global record named by a child's reverse index
    GlobalOfChild(String),
    AssetExchange,
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Ibtp => write!(f, "this ibtp id does not exist"),
            Missing::Receipt => write!(f, "this receipt id does not exist"),
            Missing::Interchain(id) => write!(f, "interchain info for {} does not exist", id),
            Missing::Transaction(id) => write!(f, "transaction info for id {} does not exist", id),
            Missing::GlobalTransaction(id) => {
                write!(f, "transaction info for global id {} does not exist", id)
            }
            Missing::GlobalOfChild(id) => write!(f, "transaction global id {} does not exist", id),
            Missing::AssetExchange => write!(f, "asset exchange record does not exist"),
        }
    }
}

/// Main error type for hub operations
#[derive(Error, Debug)]
pub enum HubError {
    #[error("this appchain does not exist")]
    ChainNotFound { chain_id: String },

    #[error("appchain {chain_id} is not available, status: {status}")]
    ChainUnavailable { chain_id: String, status: String },

    #[error("empty destination chain id")]
    EmptyDestination,

    #[error("caller is not bound to ibtp {side}")]
    CallerNotBound { side: RouteSide },

    #[error("{}", sequence_message(.expected, .got))]
    SequenceMismatch { expected: u64, got: u64 },

    #[error("{}", malformed_message(.0))]
    MalformedId(MalformedId),

    #[error("{0}")]
    NotFound(Missing),

    #[error("multi signs verify fail, counter: {counter}, required: {required}")]
    QuorumNotMet { counter: usize, required: usize },

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("illegal asset exchange info")]
    IllegalInfo,

    #[error("asset exchange status for this id is not 'Init'")]
    WrongState,

    #[error("invalid participant of asset exchange id {id}")]
    ParticipantMismatch { id: String },

    #[error("transaction with {} {id} is finished", id_label(.global))]
    AlreadyTerminal { id: String, global: bool },

    #[error("cannot get global id of child tx id {id}")]
    UnknownChild { id: String },

    #[error("{id} is not in transaction {global_id}")]
    NotAChild { id: String, global_id: String },

    #[error("{id} has already reported result")]
    AlreadyReported { id: String },

    #[error("caller is not an admin account")]
    PermissionDenied,

    #[error("nonce {nonce} already used, last nonce {last}")]
    NonceReused { nonce: u64, last: u64 },

    #[error("unknown transaction result {0}")]
    InvalidOutcome(i32),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    #[error("no validation rule registered for appchain {chain_id}")]
    RuleNotFound { chain_id: String },

    #[error("proof of ibtp {ibtp_id} rejected by rule {rule_address}")]
    ProofRejected { ibtp_id: String, rule_address: String },

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn sequence_message(expected: &u64, got: &u64) -> String {
    if got < expected {
        format!("index already exists, required {}, but {}", expected, got)
    } else {
        format!("wrong index, required {}, but {}", expected, got)
    }
}

fn malformed_message(kind: &MalformedId) -> &'static str {
    match kind {
        MalformedId::Shape => "wrong ibtp id",
        MalformedId::ChainMethod => "invalid format of appchain method",
    }
}

fn id_label(global: &bool) -> &'static str {
    if *global {
        "global Id"
    } else {
        "Id"
    }
}

impl HubError {
    /// Whether resubmitting the same input unchanged could succeed later.
    ///
    /// A packet ahead of its route counter becomes valid once the gap is
    /// filled, and an unavailable chain may be reinstated. Everything else
    /// needs corrected input.
    pub fn is_retry_safe(&self) -> bool {
        match self {
            HubError::SequenceMismatch { expected, got } => got > expected,
            HubError::ChainUnavailable { .. } => true,
            _ => false,
        }
    }

    /// Stable label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            HubError::ChainNotFound { .. } => "chain_not_found",
            HubError::ChainUnavailable { .. } => "chain_unavailable",
            HubError::EmptyDestination => "empty_destination",
            HubError::CallerNotBound { .. } => "caller_not_bound",
            HubError::SequenceMismatch { .. } => "sequence_mismatch",
            HubError::MalformedId(_) => "malformed_id",
            HubError::NotFound(_) => "not_found",
            HubError::QuorumNotMet { .. } => "quorum_not_met",
            HubError::AlreadyExists(_) => "already_exists",
            HubError::IllegalInfo => "illegal_info",
            HubError::WrongState => "wrong_state",
            HubError::ParticipantMismatch { .. } => "participant_mismatch",
            HubError::AlreadyTerminal { .. } => "already_terminal",
            HubError::UnknownChild { .. } => "unknown_child",
            HubError::NotAChild { .. } => "not_a_child",
            HubError::AlreadyReported { .. } => "already_reported",
            HubError::PermissionDenied => "permission_denied",
            HubError::NonceReused { .. } => "nonce_reused",
            HubError::InvalidOutcome(_) => "invalid_outcome",
            HubError::InvalidPayload(_) => "invalid_payload",
            HubError::InvalidBatch(_) => "invalid_batch",
            HubError::RuleNotFound { .. } => "rule_not_found",
            HubError::ProofRejected { .. } => "proof_rejected",
            HubError::Crypto(_) => "crypto",
            HubError::Codec(_) => "codec",
            HubError::Internal(_) => "internal",
        }
    }
}

/// Result type for hub operations
pub type HubResult<T> = Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_messages() {
        let replay = HubError::SequenceMismatch { expected: 2, got: 1 };
        assert_eq!(replay.to_string(), "index already exists, required 2, but 1");
        assert!(!replay.is_retry_safe());

        let gap = HubError::SequenceMismatch { expected: 2, got: 5 };
        assert_eq!(gap.to_string(), "wrong index, required 2, but 5");
        assert!(gap.is_retry_safe());
    }

    #[test]
    fn test_terminal_messages() {
        let single = HubError::AlreadyTerminal {
            id: "id0".to_string(),
            global: false,
        };
        assert_eq!(single.to_string(), "transaction with Id id0 is finished");

        let global = HubError::AlreadyTerminal {
            id: "g1".to_string(),
            global: true,
        };
        assert_eq!(global.to_string(), "transaction with global Id g1 is finished");
    }

    #[test]
    fn test_malformed_id_messages() {
        assert_eq!(
            HubError::MalformedId(MalformedId::Shape).to_string(),
            "wrong ibtp id"
        );
        assert_eq!(
            HubError::MalformedId(MalformedId::ChainMethod).to_string(),
            "invalid format of appchain method"
        );
        assert_eq!(
            HubError::CallerNotBound { side: RouteSide::To }.to_string(),
            "caller is not bound to ibtp to"
        );
    }
}
