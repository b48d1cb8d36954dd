//! Interchain packet engine
//!
//! Packets (IBTPs) arrive from appchain gateways or from other relay hubs.
//! For every packet the engine:
//! 1. Resolves the chains on its route through the directory
//! 2. Authenticates the submitter (bound key, or validator quorum for
//!    relay-to-relay traffic)
//! 3. Enforces the contiguous per-route index
//! 4. Advances the route counters, indexes the packet and emits an event

pub mod ibtp;
pub mod manager;
pub mod meta;
pub mod quorum;
pub mod verifier;

pub use ibtp::{parse_ibtp_id, parse_relay_pair, Content, Ibtp, IbtpType, MultiSignature, PacketRecord, Payload};
pub use manager::{BatchReport, InterchainManager, PacketOutcome};
pub use meta::Interchain;
pub use quorum::QuorumPolicy;
pub use verifier::ProofVerifier;

#[cfg(test)]
pub use verifier::MockProofVerifier;
