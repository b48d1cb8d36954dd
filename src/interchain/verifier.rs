//! Dispatch to validation rules

use crate::error::HubResult;

/// Executes the validation rule deployed at an address.
///
/// Rule engines live outside the hub; the packet engine only resolves which
/// rule applies and hands the proof over.
#[cfg_attr(test, mockall::automock)]
pub trait ProofVerifier: Send + Sync {
    /// Returns `Ok(false)` when the rule ran and rejected the proof.
    fn validate(
        &self,
        rule_address: &str,
        chain_id: &str,
        proof: &[u8],
        payload: &[u8],
        validators: &[String],
    ) -> HubResult<bool>;
}
