//! Signature quorum for relay-to-relay packets

use crate::error::{HubError, HubResult};

use serde::{Deserialize, Serialize};

/// A union packet needs strictly more than `numerator / denominator` of the
/// relay chain's validators to have signed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumPolicy {
    numerator: u64,
    denominator: u64,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self {
            numerator: 2,
            denominator: 3,
        }
    }
}

impl QuorumPolicy {
    pub fn new(numerator: u64, denominator: u64) -> HubResult<Self> {
        if denominator == 0 || numerator >= denominator {
            return Err(HubError::Internal(format!(
                "Invalid quorum fraction {}/{}",
                numerator, denominator
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Smallest number of valid signatures that reaches quorum.
    pub fn required(&self, validators: usize) -> usize {
        let floor = (validators as u128 * self.numerator as u128) / self.denominator as u128;
        floor as usize + 1
    }

    pub fn is_met(&self, valid: usize, validators: usize) -> bool {
        validators > 0
            && valid as u128 * self.denominator as u128
                > validators as u128 * self.numerator as u128
    }
}
