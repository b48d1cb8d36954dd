//! Asset exchange records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger key of an exchange record
pub fn exchange_key(id: &str) -> String {
    format!("asset-exchange-{}", id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetExchangeStatus {
    Init,
    Redeem,
    Refund,
}

impl AssetExchangeStatus {
    pub fn code(&self) -> u8 {
        match self {
            AssetExchangeStatus::Init => 0,
            AssetExchangeStatus::Redeem => 1,
            AssetExchangeStatus::Refund => 2,
        }
    }
}

impl fmt::Display for AssetExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetExchangeStatus::Init => "init",
            AssetExchangeStatus::Redeem => "redeem",
            AssetExchangeStatus::Refund => "refund",
        };
        write!(f, "{}", s)
    }
}

/// Terms of a swap between a source and a destination chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetExchangeInfo {
    pub id: String,
    pub sender_on_src: String,
    pub receiver_on_src: String,
    pub asset_on_src: u64,
    pub sender_on_dst: String,
    pub receiver_on_dst: String,
    pub asset_on_dst: u64,
}

impl AssetExchangeInfo {
    /// Every party named and both legs carrying a positive amount
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
            && !self.sender_on_src.is_empty()
            && !self.receiver_on_src.is_empty()
            && !self.sender_on_dst.is_empty()
            && !self.receiver_on_dst.is_empty()
            && self.asset_on_src > 0
            && self.asset_on_dst > 0
    }
}

/// Stored exchange; `chain0`/`chain1` keep the order `init` saw them in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetExchangeRecord {
    pub chain0: String,
    pub chain1: String,
    pub status: AssetExchangeStatus,
    pub info: AssetExchangeInfo,
}
