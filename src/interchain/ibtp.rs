//! Inter-blockchain transfer packets

use crate::crypto::{keccak256, KeyPair};
use crate::error::{HubError, HubResult, MalformedId};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

lazy_static! {
    /// `did:<scheme>:<chain-method>:<suffix>`; the suffix cannot contain the
    /// id separator.
    static ref CHAIN_ID: Regex =
        Regex::new(r"^did:[a-z0-9]+:[a-zA-Z0-9_]+:[^-]+$").unwrap();
}

/// Packet kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IbtpType {
    Interchain,
    ReceiptSuccess,
    ReceiptFailure,
    AssetExchangeInit,
    AssetExchangeRedeem,
    AssetExchangeRefund,
    AssetExchangeReceipt,
}

impl IbtpType {
    /// Wire code, also fed into the packet hash
    pub fn code(&self) -> u8 {
        match self {
            IbtpType::Interchain => 0,
            IbtpType::ReceiptSuccess => 1,
            IbtpType::ReceiptFailure => 2,
            IbtpType::AssetExchangeInit => 3,
            IbtpType::AssetExchangeRedeem => 4,
            IbtpType::AssetExchangeRefund => 5,
            IbtpType::AssetExchangeReceipt => 6,
        }
    }

    /// Receipts travel back along a route and are authorised by the
    /// destination chain.
    pub fn is_receipt(&self) -> bool {
        matches!(
            self,
            IbtpType::ReceiptSuccess | IbtpType::ReceiptFailure | IbtpType::AssetExchangeReceipt
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IbtpType::Interchain => "interchain",
            IbtpType::ReceiptSuccess => "receipt_success",
            IbtpType::ReceiptFailure => "receipt_failure",
            IbtpType::AssetExchangeInit => "asset_exchange_init",
            IbtpType::AssetExchangeRedeem => "asset_exchange_redeem",
            IbtpType::AssetExchangeRefund => "asset_exchange_refund",
            IbtpType::AssetExchangeReceipt => "asset_exchange_receipt",
        }
    }
}

impl fmt::Display for IbtpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single cross-chain message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ibtp {
    pub from: String,
    pub to: String,
    pub index: u64,
    #[serde(rename = "type")]
    pub ibtp_type: IbtpType,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, with = "hex::serde")]
    pub proof: Vec<u8>,
    #[serde(default, with = "hex::serde")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub version: String,
    #[serde(default, with = "hex::serde")]
    pub extra: Vec<u8>,
}

impl Ibtp {
    pub fn new(from: &str, to: &str, index: u64, ibtp_type: IbtpType) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            index,
            ibtp_type,
            timestamp: 0,
            proof: Vec::new(),
            payload: Vec::new(),
            version: String::new(),
            extra: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Canonical id `<from>-<to>-<index>`
    pub fn id(&self) -> String {
        format!("{}-{}-{}", self.from, self.to, self.index)
    }

    /// Content hash over every field except the proof.
    ///
    /// Variable-length fields are length-prefixed so no two packets share an
    /// encoding.
    pub fn hash(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(128 + self.payload.len() + self.extra.len());
        put_bytes(&mut buf, self.from.as_bytes());
        put_bytes(&mut buf, self.to.as_bytes());
        buf.extend_from_slice(&self.index.to_be_bytes());
        buf.push(self.ibtp_type.code());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        put_bytes(&mut buf, &self.payload);
        put_bytes(&mut buf, self.version.as_bytes());
        put_bytes(&mut buf, &self.extra);
        keccak256(&buf)
    }

    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash()))
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
    buf.extend_from_slice(bytes);
}

/// Split a packet id into `(from, to, index)`.
pub fn parse_ibtp_id(id: &str) -> HubResult<(String, String, u64)> {
    let parts: Vec<&str> = id.split('-').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
        return Err(HubError::MalformedId(MalformedId::Shape));
    }
    let index = parts[2]
        .parse::<u64>()
        .map_err(|_| HubError::MalformedId(MalformedId::Shape))?;

    if !CHAIN_ID.is_match(parts[0]) || !CHAIN_ID.is_match(parts[1]) {
        return Err(HubError::MalformedId(MalformedId::ChainMethod));
    }

    Ok((parts[0].to_string(), parts[1].to_string(), index))
}

/// Relay chain id of a union packet source, which must be the pair
/// `<relay>-<relay>`.
pub fn parse_relay_pair(from: &str) -> HubResult<String> {
    let parts: Vec<&str> = from.split('-').collect();
    if parts.len() != 2 || parts[0] != parts[1] {
        return Err(HubError::MalformedId(MalformedId::Shape));
    }
    if !CHAIN_ID.is_match(parts[0]) {
        return Err(HubError::MalformedId(MalformedId::ChainMethod));
    }
    Ok(parts[0].to_string())
}

/// Application payload carried by a packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub encrypted: bool,
    pub content: Content,
}

/// Contract call described by a payload; `args` are hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub src_contract_id: String,
    #[serde(default)]
    pub dst_contract_id: String,
    pub func: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Payload {
    pub fn new(func: &str, args: &[&[u8]]) -> Self {
        Self {
            encrypted: false,
            content: Content {
                func: func.to_string(),
                args: args.iter().map(hex::encode).collect(),
                ..Default::default()
            },
        }
    }

    pub fn decode(raw: &[u8]) -> HubResult<Self> {
        if raw.is_empty() {
            return Err(HubError::InvalidPayload("empty payload".to_string()));
        }
        serde_json::from_slice(raw).map_err(|e| HubError::InvalidPayload(e.to_string()))
    }

    pub fn encode(&self) -> HubResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decoded argument at `position`
    pub fn arg(&self, position: usize) -> HubResult<Vec<u8>> {
        let raw = self.content.args.get(position).ok_or_else(|| {
            HubError::InvalidPayload(format!("missing argument {}", position))
        })?;
        hex::decode(raw.trim_start_matches("0x"))
            .map_err(|e| HubError::InvalidPayload(format!("argument {}: {}", position, e)))
    }
}

/// Validator signatures over a packet hash, keyed by validator address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSignature {
    pub signatures: BTreeMap<String, String>,
}

impl MultiSignature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key`'s signature over the packet hash.
    pub fn sign(&mut self, ibtp: &Ibtp, key: &KeyPair) {
        let signature = key.sign_digest(&ibtp.hash());
        self.signatures
            .insert(key.address().to_string(), hex::encode(signature));
    }

    pub fn decode(raw: &[u8]) -> HubResult<Self> {
        Ok(serde_json::from_slice(raw)?)
    }

    pub fn encode(&self) -> HubResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// What the hub indexes for an accepted packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub tx_hash: String,
    pub tx_index: u64,
    pub ibtp: Ibtp,
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN_A: &str = "did:bitxhub:appchain1:.";
    const CHAIN_B: &str = "did:bitxhub:appchain2:.";

    #[test]
    fn test_relay_pair() {
        let relay = "did:bitxhub:relay1:.";
        assert_eq!(parse_relay_pair(&format!("{}-{}", relay, relay)).unwrap(), relay);
        assert!(matches!(
            parse_relay_pair(relay),
            Err(HubError::MalformedId(MalformedId::Shape))
        ));
        assert!(matches!(
            parse_relay_pair("relay-relay"),
            Err(HubError::MalformedId(MalformedId::ChainMethod))
        ));
    }

    #[test]
    fn test_id_and_hash() {
        let ibtp = Ibtp::new(CHAIN_A, CHAIN_B, 1, IbtpType::Interchain);
        assert_eq!(ibtp.id(), format!("{}-{}-1", CHAIN_A, CHAIN_B));

        let mut signed = ibtp.clone();
        signed.proof = vec![1, 2, 3];
        assert_eq!(ibtp.hash(), signed.hash());

        let mut other = ibtp.clone();
        other.ibtp_type = IbtpType::AssetExchangeInit;
        assert_ne!(ibtp.hash(), other.hash());

        // moving a byte between adjacent fields changes the hash
        let a = Ibtp::new("ab", "c", 1, IbtpType::Interchain);
        let b = Ibtp::new("a", "bc", 1, IbtpType::Interchain);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_parse_ibtp_id() {
        let id = format!("{}-{}-10", CHAIN_A, CHAIN_B);
        let (from, to, index) = parse_ibtp_id(&id).unwrap();
        assert_eq!(from, CHAIN_A);
        assert_eq!(to, CHAIN_B);
        assert_eq!(index, 10);

        for bad in ["a", "a-b", "a--1", "a-b-c-1", "a-b-x"] {
            assert!(matches!(
                parse_ibtp_id(bad),
                Err(HubError::MalformedId(MalformedId::Shape))
            ));
        }
        assert!(matches!(
            parse_ibtp_id("abc-def-10"),
            Err(HubError::MalformedId(MalformedId::ChainMethod))
        ));
    }

    #[test]
    fn test_payload_args() {
        let payload = Payload::new("interchainCharge", &[b"ex-1", b"100"]);
        let decoded = Payload::decode(&payload.encode().unwrap()).unwrap();
        assert_eq!(decoded.arg(0).unwrap(), b"ex-1".to_vec());
        assert!(matches!(decoded.arg(2), Err(HubError::InvalidPayload(_))));
        assert!(Payload::decode(&[]).is_err());
    }

    #[test]
    fn test_wire_format() {
        let mut ibtp = Ibtp::new(CHAIN_A, CHAIN_B, 3, IbtpType::ReceiptSuccess);
        ibtp.proof = vec![0xab];
        let json = serde_json::to_value(&ibtp).unwrap();
        assert_eq!(json["type"], "RECEIPT_SUCCESS");
        assert_eq!(json["proof"], "ab");

        let parsed: Ibtp = serde_json::from_str(&format!(
            r#"{{"from":"{}","to":"{}","index":1,"type":"INTERCHAIN"}}"#,
            CHAIN_A, CHAIN_B
        ))
        .unwrap();
        assert!(parsed.proof.is_empty());
        assert!(!parsed.ibtp_type.is_receipt());
    }
}
