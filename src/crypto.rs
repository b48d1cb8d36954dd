//! Addresses, digests and signatures
//!
//! Accounts are 20-byte addresses derived from secp256k1 public keys
//! (`keccak256(uncompressed_key[1..])[12..]`). Signatures are 65-byte
//! recoverable ECDSA signatures (`r || s || v`), so a signature can be checked
//! against an address without knowing the signer's public key.

use crate::error::{HubError, HubResult};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use lazy_static::lazy_static;
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

/// Length of a recoverable signature on the wire
pub const SIGNATURE_LEN: usize = 65;

lazy_static! {
    static ref SECP256K1: Secp256k1<All> = Secp256k1::new();
}

/// keccak256 of arbitrary bytes
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// A 20-byte account address, rendered as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Derive the address owning a public key.
    pub fn from_public_key(key: &PublicKey) -> Self {
        let uncompressed = key.serialize_uncompressed();
        let hash = keccak256(&uncompressed[1..]);
        let mut out = [0u8; 20];
        out.copy_from_slice(&hash[12..]);
        Address(out)
    }

    /// Derive the address from a base64-encoded public key, the form in which
    /// appchains register their keys with the directory.
    pub fn from_base64_public_key(encoded: &str) -> HubResult<Self> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| HubError::Crypto(format!("Invalid base64 public key: {}", e)))?;
        let key = PublicKey::from_slice(&raw)
            .map_err(|e| HubError::Crypto(format!("Invalid public key: {}", e)))?;
        Ok(Self::from_public_key(&key))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = HubError;

    fn from_str(s: &str) -> HubResult<Self> {
        let stripped = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(stripped)
            .map_err(|e| HubError::Crypto(format!("Invalid hex address: {}", e)))?;
        let bytes: [u8; 20] = bytes.try_into().map_err(|v: Vec<u8>| {
            HubError::Crypto(format!("Address must be 20 bytes, got {}", v.len()))
        })?;
        Ok(Address(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Recover the address that produced `signature` over a 32-byte digest.
pub fn recover_address(digest: &[u8; 32], signature: &[u8]) -> HubResult<Address> {
    if signature.len() != SIGNATURE_LEN {
        return Err(HubError::Crypto(format!(
            "Signature must be exactly {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        )));
    }

    // Accept both raw (0/1) and Ethereum-style (27/28) recovery bytes.
    let v = signature[64];
    let v = if v >= 27 { v - 27 } else { v };
    let recovery_id = RecoveryId::from_i32(v as i32)
        .map_err(|e| HubError::Crypto(format!("Invalid recovery id: {}", e)))?;
    let signature = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| HubError::Crypto(format!("Invalid signature: {}", e)))?;

    let message = Message::from_digest(*digest);
    let key = SECP256K1
        .recover_ecdsa(&message, &signature)
        .map_err(|e| HubError::Crypto(format!("Signature recovery failed: {}", e)))?;

    Ok(Address::from_public_key(&key))
}

/// Check that `signature` over `digest` was produced by `address`.
pub fn verify(digest: &[u8; 32], signature: &[u8], address: &Address) -> bool {
    matches!(recover_address(digest, signature), Ok(signer) if signer == *address)
}

/// A secp256k1 signing key with its derived address.
#[derive(Debug, Clone)]
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    pub fn from_secret_bytes(bytes: &[u8]) -> HubResult<Self> {
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| HubError::Crypto(format!("Invalid secret key bytes: {}", e)))?;
        let public_key = PublicKey::from_secret_key(&SECP256K1, &secret_key);
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    /// Deterministic key from a seed phrase; used for fixtures and local nodes.
    pub fn from_seed(seed: &str) -> HubResult<Self> {
        Self::from_secret_bytes(&keccak256(seed.as_bytes()))
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }

    /// Compressed public key, base64 encoded.
    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.public_key.serialize())
    }

    /// Sign a 32-byte digest, returning `r || s || v`.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Vec<u8> {
        let message = Message::from_digest(*digest);
        let signature = SECP256K1.sign_ecdsa_recoverable(&message, &self.secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut out = Vec::with_capacity(SIGNATURE_LEN);
        out.extend_from_slice(&compact);
        out.push(recovery_id.to_i32() as u8);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_recover() {
        let key = KeyPair::from_seed("alice").unwrap();
        let digest = keccak256(b"hello hub");

        let signature = key.sign_digest(&digest);
        assert_eq!(signature.len(), SIGNATURE_LEN);
        assert_eq!(recover_address(&digest, &signature).unwrap(), key.address());
        assert!(verify(&digest, &signature, &key.address()));
    }

    #[test]
    fn test_verify_rejects_other_signer_and_tampered_digest() {
        let alice = KeyPair::from_seed("alice").unwrap();
        let bob = KeyPair::from_seed("bob").unwrap();
        let digest = keccak256(b"payload");
        let signature = alice.sign_digest(&digest);

        assert!(!verify(&digest, &signature, &bob.address()));
        assert!(!verify(&keccak256(b"other"), &signature, &alice.address()));
        assert!(!verify(&digest, &signature[1..], &alice.address()));
    }

    #[test]
    fn test_address_roundtrip_and_public_key_derivation() {
        let key = KeyPair::from_seed("relay").unwrap();
        let rendered = key.address().to_string();
        assert!(rendered.starts_with("0x"));
        assert_eq!(rendered.len(), 42);

        let parsed: Address = rendered.to_uppercase().replace("0X", "0x").parse().unwrap();
        assert_eq!(parsed, key.address());

        let derived = Address::from_base64_public_key(&key.public_key_base64()).unwrap();
        assert_eq!(derived, key.address());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!(Address::from_base64_public_key("not base64!").is_err());
        let err = recover_address(&[0u8; 32], &[0u8; 10]).unwrap_err();
        assert!(err.to_string().contains("Signature must be exactly"));
    }
}
