//! Personal-sign signatures over attestation digests
//!
//! Orchestrators sign `keccak256("\x19Ethereum Signed Message:\n32" ++ digest)`
//! and publish the 65-byte `r || s || v` signature as hex. The contract and the
//! state machine recover the signer from that and compare it to the claimed
//! EVM address.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, PrimitiveSignature, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use thiserror::Error;

use crate::hash::ethereum_signed_message_hash;

/// Errors from signature parsing, signing and verification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid signature hex: {0}")]
    InvalidHex(String),

    #[error("invalid signature length: expected 65 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid recovery id {0}")]
    InvalidRecoveryId(u8),

    #[error("signature recovery failed: {0}")]
    RecoveryFailed(String),

    #[error("signature mismatch: expected signer {expected}, recovered {recovered}")]
    SignerMismatch { expected: Address, recovered: Address },

    #[error("invalid EVM address: {0}")]
    InvalidAddress(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// A 65-byte `r || s || v` signature with `v` in `{27, 28}`
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EthSignature([u8; 65]);

impl EthSignature {
    /// Build from raw bytes, normalizing a recovery id of 0/1 to 27/28.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != 65 {
            return Err(SignatureError::InvalidLength(bytes.len()));
        }
        let mut raw = [0u8; 65];
        raw.copy_from_slice(bytes);
        raw[64] = match raw[64] {
            0 | 1 => raw[64] + 27,
            27 | 28 => raw[64],
            other => return Err(SignatureError::InvalidRecoveryId(other)),
        };
        Ok(Self(raw))
    }

    /// Parse hex with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|e| SignatureError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Lowercase hex without prefix, the form carried in confirm messages
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn r(&self) -> B256 {
        B256::from_slice(&self.0[0..32])
    }

    pub fn s(&self) -> B256 {
        B256::from_slice(&self.0[32..64])
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    /// Recover the address that produced this signature over `digest`.
    ///
    /// `digest` is the unprefixed attestation digest; the personal-sign prefix
    /// is applied here.
    pub fn recover(&self, digest: B256) -> Result<Address, SignatureError> {
        let prefixed = ethereum_signed_message_hash(digest);
        let sig = PrimitiveSignature::new(
            U256::from_be_slice(&self.0[0..32]),
            U256::from_be_slice(&self.0[32..64]),
            self.v() == 28,
        );
        sig.recover_address_from_prehash(&prefixed)
            .map_err(|e| SignatureError::RecoveryFailed(e.to_string()))
    }
}

impl fmt::Debug for EthSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EthSignature(0x{})", self.to_hex())
    }
}

impl FromStr for EthSignature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Check that `signature` over `digest` was produced by `expected`.
pub fn verify_signature(
    digest: B256,
    signature: &EthSignature,
    expected: Address,
) -> Result<(), SignatureError> {
    let recovered = signature.recover(digest)?;
    if recovered != expected {
        return Err(SignatureError::SignerMismatch {
            expected,
            recovered,
        });
    }
    Ok(())
}

/// Parse a `0x`-prefixed 20-byte hex EVM address (checksum not enforced)
pub fn parse_evm_address(s: &str) -> Result<Address, SignatureError> {
    if !s.starts_with("0x") || s.len() != 42 {
        return Err(SignatureError::InvalidAddress(format!(
            "expected 0x-prefixed 40 hex chars, got '{}'",
            s
        )));
    }
    Address::from_str(s).map_err(|e| SignatureError::InvalidAddress(e.to_string()))
}

/// Orchestrator signing key
pub struct EvmSigner {
    signer: PrivateKeySigner,
}

impl EvmSigner {
    /// Create from a hex private key (with or without `0x`)
    pub fn from_hex(key: &str) -> Result<Self, SignatureError> {
        let signer = PrivateKeySigner::from_str(key.trim())
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
        Ok(Self { signer })
    }

    pub fn from_bytes(key_bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        let signer = PrivateKeySigner::from_bytes(&B256::from(*key_bytes))
            .map_err(|e| SignatureError::InvalidKey(e.to_string()))?;
        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Personal-sign an attestation digest
    pub fn sign_digest(&self, digest: B256) -> Result<EthSignature, SignatureError> {
        let prefixed = ethereum_signed_message_hash(digest);
        let signature = self
            .signer
            .sign_hash_sync(&prefixed)
            .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;
        EthSignature::from_bytes(&signature.as_bytes())
    }
}

impl fmt::Debug for EvmSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmSigner")
            .field("address", &self.address())
            .field("key", &"<redacted>")
            .finish()
    }
}
