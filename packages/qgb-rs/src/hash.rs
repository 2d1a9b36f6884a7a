//! Digest computation matching the QGB bridge contract
//!
//! Every function here reproduces an `abi.encode` + `keccak256` performed by the
//! contract. The byte layouts and the domain separators are part of the wire
//! contract: a mismatch does not error, it just makes every signature invalid.
//!
//! ## Layouts
//!
//! ```solidity
//! // validator set hash
//! keccak256(abi.encode(Validator[] validators))
//! // validator set update digest
//! keccak256(abi.encode(bridgeId, VALIDATOR_SET_DOMAIN_SEPARATOR, nonce, powerThreshold, valsetHash))
//! // data root tuple root digest
//! keccak256(abi.encode(bridgeId, DATA_ROOT_DOMAIN_SEPARATOR, nonce, tupleRoot))
//! ```

use alloy::primitives::{B256, U256};
use tiny_keccak::{Hasher, Keccak};

use crate::types::{BridgeValidator, Valset};

/// Right-pad an ASCII tag into a `bytes32`, the way Solidity casts a short string literal.
const fn right_pad(tag: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut i = 0;
    while i < tag.len() {
        out[i] = tag[i];
        i += 1;
    }
    out
}

/// `bytes32("checkpoint")`
pub const VALIDATOR_SET_DOMAIN_SEPARATOR: [u8; 32] = right_pad(b"checkpoint");

/// `bytes32("transactionBatch")`
pub const DATA_ROOT_DOMAIN_SEPARATOR: [u8; 32] = right_pad(b"transactionBatch");

/// Prefix applied by `personal_sign` to a 32-byte message
pub const ETH_SIGN_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Format a 32-byte digest as `0x`-prefixed lowercase hex
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn uint_word(value: u128) -> [u8; 32] {
    U256::from(value).to_be_bytes::<32>()
}

/// ABI-encode an ordered `Validator[]` (`struct Validator { address addr; uint256 power; }`).
pub fn encode_validator_set(members: &[BridgeValidator]) -> Vec<u8> {
    // offset word + length word + two words per member
    let mut data = Vec::with_capacity(64 + members.len() * 64);
    data.extend_from_slice(&uint_word(0x20));
    data.extend_from_slice(&uint_word(members.len() as u128));
    for member in members {
        data.extend_from_slice(member.evm_address.into_word().as_slice());
        data.extend_from_slice(&uint_word(member.power as u128));
    }
    data
}

/// Hash of the ordered validator set, as stored by the contract.
pub fn compute_valset_hash(members: &[BridgeValidator]) -> B256 {
    B256::from(keccak256(&encode_validator_set(members)))
}

/// Digest signed by orchestrators to approve moving the contract to a new valset.
pub fn valset_signing_digest(
    bridge_id: B256,
    domain_separator: [u8; 32],
    nonce: u64,
    power_threshold: u128,
    valset_hash: B256,
) -> B256 {
    let mut data = [0u8; 160];
    data[0..32].copy_from_slice(bridge_id.as_slice());
    data[32..64].copy_from_slice(&domain_separator);
    data[64..96].copy_from_slice(&uint_word(nonce as u128));
    data[96..128].copy_from_slice(&uint_word(power_threshold));
    data[128..160].copy_from_slice(valset_hash.as_slice());
    B256::from(keccak256(&data))
}

/// Digest signed by orchestrators over a data root tuple root.
pub fn data_commitment_signing_digest(
    bridge_id: B256,
    domain_separator: [u8; 32],
    nonce: u64,
    commitment: B256,
) -> B256 {
    let mut data = [0u8; 128];
    data[0..32].copy_from_slice(bridge_id.as_slice());
    data[32..64].copy_from_slice(&domain_separator);
    data[64..96].copy_from_slice(&uint_word(nonce as u128));
    data[96..128].copy_from_slice(commitment.as_slice());
    B256::from(keccak256(&data))
}

/// `keccak256("\x19Ethereum Signed Message:\n32" ++ digest)`
pub fn ethereum_signed_message_hash(digest: B256) -> B256 {
    let mut data = Vec::with_capacity(ETH_SIGN_PREFIX.len() + 32);
    data.extend_from_slice(ETH_SIGN_PREFIX);
    data.extend_from_slice(digest.as_slice());
    B256::from(keccak256(&data))
}

/// Immutable encoder parameters, fixed at deployment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    pub bridge_id: B256,
    pub valset_domain_separator: [u8; 32],
    pub data_root_domain_separator: [u8; 32],
}

impl EncoderConfig {
    /// Config using the contract's standard domain separators
    pub fn new(bridge_id: B256) -> Self {
        Self {
            bridge_id,
            valset_domain_separator: VALIDATOR_SET_DOMAIN_SEPARATOR,
            data_root_domain_separator: DATA_ROOT_DOMAIN_SEPARATOR,
        }
    }
}

/// Computes signing digests for attestations under one [`EncoderConfig`].
#[derive(Debug, Clone, Copy)]
pub struct EvmEncoder {
    config: EncoderConfig,
}

impl EvmEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Digest for a valset update to `valset`, using its own threshold and hash.
    pub fn valset_digest(&self, valset: &Valset) -> B256 {
        valset_signing_digest(
            self.config.bridge_id,
            self.config.valset_domain_separator,
            valset.nonce,
            valset.two_thirds_threshold(),
            compute_valset_hash(&valset.members),
        )
    }

    pub fn data_commitment_digest(&self, nonce: u64, commitment: B256) -> B256 {
        data_commitment_signing_digest(
            self.config.bridge_id,
            self.config.data_root_domain_separator,
            nonce,
            commitment,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, b256};

    #[test]
    fn test_domain_separators() {
        assert_eq!(
            hex::encode(VALIDATOR_SET_DOMAIN_SEPARATOR),
            "636865636b706f696e7400000000000000000000000000000000000000000000"
        );
        assert_eq!(
            hex::encode(DATA_ROOT_DOMAIN_SEPARATOR),
            "7472616e73616374696f6e426174636800000000000000000000000000000000"
        );
    }

    #[test]
    fn test_valset_hash_single_member() {
        let members = vec![BridgeValidator::new(
            address!("b33FDD9C00076A15b599F4ab0D29d59720a94E6a"),
            5000,
        )];

        let expected_data = "0000000000000000000000000000000000000000000000000000000000000020\
                             0000000000000000000000000000000000000000000000000000000000000001\
                             000000000000000000000000b33fdd9c00076a15b599f4ab0d29d59720a94e6a\
                             0000000000000000000000000000000000000000000000000000000000001388";
        assert_eq!(hex::encode(encode_validator_set(&members)), expected_data);
        assert_eq!(
            compute_valset_hash(&members),
            b256!("3c704bc9ea79d3f8c0191d4c6d38516f4bbcd645308b83185ca9fb48aff0eff6")
        );
    }

    #[test]
    fn test_valset_hash_two_members() {
        let members = vec![
            BridgeValidator::new(address!("b33FDD9C00076A15b599F4ab0D29d59720a94E6a"), 5000),
            BridgeValidator::new(address!("83319570b67638aa16F6eDa4d2C2AdBa305c9610"), 5000),
        ];
        assert_eq!(
            compute_valset_hash(&members),
            b256!("a8a26d87698033282b716b314e18c49c646d5298b664a33928540ffe996cce35")
        );
    }

    #[test]
    fn test_valset_signing_digest_layout() {
        let vs = B256::from(VALIDATOR_SET_DOMAIN_SEPARATOR);
        let expected = hex::decode(
            "636865636b706f696e7400000000000000000000000000000000000000000000\
             636865636b706f696e7400000000000000000000000000000000000000000000\
             0000000000000000000000000000000000000000000000000000000000000001\
             0000000000000000000000000000000000000000000000000000000000002710\
             636865636b706f696e7400000000000000000000000000000000000000000000",
        )
        .unwrap();

        let digest = valset_signing_digest(vs, VALIDATOR_SET_DOMAIN_SEPARATOR, 1, 10_000, vs);
        assert_eq!(digest, B256::from(keccak256(&expected)));
    }

    #[test]
    fn test_data_commitment_digest_depends_on_every_field() {
        let bridge = B256::repeat_byte(0x11);
        let root = B256::repeat_byte(0x22);
        let base = data_commitment_signing_digest(bridge, DATA_ROOT_DOMAIN_SEPARATOR, 1, root);

        assert_ne!(
            base,
            data_commitment_signing_digest(bridge, DATA_ROOT_DOMAIN_SEPARATOR, 2, root)
        );
        assert_ne!(
            base,
            data_commitment_signing_digest(B256::ZERO, DATA_ROOT_DOMAIN_SEPARATOR, 1, root)
        );
        assert_ne!(
            base,
            data_commitment_signing_digest(bridge, VALIDATOR_SET_DOMAIN_SEPARATOR, 1, root)
        );
    }

    #[test]
    fn test_eth_sign_prefix_layout() {
        let mut prefixed = ETH_SIGN_PREFIX.to_vec();
        prefixed.extend_from_slice(&VALIDATOR_SET_DOMAIN_SEPARATOR);
        assert_eq!(
            hex::encode(&prefixed),
            "19457468657265756d205369676e6564204d6573736167653a0a3332\
             636865636b706f696e7400000000000000000000000000000000000000000000"
        );
        assert_eq!(
            ethereum_signed_message_hash(B256::from(VALIDATOR_SET_DOMAIN_SEPARATOR)),
            B256::from(keccak256(&prefixed))
        );
    }

    #[test]
    fn test_encoder_uses_valset_threshold() {
        let valset = Valset::new(
            3,
            10,
            chrono::DateTime::from_timestamp(0, 0).unwrap(),
            vec![BridgeValidator::new(address!("b33FDD9C00076A15b599F4ab0D29d59720a94E6a"), 5000)],
        )
        .unwrap();
        let encoder = EvmEncoder::new(EncoderConfig::new(B256::ZERO));

        let expected = valset_signing_digest(
            B256::ZERO,
            VALIDATOR_SET_DOMAIN_SEPARATOR,
            3,
            valset.two_thirds_threshold(),
            b256!("3c704bc9ea79d3f8c0191d4c6d38516f4bbcd645308b83185ca9fb48aff0eff6"),
        );
        assert_eq!(encoder.valset_digest(&valset), expected);
    }

    #[test]
    fn test_bytes32_to_hex() {
        assert_eq!(
            bytes32_to_hex(&[0xab; 32]),
            format!("0x{}", "ab".repeat(32))
        );
    }
}
