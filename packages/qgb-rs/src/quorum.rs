//! Power-weighted quorum evaluation over confirms

use std::collections::HashMap;

use alloy::primitives::Address;
use thiserror::Error;

use crate::signature::{parse_evm_address, EthSignature};
use crate::types::{Confirm, Valset};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuorumError {
    #[error("not enough confirms for nonce {nonce}: power {power} below threshold {threshold}")]
    NotEnoughConfirms {
        nonce: u64,
        power: u128,
        threshold: u128,
    },

    #[error("missing signature for member {member}")]
    MissingSignature { member: Address },

    #[error("invalid signature from member {member}: {reason}")]
    InvalidSignature { member: Address, reason: String },
}

/// Result of summing confirm power against a valset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuorumTally {
    pub power: u128,
    pub threshold: u128,
    /// Members whose confirm was counted, in valset order
    pub signers: Vec<Address>,
}

impl QuorumTally {
    pub fn reached(&self) -> bool {
        self.power >= self.threshold
    }
}

/// Index confirms by the EVM address they claim, dropping unparseable ones.
/// The first confirm per address wins.
fn index_by_address<'a, C: Confirm>(confirms: &'a [C]) -> HashMap<Address, &'a C> {
    let mut index = HashMap::with_capacity(confirms.len());
    for confirm in confirms {
        if let Ok(addr) = parse_evm_address(confirm.eth_address()) {
            index.entry(addr).or_insert(confirm);
        }
    }
    index
}

/// Sum the power of confirms signed by members of `valset`.
///
/// Confirms from addresses outside the valset are ignored, and each member
/// counts at most once.
pub fn tally_confirms<C: Confirm>(valset: &Valset, confirms: &[C]) -> QuorumTally {
    let index = index_by_address(confirms);
    let mut power = 0u128;
    let mut signers = Vec::new();
    for member in &valset.members {
        if index.contains_key(&member.evm_address) {
            power += member.power as u128;
            signers.push(member.evm_address);
        }
    }
    QuorumTally {
        power,
        threshold: valset.two_thirds_threshold(),
        signers,
    }
}

/// Build the signature array the contract expects: one entry per member of
/// `valset`, in member order.
///
/// Fails if any member has no confirm; a partial array is never returned.
pub fn order_signatures<C: Confirm>(
    valset: &Valset,
    confirms: &[C],
) -> Result<Vec<EthSignature>, QuorumError> {
    let index = index_by_address(confirms);
    valset
        .members
        .iter()
        .map(|member| {
            let confirm = index
                .get(&member.evm_address)
                .ok_or(QuorumError::MissingSignature {
                    member: member.evm_address,
                })?;
            EthSignature::from_hex(confirm.signature()).map_err(|e| QuorumError::InvalidSignature {
                member: member.evm_address,
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BridgeValidator, ValsetConfirm};
    use chrono::DateTime;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    fn valset(powers: &[(u8, u64)]) -> Valset {
        Valset::new(
            1,
            1,
            DateTime::from_timestamp(0, 0).unwrap(),
            powers
                .iter()
                .map(|(b, p)| BridgeValidator::new(addr(*b), *p))
                .collect(),
        )
        .unwrap()
    }

    fn confirm(byte: u8) -> ValsetConfirm {
        ValsetConfirm {
            nonce: 2,
            orchestrator: format!("celestia1orch{byte}"),
            eth_address: addr(byte).to_string(),
            signature: format!("{}1b", hex::encode([byte; 64])),
        }
    }

    #[test]
    fn test_tally_ignores_non_members_and_duplicates() {
        let vs = valset(&[(1, 40), (2, 30), (3, 30)]);
        let confirms = vec![confirm(1), confirm(1), confirm(9)];
        let tally = tally_confirms(&vs, &confirms);
        assert_eq!(tally.power, 40);
        assert_eq!(tally.signers, vec![addr(1)]);
        assert_eq!(tally.threshold, 68);
        assert!(!tally.reached());
    }

    #[test]
    fn test_tally_reaches_threshold() {
        let vs = valset(&[(1, 40), (2, 30), (3, 30)]);
        let tally = tally_confirms(&vs, &[confirm(3), confirm(1)]);
        assert_eq!(tally.power, 70);
        assert!(tally.reached());
        assert_eq!(tally.signers, vec![addr(1), addr(3)]);
    }

    #[test]
    fn test_sixty_percent_is_not_quorum() {
        let vs = valset(&[(1, 30), (2, 30), (3, 40)]);
        let tally = tally_confirms(&vs, &[confirm(1), confirm(2)]);
        assert_eq!(tally.power, 60);
        assert!(!tally.reached());
    }

    #[test]
    fn test_order_signatures_follows_member_order() {
        let vs = valset(&[(1, 10), (2, 30), (3, 20)]);
        let ordered = order_signatures(&vs, &[confirm(1), confirm(3), confirm(2)]).unwrap();
        let firsts: Vec<u8> = ordered.iter().map(|s| s.as_bytes()[0]).collect();
        assert_eq!(firsts, vec![2, 3, 1]);
    }

    #[test]
    fn test_order_signatures_missing_member() {
        let vs = valset(&[(1, 10), (2, 30)]);
        let err = order_signatures(&vs, &[confirm(2)]).unwrap_err();
        assert_eq!(err, QuorumError::MissingSignature { member: addr(1) });
        assert!(err.to_string().starts_with("missing signature for member"));
    }
}
