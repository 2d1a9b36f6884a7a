//! Bridge power arithmetic
//!
//! Staking power is rescaled so that a validator set always sums to roughly
//! 2^32. Scaling goes through 256-bit integers so large stakes never overflow.

use std::collections::HashMap;

use alloy::primitives::{Address, U256};

use crate::types::BridgeValidator;

/// Total bridge power of a freshly normalized validator set
pub const MAX_BRIDGE_POWER: u64 = 1 << 32;

/// Scale `raw` staking power into bridge power: `floor(raw * 2^32 / total)`.
///
/// Returns 0 when `total` is 0. `raw` must not exceed `total`.
pub fn normalize_power(raw: u64, total: u128) -> u64 {
    if total == 0 {
        return 0;
    }
    debug_assert!(
        raw as u128 <= total,
        "member power {} exceeds set total {}",
        raw,
        total
    );
    let raw = (raw as u128).min(total);
    let scaled = U256::from(raw) * U256::from(MAX_BRIDGE_POWER) / U256::from(total);
    // raw <= total, so scaled <= MAX_BRIDGE_POWER
    u64::try_from(scaled).unwrap_or(MAX_BRIDGE_POWER)
}

/// Normalize raw `(address, staking power)` pairs into bridge validators.
///
/// Members whose normalized power rounds down to zero are dropped.
pub fn normalize_members(raw: &[(Address, u64)]) -> Vec<BridgeValidator> {
    let total: u128 = raw.iter().map(|(_, p)| *p as u128).sum();
    raw.iter()
        .filter_map(|(addr, p)| {
            let power = normalize_power(*p, total);
            (power > 0).then(|| BridgeValidator::new(*addr, power))
        })
        .collect()
}

/// Strictly-more-than-two-thirds threshold used by the bridge contract.
pub fn two_thirds_threshold(total: u128) -> u128 {
    2 * (total / 3 + 1)
}

/// Sum of absolute per-address power changes, as a fraction of 2^32.
///
/// Addresses present on only one side count with their full power.
pub fn power_diff(a: &[BridgeValidator], b: &[BridgeValidator]) -> f64 {
    abs_power_delta(a, b) as f64 / MAX_BRIDGE_POWER as f64
}

/// Integer form of the valset trigger: `power_diff > bps / 10_000`.
pub fn is_significant_power_diff(a: &[BridgeValidator], b: &[BridgeValidator], bps: u64) -> bool {
    abs_power_delta(a, b) * 10_000 > bps as u128 * MAX_BRIDGE_POWER as u128
}

fn abs_power_delta(a: &[BridgeValidator], b: &[BridgeValidator]) -> u128 {
    let mut deltas: HashMap<Address, i128> = HashMap::with_capacity(a.len() + b.len());
    for member in a {
        *deltas.entry(member.evm_address).or_default() += member.power as i128;
    }
    for member in b {
        *deltas.entry(member.evm_address).or_default() -= member.power as i128;
    }
    deltas.values().map(|d| d.unsigned_abs()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(powers: &[u64]) -> Vec<BridgeValidator> {
        powers
            .iter()
            .enumerate()
            .map(|(i, p)| BridgeValidator::new(Address::repeat_byte(i as u8 + 1), *p))
            .collect()
    }

    #[test]
    fn test_normalize_single_validator_gets_full_power() {
        assert_eq!(normalize_power(100, 100), MAX_BRIDGE_POWER);
        assert_eq!(normalize_power(5, 0), 0);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "exceeds set total")]
    fn test_normalize_member_above_total_panics() {
        normalize_power(101, 100);
    }

    #[test]
    fn test_normalize_large_stakes_do_not_overflow() {
        let raw = u64::MAX / 2;
        let total = raw as u128 * 2;
        assert_eq!(normalize_power(raw, total), MAX_BRIDGE_POWER / 2);
    }

    #[test]
    fn test_normalized_sum_close_to_max() {
        let raw = [
            (Address::repeat_byte(1), 7),
            (Address::repeat_byte(2), 11),
            (Address::repeat_byte(3), 13),
        ];
        let normalized = normalize_members(&raw);
        let sum: u64 = normalized.iter().map(|m| m.power).sum();
        assert!(sum <= MAX_BRIDGE_POWER);
        assert!(MAX_BRIDGE_POWER - sum < normalized.len() as u64);
    }

    #[test]
    fn test_normalize_drops_dust() {
        let raw = [
            (Address::repeat_byte(1), u64::MAX),
            (Address::repeat_byte(2), 1),
        ];
        let normalized = normalize_members(&raw);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].evm_address, Address::repeat_byte(1));
    }

    #[test]
    fn test_two_thirds_threshold() {
        assert_eq!(two_thirds_threshold(0), 2);
        assert_eq!(two_thirds_threshold(3), 4);
        assert_eq!(two_thirds_threshold(100), 68);
        assert_eq!(
            two_thirds_threshold(MAX_BRIDGE_POWER as u128),
            2_863_311_532
        );
        // holds once the set is large enough to tolerate a faulty member
        for total in [6u128, 10, 1000, MAX_BRIDGE_POWER as u128] {
            assert!(two_thirds_threshold(total) <= total);
            assert!(3 * two_thirds_threshold(total) > 2 * total);
        }
    }

    #[test]
    fn test_power_diff_reference_vector() {
        let a = members(&[1073741823, 1073741823, 2147483646]);
        let b = members(&[858993459, 858993459, 2576980377]);
        let diff = power_diff(&a, &b);
        assert!((diff - 0.2).abs() < 0.001, "diff was {diff}");
        assert!(is_significant_power_diff(&a, &b, 500));
        assert!(!is_significant_power_diff(&a, &b, 2500));
    }

    #[test]
    fn test_power_diff_counts_joins_and_leaves() {
        let a = members(&[MAX_BRIDGE_POWER]);
        let b = vec![BridgeValidator::new(Address::repeat_byte(9), MAX_BRIDGE_POWER)];
        assert!((power_diff(&a, &b) - 2.0).abs() < f64::EPSILON);
        assert_eq!(power_diff(&a, &a), 0.0);
    }
}
