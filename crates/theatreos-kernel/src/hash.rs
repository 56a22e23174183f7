// SPDX-License-Identifier: Apache-2.0
//! Stable state digest for [`theatreos_types::world::Snapshot::state_hash`].

use sha2::{Digest, Sha256};
use theatreos_types::world::WorldState;

/// Digest `state` under canonical key order.
///
/// `WorldState`'s maps are all `BTreeMap`, so `serde_json` already emits
/// keys in sorted order; hashing the serialized bytes directly gives a
/// digest stable across processes and across Rust's `HashMap` iteration
/// order (which canonical JSON is specifically chosen to avoid depending
/// on).
#[must_use]
pub fn state_hash(state: &WorldState) -> String {
    let bytes = serde_json::to_vec(state).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_states_hash_identically() {
        let a = WorldState::default();
        let b = WorldState::default();
        assert_eq!(state_hash(&a), state_hash(&b));
    }

    #[test]
    fn differing_states_hash_differently() {
        let mut a = WorldState::default();
        a.variables.insert("v1".to_string(), 0.5);
        let b = WorldState::default();
        assert_ne!(state_hash(&a), state_hash(&b));
    }
}
