// SPDX-License-Identifier: Apache-2.0
//! The `Stage` entity (spec §3): a geo-located point with three nested
//! geofence rings.

use crate::ids::{StageId, TheatreId};
use serde::{Deserialize, Serialize};

/// A geo-located stage with nested ring geofences, `ring_c_m ≥ ring_b_m ≥
/// ring_a_m`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Stable identifier.
    pub stage_id: StageId,
    /// Owning theatre.
    pub theatre_id: TheatreId,
    /// Display name.
    pub name: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Outer ring radius, meters.
    pub ring_c_m: f64,
    /// Middle ring radius, meters.
    pub ring_b_m: f64,
    /// Inner ring radius, meters.
    pub ring_a_m: f64,
    /// Free-form tags used by the scheduler's `stage_tag_any` matching.
    pub tags: Vec<String>,
}

impl Stage {
    /// Whether the ring radii satisfy `ring_c_m ≥ ring_b_m ≥ ring_a_m`.
    #[must_use]
    pub fn rings_are_well_formed(&self) -> bool {
        self.ring_c_m >= self.ring_b_m && self.ring_b_m >= self.ring_a_m
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(c: f64, b: f64, a: f64) -> Stage {
        Stage {
            stage_id: "s1".into(),
            theatre_id: "t1".into(),
            name: "Test Stage".into(),
            lat: 0.0,
            lng: 0.0,
            ring_c_m: c,
            ring_b_m: b,
            ring_a_m: a,
            tags: vec![],
        }
    }

    #[test]
    fn accepts_non_increasing_rings() {
        assert!(stage(300.0, 150.0, 50.0).rings_are_well_formed());
        assert!(stage(100.0, 100.0, 100.0).rings_are_well_formed());
    }

    #[test]
    fn rejects_increasing_rings() {
        assert!(!stage(50.0, 150.0, 300.0).rings_are_well_formed());
    }
}
