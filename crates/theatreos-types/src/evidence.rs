// SPDX-License-Identifier: Apache-2.0
//! Evidence entities (spec §3, §4.5). Grade sets the TTL; rarity is a
//! flavor/value dimension the spec only requires as a bare `rarity` field.

use crate::ids::{EvidenceId, EvidenceTypeId, StageId, TheatreId, UserId};
use crate::Instant;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Evidence grade; determines TTL (spec §3: A=168h, B=72h, C=24h).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvidenceGrade {
    /// 168-hour TTL.
    A,
    /// 72-hour TTL.
    B,
    /// 24-hour TTL.
    C,
}

impl EvidenceGrade {
    /// TTL in hours for this grade (spec §3).
    #[must_use]
    pub fn ttl_hours(self) -> i64 {
        match self {
            EvidenceGrade::A => 168,
            EvidenceGrade::B => 72,
            EvidenceGrade::C => 24,
        }
    }

    /// Confidence bonus applied on a successful unchallenged `verify`
    /// (spec §4.5).
    #[must_use]
    pub fn verify_bonus(self) -> f64 {
        match self {
            EvidenceGrade::A => 3.0,
            EvidenceGrade::B => 2.0,
            EvidenceGrade::C => 1.0,
        }
    }

    /// Base trade value before the rarity multiplier (spec §4.5).
    #[must_use]
    pub fn base_trade_value(self) -> f64 {
        match self {
            EvidenceGrade::A => 100.0,
            EvidenceGrade::B => 50.0,
            EvidenceGrade::C => 10.0,
        }
    }
}

impl fmt::Display for EvidenceGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvidenceGrade::A => "A",
            EvidenceGrade::B => "B",
            EvidenceGrade::C => "C",
        };
        f.write_str(s)
    }
}

/// Evidence rarity: a drop-weight/value dimension independent of grade
/// (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceRarity {
    /// Most common; lowest trade-value multiplier.
    Common,
    /// Uncommon.
    Uncommon,
    /// Rare.
    Rare,
    /// Epic.
    Epic,
    /// Rarest; highest trade-value multiplier.
    Legendary,
}

impl EvidenceRarity {
    /// Relative weight used when a beat's `evidence_outputs` rolls a
    /// rarity without an explicit tier.
    #[must_use]
    pub fn drop_weight(self) -> u32 {
        match self {
            EvidenceRarity::Common => 50,
            EvidenceRarity::Uncommon => 30,
            EvidenceRarity::Rare => 15,
            EvidenceRarity::Epic => 4,
            EvidenceRarity::Legendary => 1,
        }
    }

    /// Trade-value multiplier applied on top of the grade's base value
    /// when an item is consumed.
    #[must_use]
    pub fn value_multiplier(self) -> f64 {
        match self {
            EvidenceRarity::Common => 1.0,
            EvidenceRarity::Uncommon => 1.5,
            EvidenceRarity::Rare => 2.5,
            EvidenceRarity::Epic => 5.0,
            EvidenceRarity::Legendary => 10.0,
        }
    }
}

/// An owned, gradeable, TTL'd evidence item (spec §3 "Evidence").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Stable identifier.
    pub evidence_id: EvidenceId,
    /// Owning theatre.
    pub theatre_id: TheatreId,
    /// Current owner.
    pub owner_id: UserId,
    /// Display name.
    pub name: String,
    /// Grade, sets TTL.
    pub grade: EvidenceGrade,
    /// Rarity, a value/flavor dimension.
    pub rarity: EvidenceRarity,
    /// The theme-pack evidence type this item instantiates.
    #[serde(rename = "type")]
    pub evidence_type: EvidenceTypeId,
    /// The beat/scene this item was sourced from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_scene: Option<String>,
    /// The stage this item was sourced from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_stage: Option<StageId>,
    /// When this item was granted.
    pub obtained_at: Instant,
    /// TTL boundary; unreadable for mutation past this instant.
    pub expires_at: Instant,
    /// Whether `verify` has confirmed authenticity.
    pub verified: bool,
    /// Whether ownership may transfer.
    pub tradeable: bool,
    /// One-way terminal flag; a consumed item cannot transfer, verify, or
    /// consume again.
    pub consumed: bool,
    /// Opaque metadata bag (spec §9 "heterogeneous JSON metadata bags" —
    /// only the `secret` field used by challenge-based `verify` is typed
    /// at this edge; everything else stays inside the blob).
    pub metadata: serde_json::Value,
}

impl Evidence {
    /// Whether `now` is past `expires_at` (read-only past expiry, spec
    /// §3 "Lifecycles").
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// An audit record of one ownership change (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceTransfer {
    /// The evidence item transferred.
    pub evidence_id: EvidenceId,
    /// Prior owner.
    pub from_user_id: UserId,
    /// New owner.
    pub to_user_id: UserId,
    /// When the transfer was recorded.
    pub at: Instant,
}

/// Result of a `verify` call (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResult {
    /// Evidence verified.
    pub evidence_id: EvidenceId,
    /// Whether the item was judged authentic.
    pub is_authentic: bool,
    /// Confidence in `[0,1]`.
    pub confidence: f64,
    /// Grade-scaled bonus applied if authentic, `0.0` otherwise.
    pub grade_bonus: f64,
}

/// Result of a `consume` call (spec §4.5): the item becomes a one-way
/// terminal and reports the value it returned to the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeResult {
    /// Evidence consumed.
    pub evidence_id: EvidenceId,
    /// Free-form reason the item was consumed (e.g. `"submit"`).
    pub purpose: String,
    /// `grade.base_trade_value() * rarity.value_multiplier()`.
    pub value_returned: f64,
}
