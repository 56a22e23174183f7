// SPDX-License-Identifier: Apache-2.0
//! Crew entities (spec §3, §4.8): membership, tiered permissions,
//! collective actions, and the shared resource pool.

use crate::ids::{CrewActionId, CrewId, SharedResourceId, TheatreId, UserId};
use crate::Instant;
use serde::{Deserialize, Serialize};

/// A crew's tier, gating `max_members` and the allowed action-type set
/// (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewTier {
    /// Smallest tier.
    Tier1,
    /// Mid tier.
    Tier2,
    /// Largest tier.
    Tier3,
}

impl CrewTier {
    /// Maximum member count for this tier.
    #[must_use]
    pub fn max_members(self) -> u32 {
        match self {
            CrewTier::Tier1 => 5,
            CrewTier::Tier2 => 10,
            CrewTier::Tier3 => 20,
        }
    }

    /// Collective-action kinds this tier may initiate, additive over
    /// lower tiers (spec §4).
    #[must_use]
    pub fn allowed_actions(self) -> &'static [&'static str] {
        match self {
            CrewTier::Tier1 => &["share_evidence", "group_vote"],
            CrewTier::Tier2 => &[
                "share_evidence",
                "group_vote",
                "coordinate_spread",
                "pool_resources",
            ],
            CrewTier::Tier3 => &[
                "share_evidence",
                "group_vote",
                "coordinate_spread",
                "pool_resources",
                "territory_claim",
                "mass_action",
            ],
        }
    }
}

/// A member's standing within a crew (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewRole {
    /// The crew's sole leader.
    Leader,
    /// An elevated member.
    Officer,
    /// An ordinary member.
    Member,
}

/// A multi-player group with a tiered permission set (spec §3 "Crew").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crew {
    /// Stable identifier.
    pub crew_id: CrewId,
    /// Owning theatre.
    pub theatre_id: TheatreId,
    /// Display name.
    pub name: String,
    /// Current tier.
    pub tier: CrewTier,
    /// Reputation score (engine-defined scale).
    pub reputation: f64,
    /// Sum of every member's `contribution`.
    pub total_contribution: u64,
    /// Optional flavor motto (spec §4 supplement).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motto: Option<String>,
    /// Opaque settings bag (spec §9 metadata-bag guidance).
    #[serde(default)]
    pub settings: serde_json::Value,
    /// Creation time.
    pub created_at: Instant,
}

/// One user's membership row (spec §3 "Membership"). Exactly one
/// membership per `(user, theatre)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    /// The crew.
    pub crew_id: CrewId,
    /// The member.
    pub user_id: UserId,
    /// Standing within the crew.
    pub role: CrewRole,
    /// Accumulated contribution (shared resources add `quantity * 10`,
    /// spec §4.8).
    pub contribution: u64,
    /// When this user joined.
    pub joined_at: Instant,
}

/// A collective action's lifecycle (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrewActionState {
    /// Initiated, below quorum.
    Pending,
    /// Quorum met; underway.
    InProgress,
    /// Finished.
    Completed,
    /// Passed `deadline` without quorum.
    Expired,
}

/// A tier-gated collective action (spec §3 "CrewAction").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewAction {
    /// Stable identifier.
    pub action_id: CrewActionId,
    /// Owning crew.
    pub crew_id: CrewId,
    /// Action kind; must be in the crew's tier's `allowed_actions`.
    pub kind: String,
    /// The user who started this action.
    pub initiator_id: UserId,
    /// Members who have joined (initiator counts as the first).
    pub participants: Vec<UserId>,
    /// Participants required to reach `InProgress`.
    pub quorum: u32,
    /// Deadline past which a `Pending` action expires (default 24h after
    /// initiation, spec §4.8).
    pub deadline: Instant,
    /// Current state.
    pub state: CrewActionState,
}

/// One unit shared into the crew's pool (spec §3 "SharedResource").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedResource {
    /// Stable identifier.
    pub resource_id: SharedResourceId,
    /// Owning crew.
    pub crew_id: CrewId,
    /// Resource kind (engine-defined; e.g. an evidence reference or a
    /// free-form pool currency).
    pub kind: String,
    /// Quantity contributed.
    pub amount: u64,
    /// Contributing member.
    pub contributor_id: UserId,
    /// Claiming member, once claimed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<UserId>,
    /// When this resource was shared.
    pub shared_at: Instant,
}
