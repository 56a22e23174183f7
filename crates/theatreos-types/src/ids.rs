// SPDX-License-Identifier: Apache-2.0
//! Opaque entity identifiers.
//!
//! All ids are opaque strings at the wire/storage edge (per spec §3); the
//! newtypes here exist so engines can't accidentally pass a `StageId` where
//! a `ThreadId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(TheatreId, "Identifies one independent world instance.");
opaque_id!(UserId, "Identifies a player, operator, or other account.");
opaque_id!(StageId, "Identifies a geo-located stage within a theatre.");
opaque_id!(ThemePackId, "Identifies a versioned theme pack.");
opaque_id!(VarId, "Identifies a world variable declared by a theme pack.");
opaque_id!(ThreadId, "Identifies a story thread declared by a theme pack.");
opaque_id!(ObjectId, "Identifies a key object tracked by `object_holders`.");
opaque_id!(CharacterId, "Identifies a theme-pack character.");
opaque_id!(FactionId, "Identifies a theme-pack faction.");
opaque_id!(BeatTemplateId, "Identifies a theme-pack beat template.");
opaque_id!(GateTemplateId, "Identifies a theme-pack gate template.");
opaque_id!(EvidenceTypeId, "Identifies a theme-pack evidence type.");
opaque_id!(PlanId, "Identifies a generated `HourPlan`.");
opaque_id!(SlotId, "Identifies one slot within an `HourPlan`.");
opaque_id!(GateId, "Identifies a live `GateInstance`.");
opaque_id!(OptionId, "Identifies one option within a gate's option set.");
opaque_id!(VoteId, "Identifies a cast vote.");
opaque_id!(StakeId, "Identifies a placed stake.");
opaque_id!(EvidenceId, "Identifies an evidence item.");
opaque_id!(RumorId, "Identifies a rumor.");
opaque_id!(SpreadId, "Identifies one spread event of a rumor.");
opaque_id!(TraceId, "Identifies a trace left at a stage.");
opaque_id!(CrewId, "Identifies a crew.");
opaque_id!(CrewActionId, "Identifies a collective crew action.");
opaque_id!(SharedResourceId, "Identifies a pooled crew resource.");
opaque_id!(DeltaId, "Identifies an applied world delta.");
opaque_id!(SnapshotId, "Identifies a world-state snapshot.");
opaque_id!(EventId, "Identifies an event-log entry.");

/// An idempotency key scoped to one theatre (spec §5: "`(theatre_id,
/// idempotency_key)` is unique globally").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(pub String);

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for IdempotencyKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for IdempotencyKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
