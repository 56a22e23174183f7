// SPDX-License-Identifier: Apache-2.0
//! Trace entities (spec §3, §4.7): stage-local discoverable markers.

use crate::ids::{StageId, TheatreId, TraceId, UserId};
use crate::Instant;
use serde::{Deserialize, Serialize};

/// The kind of mark left at a stage (spec §3). Each carries its own TTL
/// and base discovery difficulty (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceType {
    /// A passing footprint; shortest TTL, easiest to find.
    Footprint,
    /// A deliberate mark.
    Mark,
    /// A left message.
    Message,
    /// An offering; longest TTL, hardest to find.
    Offering,
}

impl TraceType {
    /// TTL in hours for this trace type (spec §4.7).
    #[must_use]
    pub fn ttl_hours(self) -> i64 {
        match self {
            TraceType::Footprint => 24,
            TraceType::Mark => 72,
            TraceType::Message => 48,
            TraceType::Offering => 168,
        }
    }

    /// Default discovery difficulty in `[0,1]` (original's per-type
    /// default; leave callers free to override per-trace).
    #[must_use]
    pub fn default_difficulty(self) -> f64 {
        match self {
            TraceType::Footprint => 0.3,
            TraceType::Mark => 0.5,
            TraceType::Message => 0.4,
            TraceType::Offering => 0.7,
        }
    }
}

/// Who may see a trace (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceVisibility {
    /// Visible to any player.
    Public,
    /// Visible only to the creator's crew.
    Crew,
    /// Visible only to the creator.
    Private,
}

/// A discoverable marker left at a stage (spec §3 "Trace").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Stable identifier.
    pub trace_id: TraceId,
    /// Owning theatre.
    pub theatre_id: TheatreId,
    /// Leaving user.
    pub creator_id: UserId,
    /// Stage this trace sits at.
    pub stage_id: StageId,
    /// Kind of mark.
    #[serde(rename = "type")]
    pub trace_type: TraceType,
    /// Free-form content (message text, offering description), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Who may see this trace.
    pub visibility: TraceVisibility,
    /// Probability a discovery attempt fails, `[0,1]`.
    pub discovery_difficulty: f64,
    /// When this trace was left.
    pub created_at: Instant,
    /// TTL boundary.
    pub expires_at: Instant,
    /// Count of successful discoveries.
    pub discovery_count: u32,
}

impl Trace {
    /// Whether `now` is past `expires_at`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// One `(trace, discoverer)` attempt (spec §3); at most one per pair (P6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceDiscovery {
    /// The trace attempted.
    pub trace_id: TraceId,
    /// The attempting user.
    pub discoverer_id: UserId,
    /// Whether the attempt succeeded.
    pub succeeded: bool,
    /// When the attempt was made.
    pub at: Instant,
}

/// A stage's aggregate trace density, bucketed into a heat level (spec
/// §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatLevel {
    /// No live traces.
    None,
    /// 1-4 live traces.
    Low,
    /// 5-9 live traces.
    Medium,
    /// 10-19 live traces.
    High,
    /// 20+ live traces.
    VeryHigh,
}

impl HeatLevel {
    /// Bucket a non-expired trace count into a heat level.
    #[must_use]
    pub fn from_count(total: u32) -> HeatLevel {
        if total >= 20 {
            HeatLevel::VeryHigh
        } else if total >= 10 {
            HeatLevel::High
        } else if total >= 5 {
            HeatLevel::Medium
        } else if total > 0 {
            HeatLevel::Low
        } else {
            HeatLevel::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heat_level_bucket_boundaries() {
        assert_eq!(HeatLevel::from_count(0), HeatLevel::None);
        assert_eq!(HeatLevel::from_count(1), HeatLevel::Low);
        assert_eq!(HeatLevel::from_count(4), HeatLevel::Low);
        assert_eq!(HeatLevel::from_count(5), HeatLevel::Medium);
        assert_eq!(HeatLevel::from_count(9), HeatLevel::Medium);
        assert_eq!(HeatLevel::from_count(10), HeatLevel::High);
        assert_eq!(HeatLevel::from_count(19), HeatLevel::High);
        assert_eq!(HeatLevel::from_count(20), HeatLevel::VeryHigh);
        assert_eq!(HeatLevel::from_count(500), HeatLevel::VeryHigh);
    }
}
