// SPDX-License-Identifier: Apache-2.0
//! The event-log wire shape (spec §6): every successful delta or engine
//! action that subscribers care about produces one of these, which is both
//! appended to `world_event_log` and handed to Realtime Fanout.

use crate::ids::{EventId, StageId, TheatreId, UserId};
use crate::Instant;
use serde::{Deserialize, Serialize};

/// Non-exhaustive event kinds (spec §6). Carried as a string on the wire so
/// new kinds don't require a schema migration, but engines only ever
/// construct these through the typed constructors below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Background scheduler/driver heartbeat tick.
    Tick,
    /// Aggregate world-state-changed notice (coalesces var/thread/object
    /// changes from one delta).
    WorldStateChanged,
    /// A world variable changed.
    VarChanged,
    /// A story thread advanced phase or progress.
    ThreadAdvanced,
    /// An object's holder changed.
    ObjectMoved,
    /// An `HourPlan` was generated.
    PlanGenerated,
    /// A beat's scene began.
    SceneStarted,
    /// A beat's scene ended.
    SceneEnded,
    /// A gate transitioned `scheduled -> open`.
    GateOpened,
    /// A gate transitioned `open -> closing`.
    GateClosing,
    /// A gate resolved (`closing -> resolved`).
    GateResolved,
    /// A gate was cancelled by an operator.
    GateCancelled,
    /// A vote was cast or superseded.
    VoteCast,
    /// A stake was placed.
    StakePlaced,
    /// Evidence was granted to a user.
    EvidenceGranted,
    /// Evidence ownership transferred.
    EvidenceTransferred,
    /// Evidence is nearing expiry.
    EvidenceExpiring,
    /// A rumor was published.
    RumorPublished,
    /// A rumor crossed the virality threshold.
    RumorViral,
    /// A rumor was debunked.
    RumorDebunked,
    /// A trace was left at a stage.
    TraceLeft,
    /// A trace was discovered.
    TraceDiscovered,
    /// A crew collective action started.
    CrewActionStarted,
    /// A crew collective action completed.
    CrewActionCompleted,
    /// A free-form notification.
    Notification,
    /// Realtime keep-alive.
    Heartbeat,
}

/// The most specific non-empty delivery selector for an event (spec §4.9).
/// Dispatch picks the first populated field in declaration order:
/// `target_users`, then `target_stage`, then `target_theatre`, then a
/// global broadcast if all are empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventTarget {
    /// Deliver only to these users' active streams.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_users: Vec<UserId>,
    /// Deliver to all subscribers of this stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_stage: Option<StageId>,
    /// Deliver to all subscribers of this theatre.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_theatre: Option<TheatreId>,
}

impl EventTarget {
    /// Target a single user.
    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self {
            target_users: vec![user_id],
            ..Self::default()
        }
    }

    /// Target every subscriber of a stage.
    #[must_use]
    pub fn stage(stage_id: StageId) -> Self {
        Self {
            target_stage: Some(stage_id),
            ..Self::default()
        }
    }

    /// Target every subscriber of a theatre.
    #[must_use]
    pub fn theatre(theatre_id: TheatreId) -> Self {
        Self {
            target_theatre: Some(theatre_id),
            ..Self::default()
        }
    }
}

/// One append-only event-log entry (spec §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Stable identifier.
    pub event_id: EventId,
    /// Owning theatre.
    pub theatre_id: TheatreId,
    /// Time the event was produced.
    pub at: Instant,
    /// Event kind.
    pub kind: EventKind,
    /// Delivery target, if more specific than theatre-wide broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<EventTarget>,
    /// Kind-specific payload.
    pub payload: serde_json::Value,
    /// The delta that produced this event, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_by_delta: Option<String>,
}
