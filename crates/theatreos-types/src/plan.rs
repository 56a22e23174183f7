// SPDX-License-Identifier: Apache-2.0
//! `HourPlan`, `Slot`, and `Beat` (spec §3, §4.3).

use crate::ids::{
    BeatTemplateId, GateTemplateId, PlanId, SlotId, StageId, TheatreId, ThreadId,
};
use crate::Instant;
use serde::{Deserialize, Serialize};

/// Where an `HourPlan` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// Produced by the scheduler's normal selection algorithm.
    Auto,
    /// Produced or altered by an operator override.
    Override,
}

/// One scene descriptor bound to a stage within a slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beat {
    /// The template this beat instantiates.
    pub template_id: BeatTemplateId,
    /// The thread this beat advances, if any.
    pub thread_id: Option<ThreadId>,
    /// Stage this beat is assigned to.
    pub stage_id: StageId,
    /// Gate planned for this beat's optional gate, if the template carries one.
    pub gate_id: Option<crate::ids::GateId>,
    /// Whether this beat was filled from the pack's rescue-beat set.
    pub is_rescue: bool,
}

/// One time-window within an `HourPlan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    /// Stable identifier.
    pub slot_id: SlotId,
    /// Start of this slot.
    pub start: Instant,
    /// Duration in minutes.
    pub duration_minutes: u32,
    /// Scene descriptors filling this slot.
    pub beats: Vec<Beat>,
    /// Gate templates planned for this slot (engine instantiates the
    /// `GateInstance` rows separately; this records the plan's intent).
    pub planned_gates: Vec<GateTemplateId>,
    /// Present only for a plan with no valid candidates (spec §4.3 failure
    /// model): a human-readable note explaining the silent slot.
    pub explain_note: Option<String>,
}

/// The scheduler's output for one slot (spec §3, §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourPlan {
    /// Stable identifier.
    pub plan_id: PlanId,
    /// Owning theatre.
    pub theatre_id: TheatreId,
    /// Start of the covered slot.
    pub slot_start: Instant,
    /// The primary thread selected for this slot.
    pub primary_thread_id: Option<ThreadId>,
    /// Supporting threads selected alongside the primary.
    pub support_thread_ids: Vec<ThreadId>,
    /// The slots covered by this plan (normally one, `slot_duration_minutes`
    /// wide).
    pub slots: Vec<Slot>,
    /// When this plan was generated.
    pub generated_at: Instant,
    /// Whether this plan was generated automatically or via override.
    pub source: PlanSource,
}
