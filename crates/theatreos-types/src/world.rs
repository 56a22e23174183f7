// SPDX-License-Identifier: Apache-2.0
//! World state, deltas, and snapshots (spec §3, §4.2).
//!
//! `World Kernel` is the only writer of these shapes; every other engine
//! reads them (directly or via an applied delta's resulting event) and
//! never mutates current-state rows itself.

use crate::ids::{DeltaId, IdempotencyKey, ObjectId, SnapshotId, TheatreId, ThreadId, VarId};
use crate::Instant;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current value of one declared world variable.
pub type VarMap = BTreeMap<String, f64>;

/// `(phase, progress, last_advanced_at)` for one story thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadState {
    /// Current phase name, one of the thread's declared phases (I3).
    pub phase: String,
    /// Progress within the current phase, `[0,1]`.
    pub progress: f64,
    /// When this thread last advanced phase or progress.
    pub last_advanced_at: Instant,
}

/// Current holder of a tracked key object: a user, a crew, a stage, or
/// nothing (`"lost"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Holder {
    /// Held by a player.
    User(String),
    /// Held by a crew.
    Crew(String),
    /// Sitting at a stage, unheld.
    Stage(String),
    /// Not held by anything (I4 still requires exactly one holder: "lost"
    /// is itself a holder value, never the absence of a row).
    Lost,
}

/// The full current state of one theatre (spec §3 "World state").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldState {
    /// `variable-id -> current value`.
    pub variables: VarMap,
    /// `thread-id -> current state`.
    pub threads: BTreeMap<String, ThreadState>,
    /// `object-id -> current holder`.
    pub objects: BTreeMap<String, Holder>,
}

/// A requested change to one world variable, before clamping (I2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarChange {
    /// Variable to change.
    pub var_id: VarId,
    /// Signed delta to apply to the variable's current value.
    pub delta: f64,
}

/// A requested change to one story thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadChange {
    /// Thread to change.
    pub thread_id: ThreadId,
    /// New phase, if this change advances the thread's phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_phase: Option<String>,
    /// Signed change to progress within the (possibly new) phase.
    #[serde(default)]
    pub progress_delta: f64,
}

/// A requested change to one tracked object's holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectChange {
    /// Object to move.
    pub object_id: ObjectId,
    /// Required current holder; if supplied and it doesn't match, the
    /// whole delta is rejected with `conflict`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_from: Option<Holder>,
    /// New holder.
    pub to: Holder,
}

/// Why a delta was produced. Free text for now (e.g. `"gate_resolve:g1"`,
/// `"beat_effect:b4"`, `"operator_override"`).
pub type DeltaCause = String;

/// Input to `WorldKernel::apply_delta` (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyDeltaRequest {
    /// Owning theatre.
    pub theatre_id: TheatreId,
    /// Deduplication key; unique per `(theatre_id, idempotency_key)`.
    pub idempotency_key: IdempotencyKey,
    /// Human-readable cause, carried onto the applied record.
    pub cause: DeltaCause,
    /// Variable changes to apply.
    #[serde(default)]
    pub var_changes: Vec<VarChange>,
    /// Thread changes to apply.
    #[serde(default)]
    pub thread_changes: Vec<ThreadChange>,
    /// Object changes to apply.
    #[serde(default)]
    pub object_changes: Vec<ObjectChange>,
}

/// An immutable, already-applied delta record (spec §3 "Delta").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedDeltaRecord {
    /// Stable identifier.
    pub delta_id: DeltaId,
    /// Owning theatre.
    pub theatre_id: TheatreId,
    /// Deduplication key this delta was applied under.
    pub idempotency_key: IdempotencyKey,
    /// Human-readable cause.
    pub cause: DeltaCause,
    /// Variable changes, as actually applied (post-clamp).
    pub var_changes: Vec<VarChange>,
    /// Thread changes, as actually applied.
    pub thread_changes: Vec<ThreadChange>,
    /// Object changes, as actually applied.
    pub object_changes: Vec<ObjectChange>,
    /// When this delta was committed.
    pub applied_at: Instant,
}

/// A point-in-time capture of a theatre's state (spec §3 "Snapshot").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Stable identifier.
    pub snapshot_id: SnapshotId,
    /// Owning theatre.
    pub theatre_id: TheatreId,
    /// When this snapshot was taken.
    pub taken_at: Instant,
    /// Stable digest of `full_state` under canonical key order.
    pub state_hash: String,
    /// The captured state.
    pub full_state: WorldState,
}
