// SPDX-License-Identifier: Apache-2.0
//! The storage adapter contract (spec §9: "multiple per-entity service/
//! service_db variants ... specify the contract once").
//!
//! Every engine crate depends on `Storage` rather than on a specific
//! backend. Two implementations share the contract: [`memory::InMemoryStorage`]
//! (used by every engine's unit tests and by `theatreos-server`'s dev mode)
//! and [`postgres::PostgresStorage`] (the production backend, wired at
//! `theatreos-server::main`).

pub mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use theatreos_types::crew::{Crew, CrewAction, Membership, SharedResource};
use theatreos_types::evidence::{Evidence, EvidenceTransfer};
use theatreos_types::gate::{GateInstance, Settlement, Stake, Vote, Wallet};
use theatreos_types::plan::HourPlan;
use theatreos_types::rumor::{Rumor, Spread};
use theatreos_types::stage::Stage;
use theatreos_types::theatre::Theatre;
use theatreos_types::trace::{Trace, TraceDiscovery};
use theatreos_types::user::User;
use theatreos_types::world::{AppliedDeltaRecord, Snapshot, WorldState};
use theatreos_types::{
    CrewActionId, CrewId, EvidenceId, GateId, IdempotencyKey, RumorId, SharedResourceId, StageId,
    TheatreId, ThemePackId, TraceId, UserId,
};

pub use error::{StorageError, StorageResult};

/// The full storage contract (spec §6 "Storage layout (logical)").
///
/// Implementations must uphold:
/// - `(theatre_id, idempotency_key)` uniqueness for deltas (spec §5).
/// - one live vote per `(gate, user)`, one spread per `(rumor, spreader)`,
///   one discovery per `(trace, discoverer)` (P5, P6).
/// - atomic wallet-debit-plus-stake-insert (spec §4.4 `stake`).
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    // ---- theatres / users / stages -----------------------------------
    async fn put_theatre(&self, theatre: Theatre) -> StorageResult<()>;
    async fn get_theatre(&self, theatre_id: &TheatreId) -> StorageResult<Theatre>;
    /// Every known theatre, for background drivers to enumerate (spec §5
    /// "a small fixed set of background drivers (per theatre)").
    async fn list_theatres(&self) -> StorageResult<Vec<Theatre>>;
    async fn set_bound_pack(
        &self,
        theatre_id: &TheatreId,
        pack_id: &ThemePackId,
    ) -> StorageResult<()>;

    async fn put_user(&self, user: User) -> StorageResult<()>;
    async fn get_user(&self, user_id: &UserId) -> StorageResult<User>;

    async fn put_stage(&self, stage: Stage) -> StorageResult<()>;
    async fn get_stage(&self, stage_id: &StageId) -> StorageResult<Stage>;
    async fn list_stages(&self, theatre_id: &TheatreId) -> StorageResult<Vec<Stage>>;

    // ---- wallets -------------------------------------------------------
    async fn get_wallet(&self, theatre_id: &TheatreId, user_id: &UserId) -> StorageResult<Wallet>;
    /// Debit `amount` from the wallet, returning the new balance. Fails
    /// with `Conflict` if the balance would go negative; caller maps that
    /// to `EngineError::InsufficientFunds`.
    async fn debit_wallet(
        &self,
        theatre_id: &TheatreId,
        user_id: &UserId,
        amount: u64,
    ) -> StorageResult<u64>;
    async fn credit_wallet(
        &self,
        theatre_id: &TheatreId,
        user_id: &UserId,
        amount: u64,
    ) -> StorageResult<u64>;

    // ---- world kernel ----------------------------------------------------
    async fn get_world_state(&self, theatre_id: &TheatreId) -> StorageResult<WorldState>;
    /// Look up a previously applied delta by idempotency key, if any.
    async fn find_applied_delta(
        &self,
        theatre_id: &TheatreId,
        idempotency_key: &IdempotencyKey,
    ) -> StorageResult<Option<AppliedDeltaRecord>>;
    /// Commit a new world state alongside its delta record and events, all
    /// under one atomic write. Fails with `Conflict` if the idempotency key
    /// was concurrently claimed.
    async fn commit_delta(
        &self,
        theatre_id: &TheatreId,
        new_state: WorldState,
        record: AppliedDeltaRecord,
        events: Vec<theatreos_types::Event>,
    ) -> StorageResult<()>;
    async fn put_snapshot(&self, snapshot: Snapshot) -> StorageResult<()>;
    async fn latest_snapshot(&self, theatre_id: &TheatreId) -> StorageResult<Option<Snapshot>>;
    async fn list_events(
        &self,
        theatre_id: &TheatreId,
        from: theatreos_types::Instant,
        to: theatreos_types::Instant,
    ) -> StorageResult<Vec<theatreos_types::Event>>;

    // ---- scheduler -------------------------------------------------------
    async fn put_plan(&self, plan: HourPlan) -> StorageResult<()>;
    async fn recent_plans(
        &self,
        theatre_id: &TheatreId,
        limit: usize,
    ) -> StorageResult<Vec<HourPlan>>;

    // ---- gates -------------------------------------------------------
    async fn put_gate(&self, gate: GateInstance) -> StorageResult<()>;
    async fn get_gate(&self, gate_id: &GateId) -> StorageResult<GateInstance>;
    async fn update_gate(&self, gate: GateInstance) -> StorageResult<()>;
    /// Gates due for a time-driven lifecycle transition at or before `now`.
    async fn due_gates(
        &self,
        theatre_id: &TheatreId,
        now: theatreos_types::Instant,
    ) -> StorageResult<Vec<GateInstance>>;

    async fn upsert_vote(&self, vote: Vote) -> StorageResult<Vote>;
    async fn get_vote(&self, gate_id: &GateId, user_id: &UserId) -> StorageResult<Option<Vote>>;
    async fn list_votes(&self, gate_id: &GateId) -> StorageResult<Vec<Vote>>;

    async fn find_stake_by_idem(
        &self,
        gate_id: &GateId,
        idempotency_key: &IdempotencyKey,
    ) -> StorageResult<Option<Stake>>;
    /// Atomically debit the wallet and insert the stake row.
    async fn place_stake(
        &self,
        theatre_id: &TheatreId,
        stake: Stake,
    ) -> StorageResult<Stake>;
    async fn list_stakes(&self, gate_id: &GateId) -> StorageResult<Vec<Stake>>;
    async fn mark_stake_refunded(&self, stake_id: &theatreos_types::StakeId) -> StorageResult<()>;
    async fn put_settlement(&self, settlement: Settlement) -> StorageResult<()>;
    async fn find_settlement(
        &self,
        gate_id: &GateId,
        stake_id: &theatreos_types::StakeId,
    ) -> StorageResult<Option<Settlement>>;

    // ---- evidence -------------------------------------------------------
    async fn put_evidence(&self, evidence: Evidence) -> StorageResult<()>;
    async fn get_evidence(&self, evidence_id: &EvidenceId) -> StorageResult<Evidence>;
    async fn update_evidence(&self, evidence: Evidence) -> StorageResult<()>;
    async fn put_evidence_transfer(&self, transfer: EvidenceTransfer) -> StorageResult<()>;
    async fn list_evidence_for_owner(
        &self,
        theatre_id: &TheatreId,
        owner_id: &UserId,
    ) -> StorageResult<Vec<Evidence>>;
    async fn list_evidence_for_theatre(&self, theatre_id: &TheatreId) -> StorageResult<Vec<Evidence>>;

    // ---- rumors -------------------------------------------------------
    async fn put_rumor(&self, rumor: Rumor) -> StorageResult<()>;
    async fn get_rumor(&self, rumor_id: &RumorId) -> StorageResult<Rumor>;
    async fn update_rumor(&self, rumor: Rumor) -> StorageResult<()>;
    async fn put_spread(&self, spread: Spread) -> StorageResult<Spread>;
    async fn find_spread(
        &self,
        rumor_id: &RumorId,
        spreader_id: &UserId,
    ) -> StorageResult<Option<Spread>>;
    async fn last_draft_at(
        &self,
        theatre_id: &TheatreId,
        author_id: &UserId,
    ) -> StorageResult<Option<theatreos_types::Instant>>;
    async fn list_rumors(
        &self,
        theatre_id: &TheatreId,
    ) -> StorageResult<Vec<Rumor>>;
    async fn stage_heat(&self, stage_id: &StageId) -> StorageResult<u32>;

    // ---- traces -------------------------------------------------------
    async fn put_trace(&self, trace: Trace) -> StorageResult<()>;
    async fn get_trace(&self, trace_id: &TraceId) -> StorageResult<Trace>;
    async fn update_trace(&self, trace: Trace) -> StorageResult<()>;
    async fn put_discovery(&self, discovery: TraceDiscovery) -> StorageResult<TraceDiscovery>;
    async fn find_discovery(
        &self,
        trace_id: &TraceId,
        discoverer_id: &UserId,
    ) -> StorageResult<Option<TraceDiscovery>>;
    async fn list_traces_at_stage(&self, stage_id: &StageId) -> StorageResult<Vec<Trace>>;

    // ---- crews -------------------------------------------------------
    async fn put_crew(&self, crew: Crew) -> StorageResult<()>;
    async fn get_crew(&self, crew_id: &CrewId) -> StorageResult<Crew>;
    async fn update_crew(&self, crew: Crew) -> StorageResult<()>;
    /// Removes a crew whose membership has gone to zero (the sole leader
    /// disbanding). Idempotent: removing an already-absent crew is not an
    /// error.
    async fn remove_crew(&self, crew_id: &CrewId) -> StorageResult<()>;
    async fn put_membership(&self, membership: Membership) -> StorageResult<()>;
    async fn update_membership(&self, membership: Membership) -> StorageResult<()>;
    async fn remove_membership(
        &self,
        crew_id: &CrewId,
        user_id: &UserId,
    ) -> StorageResult<()>;
    async fn get_membership(
        &self,
        theatre_id: &TheatreId,
        user_id: &UserId,
    ) -> StorageResult<Option<Membership>>;
    async fn list_memberships(&self, crew_id: &CrewId) -> StorageResult<Vec<Membership>>;
    async fn put_crew_action(&self, action: CrewAction) -> StorageResult<()>;
    async fn get_crew_action(
        &self,
        action_id: &CrewActionId,
    ) -> StorageResult<CrewAction>;
    async fn update_crew_action(&self, action: CrewAction) -> StorageResult<()>;
    async fn put_shared_resource(&self, resource: SharedResource) -> StorageResult<()>;
    async fn get_shared_resource(
        &self,
        resource_id: &SharedResourceId,
    ) -> StorageResult<SharedResource>;
    async fn update_shared_resource(&self, resource: SharedResource) -> StorageResult<()>;
    async fn list_shared_resources(&self, crew_id: &CrewId) -> StorageResult<Vec<SharedResource>>;
}

/// Where engines hand off events for delivery (spec §4.9 Realtime Fanout).
///
/// Distinct from [`Storage::commit_delta`]'s event log: that persists the
/// durable `world_event_log` record for Kernel-originated deltas, while this
/// is the live publish path every engine uses for its own transient
/// notifications (`gate_opened`, `vote_cast`, `rumor_viral`, ...), Kernel
/// deltas included once committed.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    /// Hand `event` to the fanout for delivery to its target's subscribers.
    async fn publish(&self, event: theatreos_types::Event);
}

/// An [`EventSink`] that discards everything. Used by engine unit tests and
/// anywhere a live fanout isn't wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn publish(&self, _event: theatreos_types::Event) {}
}
