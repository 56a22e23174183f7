// SPDX-License-Identifier: Apache-2.0
//! An in-memory [`Storage`] double. Used by every engine's unit tests and
//! by `theatreos-server` in dev mode. Mirrors the Postgres schema's
//! uniqueness constraints (one vote per `(gate, user)`, one spread per
//! `(rumor, spreader)`, ...) without needing a real database.

use crate::error::{StorageError, StorageResult};
use crate::Storage;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

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
    CrewActionId, CrewId, Event, EvidenceId, GateId, IdempotencyKey, Instant, RumorId,
    SharedResourceId, StageId, StakeId, TheatreId, ThemePackId, TraceId, UserId,
};

#[derive(Default)]
struct Inner {
    theatres: HashMap<String, Theatre>,
    users: HashMap<String, User>,
    stages: HashMap<String, Stage>,
    wallets: HashMap<(String, String), Wallet>,

    world_state: HashMap<String, WorldState>,
    delta_idempotency: HashMap<(String, String), AppliedDeltaRecord>,
    snapshots: HashMap<String, Vec<Snapshot>>,
    events: HashMap<String, Vec<Event>>,

    plans: HashMap<String, Vec<HourPlan>>,

    gates: HashMap<String, GateInstance>,
    votes: HashMap<(String, String), Vote>,
    stakes: HashMap<String, Vec<Stake>>,
    stake_idempotency: HashMap<(String, String), StakeId>,
    settlements: HashMap<(String, String), Settlement>,

    evidence: HashMap<String, Evidence>,
    evidence_transfers: Vec<EvidenceTransfer>,

    rumors: HashMap<String, Rumor>,
    spreads: HashMap<(String, String), Spread>,
    stage_heat: HashMap<String, u32>,

    traces: HashMap<String, Trace>,
    discoveries: HashMap<(String, String), TraceDiscovery>,

    crews: HashMap<String, Crew>,
    memberships: HashMap<(String, String), Membership>,
    crew_actions: HashMap<String, CrewAction>,
    shared_resources: HashMap<String, SharedResource>,
}

/// An in-memory implementation of [`Storage`], guarded by a single mutex.
///
/// One `Arc<Mutex<_>>`-guarded map: simple reasoning, fine for a test
/// double and for the bounded scale of a single-process deployment.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

impl InMemoryStorage {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(what: &str, id: &str) -> StorageError {
    StorageError::NotFound(format!("{what} {id}"))
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn put_theatre(&self, theatre: Theatre) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .theatres
            .insert(theatre.theatre_id.as_str().to_string(), theatre);
        Ok(())
    }

    async fn get_theatre(&self, theatre_id: &TheatreId) -> StorageResult<Theatre> {
        let inner = self.inner.lock().await;
        inner
            .theatres
            .get(theatre_id.as_str())
            .cloned()
            .ok_or_else(|| not_found("theatre", theatre_id.as_str()))
    }

    async fn list_theatres(&self) -> StorageResult<Vec<Theatre>> {
        let inner = self.inner.lock().await;
        Ok(inner.theatres.values().cloned().collect())
    }

    async fn set_bound_pack(
        &self,
        theatre_id: &TheatreId,
        pack_id: &ThemePackId,
    ) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        let theatre = inner
            .theatres
            .get_mut(theatre_id.as_str())
            .ok_or_else(|| not_found("theatre", theatre_id.as_str()))?;
        theatre.bound_theme_pack_id = Some(pack_id.clone());
        Ok(())
    }

    async fn put_user(&self, user: User) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.users.insert(user.user_id.as_str().to_string(), user);
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> StorageResult<User> {
        let inner = self.inner.lock().await;
        inner
            .users
            .get(user_id.as_str())
            .cloned()
            .ok_or_else(|| not_found("user", user_id.as_str()))
    }

    async fn put_stage(&self, stage: Stage) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.stages.insert(stage.stage_id.as_str().to_string(), stage);
        Ok(())
    }

    async fn get_stage(&self, stage_id: &StageId) -> StorageResult<Stage> {
        let inner = self.inner.lock().await;
        inner
            .stages
            .get(stage_id.as_str())
            .cloned()
            .ok_or_else(|| not_found("stage", stage_id.as_str()))
    }

    async fn list_stages(&self, theatre_id: &TheatreId) -> StorageResult<Vec<Stage>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .stages
            .values()
            .filter(|s| &s.theatre_id == theatre_id)
            .cloned()
            .collect())
    }

    async fn get_wallet(&self, theatre_id: &TheatreId, user_id: &UserId) -> StorageResult<Wallet> {
        let mut inner = self.inner.lock().await;
        let key = (theatre_id.as_str().to_string(), user_id.as_str().to_string());
        Ok(inner
            .wallets
            .entry(key)
            .or_insert_with(|| Wallet {
                user_id: user_id.clone(),
                theatre_id: theatre_id.clone(),
                ticket_balance: 0,
            })
            .clone())
    }

    async fn debit_wallet(
        &self,
        theatre_id: &TheatreId,
        user_id: &UserId,
        amount: u64,
    ) -> StorageResult<u64> {
        let mut inner = self.inner.lock().await;
        let key = (theatre_id.as_str().to_string(), user_id.as_str().to_string());
        let wallet = inner.wallets.entry(key).or_insert_with(|| Wallet {
            user_id: user_id.clone(),
            theatre_id: theatre_id.clone(),
            ticket_balance: 0,
        });
        if wallet.ticket_balance < amount {
            return Err(StorageError::Conflict(format!(
                "insufficient balance for {user_id}: have {}, need {amount}",
                wallet.ticket_balance
            )));
        }
        wallet.ticket_balance -= amount;
        Ok(wallet.ticket_balance)
    }

    async fn credit_wallet(
        &self,
        theatre_id: &TheatreId,
        user_id: &UserId,
        amount: u64,
    ) -> StorageResult<u64> {
        let mut inner = self.inner.lock().await;
        let key = (theatre_id.as_str().to_string(), user_id.as_str().to_string());
        let wallet = inner.wallets.entry(key).or_insert_with(|| Wallet {
            user_id: user_id.clone(),
            theatre_id: theatre_id.clone(),
            ticket_balance: 0,
        });
        wallet.ticket_balance = wallet.ticket_balance.saturating_add(amount);
        Ok(wallet.ticket_balance)
    }

    async fn get_world_state(&self, theatre_id: &TheatreId) -> StorageResult<WorldState> {
        let inner = self.inner.lock().await;
        Ok(inner
            .world_state
            .get(theatre_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn find_applied_delta(
        &self,
        theatre_id: &TheatreId,
        idempotency_key: &IdempotencyKey,
    ) -> StorageResult<Option<AppliedDeltaRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .delta_idempotency
            .get(&(
                theatre_id.as_str().to_string(),
                idempotency_key.0.clone(),
            ))
            .cloned())
    }

    async fn commit_delta(
        &self,
        theatre_id: &TheatreId,
        new_state: WorldState,
        record: AppliedDeltaRecord,
        events: Vec<Event>,
    ) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        let key = (theatre_id.as_str().to_string(), record.idempotency_key.0.clone());
        if inner.delta_idempotency.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "idempotency key {} already claimed",
                record.idempotency_key
            )));
        }
        inner
            .world_state
            .insert(theatre_id.as_str().to_string(), new_state);
        inner.delta_idempotency.insert(key, record);
        inner
            .events
            .entry(theatre_id.as_str().to_string())
            .or_default()
            .extend(events);
        Ok(())
    }

    async fn put_snapshot(&self, snapshot: Snapshot) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .snapshots
            .entry(snapshot.theatre_id.as_str().to_string())
            .or_default()
            .push(snapshot);
        Ok(())
    }

    async fn latest_snapshot(&self, theatre_id: &TheatreId) -> StorageResult<Option<Snapshot>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .snapshots
            .get(theatre_id.as_str())
            .and_then(|v| v.last().cloned()))
    }

    async fn list_events(
        &self,
        theatre_id: &TheatreId,
        from: Instant,
        to: Instant,
    ) -> StorageResult<Vec<Event>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .get(theatre_id.as_str())
            .map(|v| {
                v.iter()
                    .filter(|e| e.at >= from && e.at <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put_plan(&self, plan: HourPlan) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .plans
            .entry(plan.theatre_id.as_str().to_string())
            .or_default()
            .push(plan);
        Ok(())
    }

    async fn recent_plans(
        &self,
        theatre_id: &TheatreId,
        limit: usize,
    ) -> StorageResult<Vec<HourPlan>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .plans
            .get(theatre_id.as_str())
            .map(|v| v.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn put_gate(&self, gate: GateInstance) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.gates.insert(gate.gate_id.as_str().to_string(), gate);
        Ok(())
    }

    async fn get_gate(&self, gate_id: &GateId) -> StorageResult<GateInstance> {
        let inner = self.inner.lock().await;
        inner
            .gates
            .get(gate_id.as_str())
            .cloned()
            .ok_or_else(|| not_found("gate", gate_id.as_str()))
    }

    async fn update_gate(&self, gate: GateInstance) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.gates.insert(gate.gate_id.as_str().to_string(), gate);
        Ok(())
    }

    async fn due_gates(
        &self,
        theatre_id: &TheatreId,
        now: Instant,
    ) -> StorageResult<Vec<GateInstance>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .gates
            .values()
            .filter(|g| {
                &g.theatre_id == theatre_id
                    && match g.state {
                        theatreos_types::gate::GateState::Scheduled => now >= g.open_at,
                        theatreos_types::gate::GateState::Open => now >= g.close_at,
                        theatreos_types::gate::GateState::Closing => now >= g.resolve_at,
                        _ => false,
                    }
            })
            .cloned()
            .collect())
    }

    async fn upsert_vote(&self, vote: Vote) -> StorageResult<Vote> {
        let mut inner = self.inner.lock().await;
        let key = (vote.gate_id.as_str().to_string(), vote.user_id.as_str().to_string());
        inner.votes.insert(key, vote.clone());
        Ok(vote)
    }

    async fn get_vote(&self, gate_id: &GateId, user_id: &UserId) -> StorageResult<Option<Vote>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .votes
            .get(&(gate_id.as_str().to_string(), user_id.as_str().to_string()))
            .cloned())
    }

    async fn list_votes(&self, gate_id: &GateId) -> StorageResult<Vec<Vote>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .votes
            .values()
            .filter(|v| &v.gate_id == gate_id)
            .cloned()
            .collect())
    }

    async fn find_stake_by_idem(
        &self,
        gate_id: &GateId,
        idempotency_key: &IdempotencyKey,
    ) -> StorageResult<Option<Stake>> {
        let inner = self.inner.lock().await;
        let Some(stake_id) = inner
            .stake_idempotency
            .get(&(gate_id.as_str().to_string(), idempotency_key.0.clone()))
        else {
            return Ok(None);
        };
        Ok(inner
            .stakes
            .get(gate_id.as_str())
            .and_then(|v| v.iter().find(|s| &s.stake_id == stake_id).cloned()))
    }

    async fn place_stake(&self, theatre_id: &TheatreId, stake: Stake) -> StorageResult<Stake> {
        let mut inner = self.inner.lock().await;
        let wallet_key = (theatre_id.as_str().to_string(), stake.user_id.as_str().to_string());
        let wallet = inner.wallets.entry(wallet_key).or_insert_with(|| Wallet {
            user_id: stake.user_id.clone(),
            theatre_id: theatre_id.clone(),
            ticket_balance: 0,
        });
        if wallet.ticket_balance < stake.amount {
            return Err(StorageError::Conflict(format!(
                "insufficient balance for {}: have {}, need {}",
                stake.user_id, wallet.ticket_balance, stake.amount
            )));
        }
        wallet.ticket_balance -= stake.amount;

        let idem_key = (
            stake.gate_id.as_str().to_string(),
            stake.idempotency_key.0.clone(),
        );
        inner
            .stake_idempotency
            .insert(idem_key, stake.stake_id.clone());
        inner
            .stakes
            .entry(stake.gate_id.as_str().to_string())
            .or_default()
            .push(stake.clone());
        Ok(stake)
    }

    async fn list_stakes(&self, gate_id: &GateId) -> StorageResult<Vec<Stake>> {
        let inner = self.inner.lock().await;
        Ok(inner.stakes.get(gate_id.as_str()).cloned().unwrap_or_default())
    }

    async fn mark_stake_refunded(&self, stake_id: &StakeId) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        for stakes in inner.stakes.values_mut() {
            if let Some(stake) = stakes.iter_mut().find(|s| &s.stake_id == stake_id) {
                stake.refunded = true;
                return Ok(());
            }
        }
        Err(not_found("stake", stake_id.as_str()))
    }

    async fn put_settlement(&self, settlement: Settlement) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        let key = (
            settlement.gate_id.as_str().to_string(),
            settlement.stake_id.as_str().to_string(),
        );
        inner.settlements.insert(key, settlement);
        Ok(())
    }

    async fn find_settlement(
        &self,
        gate_id: &GateId,
        stake_id: &StakeId,
    ) -> StorageResult<Option<Settlement>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .settlements
            .get(&(gate_id.as_str().to_string(), stake_id.as_str().to_string()))
            .cloned())
    }

    async fn put_evidence(&self, evidence: Evidence) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .evidence
            .insert(evidence.evidence_id.as_str().to_string(), evidence);
        Ok(())
    }

    async fn get_evidence(&self, evidence_id: &EvidenceId) -> StorageResult<Evidence> {
        let inner = self.inner.lock().await;
        inner
            .evidence
            .get(evidence_id.as_str())
            .cloned()
            .ok_or_else(|| not_found("evidence", evidence_id.as_str()))
    }

    async fn update_evidence(&self, evidence: Evidence) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .evidence
            .insert(evidence.evidence_id.as_str().to_string(), evidence);
        Ok(())
    }

    async fn put_evidence_transfer(&self, transfer: EvidenceTransfer) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.evidence_transfers.push(transfer);
        Ok(())
    }

    async fn list_evidence_for_owner(
        &self,
        theatre_id: &TheatreId,
        owner_id: &UserId,
    ) -> StorageResult<Vec<Evidence>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .evidence
            .values()
            .filter(|e| &e.theatre_id == theatre_id && &e.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_evidence_for_theatre(&self, theatre_id: &TheatreId) -> StorageResult<Vec<Evidence>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .evidence
            .values()
            .filter(|e| &e.theatre_id == theatre_id)
            .cloned()
            .collect())
    }

    async fn put_rumor(&self, rumor: Rumor) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.rumors.insert(rumor.rumor_id.as_str().to_string(), rumor);
        Ok(())
    }

    async fn get_rumor(&self, rumor_id: &RumorId) -> StorageResult<Rumor> {
        let inner = self.inner.lock().await;
        inner
            .rumors
            .get(rumor_id.as_str())
            .cloned()
            .ok_or_else(|| not_found("rumor", rumor_id.as_str()))
    }

    async fn update_rumor(&self, rumor: Rumor) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.rumors.insert(rumor.rumor_id.as_str().to_string(), rumor);
        Ok(())
    }

    async fn put_spread(&self, spread: Spread) -> StorageResult<Spread> {
        let mut inner = self.inner.lock().await;
        let key = (
            spread.rumor_id.as_str().to_string(),
            spread.spreader_id.as_str().to_string(),
        );
        if inner.spreads.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "spread already recorded for {}/{}",
                spread.rumor_id, spread.spreader_id
            )));
        }
        if let Some(stage_id) = &spread.stage_id {
            *inner.stage_heat.entry(stage_id.as_str().to_string()).or_insert(0) += 1;
        }
        inner.spreads.insert(key, spread.clone());
        Ok(spread)
    }

    async fn find_spread(
        &self,
        rumor_id: &RumorId,
        spreader_id: &UserId,
    ) -> StorageResult<Option<Spread>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .spreads
            .get(&(rumor_id.as_str().to_string(), spreader_id.as_str().to_string()))
            .cloned())
    }

    async fn last_draft_at(
        &self,
        theatre_id: &TheatreId,
        author_id: &UserId,
    ) -> StorageResult<Option<Instant>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rumors
            .values()
            .filter(|r| &r.theatre_id == theatre_id && &r.author_id == author_id)
            .map(|r| r.created_at)
            .max())
    }

    async fn list_rumors(&self, theatre_id: &TheatreId) -> StorageResult<Vec<Rumor>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rumors
            .values()
            .filter(|r| &r.theatre_id == theatre_id)
            .cloned()
            .collect())
    }

    async fn stage_heat(&self, stage_id: &StageId) -> StorageResult<u32> {
        let inner = self.inner.lock().await;
        Ok(inner.stage_heat.get(stage_id.as_str()).copied().unwrap_or(0))
    }

    async fn put_trace(&self, trace: Trace) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.traces.insert(trace.trace_id.as_str().to_string(), trace);
        Ok(())
    }

    async fn get_trace(&self, trace_id: &TraceId) -> StorageResult<Trace> {
        let inner = self.inner.lock().await;
        inner
            .traces
            .get(trace_id.as_str())
            .cloned()
            .ok_or_else(|| not_found("trace", trace_id.as_str()))
    }

    async fn update_trace(&self, trace: Trace) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.traces.insert(trace.trace_id.as_str().to_string(), trace);
        Ok(())
    }

    async fn put_discovery(&self, discovery: TraceDiscovery) -> StorageResult<TraceDiscovery> {
        let mut inner = self.inner.lock().await;
        let key = (
            discovery.trace_id.as_str().to_string(),
            discovery.discoverer_id.as_str().to_string(),
        );
        if inner.discoveries.contains_key(&key) {
            return Err(StorageError::Conflict(format!(
                "discovery already attempted for {}/{}",
                discovery.trace_id, discovery.discoverer_id
            )));
        }
        inner.discoveries.insert(key, discovery.clone());
        Ok(discovery)
    }

    async fn find_discovery(
        &self,
        trace_id: &TraceId,
        discoverer_id: &UserId,
    ) -> StorageResult<Option<TraceDiscovery>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .discoveries
            .get(&(trace_id.as_str().to_string(), discoverer_id.as_str().to_string()))
            .cloned())
    }

    async fn list_traces_at_stage(&self, stage_id: &StageId) -> StorageResult<Vec<Trace>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .traces
            .values()
            .filter(|t| &t.stage_id == stage_id)
            .cloned()
            .collect())
    }

    async fn put_crew(&self, crew: Crew) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.crews.insert(crew.crew_id.as_str().to_string(), crew);
        Ok(())
    }

    async fn get_crew(&self, crew_id: &CrewId) -> StorageResult<Crew> {
        let inner = self.inner.lock().await;
        inner
            .crews
            .get(crew_id.as_str())
            .cloned()
            .ok_or_else(|| not_found("crew", crew_id.as_str()))
    }

    async fn update_crew(&self, crew: Crew) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.crews.insert(crew.crew_id.as_str().to_string(), crew);
        Ok(())
    }

    async fn remove_crew(&self, crew_id: &CrewId) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.crews.remove(crew_id.as_str());
        Ok(())
    }

    async fn put_membership(&self, membership: Membership) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        let key = (
            membership.crew_id.as_str().to_string(),
            membership.user_id.as_str().to_string(),
        );
        inner.memberships.insert(key, membership);
        Ok(())
    }

    async fn update_membership(&self, membership: Membership) -> StorageResult<()> {
        self.put_membership(membership).await
    }

    async fn remove_membership(&self, crew_id: &CrewId, user_id: &UserId) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .memberships
            .remove(&(crew_id.as_str().to_string(), user_id.as_str().to_string()));
        Ok(())
    }

    async fn get_membership(
        &self,
        theatre_id: &TheatreId,
        user_id: &UserId,
    ) -> StorageResult<Option<Membership>> {
        let inner = self.inner.lock().await;
        for ((crew_id, uid), membership) in &inner.memberships {
            if uid == user_id.as_str() {
                if let Some(crew) = inner.crews.get(crew_id) {
                    if &crew.theatre_id == theatre_id {
                        return Ok(Some(membership.clone()));
                    }
                }
            }
        }
        Ok(None)
    }

    async fn list_memberships(&self, crew_id: &CrewId) -> StorageResult<Vec<Membership>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .memberships
            .values()
            .filter(|m| &m.crew_id == crew_id)
            .cloned()
            .collect())
    }

    async fn put_crew_action(&self, action: CrewAction) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .crew_actions
            .insert(action.action_id.as_str().to_string(), action);
        Ok(())
    }

    async fn get_crew_action(&self, action_id: &CrewActionId) -> StorageResult<CrewAction> {
        let inner = self.inner.lock().await;
        inner
            .crew_actions
            .get(action_id.as_str())
            .cloned()
            .ok_or_else(|| not_found("crew_action", action_id.as_str()))
    }

    async fn update_crew_action(&self, action: CrewAction) -> StorageResult<()> {
        self.put_crew_action(action).await
    }

    async fn put_shared_resource(&self, resource: SharedResource) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner
            .shared_resources
            .insert(resource.resource_id.as_str().to_string(), resource);
        Ok(())
    }

    async fn get_shared_resource(
        &self,
        resource_id: &SharedResourceId,
    ) -> StorageResult<SharedResource> {
        let inner = self.inner.lock().await;
        inner
            .shared_resources
            .get(resource_id.as_str())
            .cloned()
            .ok_or_else(|| not_found("shared_resource", resource_id.as_str()))
    }

    async fn update_shared_resource(&self, resource: SharedResource) -> StorageResult<()> {
        self.put_shared_resource(resource).await
    }

    async fn list_shared_resources(&self, crew_id: &CrewId) -> StorageResult<Vec<SharedResource>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .shared_resources
            .values()
            .filter(|r| &r.crew_id == crew_id)
            .cloned()
            .collect())
    }
}
