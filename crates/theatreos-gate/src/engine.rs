// SPDX-License-Identifier: Apache-2.0
//! `GateEngine`: vote, stake, the time-driven lifecycle driver, resolution,
//! and cancellation (spec §4.4).

use crate::consequence::parse_bullets;
use crate::weight::{composite_score, stake_weight};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use theatreos_kernel::WorldKernel;
use theatreos_storage::{EventSink, Storage};
use theatreos_types::gate::{ExplainCard, GateInstance, GateState, Settlement, Stake, Vote};
use theatreos_types::world::ApplyDeltaRequest;
use theatreos_types::{
    EngineError, Event, EventKind, EventTarget, GateId, IdempotencyKey, Instant, OptionId,
    TheatreId, UserId, VoteId,
};
use theatreos_types::StakeId;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

type EngineResult<T> = Result<T, EngineError>;

/// Owns per-gate serialization and the full gate lifecycle over a
/// [`Storage`] backend, a [`theatreos_themepack::registry::ThemePackRegistry`]
/// allow-list, and the [`WorldKernel`] resolution writes back into.
pub struct GateEngine<S: Storage> {
    storage: Arc<S>,
    registry: Arc<theatreos_themepack::registry::ThemePackRegistry>,
    kernel: Arc<WorldKernel<S>>,
    events: Arc<dyn EventSink>,
    gate_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: Storage> GateEngine<S> {
    /// Construct a Gate Engine over `storage`, `registry`, and `kernel`,
    /// publishing realtime notices through `events`.
    #[must_use]
    pub fn new(
        storage: Arc<S>,
        registry: Arc<theatreos_themepack::registry::ThemePackRegistry>,
        kernel: Arc<WorldKernel<S>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            storage,
            registry,
            kernel,
            events,
            gate_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn gate_lock(&self, gate_id: &GateId) -> Arc<Mutex<()>> {
        let mut locks = self.gate_locks.lock().await;
        locks
            .entry(gate_id.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Cast or supersede a vote (spec §4.4 "Voting contract"). Must be
    /// `open`; retries with the same `idempotency_key` are no-ops.
    #[instrument(skip(self), fields(gate_id = %gate_id, user_id = %user_id))]
    pub async fn vote(
        &self,
        gate_id: &GateId,
        user_id: &UserId,
        option_id: &OptionId,
        idempotency_key: &IdempotencyKey,
    ) -> EngineResult<Vote> {
        let lock = self.gate_lock(gate_id).await;
        let _guard = lock.lock().await;

        let gate = self.storage.get_gate(gate_id).await.map_err(EngineError::from)?;
        if gate.state != GateState::Open {
            return Err(EngineError::Conflict("gate_not_open".to_string()));
        }
        if !gate.options.contains(option_id) {
            return Err(EngineError::Validation("option_invalid".to_string()));
        }

        if let Some(existing) = self
            .storage
            .get_vote(gate_id, user_id)
            .await
            .map_err(EngineError::from)?
        {
            if existing.idempotency_key == *idempotency_key {
                return Ok(existing);
            }
        }

        let vote = Vote {
            vote_id: VoteId::from(uuid::Uuid::new_v4().to_string()),
            gate_id: gate_id.clone(),
            user_id: user_id.clone(),
            option_id: option_id.clone(),
            cast_at: chrono::Utc::now(),
            idempotency_key: idempotency_key.clone(),
        };
        let stored = self
            .storage
            .upsert_vote(vote)
            .await
            .map_err(EngineError::from)?;

        self.refresh_tally(&gate).await?;
        self.events
            .publish(vote_cast_event(&gate, &stored))
            .await;
        Ok(stored)
    }

    /// Place a stake (spec §4.4 "Staking contract"): atomic wallet debit
    /// plus stake insert, idempotent by key.
    #[instrument(skip(self), fields(gate_id = %gate_id, user_id = %user_id, amount))]
    pub async fn stake(
        &self,
        gate_id: &GateId,
        user_id: &UserId,
        option_id: &OptionId,
        amount: u64,
        idempotency_key: &IdempotencyKey,
    ) -> EngineResult<Stake> {
        if amount == 0 {
            return Err(EngineError::Validation("amount must be > 0".to_string()));
        }

        let lock = self.gate_lock(gate_id).await;
        let _guard = lock.lock().await;

        let gate = self.storage.get_gate(gate_id).await.map_err(EngineError::from)?;
        if gate.state != GateState::Open {
            return Err(EngineError::Conflict("gate_not_open".to_string()));
        }
        if !gate.options.contains(option_id) {
            return Err(EngineError::Validation("option_invalid".to_string()));
        }

        if let Some(existing) = self
            .storage
            .find_stake_by_idem(gate_id, idempotency_key)
            .await
            .map_err(EngineError::from)?
        {
            return Ok(existing);
        }

        let stake = Stake {
            stake_id: StakeId::from(uuid::Uuid::new_v4().to_string()),
            gate_id: gate_id.clone(),
            user_id: user_id.clone(),
            option_id: option_id.clone(),
            amount,
            placed_at: chrono::Utc::now(),
            idempotency_key: idempotency_key.clone(),
            refunded: false,
        };
        let stored = self
            .storage
            .place_stake(&gate.theatre_id, stake)
            .await
            .map_err(|err| match err {
                theatreos_storage::StorageError::Conflict(msg) => {
                    EngineError::InsufficientFunds(msg)
                }
                other => EngineError::from(other),
            })?;

        self.events
            .publish(stake_placed_event(&gate, &stored))
            .await;
        Ok(stored)
    }

    async fn refresh_tally(&self, gate: &GateInstance) -> EngineResult<()> {
        let votes = self
            .storage
            .list_votes(&gate.gate_id)
            .await
            .map_err(EngineError::from)?;
        let mut tally: BTreeMap<String, u64> = gate
            .options
            .iter()
            .map(|o| (o.as_str().to_string(), 0))
            .collect();
        for v in &votes {
            *tally.entry(v.option_id.as_str().to_string()).or_insert(0) += 1;
        }
        let mut updated = gate.clone();
        updated.vote_tally = tally;
        self.storage
            .update_gate(updated)
            .await
            .map_err(EngineError::from)
    }

    /// Cancel a `scheduled` or `open` gate: refund every stake, no Kernel
    /// delta, `gate_cancelled` event (spec §4.4 "Cancellation").
    #[instrument(skip(self), fields(gate_id = %gate_id))]
    pub async fn cancel(&self, gate_id: &GateId) -> EngineResult<GateInstance> {
        let lock = self.gate_lock(gate_id).await;
        let _guard = lock.lock().await;

        let mut gate = self.storage.get_gate(gate_id).await.map_err(EngineError::from)?;
        if !matches!(gate.state, GateState::Scheduled | GateState::Open) {
            return Err(EngineError::Conflict(
                "gate cannot be cancelled past open".to_string(),
            ));
        }

        let stakes = self
            .storage
            .list_stakes(gate_id)
            .await
            .map_err(EngineError::from)?;
        for stake in stakes.into_iter().filter(|s| !s.refunded) {
            self.storage
                .credit_wallet(&gate.theatre_id, &stake.user_id, stake.amount)
                .await
                .map_err(EngineError::from)?;
            self.storage
                .mark_stake_refunded(&stake.stake_id)
                .await
                .map_err(EngineError::from)?;
        }

        gate.state = GateState::Cancelled;
        self.storage
            .update_gate(gate.clone())
            .await
            .map_err(EngineError::from)?;

        self.events.publish(gate_cancelled_event(&gate)).await;
        info!(gate_id = %gate_id, "gate cancelled");
        Ok(gate)
    }

    /// Check every gate due for a lifecycle transition at `now` and drive it
    /// forward one step (spec §4.4 "State machine"; background driver, spec
    /// §5). Safe to call repeatedly; every transition is idempotent.
    #[instrument(skip(self), fields(theatre_id = %theatre_id))]
    pub async fn process_due(&self, theatre_id: &TheatreId, now: Instant) -> EngineResult<Vec<GateId>> {
        let due = self
            .storage
            .due_gates(theatre_id, now)
            .await
            .map_err(EngineError::from)?;
        let mut transitioned = Vec::new();

        for candidate in due {
            let lock = self.gate_lock(&candidate.gate_id).await;
            let _guard = lock.lock().await;

            let mut gate = self
                .storage
                .get_gate(&candidate.gate_id)
                .await
                .map_err(EngineError::from)?;

            match gate.state {
                GateState::Scheduled if now >= gate.open_at => {
                    gate.state = GateState::Open;
                    self.storage
                        .update_gate(gate.clone())
                        .await
                        .map_err(EngineError::from)?;
                    self.events.publish(gate_opened_event(&gate)).await;
                    transitioned.push(gate.gate_id.clone());
                }
                GateState::Open if now >= gate.close_at => {
                    gate.state = GateState::Closing;
                    self.storage
                        .update_gate(gate.clone())
                        .await
                        .map_err(EngineError::from)?;
                    self.events.publish(gate_closing_event(&gate)).await;
                    transitioned.push(gate.gate_id.clone());
                }
                GateState::Closing if now >= gate.resolve_at => {
                    match self.resolve_locked(&mut gate).await {
                        Ok(_card) => transitioned.push(gate.gate_id.clone()),
                        Err(err) => {
                            warn!(?err, gate_id = %gate.gate_id, "gate resolution failed, retrying next tick");
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(transitioned)
    }

    /// Resolve `gate_id` directly (used by tests and operator tooling that
    /// don't want to wait for `process_due`'s time check).
    pub async fn resolve(&self, gate_id: &GateId) -> EngineResult<ExplainCard> {
        let lock = self.gate_lock(gate_id).await;
        let _guard = lock.lock().await;
        let mut gate = self.storage.get_gate(gate_id).await.map_err(EngineError::from)?;
        self.resolve_locked(&mut gate).await
    }

    /// Resolution algorithm (spec §4.4 steps 1-7). Caller must hold the
    /// gate's lock. Idempotent: a gate already `resolved` reconstructs the
    /// same Explain Card from its frozen votes/stakes rather than re-settling.
    async fn resolve_locked(&self, gate: &mut GateInstance) -> EngineResult<ExplainCard> {
        let template = self
            .registry
            .gate_template(&gate.theatre_id, gate.template_id.as_str())
            .map_err(|e| EngineError::Validation(e.to_string()))?
            .ok_or_else(|| {
                EngineError::Validation(format!("unknown gate template {}", gate.template_id))
            })?;

        let votes = self
            .storage
            .list_votes(&gate.gate_id)
            .await
            .map_err(EngineError::from)?;
        let stakes = self
            .storage
            .list_stakes(&gate.gate_id)
            .await
            .map_err(EngineError::from)?;

        let mut vote_tally: BTreeMap<String, u64> = gate
            .options
            .iter()
            .map(|o| (o.as_str().to_string(), 0))
            .collect();
        for v in &votes {
            *vote_tally.entry(v.option_id.as_str().to_string()).or_insert(0) += 1;
        }
        let total_votes: u64 = vote_tally.values().sum();

        let mut stake_weight_tally: BTreeMap<String, f64> = gate
            .options
            .iter()
            .map(|o| (o.as_str().to_string(), 0.0))
            .collect();
        let mut stake_pool_by_option: BTreeMap<String, u64> = gate
            .options
            .iter()
            .map(|o| (o.as_str().to_string(), 0))
            .collect();
        for s in stakes.iter().filter(|s| !s.refunded) {
            let w = stake_weight(&template.stake.weight_rule, s.amount);
            *stake_weight_tally
                .entry(s.option_id.as_str().to_string())
                .or_insert(0.0) += w;
            *stake_pool_by_option
                .entry(s.option_id.as_str().to_string())
                .or_insert(0) += s.amount;
        }
        let total_weight: f64 = stake_weight_tally.values().sum();
        let total_pool: u64 = stake_pool_by_option.values().sum();

        let mut winner: Option<(String, f64, f64)> = None;
        for option in &gate.options {
            let key = option.as_str().to_string();
            let vote_share = if total_votes == 0 {
                0.0
            } else {
                vote_tally[&key] as f64 / total_votes as f64
            };
            let weight_share = if total_weight <= 0.0 {
                0.0
            } else {
                stake_weight_tally[&key] / total_weight
            };
            let score = composite_score(vote_share, weight_share);
            let w = stake_weight_tally[&key];
            winner = Some(match winner {
                None => (key, score, w),
                Some((best_key, best_score, best_weight)) => {
                    if score > best_score
                        || ((score - best_score).abs() < 1e-12
                            && (w > best_weight
                                || ((w - best_weight).abs() < 1e-12 && key < best_key)))
                    {
                        (key, score, w)
                    } else {
                        (best_key, best_score, best_weight)
                    }
                }
            });
        }
        let (winning_key, _score, _weight) = winner
            .ok_or_else(|| EngineError::Validation("gate template has no options".to_string()))?;
        let winning_option: OptionId = winning_key.clone().into();
        let winning_pool = stake_pool_by_option.get(&winning_key).copied().unwrap_or(0);

        let now = chrono::Utc::now();

        // step 3/4: the template carries one win bullet list, applied for
        // whichever option comes out ahead; there is no per-option win/lose
        // split in the pack format (only a single winner per gate). Applied
        // before any wallet settlement or gate-state flip: if the delta is
        // rejected, nothing else about this resolution has taken effect yet
        // (no partial resolution is ever observable).
        let consequence_bullets = &template.consequences_win;
        let (var_changes, thread_changes) = parse_bullets(consequence_bullets);

        let mut consequences_applied = Vec::new();
        if !var_changes.is_empty() || !thread_changes.is_empty() {
            let delta_key = IdempotencyKey::from(format!("gate_resolve:{}", gate.gate_id));
            self.kernel
                .apply_delta(ApplyDeltaRequest {
                    theatre_id: gate.theatre_id.clone(),
                    idempotency_key: delta_key,
                    cause: format!("gate_resolve:{}", gate.gate_id),
                    var_changes,
                    thread_changes,
                    object_changes: Vec::new(),
                })
                .await?;
            consequences_applied = consequence_bullets.clone();
        }

        // step 5: settle stakes, idempotent per (gate, stake).
        for s in stakes.iter().filter(|s| !s.refunded) {
            if self
                .storage
                .find_settlement(&gate.gate_id, &s.stake_id)
                .await
                .map_err(EngineError::from)?
                .is_some()
            {
                continue;
            }
            let payout = if s.option_id.as_str() == winning_key && winning_pool > 0 {
                (u128::from(s.amount) * u128::from(total_pool) / u128::from(winning_pool)) as u64
            } else {
                0
            };
            if payout > 0 {
                self.storage
                    .credit_wallet(&gate.theatre_id, &s.user_id, payout)
                    .await
                    .map_err(EngineError::from)?;
            }
            self.storage
                .put_settlement(Settlement {
                    gate_id: gate.gate_id.clone(),
                    stake_id: s.stake_id.clone(),
                    user_id: s.user_id.clone(),
                    payout,
                    settled_at: now,
                })
                .await
                .map_err(EngineError::from)?;
        }

        gate.state = GateState::Resolved;
        gate.winning_option = Some(winning_option.clone());
        gate.settled_at = Some(now);
        gate.vote_tally = vote_tally.clone();
        self.storage
            .update_gate(gate.clone())
            .await
            .map_err(EngineError::from)?;

        let card = ExplainCard {
            gate_id: gate.gate_id.clone(),
            title: if template.explain_card_title.is_empty() {
                template.title.clone()
            } else {
                template.explain_card_title.clone()
            },
            winning_option,
            option_tally: vote_tally,
            stake_tally: stake_weight_tally,
            evidence_used: Vec::new(),
            consequences_applied,
            generated_at: now,
        };

        self.events.publish(gate_resolved_event(gate, &card)).await;
        info!(gate_id = %gate.gate_id, winning_option = %card.winning_option, "gate resolved");
        Ok(card)
    }
}

fn vote_cast_event(gate: &GateInstance, vote: &Vote) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: gate.theatre_id.clone(),
        at: vote.cast_at,
        kind: EventKind::VoteCast,
        target: Some(EventTarget::theatre(gate.theatre_id.clone())),
        payload: serde_json::json!({
            "gate_id": gate.gate_id,
            "user_id": vote.user_id,
            "option_id": vote.option_id,
        }),
        produced_by_delta: None,
    }
}

fn stake_placed_event(gate: &GateInstance, stake: &Stake) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: gate.theatre_id.clone(),
        at: stake.placed_at,
        kind: EventKind::StakePlaced,
        target: Some(EventTarget::theatre(gate.theatre_id.clone())),
        payload: serde_json::json!({
            "gate_id": gate.gate_id,
            "user_id": stake.user_id,
            "option_id": stake.option_id,
            "amount": stake.amount,
        }),
        produced_by_delta: None,
    }
}

fn gate_opened_event(gate: &GateInstance) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: gate.theatre_id.clone(),
        at: chrono::Utc::now(),
        kind: EventKind::GateOpened,
        target: Some(EventTarget::theatre(gate.theatre_id.clone())),
        payload: serde_json::json!({ "gate_id": gate.gate_id, "options": gate.options }),
        produced_by_delta: None,
    }
}

fn gate_closing_event(gate: &GateInstance) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: gate.theatre_id.clone(),
        at: chrono::Utc::now(),
        kind: EventKind::GateClosing,
        target: Some(EventTarget::theatre(gate.theatre_id.clone())),
        payload: serde_json::json!({ "gate_id": gate.gate_id }),
        produced_by_delta: None,
    }
}

fn gate_cancelled_event(gate: &GateInstance) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: gate.theatre_id.clone(),
        at: chrono::Utc::now(),
        kind: EventKind::GateCancelled,
        target: Some(EventTarget::theatre(gate.theatre_id.clone())),
        payload: serde_json::json!({ "gate_id": gate.gate_id }),
        produced_by_delta: None,
    }
}

fn gate_resolved_event(gate: &GateInstance, card: &ExplainCard) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: gate.theatre_id.clone(),
        at: card.generated_at,
        kind: EventKind::GateResolved,
        target: Some(EventTarget::theatre(gate.theatre_id.clone())),
        payload: serde_json::to_value(card).unwrap_or(serde_json::Value::Null),
        produced_by_delta: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use theatreos_storage::memory::InMemoryStorage;
    use theatreos_storage::NullEventSink;
    use theatreos_themepack::registry::ThemePackRegistry;
    use theatreos_types::gate::Wallet;
    use theatreos_types::theatre::Theatre;
    use theatreos_types::TheatreId;

    fn write_pack(dir: &std::path::Path, body: &str) {
        let mut f = fs::File::create(dir.join("p1.json")).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    async fn test_engine() -> (GateEngine<InMemoryStorage>, tempfile::TempDir, Arc<InMemoryStorage>, TheatreId) {
        let dir = tempfile::tempdir().unwrap();
        write_pack(
            dir.path(),
            r#"{
                "metadata": {"pack_id": "p1", "name": "Test"},
                "characters": [{"character_id": "c1", "name": "Ada"}],
                "threads": [{"thread_id": "t1", "name": "Main"}],
                "beat_templates": [{"beat_id": "b1", "thread_id": "t1"}],
                "gate_templates": [
                    {"gate_id": "gt1", "title": "Who talks?",
                     "options": [{"option_id": "A"}, {"option_id": "B"}],
                     "stake": {"weight_rule": "sqrt"},
                     "resolve_algorithm": "composite",
                     "consequences_win": ["thread:t1::0.1"],
                     "consequences_lose": []}
                ]
            }"#,
        );
        let registry = Arc::new(ThemePackRegistry::new(dir.path(), "p1"));
        let storage = Arc::new(InMemoryStorage::new());
        let theatre_id: TheatreId = "t1".into();
        registry.bind_theatre(&theatre_id, Some("p1")).unwrap();
        storage
            .put_theatre(Theatre {
                theatre_id: theatre_id.clone(),
                name: "Test".to_string(),
                bound_theme_pack_id: Some("p1".to_string()),
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
        let kernel = Arc::new(WorldKernel::new(storage.clone(), registry.clone()));
        let engine = GateEngine::new(
            storage.clone(),
            registry.clone(),
            kernel,
            Arc::new(NullEventSink),
        );
        (engine, dir, storage, theatre_id)
    }

    async fn seed_wallet(storage: &InMemoryStorage, theatre_id: &TheatreId, user_id: &UserId, amount: u64) {
        storage
            .credit_wallet(theatre_id, user_id, amount)
            .await
            .unwrap();
        let _ = Wallet {
            user_id: user_id.clone(),
            theatre_id: theatre_id.clone(),
            ticket_balance: amount,
        };
    }

    fn make_gate(theatre_id: &TheatreId, open_at: Instant) -> GateInstance {
        GateInstance {
            gate_id: "g1".into(),
            theatre_id: theatre_id.clone(),
            slot_id: "s1".into(),
            template_id: "gt1".into(),
            options: vec!["A".into(), "B".into()],
            open_at,
            close_at: open_at + chrono::Duration::minutes(55),
            resolve_at: open_at + chrono::Duration::minutes(60),
            state: GateState::Open,
            vote_tally: BTreeMap::new(),
            winning_option: None,
            settled_at: None,
        }
    }

    #[tokio::test]
    async fn scenario_4_vote_stake_resolve() {
        let (engine, _dir, storage, theatre_id) = test_engine().await;
        let open_at = chrono::Utc::now() - chrono::Duration::minutes(1);
        storage.put_gate(make_gate(&theatre_id, open_at)).await.unwrap();

        let u1: UserId = "u1".into();
        let u2: UserId = "u2".into();
        let u3: UserId = "u3".into();
        let u4: UserId = "u4".into();
        seed_wallet(&storage, &theatre_id, &u3, 100).await;
        seed_wallet(&storage, &theatre_id, &u4, 400).await;

        let gate_id: GateId = "g1".into();
        engine
            .vote(&gate_id, &u1, &"A".into(), &"v1".into())
            .await
            .unwrap();
        engine
            .vote(&gate_id, &u2, &"B".into(), &"v2".into())
            .await
            .unwrap();
        engine
            .stake(&gate_id, &u3, &"A".into(), 100, &"s1".into())
            .await
            .unwrap();
        engine
            .stake(&gate_id, &u4, &"B".into(), 400, &"s2".into())
            .await
            .unwrap();

        assert_eq!(storage.get_wallet(&theatre_id, &u3).await.unwrap().ticket_balance, 0);
        assert_eq!(storage.get_wallet(&theatre_id, &u4).await.unwrap().ticket_balance, 0);

        let card = engine.resolve(&gate_id).await.unwrap();
        assert_eq!(card.winning_option.as_str(), "B");
        assert_eq!(storage.get_wallet(&theatre_id, &u4).await.unwrap().ticket_balance, 500);
        assert_eq!(storage.get_wallet(&theatre_id, &u3).await.unwrap().ticket_balance, 0);

        // re-firing the resolver is a no-op (idempotent settlement + delta).
        let card2 = engine.resolve(&gate_id).await.unwrap();
        assert_eq!(card2.winning_option.as_str(), "B");
        assert_eq!(storage.get_wallet(&theatre_id, &u4).await.unwrap().ticket_balance, 500);
    }

    #[tokio::test]
    async fn cancel_refunds_all_stakes() {
        let (engine, _dir, storage, theatre_id) = test_engine().await;
        let open_at = chrono::Utc::now() - chrono::Duration::minutes(1);
        storage.put_gate(make_gate(&theatre_id, open_at)).await.unwrap();
        let u1: UserId = "u1".into();
        seed_wallet(&storage, &theatre_id, &u1, 100).await;

        let gate_id: GateId = "g1".into();
        engine
            .stake(&gate_id, &u1, &"A".into(), 100, &"s1".into())
            .await
            .unwrap();
        assert_eq!(storage.get_wallet(&theatre_id, &u1).await.unwrap().ticket_balance, 0);

        engine.cancel(&gate_id).await.unwrap();
        assert_eq!(storage.get_wallet(&theatre_id, &u1).await.unwrap().ticket_balance, 100);

        let err = engine
            .vote(&gate_id, &u1, &"A".into(), &"v1".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn voting_on_invalid_option_is_validation_error() {
        let (engine, _dir, storage, theatre_id) = test_engine().await;
        let open_at = chrono::Utc::now() - chrono::Duration::minutes(1);
        storage.put_gate(make_gate(&theatre_id, open_at)).await.unwrap();
        let gate_id: GateId = "g1".into();
        let err = engine
            .vote(&gate_id, &"u1".into(), &"Z".into(), &"v1".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
}
