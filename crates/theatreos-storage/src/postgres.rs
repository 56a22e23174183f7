// SPDX-License-Identifier: Apache-2.0
//! The Postgres-backed [`Storage`] implementation (spec §6, migrations in
//! `migrations/0001_init.sql`). Entities are stored as a JSONB `data` column
//! plus the indexed columns callers filter on, the same two-speed layout
//! `paritytech-substrate-archive` uses for its archived block data.

use crate::error::{StorageError, StorageResult};
use crate::Storage;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use theatreos_types::crew::{Crew, CrewAction, Membership, SharedResource};
use theatreos_types::evidence::{Evidence, EvidenceTransfer};
use theatreos_types::gate::{GateInstance, GateState, Settlement, Stake, Vote, Wallet};
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

/// A connection pool wrapped in the shared `Storage` contract.
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to `database_url` and verify `migrations/` have been applied.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Run the bundled migrations against the connected database.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<serde_json::Value> {
        serde_json::to_value(value).map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> StorageResult<T> {
        serde_json::from_value(value).map_err(|e| StorageError::Backend(e.to_string()))
    }
}

fn event_kind_str(kind: theatreos_types::EventKind) -> &'static str {
    use theatreos_types::EventKind;
    match kind {
        EventKind::Tick => "tick",
        EventKind::WorldStateChanged => "world_state_changed",
        EventKind::VarChanged => "var_changed",
        EventKind::ThreadAdvanced => "thread_advanced",
        EventKind::ObjectMoved => "object_moved",
        EventKind::PlanGenerated => "plan_generated",
        EventKind::SceneStarted => "scene_started",
        EventKind::SceneEnded => "scene_ended",
        EventKind::GateOpened => "gate_opened",
        EventKind::GateClosing => "gate_closing",
        EventKind::GateResolved => "gate_resolved",
        EventKind::GateCancelled => "gate_cancelled",
        EventKind::VoteCast => "vote_cast",
        EventKind::StakePlaced => "stake_placed",
        EventKind::EvidenceGranted => "evidence_granted",
        EventKind::EvidenceTransferred => "evidence_transferred",
        EventKind::EvidenceExpiring => "evidence_expiring",
        EventKind::RumorPublished => "rumor_published",
        EventKind::RumorViral => "rumor_viral",
        EventKind::RumorDebunked => "rumor_debunked",
        EventKind::TraceLeft => "trace_left",
        EventKind::TraceDiscovered => "trace_discovered",
        EventKind::CrewActionStarted => "crew_action_started",
        EventKind::CrewActionCompleted => "crew_action_completed",
        EventKind::Notification => "notification",
        EventKind::Heartbeat => "heartbeat",
    }
}

fn gate_state_str(state: GateState) -> &'static str {
    match state {
        GateState::Scheduled => "scheduled",
        GateState::Open => "open",
        GateState::Closing => "closing",
        GateState::Resolved => "resolved",
        GateState::Cancelled => "cancelled",
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn put_theatre(&self, theatre: Theatre) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO theatres (theatre_id, name, city, timezone, bound_theme_pack_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (theatre_id) DO UPDATE SET
               name = EXCLUDED.name, city = EXCLUDED.city, timezone = EXCLUDED.timezone,
               bound_theme_pack_id = EXCLUDED.bound_theme_pack_id",
        )
        .bind(theatre.theatre_id.as_str())
        .bind(&theatre.name)
        .bind(&theatre.city)
        .bind(&theatre.timezone)
        .bind(theatre.bound_theme_pack_id.as_ref().map(|p| p.as_str()))
        .bind(theatre.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_theatre(&self, theatre_id: &TheatreId) -> StorageResult<Theatre> {
        let row = sqlx::query(
            "SELECT theatre_id, name, city, timezone, bound_theme_pack_id, created_at
             FROM theatres WHERE theatre_id = $1",
        )
        .bind(theatre_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::NotFound(format!("theatre {theatre_id}")))?;
        Ok(Theatre {
            theatre_id: row.get::<String, _>("theatre_id").into(),
            name: row.get("name"),
            city: row.get("city"),
            timezone: row.get("timezone"),
            bound_theme_pack_id: row
                .get::<Option<String>, _>("bound_theme_pack_id")
                .map(Into::into),
            created_at: row.get("created_at"),
        })
    }

    async fn list_theatres(&self) -> StorageResult<Vec<Theatre>> {
        let rows = sqlx::query(
            "SELECT theatre_id, name, city, timezone, bound_theme_pack_id, created_at FROM theatres",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| Theatre {
                theatre_id: row.get::<String, _>("theatre_id").into(),
                name: row.get("name"),
                city: row.get("city"),
                timezone: row.get("timezone"),
                bound_theme_pack_id: row
                    .get::<Option<String>, _>("bound_theme_pack_id")
                    .map(Into::into),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn set_bound_pack(
        &self,
        theatre_id: &TheatreId,
        pack_id: &ThemePackId,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE theatres SET bound_theme_pack_id = $2 WHERE theatre_id = $1",
        )
        .bind(theatre_id.as_str())
        .bind(pack_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("theatre {theatre_id}")));
        }
        Ok(())
    }

    async fn put_user(&self, user: User) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO users (user_id, display_name, role, active)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id) DO UPDATE SET
               display_name = EXCLUDED.display_name, role = EXCLUDED.role, active = EXCLUDED.active",
        )
        .bind(user.user_id.as_str())
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(user.active)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> StorageResult<User> {
        let row = sqlx::query("SELECT user_id, display_name, role, active FROM users WHERE user_id = $1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("user {user_id}")))?;
        let role_str: String = row.get("role");
        Ok(User {
            user_id: row.get::<String, _>("user_id").into(),
            display_name: row.get("display_name"),
            role: theatreos_types::Role::from_str_opt(&role_str)
                .ok_or_else(|| StorageError::Backend(format!("unknown role {role_str}")))?,
            active: row.get("active"),
        })
    }

    async fn put_stage(&self, stage: Stage) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO stages (stage_id, theatre_id, name, lat, lng, ring_c_m, ring_b_m, ring_a_m, tags)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (stage_id) DO UPDATE SET
               name = EXCLUDED.name, lat = EXCLUDED.lat, lng = EXCLUDED.lng,
               ring_c_m = EXCLUDED.ring_c_m, ring_b_m = EXCLUDED.ring_b_m, ring_a_m = EXCLUDED.ring_a_m,
               tags = EXCLUDED.tags",
        )
        .bind(stage.stage_id.as_str())
        .bind(stage.theatre_id.as_str())
        .bind(&stage.name)
        .bind(stage.lat)
        .bind(stage.lng)
        .bind(stage.ring_c_m)
        .bind(stage.ring_b_m)
        .bind(stage.ring_a_m)
        .bind(Self::to_json(&stage.tags)?)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_stage(&self, stage_id: &StageId) -> StorageResult<Stage> {
        let row = sqlx::query(
            "SELECT stage_id, theatre_id, name, lat, lng, ring_c_m, ring_b_m, ring_a_m, tags
             FROM stages WHERE stage_id = $1",
        )
        .bind(stage_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::NotFound(format!("stage {stage_id}")))?;
        Ok(Stage {
            stage_id: row.get::<String, _>("stage_id").into(),
            theatre_id: row.get::<String, _>("theatre_id").into(),
            name: row.get("name"),
            lat: row.get("lat"),
            lng: row.get("lng"),
            ring_c_m: row.get("ring_c_m"),
            ring_b_m: row.get("ring_b_m"),
            ring_a_m: row.get("ring_a_m"),
            tags: Self::from_json(row.get("tags"))?,
        })
    }

    async fn list_stages(&self, theatre_id: &TheatreId) -> StorageResult<Vec<Stage>> {
        let rows = sqlx::query(
            "SELECT stage_id, theatre_id, name, lat, lng, ring_c_m, ring_b_m, ring_a_m, tags
             FROM stages WHERE theatre_id = $1",
        )
        .bind(theatre_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                Ok(Stage {
                    stage_id: row.get::<String, _>("stage_id").into(),
                    theatre_id: row.get::<String, _>("theatre_id").into(),
                    name: row.get("name"),
                    lat: row.get("lat"),
                    lng: row.get("lng"),
                    ring_c_m: row.get("ring_c_m"),
                    ring_b_m: row.get("ring_b_m"),
                    ring_a_m: row.get("ring_a_m"),
                    tags: Self::from_json(row.get("tags"))?,
                })
            })
            .collect()
    }

    async fn get_wallet(&self, theatre_id: &TheatreId, user_id: &UserId) -> StorageResult<Wallet> {
        let row = sqlx::query(
            "INSERT INTO user_wallets (user_id, theatre_id, ticket_balance)
             VALUES ($1, $2, 0)
             ON CONFLICT (user_id, theatre_id) DO UPDATE SET user_id = EXCLUDED.user_id
             RETURNING ticket_balance",
        )
        .bind(user_id.as_str())
        .bind(theatre_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Wallet {
            user_id: user_id.clone(),
            theatre_id: theatre_id.clone(),
            ticket_balance: row.get::<i64, _>("ticket_balance") as u64,
        })
    }

    async fn debit_wallet(
        &self,
        theatre_id: &TheatreId,
        user_id: &UserId,
        amount: u64,
    ) -> StorageResult<u64> {
        self.get_wallet(theatre_id, user_id).await?;
        let row = sqlx::query(
            "UPDATE user_wallets SET ticket_balance = ticket_balance - $3
             WHERE user_id = $1 AND theatre_id = $2 AND ticket_balance >= $3
             RETURNING ticket_balance",
        )
        .bind(user_id.as_str())
        .bind(theatre_id.as_str())
        .bind(amount as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or_else(|| StorageError::Conflict(format!("insufficient balance for {user_id}")))?;
        Ok(row.get::<i64, _>("ticket_balance") as u64)
    }

    async fn credit_wallet(
        &self,
        theatre_id: &TheatreId,
        user_id: &UserId,
        amount: u64,
    ) -> StorageResult<u64> {
        self.get_wallet(theatre_id, user_id).await?;
        let row = sqlx::query(
            "UPDATE user_wallets SET ticket_balance = ticket_balance + $3
             WHERE user_id = $1 AND theatre_id = $2
             RETURNING ticket_balance",
        )
        .bind(user_id.as_str())
        .bind(theatre_id.as_str())
        .bind(amount as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.get::<i64, _>("ticket_balance") as u64)
    }

    async fn get_world_state(&self, theatre_id: &TheatreId) -> StorageResult<WorldState> {
        let vars = sqlx::query("SELECT var_id, value FROM world_var_current WHERE theatre_id = $1")
            .bind(theatre_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let threads = sqlx::query(
            "SELECT thread_id, phase, progress, last_advanced_at FROM thread_state_current WHERE theatre_id = $1",
        )
        .bind(theatre_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        let objects = sqlx::query(
            "SELECT object_id, holder FROM object_holder_current WHERE theatre_id = $1",
        )
        .bind(theatre_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut state = WorldState::default();
        for row in vars {
            state
                .variables
                .insert(row.get::<String, _>("var_id"), row.get("value"));
        }
        for row in threads {
            state.threads.insert(
                row.get::<String, _>("thread_id"),
                theatreos_types::world::ThreadState {
                    phase: row.get("phase"),
                    progress: row.get("progress"),
                    last_advanced_at: row.get("last_advanced_at"),
                },
            );
        }
        for row in objects {
            let holder_text: String = row.get("holder");
            let holder = serde_json::from_str(&holder_text)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            state.objects.insert(row.get::<String, _>("object_id"), holder);
        }
        Ok(state)
    }

    async fn find_applied_delta(
        &self,
        theatre_id: &TheatreId,
        idempotency_key: &IdempotencyKey,
    ) -> StorageResult<Option<AppliedDeltaRecord>> {
        let Some(row) = sqlx::query(
            "SELECT delta_id FROM world_delta_idempotency WHERE theatre_id = $1 AND idempotency_key = $2",
        )
        .bind(theatre_id.as_str())
        .bind(&idempotency_key.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        let delta_id: String = row.get("delta_id");
        let delta_row = sqlx::query("SELECT data FROM world_deltas WHERE delta_id = $1")
            .bind(&delta_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Some(Self::from_json(delta_row.get("data"))?))
    }

    async fn commit_delta(
        &self,
        theatre_id: &TheatreId,
        new_state: WorldState,
        record: AppliedDeltaRecord,
        events: Vec<Event>,
    ) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let inserted = sqlx::query(
            "INSERT INTO world_delta_idempotency (theatre_id, idempotency_key, delta_id)
             VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(theatre_id.as_str())
        .bind(&record.idempotency_key.0)
        .bind(record.delta_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        if inserted.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!(
                "idempotency key {} already claimed",
                record.idempotency_key
            )));
        }

        sqlx::query(
            "INSERT INTO world_deltas (delta_id, theatre_id, idempotency_key, cause, data, applied_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(record.delta_id.as_str())
        .bind(theatre_id.as_str())
        .bind(&record.idempotency_key.0)
        .bind(&record.cause)
        .bind(Self::to_json(&record)?)
        .bind(record.applied_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        for (var_id, value) in &new_state.variables {
            sqlx::query(
                "INSERT INTO world_var_current (theatre_id, var_id, value, updated_at)
                 VALUES ($1, $2, $3, now())
                 ON CONFLICT (theatre_id, var_id) DO UPDATE SET value = EXCLUDED.value, updated_at = now()",
            )
            .bind(theatre_id.as_str())
            .bind(var_id)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        for (thread_id, thread_state) in &new_state.threads {
            sqlx::query(
                "INSERT INTO thread_state_current (theatre_id, thread_id, phase, progress, last_advanced_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (theatre_id, thread_id) DO UPDATE SET
                   phase = EXCLUDED.phase, progress = EXCLUDED.progress, last_advanced_at = EXCLUDED.last_advanced_at",
            )
            .bind(theatre_id.as_str())
            .bind(thread_id)
            .bind(&thread_state.phase)
            .bind(thread_state.progress)
            .bind(thread_state.last_advanced_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        for (object_id, holder) in &new_state.objects {
            sqlx::query(
                "INSERT INTO object_holder_current (theatre_id, object_id, holder, updated_at)
                 VALUES ($1, $2, $3, now())
                 ON CONFLICT (theatre_id, object_id) DO UPDATE SET holder = EXCLUDED.holder, updated_at = now()",
            )
            .bind(theatre_id.as_str())
            .bind(object_id)
            .bind(serde_json::to_string(holder).map_err(|e| StorageError::Backend(e.to_string()))?)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        }

        for event in events {
            sqlx::query(
                "INSERT INTO world_event_log (event_id, theatre_id, at, kind, target, payload, produced_by_delta)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(event.event_id.as_str())
            .bind(theatre_id.as_str())
            .bind(event.at)
            .bind(event_kind_str(event.kind))
            .bind(event.target.as_ref().map(Self::to_json).transpose()?)
            .bind(&event.payload)
            .bind(&event.produced_by_delta)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn put_snapshot(&self, snapshot: Snapshot) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO world_state_snapshot (snapshot_id, theatre_id, taken_at, state_hash, full_state)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(snapshot.snapshot_id.as_str())
        .bind(snapshot.theatre_id.as_str())
        .bind(snapshot.taken_at)
        .bind(&snapshot.state_hash)
        .bind(Self::to_json(&snapshot.full_state)?)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn latest_snapshot(&self, theatre_id: &TheatreId) -> StorageResult<Option<Snapshot>> {
        let Some(row) = sqlx::query(
            "SELECT snapshot_id, taken_at, state_hash, full_state FROM world_state_snapshot
             WHERE theatre_id = $1 ORDER BY taken_at DESC LIMIT 1",
        )
        .bind(theatre_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        Ok(Some(Snapshot {
            snapshot_id: row.get::<String, _>("snapshot_id").into(),
            theatre_id: theatre_id.clone(),
            taken_at: row.get("taken_at"),
            state_hash: row.get("state_hash"),
            full_state: Self::from_json(row.get("full_state"))?,
        }))
    }

    async fn list_events(
        &self,
        theatre_id: &TheatreId,
        from: Instant,
        to: Instant,
    ) -> StorageResult<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT event_id, at, kind, target, payload, produced_by_delta FROM world_event_log
             WHERE theatre_id = $1 AND at >= $2 AND at <= $3 ORDER BY at ASC",
        )
        .bind(theatre_id.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                let target: Option<serde_json::Value> = row.get("target");
                let kind_str: String = row.get("kind");
                Ok(Event {
                    event_id: row.get::<String, _>("event_id").into(),
                    theatre_id: theatre_id.clone(),
                    at: row.get("at"),
                    kind: Self::from_json(serde_json::Value::String(kind_str))?,
                    target: target.map(Self::from_json).transpose()?,
                    payload: row.get("payload"),
                    produced_by_delta: row.get("produced_by_delta"),
                })
            })
            .collect()
    }

    async fn put_plan(&self, plan: HourPlan) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO hour_plans (plan_id, theatre_id, slot_start, source, data, generated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(plan.plan_id.as_str())
        .bind(plan.theatre_id.as_str())
        .bind(plan.slot_start)
        .bind(Self::to_json(&plan.source)?.as_str().unwrap_or_default().to_string())
        .bind(Self::to_json(&plan)?)
        .bind(plan.generated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn recent_plans(
        &self,
        theatre_id: &TheatreId,
        limit: usize,
    ) -> StorageResult<Vec<HourPlan>> {
        let rows = sqlx::query(
            "SELECT data FROM hour_plans WHERE theatre_id = $1 ORDER BY slot_start DESC LIMIT $2",
        )
        .bind(theatre_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(|row| Self::from_json(row.get("data"))).collect()
    }

    async fn put_gate(&self, gate: GateInstance) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO gate_instances
               (gate_id, theatre_id, slot_id, template_id, data, state, open_at, close_at, resolve_at, winning_option, settled_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(gate.gate_id.as_str())
        .bind(gate.theatre_id.as_str())
        .bind(gate.slot_id.as_str())
        .bind(gate.template_id.as_str())
        .bind(Self::to_json(&gate)?)
        .bind(gate_state_str(gate.state))
        .bind(gate.open_at)
        .bind(gate.close_at)
        .bind(gate.resolve_at)
        .bind(gate.winning_option.as_ref().map(|o| o.as_str().to_string()))
        .bind(gate.settled_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_gate(&self, gate_id: &GateId) -> StorageResult<GateInstance> {
        let row = sqlx::query("SELECT data FROM gate_instances WHERE gate_id = $1")
            .bind(gate_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("gate {gate_id}")))?;
        Self::from_json(row.get("data"))
    }

    async fn update_gate(&self, gate: GateInstance) -> StorageResult<()> {
        sqlx::query(
            "UPDATE gate_instances SET data = $2, state = $3, winning_option = $4, settled_at = $5
             WHERE gate_id = $1",
        )
        .bind(gate.gate_id.as_str())
        .bind(Self::to_json(&gate)?)
        .bind(gate_state_str(gate.state))
        .bind(gate.winning_option.as_ref().map(|o| o.as_str().to_string()))
        .bind(gate.settled_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn due_gates(
        &self,
        theatre_id: &TheatreId,
        now: Instant,
    ) -> StorageResult<Vec<GateInstance>> {
        let rows = sqlx::query(
            "SELECT data FROM gate_instances WHERE theatre_id = $1 AND
               ((state = 'scheduled' AND open_at <= $2) OR
                (state = 'open' AND close_at <= $2) OR
                (state = 'closing' AND resolve_at <= $2))",
        )
        .bind(theatre_id.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(|row| Self::from_json(row.get("data"))).collect()
    }

    async fn upsert_vote(&self, vote: Vote) -> StorageResult<Vote> {
        sqlx::query(
            "INSERT INTO gate_votes (vote_id, gate_id, user_id, option_id, cast_at, idempotency_key)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (gate_id, user_id) DO UPDATE SET
               vote_id = EXCLUDED.vote_id, option_id = EXCLUDED.option_id,
               cast_at = EXCLUDED.cast_at, idempotency_key = EXCLUDED.idempotency_key",
        )
        .bind(vote.vote_id.as_str())
        .bind(vote.gate_id.as_str())
        .bind(vote.user_id.as_str())
        .bind(vote.option_id.as_str())
        .bind(vote.cast_at)
        .bind(&vote.idempotency_key.0)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(vote)
    }

    async fn get_vote(&self, gate_id: &GateId, user_id: &UserId) -> StorageResult<Option<Vote>> {
        let Some(row) = sqlx::query(
            "SELECT vote_id, option_id, cast_at, idempotency_key FROM gate_votes
             WHERE gate_id = $1 AND user_id = $2",
        )
        .bind(gate_id.as_str())
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        Ok(Some(Vote {
            vote_id: row.get::<String, _>("vote_id").into(),
            gate_id: gate_id.clone(),
            user_id: user_id.clone(),
            option_id: row.get::<String, _>("option_id").into(),
            cast_at: row.get("cast_at"),
            idempotency_key: row.get::<String, _>("idempotency_key").into(),
        }))
    }

    async fn list_votes(&self, gate_id: &GateId) -> StorageResult<Vec<Vote>> {
        let rows = sqlx::query(
            "SELECT vote_id, user_id, option_id, cast_at, idempotency_key FROM gate_votes WHERE gate_id = $1",
        )
        .bind(gate_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| Vote {
                vote_id: row.get::<String, _>("vote_id").into(),
                gate_id: gate_id.clone(),
                user_id: row.get::<String, _>("user_id").into(),
                option_id: row.get::<String, _>("option_id").into(),
                cast_at: row.get("cast_at"),
                idempotency_key: row.get::<String, _>("idempotency_key").into(),
            })
            .collect())
    }

    async fn find_stake_by_idem(
        &self,
        gate_id: &GateId,
        idempotency_key: &IdempotencyKey,
    ) -> StorageResult<Option<Stake>> {
        let Some(row) = sqlx::query(
            "SELECT stake_id, user_id, option_id, amount, placed_at, refunded FROM gate_stakes
             WHERE gate_id = $1 AND idempotency_key = $2",
        )
        .bind(gate_id.as_str())
        .bind(&idempotency_key.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        Ok(Some(Stake {
            stake_id: row.get::<String, _>("stake_id").into(),
            gate_id: gate_id.clone(),
            user_id: row.get::<String, _>("user_id").into(),
            option_id: row.get::<String, _>("option_id").into(),
            amount: row.get::<i64, _>("amount") as u64,
            placed_at: row.get("placed_at"),
            idempotency_key: idempotency_key.clone(),
            refunded: row.get("refunded"),
        }))
    }

    async fn place_stake(&self, theatre_id: &TheatreId, stake: Stake) -> StorageResult<Stake> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        sqlx::query(
            "INSERT INTO user_wallets (user_id, theatre_id, ticket_balance) VALUES ($1, $2, 0)
             ON CONFLICT (user_id, theatre_id) DO NOTHING",
        )
        .bind(stake.user_id.as_str())
        .bind(theatre_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let debited = sqlx::query(
            "UPDATE user_wallets SET ticket_balance = ticket_balance - $3
             WHERE user_id = $1 AND theatre_id = $2 AND ticket_balance >= $3",
        )
        .bind(stake.user_id.as_str())
        .bind(theatre_id.as_str())
        .bind(stake.amount as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        if debited.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!(
                "insufficient balance for {}",
                stake.user_id
            )));
        }

        sqlx::query(
            "INSERT INTO gate_stakes (stake_id, gate_id, user_id, option_id, amount, placed_at, idempotency_key)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(stake.stake_id.as_str())
        .bind(stake.gate_id.as_str())
        .bind(stake.user_id.as_str())
        .bind(stake.option_id.as_str())
        .bind(stake.amount as i64)
        .bind(stake.placed_at)
        .bind(&stake.idempotency_key.0)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(stake)
    }

    async fn list_stakes(&self, gate_id: &GateId) -> StorageResult<Vec<Stake>> {
        let rows = sqlx::query(
            "SELECT stake_id, user_id, option_id, amount, placed_at, idempotency_key, refunded
             FROM gate_stakes WHERE gate_id = $1",
        )
        .bind(gate_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|row| Stake {
                stake_id: row.get::<String, _>("stake_id").into(),
                gate_id: gate_id.clone(),
                user_id: row.get::<String, _>("user_id").into(),
                option_id: row.get::<String, _>("option_id").into(),
                amount: row.get::<i64, _>("amount") as u64,
                placed_at: row.get("placed_at"),
                idempotency_key: row.get::<String, _>("idempotency_key").into(),
                refunded: row.get("refunded"),
            })
            .collect())
    }

    async fn mark_stake_refunded(&self, stake_id: &StakeId) -> StorageResult<()> {
        let result = sqlx::query("UPDATE gate_stakes SET refunded = true WHERE stake_id = $1")
            .bind(stake_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("stake {stake_id}")));
        }
        Ok(())
    }

    async fn put_settlement(&self, settlement: Settlement) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO gate_settlements (settlement_id, gate_id, stake_id, user_id, payout, settled_at)
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (stake_id) DO NOTHING",
        )
        .bind(format!("{}:{}", settlement.gate_id, settlement.stake_id))
        .bind(settlement.gate_id.as_str())
        .bind(settlement.stake_id.as_str())
        .bind(settlement.user_id.as_str())
        .bind(settlement.payout as i64)
        .bind(settlement.settled_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn find_settlement(
        &self,
        gate_id: &GateId,
        stake_id: &StakeId,
    ) -> StorageResult<Option<Settlement>> {
        let Some(row) = sqlx::query(
            "SELECT user_id, payout, settled_at FROM gate_settlements WHERE gate_id = $1 AND stake_id = $2",
        )
        .bind(gate_id.as_str())
        .bind(stake_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        Ok(Some(Settlement {
            gate_id: gate_id.clone(),
            stake_id: stake_id.clone(),
            user_id: row.get::<String, _>("user_id").into(),
            payout: row.get::<i64, _>("payout") as u64,
            settled_at: row.get("settled_at"),
        }))
    }

    async fn put_evidence(&self, evidence: Evidence) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO evidences (evidence_id, theatre_id, owner_id, data, expires_at, consumed)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(evidence.evidence_id.as_str())
        .bind(evidence.theatre_id.as_str())
        .bind(evidence.owner_id.as_str())
        .bind(Self::to_json(&evidence)?)
        .bind(evidence.expires_at)
        .bind(evidence.consumed)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_evidence(&self, evidence_id: &EvidenceId) -> StorageResult<Evidence> {
        let row = sqlx::query("SELECT data FROM evidences WHERE evidence_id = $1")
            .bind(evidence_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("evidence {evidence_id}")))?;
        Self::from_json(row.get("data"))
    }

    async fn update_evidence(&self, evidence: Evidence) -> StorageResult<()> {
        sqlx::query(
            "UPDATE evidences SET owner_id = $2, data = $3, consumed = $4 WHERE evidence_id = $1",
        )
        .bind(evidence.evidence_id.as_str())
        .bind(evidence.owner_id.as_str())
        .bind(Self::to_json(&evidence)?)
        .bind(evidence.consumed)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn put_evidence_transfer(&self, transfer: EvidenceTransfer) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO evidence_transfers (transfer_id, evidence_id, from_user_id, to_user_id, at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(transfer.evidence_id.as_str())
        .bind(transfer.from_user_id.as_str())
        .bind(transfer.to_user_id.as_str())
        .bind(transfer.at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_evidence_for_owner(
        &self,
        theatre_id: &TheatreId,
        owner_id: &UserId,
    ) -> StorageResult<Vec<Evidence>> {
        let rows = sqlx::query(
            "SELECT data FROM evidences WHERE theatre_id = $1 AND owner_id = $2",
        )
        .bind(theatre_id.as_str())
        .bind(owner_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(|row| Self::from_json(row.get("data"))).collect()
    }

    async fn list_evidence_for_theatre(&self, theatre_id: &TheatreId) -> StorageResult<Vec<Evidence>> {
        let rows = sqlx::query("SELECT data FROM evidences WHERE theatre_id = $1")
            .bind(theatre_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(|row| Self::from_json(row.get("data"))).collect()
    }

    async fn put_rumor(&self, rumor: Rumor) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO rumors (rumor_id, theatre_id, author_id, data, status, expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(rumor.rumor_id.as_str())
        .bind(rumor.theatre_id.as_str())
        .bind(rumor.author_id.as_str())
        .bind(Self::to_json(&rumor)?)
        .bind(Self::to_json(&rumor.status)?.as_str().unwrap_or_default().to_string())
        .bind(rumor.expires_at)
        .bind(rumor.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_rumor(&self, rumor_id: &RumorId) -> StorageResult<Rumor> {
        let row = sqlx::query("SELECT data FROM rumors WHERE rumor_id = $1")
            .bind(rumor_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("rumor {rumor_id}")))?;
        Self::from_json(row.get("data"))
    }

    async fn update_rumor(&self, rumor: Rumor) -> StorageResult<()> {
        sqlx::query("UPDATE rumors SET data = $2, status = $3 WHERE rumor_id = $1")
            .bind(rumor.rumor_id.as_str())
            .bind(Self::to_json(&rumor)?)
            .bind(Self::to_json(&rumor.status)?.as_str().unwrap_or_default().to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn put_spread(&self, spread: Spread) -> StorageResult<Spread> {
        sqlx::query(
            "INSERT INTO rumor_spreads (spread_id, rumor_id, spreader_id, stage_id, at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(spread.spread_id.as_str())
        .bind(spread.rumor_id.as_str())
        .bind(spread.spreader_id.as_str())
        .bind(spread.stage_id.as_ref().map(|s| s.as_str()))
        .bind(spread.at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return StorageError::Conflict(format!(
                        "spread already recorded for {}/{}",
                        spread.rumor_id, spread.spreader_id
                    ));
                }
            }
            StorageError::Backend(e.to_string())
        })?;
        Ok(spread)
    }

    async fn find_spread(
        &self,
        rumor_id: &RumorId,
        spreader_id: &UserId,
    ) -> StorageResult<Option<Spread>> {
        let Some(row) = sqlx::query(
            "SELECT spread_id, stage_id, at FROM rumor_spreads WHERE rumor_id = $1 AND spreader_id = $2",
        )
        .bind(rumor_id.as_str())
        .bind(spreader_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        Ok(Some(Spread {
            spread_id: row.get::<String, _>("spread_id").into(),
            rumor_id: rumor_id.clone(),
            spreader_id: spreader_id.clone(),
            stage_id: row.get::<Option<String>, _>("stage_id").map(Into::into),
            at: row.get("at"),
        }))
    }

    async fn last_draft_at(
        &self,
        theatre_id: &TheatreId,
        author_id: &UserId,
    ) -> StorageResult<Option<Instant>> {
        let row = sqlx::query(
            "SELECT created_at FROM rumors WHERE theatre_id = $1 AND author_id = $2
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(theatre_id.as_str())
        .bind(author_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.map(|r| r.get("created_at")))
    }

    async fn list_rumors(&self, theatre_id: &TheatreId) -> StorageResult<Vec<Rumor>> {
        let rows = sqlx::query("SELECT data FROM rumors WHERE theatre_id = $1")
            .bind(theatre_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(|row| Self::from_json(row.get("data"))).collect()
    }

    async fn stage_heat(&self, stage_id: &StageId) -> StorageResult<u32> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM rumor_spreads WHERE stage_id = $1")
            .bind(stage_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(row.get::<i64, _>("n") as u32)
    }

    async fn put_trace(&self, trace: Trace) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO traces (trace_id, theatre_id, stage_id, data, expires_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(trace.trace_id.as_str())
        .bind(trace.theatre_id.as_str())
        .bind(trace.stage_id.as_str())
        .bind(Self::to_json(&trace)?)
        .bind(trace.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_trace(&self, trace_id: &TraceId) -> StorageResult<Trace> {
        let row = sqlx::query("SELECT data FROM traces WHERE trace_id = $1")
            .bind(trace_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("trace {trace_id}")))?;
        Self::from_json(row.get("data"))
    }

    async fn update_trace(&self, trace: Trace) -> StorageResult<()> {
        sqlx::query("UPDATE traces SET data = $2 WHERE trace_id = $1")
            .bind(trace.trace_id.as_str())
            .bind(Self::to_json(&trace)?)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn put_discovery(&self, discovery: TraceDiscovery) -> StorageResult<TraceDiscovery> {
        sqlx::query(
            "INSERT INTO trace_discoveries (discovery_id, trace_id, discoverer_id, succeeded, at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(discovery.trace_id.as_str())
        .bind(discovery.discoverer_id.as_str())
        .bind(discovery.succeeded)
        .bind(discovery.at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return StorageError::Conflict(format!(
                        "discovery already attempted for {}/{}",
                        discovery.trace_id, discovery.discoverer_id
                    ));
                }
            }
            StorageError::Backend(e.to_string())
        })?;
        Ok(discovery)
    }

    async fn find_discovery(
        &self,
        trace_id: &TraceId,
        discoverer_id: &UserId,
    ) -> StorageResult<Option<TraceDiscovery>> {
        let Some(row) = sqlx::query(
            "SELECT succeeded, at FROM trace_discoveries WHERE trace_id = $1 AND discoverer_id = $2",
        )
        .bind(trace_id.as_str())
        .bind(discoverer_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        Ok(Some(TraceDiscovery {
            trace_id: trace_id.clone(),
            discoverer_id: discoverer_id.clone(),
            succeeded: row.get("succeeded"),
            at: row.get("at"),
        }))
    }

    async fn list_traces_at_stage(&self, stage_id: &StageId) -> StorageResult<Vec<Trace>> {
        let rows = sqlx::query("SELECT data FROM traces WHERE stage_id = $1")
            .bind(stage_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(|row| Self::from_json(row.get("data"))).collect()
    }

    async fn put_crew(&self, crew: Crew) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO crews (crew_id, theatre_id, name, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(crew.crew_id.as_str())
        .bind(crew.theatre_id.as_str())
        .bind(&crew.name)
        .bind(Self::to_json(&crew)?)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_crew(&self, crew_id: &CrewId) -> StorageResult<Crew> {
        let row = sqlx::query("SELECT data FROM crews WHERE crew_id = $1")
            .bind(crew_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("crew {crew_id}")))?;
        Self::from_json(row.get("data"))
    }

    async fn update_crew(&self, crew: Crew) -> StorageResult<()> {
        sqlx::query("UPDATE crews SET name = $2, data = $3 WHERE crew_id = $1")
            .bind(crew.crew_id.as_str())
            .bind(&crew.name)
            .bind(Self::to_json(&crew)?)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn remove_crew(&self, crew_id: &CrewId) -> StorageResult<()> {
        sqlx::query("DELETE FROM crews WHERE crew_id = $1")
            .bind(crew_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn put_membership(&self, membership: Membership) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO crew_memberships (crew_id, user_id, role, contribution, joined_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (crew_id, user_id) DO UPDATE SET
               role = EXCLUDED.role, contribution = EXCLUDED.contribution",
        )
        .bind(membership.crew_id.as_str())
        .bind(membership.user_id.as_str())
        .bind(Self::to_json(&membership.role)?.as_str().unwrap_or_default().to_string())
        .bind(membership.contribution as i64)
        .bind(membership.joined_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn update_membership(&self, membership: Membership) -> StorageResult<()> {
        self.put_membership(membership).await
    }

    async fn remove_membership(&self, crew_id: &CrewId, user_id: &UserId) -> StorageResult<()> {
        sqlx::query("DELETE FROM crew_memberships WHERE crew_id = $1 AND user_id = $2")
            .bind(crew_id.as_str())
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_membership(
        &self,
        theatre_id: &TheatreId,
        user_id: &UserId,
    ) -> StorageResult<Option<Membership>> {
        let Some(row) = sqlx::query(
            "SELECT m.crew_id, m.role, m.contribution, m.joined_at
             FROM crew_memberships m JOIN crews c ON c.crew_id = m.crew_id
             WHERE c.theatre_id = $1 AND m.user_id = $2",
        )
        .bind(theatre_id.as_str())
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        let role_str: String = row.get("role");
        Ok(Some(Membership {
            crew_id: row.get::<String, _>("crew_id").into(),
            user_id: user_id.clone(),
            role: Self::from_json(serde_json::Value::String(role_str))?,
            contribution: row.get::<i64, _>("contribution") as u64,
            joined_at: row.get("joined_at"),
        }))
    }

    async fn list_memberships(&self, crew_id: &CrewId) -> StorageResult<Vec<Membership>> {
        let rows = sqlx::query(
            "SELECT user_id, role, contribution, joined_at FROM crew_memberships WHERE crew_id = $1",
        )
        .bind(crew_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                let role_str: String = row.get("role");
                Ok(Membership {
                    crew_id: crew_id.clone(),
                    user_id: row.get::<String, _>("user_id").into(),
                    role: Self::from_json(serde_json::Value::String(role_str))?,
                    contribution: row.get::<i64, _>("contribution") as u64,
                    joined_at: row.get("joined_at"),
                })
            })
            .collect()
    }

    async fn put_crew_action(&self, action: CrewAction) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO crew_actions (action_id, crew_id, data, state, deadline)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(action.action_id.as_str())
        .bind(action.crew_id.as_str())
        .bind(Self::to_json(&action)?)
        .bind(Self::to_json(&action.state)?.as_str().unwrap_or_default().to_string())
        .bind(action.deadline)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_crew_action(&self, action_id: &CrewActionId) -> StorageResult<CrewAction> {
        let row = sqlx::query("SELECT data FROM crew_actions WHERE action_id = $1")
            .bind(action_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("crew_action {action_id}")))?;
        Self::from_json(row.get("data"))
    }

    async fn update_crew_action(&self, action: CrewAction) -> StorageResult<()> {
        sqlx::query("UPDATE crew_actions SET data = $2, state = $3 WHERE action_id = $1")
            .bind(action.action_id.as_str())
            .bind(Self::to_json(&action)?)
            .bind(Self::to_json(&action.state)?.as_str().unwrap_or_default().to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn put_shared_resource(&self, resource: SharedResource) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO shared_resources (resource_id, crew_id, data, claimed_by)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(resource.resource_id.as_str())
        .bind(resource.crew_id.as_str())
        .bind(Self::to_json(&resource)?)
        .bind(resource.claimed_by.as_ref().map(|u| u.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_shared_resource(
        &self,
        resource_id: &SharedResourceId,
    ) -> StorageResult<SharedResource> {
        let row = sqlx::query("SELECT data FROM shared_resources WHERE resource_id = $1")
            .bind(resource_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("shared_resource {resource_id}")))?;
        Self::from_json(row.get("data"))
    }

    async fn update_shared_resource(&self, resource: SharedResource) -> StorageResult<()> {
        sqlx::query("UPDATE shared_resources SET data = $2, claimed_by = $3 WHERE resource_id = $1")
            .bind(resource.resource_id.as_str())
            .bind(Self::to_json(&resource)?)
            .bind(resource.claimed_by.as_ref().map(|u| u.as_str()))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn list_shared_resources(&self, crew_id: &CrewId) -> StorageResult<Vec<SharedResource>> {
        let rows = sqlx::query("SELECT data FROM shared_resources WHERE crew_id = $1")
            .bind(crew_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        rows.into_iter().map(|row| Self::from_json(row.get("data"))).collect()
    }
}
