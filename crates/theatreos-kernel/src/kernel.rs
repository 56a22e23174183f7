// SPDX-License-Identifier: Apache-2.0
//! `WorldKernel::apply_delta` and friends (spec §4.2).

use crate::hash::state_hash;
use std::collections::HashMap;
use std::sync::Arc;
use theatreos_storage::Storage;
use theatreos_themepack::registry::ThemePackRegistry;
use theatreos_types::world::{
    AppliedDeltaRecord, ApplyDeltaRequest, Holder, Snapshot, ThreadState, WorldState,
};
use theatreos_types::{DeltaId, EngineError, Event, EventKind, EventTarget, Instant, SnapshotId, TheatreId};
use tokio::sync::Mutex;
use tracing::{info, instrument};

type EngineResult<T> = Result<T, EngineError>;

/// Owns per-theatre serialization and exposes the Kernel's public
/// operations over a [`Storage`] backend and a [`ThemePackRegistry`]
/// allow-list.
pub struct WorldKernel<S: Storage> {
    storage: Arc<S>,
    registry: Arc<ThemePackRegistry>,
    theatre_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: Storage> WorldKernel<S> {
    /// Construct a Kernel over `storage`, consulting `registry` as the
    /// allow-list for every written name (spec §4.1 contract).
    #[must_use]
    pub fn new(storage: Arc<S>, registry: Arc<ThemePackRegistry>) -> Self {
        Self {
            storage,
            registry,
            theatre_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn theatre_lock(&self, theatre_id: &TheatreId) -> Arc<Mutex<()>> {
        let mut locks = self.theatre_locks.lock().await;
        locks
            .entry(theatre_id.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Current `{variables, threads, objects}` for `theatre_id` (spec §4.2
    /// `get_state`).
    pub async fn get_state(&self, theatre_id: &TheatreId) -> EngineResult<WorldState> {
        self.storage
            .get_world_state(theatre_id)
            .await
            .map_err(EngineError::from)
    }

    /// Apply a delta atomically and idempotently (spec §4.2 `apply_delta`,
    /// steps 1-7).
    #[instrument(skip(self, req), fields(theatre_id = %req.theatre_id, idempotency_key = %req.idempotency_key))]
    pub async fn apply_delta(&self, req: ApplyDeltaRequest) -> EngineResult<AppliedDeltaRecord> {
        let lock = self.theatre_lock(&req.theatre_id).await;
        let _guard = lock.lock().await;

        if let Some(existing) = self
            .storage
            .find_applied_delta(&req.theatre_id, &req.idempotency_key)
            .await
            .map_err(EngineError::from)?
        {
            info!("idempotent replay, no side effects");
            return Ok(existing);
        }

        let mut state = self
            .storage
            .get_world_state(&req.theatre_id)
            .await
            .map_err(EngineError::from)?;

        let mut events = Vec::new();
        let now = chrono::Utc::now();

        for change in &req.var_changes {
            let declared = self
                .registry
                .world_variable(&req.theatre_id, change.var_id.as_str())
                .map_err(|e| EngineError::Validation(e.to_string()))?
                .ok_or_else(|| {
                    EngineError::Validation(format!("unknown world variable {}", change.var_id))
                })?;

            if change.delta.abs() > declared.max_change_per_hour {
                return Err(EngineError::Validation(format!(
                    "variable {} change magnitude {} exceeds max_change_per_hour {}",
                    change.var_id,
                    change.delta.abs(),
                    declared.max_change_per_hour
                )));
            }

            let current = *state
                .variables
                .get(change.var_id.as_str())
                .unwrap_or(&declared.default_value);
            let raw = current + change.delta;
            let clamped = raw.clamp(declared.min_value, declared.max_value);
            state
                .variables
                .insert(change.var_id.as_str().to_string(), clamped);

            events.push(var_changed_event(&req.theatre_id, now, change.var_id.as_str(), clamped));
        }

        for change in &req.thread_changes {
            let declared = self
                .registry
                .thread(&req.theatre_id, change.thread_id.as_str())
                .map_err(|e| EngineError::Validation(e.to_string()))?
                .ok_or_else(|| {
                    EngineError::Validation(format!("unknown thread {}", change.thread_id))
                })?;

            let mut thread_state = state
                .threads
                .get(change.thread_id.as_str())
                .cloned()
                .unwrap_or_else(|| ThreadState {
                    phase: declared
                        .phases
                        .first()
                        .map(|p| p.phase.clone())
                        .unwrap_or_default(),
                    progress: 0.0,
                    last_advanced_at: now,
                });

            if let Some(new_phase) = &change.new_phase {
                if !declared.has_phase(new_phase) {
                    return Err(EngineError::Validation(format!(
                        "thread {} has no declared phase {}",
                        change.thread_id, new_phase
                    )));
                }
                thread_state.phase = new_phase.clone();
            }
            thread_state.progress = (thread_state.progress + change.progress_delta).clamp(0.0, 1.0);
            thread_state.last_advanced_at = now;

            state
                .threads
                .insert(change.thread_id.as_str().to_string(), thread_state.clone());

            events.push(thread_advanced_event(
                &req.theatre_id,
                now,
                change.thread_id.as_str(),
                &thread_state,
            ));
        }

        for change in &req.object_changes {
            let valid = self
                .registry
                .is_valid_object(&req.theatre_id, change.object_id.as_str())
                .map_err(|e| EngineError::Validation(e.to_string()))?;
            if !valid {
                return Err(EngineError::Validation(format!(
                    "unknown object {}",
                    change.object_id
                )));
            }

            let current_holder = state
                .objects
                .get(change.object_id.as_str())
                .cloned()
                .unwrap_or(Holder::Lost);
            if let Some(expected) = &change.expected_from {
                if expected != &current_holder {
                    return Err(EngineError::Conflict(format!(
                        "object {} expected holder {:?}, found {:?}",
                        change.object_id, expected, current_holder
                    )));
                }
            }

            state
                .objects
                .insert(change.object_id.as_str().to_string(), change.to.clone());

            events.push(object_moved_event(
                &req.theatre_id,
                now,
                change.object_id.as_str(),
                &change.to,
            ));
        }

        if events.is_empty() {
            return Err(EngineError::Validation(
                "delta carries no var, thread, or object changes".to_string(),
            ));
        }

        let delta_id = DeltaId::from(uuid::Uuid::new_v4().to_string());
        let record = AppliedDeltaRecord {
            delta_id: delta_id.clone(),
            theatre_id: req.theatre_id.clone(),
            idempotency_key: req.idempotency_key.clone(),
            cause: req.cause.clone(),
            var_changes: req.var_changes.clone(),
            thread_changes: req.thread_changes.clone(),
            object_changes: req.object_changes.clone(),
            applied_at: now,
        };

        for event in &mut events {
            event.produced_by_delta = Some(delta_id.as_str().to_string());
        }

        self.storage
            .commit_delta(&req.theatre_id, state, record.clone(), events)
            .await
            .map_err(EngineError::from)?;

        info!(delta_id = %delta_id, "delta applied");
        Ok(record)
    }

    /// Take a snapshot of `theatre_id`'s current state (spec §4.2
    /// `snapshot`).
    pub async fn snapshot(&self, theatre_id: &TheatreId) -> EngineResult<Snapshot> {
        let full_state = self
            .storage
            .get_world_state(theatre_id)
            .await
            .map_err(EngineError::from)?;
        let snapshot = Snapshot {
            snapshot_id: SnapshotId::from(uuid::Uuid::new_v4().to_string()),
            theatre_id: theatre_id.clone(),
            taken_at: chrono::Utc::now(),
            state_hash: state_hash(&full_state),
            full_state,
        };
        self.storage
            .put_snapshot(snapshot.clone())
            .await
            .map_err(EngineError::from)?;
        Ok(snapshot)
    }

    /// The most recent snapshot taken for `theatre_id`, if any.
    pub async fn latest_snapshot(&self, theatre_id: &TheatreId) -> EngineResult<Option<Snapshot>> {
        self.storage
            .latest_snapshot(theatre_id)
            .await
            .map_err(EngineError::from)
    }

    /// Events in `[from, to]` for `theatre_id` (spec §4.2 `replay`; P1:
    /// replaying these against an earlier snapshot reproduces current
    /// state).
    pub async fn replay(
        &self,
        theatre_id: &TheatreId,
        from: Instant,
        to: Instant,
    ) -> EngineResult<Vec<Event>> {
        self.storage
            .list_events(theatre_id, from, to)
            .await
            .map_err(EngineError::from)
    }
}

fn var_changed_event(theatre_id: &TheatreId, at: Instant, var_id: &str, value: f64) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: theatre_id.clone(),
        at,
        kind: EventKind::VarChanged,
        target: Some(EventTarget::theatre(theatre_id.clone())),
        payload: serde_json::json!({ "var_id": var_id, "value": value }),
        produced_by_delta: None,
    }
}

fn thread_advanced_event(
    theatre_id: &TheatreId,
    at: Instant,
    thread_id: &str,
    state: &ThreadState,
) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: theatre_id.clone(),
        at,
        kind: EventKind::ThreadAdvanced,
        target: Some(EventTarget::theatre(theatre_id.clone())),
        payload: serde_json::json!({
            "thread_id": thread_id,
            "phase": state.phase,
            "progress": state.progress,
        }),
        produced_by_delta: None,
    }
}

fn object_moved_event(theatre_id: &TheatreId, at: Instant, object_id: &str, holder: &Holder) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: theatre_id.clone(),
        at,
        kind: EventKind::ObjectMoved,
        target: Some(EventTarget::theatre(theatre_id.clone())),
        payload: serde_json::json!({ "object_id": object_id, "holder": holder }),
        produced_by_delta: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use theatreos_storage::memory::InMemoryStorage;
    use theatreos_types::world::{ObjectChange, ThreadChange, VarChange};

    fn write_pack(dir: &std::path::Path, body: &str) {
        let mut f = fs::File::create(dir.join("p1.json")).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    fn test_kernel() -> (WorldKernel<InMemoryStorage>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        write_pack(
            dir.path(),
            r#"{
                "metadata": {"pack_id": "p1", "name": "Test"},
                "world_variables": [
                    {"id": "v1", "default_value": 0.5, "min_value": 0.0, "max_value": 1.0, "max_change_per_hour": 0.15}
                ],
                "threads": [
                    {"thread_id": "t1", "name": "Main", "phases": [{"phase": "setup"}, {"phase": "climax"}]}
                ],
                "key_objects": [{"object_id": "o1", "name": "MacGuffin"}],
                "characters": [{"character_id": "c1", "name": "Ada"}],
                "beat_templates": [{"beat_id": "b1", "thread_id": "t1"}]
            }"#,
        );
        let registry = Arc::new(ThemePackRegistry::new(dir.path(), "p1"));
        let storage = Arc::new(InMemoryStorage::new());
        (WorldKernel::new(storage, registry), dir)
    }

    #[tokio::test]
    async fn idempotent_delta_applies_once() {
        let (kernel, _dir) = test_kernel();
        let theatre_id: TheatreId = "t1".into();
        let req = ApplyDeltaRequest {
            theatre_id: theatre_id.clone(),
            idempotency_key: "k1".into(),
            cause: "test".into(),
            var_changes: vec![VarChange {
                var_id: "v1".into(),
                delta: 0.1,
            }],
            thread_changes: vec![],
            object_changes: vec![],
        };

        kernel.apply_delta(req.clone()).await.unwrap();
        let state = kernel.get_state(&theatre_id).await.unwrap();
        assert!((state.variables["v1"] - 0.6).abs() < 1e-9);

        kernel.apply_delta(req).await.unwrap();
        let state = kernel.get_state(&theatre_id).await.unwrap();
        assert!((state.variables["v1"] - 0.6).abs() < 1e-9);

        let events = kernel
            .replay(
                &theatre_id,
                chrono::Utc::now() - chrono::Duration::hours(1),
                chrono::Utc::now() + chrono::Duration::hours(1),
            )
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn over_budget_change_is_rejected() {
        let (kernel, _dir) = test_kernel();
        let theatre_id: TheatreId = "t1".into();
        kernel
            .apply_delta(ApplyDeltaRequest {
                theatre_id: theatre_id.clone(),
                idempotency_key: "k1".into(),
                cause: "test".into(),
                var_changes: vec![VarChange {
                    var_id: "v1".into(),
                    delta: 0.1,
                }],
                thread_changes: vec![],
                object_changes: vec![],
            })
            .await
            .unwrap();

        let err = kernel
            .apply_delta(ApplyDeltaRequest {
                theatre_id: theatre_id.clone(),
                idempotency_key: "k2".into(),
                cause: "test".into(),
                var_changes: vec![VarChange {
                    var_id: "v1".into(),
                    delta: 0.2,
                }],
                thread_changes: vec![],
                object_changes: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let state = kernel.get_state(&theatre_id).await.unwrap();
        assert!((state.variables["v1"] - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn change_exactly_at_budget_is_accepted() {
        let (kernel, _dir) = test_kernel();
        let theatre_id: TheatreId = "t1".into();
        kernel
            .apply_delta(ApplyDeltaRequest {
                theatre_id,
                idempotency_key: "k1".into(),
                cause: "test".into(),
                var_changes: vec![VarChange {
                    var_id: "v1".into(),
                    delta: 0.15,
                }],
                thread_changes: vec![],
                object_changes: vec![],
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_variable_is_validation_error() {
        let (kernel, _dir) = test_kernel();
        let err = kernel
            .apply_delta(ApplyDeltaRequest {
                theatre_id: "t1".into(),
                idempotency_key: "k1".into(),
                cause: "test".into(),
                var_changes: vec![VarChange {
                    var_id: "nope".into(),
                    delta: 0.1,
                }],
                thread_changes: vec![],
                object_changes: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn object_holder_mismatch_is_conflict() {
        let (kernel, _dir) = test_kernel();
        let theatre_id: TheatreId = "t1".into();
        let err = kernel
            .apply_delta(ApplyDeltaRequest {
                theatre_id,
                idempotency_key: "k1".into(),
                cause: "test".into(),
                var_changes: vec![],
                thread_changes: vec![],
                object_changes: vec![ObjectChange {
                    object_id: "o1".into(),
                    expected_from: Some(Holder::User("u1".to_string())),
                    to: Holder::User("u2".to_string()),
                }],
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn thread_advances_through_declared_phase() {
        let (kernel, _dir) = test_kernel();
        let theatre_id: TheatreId = "t1".into();
        kernel
            .apply_delta(ApplyDeltaRequest {
                theatre_id: theatre_id.clone(),
                idempotency_key: "k1".into(),
                cause: "test".into(),
                var_changes: vec![],
                thread_changes: vec![ThreadChange {
                    thread_id: "t1".into(),
                    new_phase: Some("climax".to_string()),
                    progress_delta: 0.2,
                }],
                object_changes: vec![],
            })
            .await
            .unwrap();
        let state = kernel.get_state(&theatre_id).await.unwrap();
        assert_eq!(state.threads["t1"].phase, "climax");
    }

    #[tokio::test]
    async fn snapshot_hash_is_stable() {
        let (kernel, _dir) = test_kernel();
        let theatre_id: TheatreId = "t1".into();
        let snap1 = kernel.snapshot(&theatre_id).await.unwrap();
        let snap2 = kernel.snapshot(&theatre_id).await.unwrap();
        assert_eq!(snap1.state_hash, snap2.state_hash);
    }
}
