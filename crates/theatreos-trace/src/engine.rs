// SPDX-License-Identifier: Apache-2.0
//! `TraceEngine`: leave, discover, stage density (spec §4.7).

use rand::Rng;
use std::sync::Arc;
use theatreos_storage::{EventSink, Storage};
use theatreos_types::trace::{HeatLevel, Trace, TraceDiscovery, TraceType, TraceVisibility};
use theatreos_types::{EngineError, Event, EventKind, EventTarget, StageId, TheatreId, TraceId, UserId};
use tracing::{info, instrument};

type EngineResult<T> = Result<T, EngineError>;

/// Outcome of a `discover` attempt (spec §4.7): the difficulty roll may
/// fail without that being an error, but the attempt still consumes the
/// caller's one shot at this trace.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    /// The trace attempted.
    pub trace_id: TraceId,
    /// Whether the roll succeeded.
    pub discovered: bool,
}

/// Owns the Trace Engine over a [`Storage`] backend, publishing realtime
/// notices through an [`EventSink`].
pub struct TraceEngine<S: Storage> {
    storage: Arc<S>,
    events: Arc<dyn EventSink>,
}

impl<S: Storage> TraceEngine<S> {
    /// Construct a Trace Engine over `storage`, publishing through `events`.
    #[must_use]
    pub fn new(storage: Arc<S>, events: Arc<dyn EventSink>) -> Self {
        Self { storage, events }
    }

    /// Leave a trace at a stage (spec §4.7 "leave"). TTL and default
    /// difficulty come from `trace_type`; `difficulty_override` lets a
    /// caller (e.g. a beat effect) set a harder or easier find.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, content), fields(stage_id = %stage_id))]
    pub async fn leave(
        &self,
        theatre_id: &TheatreId,
        creator_id: &UserId,
        stage_id: &StageId,
        trace_type: TraceType,
        content: Option<String>,
        visibility: TraceVisibility,
        difficulty_override: Option<f64>,
    ) -> EngineResult<Trace> {
        let now = chrono::Utc::now();
        let trace = Trace {
            trace_id: TraceId::from(uuid::Uuid::new_v4().to_string()),
            theatre_id: theatre_id.clone(),
            creator_id: creator_id.clone(),
            stage_id: stage_id.clone(),
            trace_type,
            content,
            visibility,
            discovery_difficulty: difficulty_override.unwrap_or_else(|| trace_type.default_difficulty()),
            created_at: now,
            expires_at: now + chrono::Duration::hours(trace_type.ttl_hours()),
            discovery_count: 0,
        };
        self.storage.put_trace(trace.clone()).await.map_err(EngineError::from)?;

        self.events.publish(trace_left_event(&trace)).await;
        info!(trace_id = %trace.trace_id, "trace left");
        Ok(trace)
    }

    /// Fetch one trace by id, expired or not.
    pub async fn get(&self, trace_id: &TraceId) -> EngineResult<Trace> {
        self.storage.get_trace(trace_id).await.map_err(EngineError::from)
    }

    /// Attempt to discover a trace (spec §4.7 "discover"). Requires the
    /// trace isn't expired and that `discoverer_id` has no prior attempt
    /// (storage enforces one discovery row per `(trace, discoverer)` and
    /// fails with `Conflict` on a repeat, success or failure alike, so a
    /// failed attempt cannot be retried). Success probability is
    /// `1 - discovery_difficulty`.
    #[instrument(skip(self))]
    pub async fn discover(&self, trace_id: &TraceId, discoverer_id: &UserId) -> EngineResult<DiscoveryOutcome> {
        let mut trace = self.storage.get_trace(trace_id).await.map_err(EngineError::from)?;
        let now = chrono::Utc::now();
        if trace.is_expired(now) {
            return Err(EngineError::Validation("trace has expired".to_string()));
        }

        let roll = rand::thread_rng().gen_range(0.0..1.0);
        let discovered = roll > trace.discovery_difficulty;

        self.storage
            .put_discovery(TraceDiscovery {
                trace_id: trace_id.clone(),
                discoverer_id: discoverer_id.clone(),
                succeeded: discovered,
                at: now,
            })
            .await
            .map_err(EngineError::from)?;

        if discovered {
            trace.discovery_count += 1;
            self.storage.update_trace(trace.clone()).await.map_err(EngineError::from)?;
            self.events
                .publish(trace_discovered_event(&trace, discoverer_id, now))
                .await;
            info!(trace_id = %trace_id, %discoverer_id, "trace discovered");
        }

        Ok(DiscoveryOutcome {
            trace_id: trace_id.clone(),
            discovered,
        })
    }

    /// List traces at a stage (spec §4.7 "list"), filtered by visibility:
    /// public traces to anyone, `crew`/`private` traces only to their
    /// creator. `viewer_id: None` sees only `public`.
    pub async fn list_at_stage(
        &self,
        stage_id: &StageId,
        viewer_id: Option<&UserId>,
        include_expired: bool,
    ) -> EngineResult<Vec<Trace>> {
        let now = chrono::Utc::now();
        let traces = self.storage.list_traces_at_stage(stage_id).await.map_err(EngineError::from)?;
        Ok(traces
            .into_iter()
            .filter(|t| include_expired || !t.is_expired(now))
            .filter(|t| match (t.visibility, viewer_id) {
                (TraceVisibility::Public, _) => true,
                (_, Some(viewer)) => &t.creator_id == viewer,
                (_, None) => false,
            })
            .collect())
    }

    /// A stage's live-trace density bucketed into a [`HeatLevel`] (spec
    /// §4.7 "density").
    pub async fn stage_density(&self, stage_id: &StageId) -> EngineResult<HeatLevel> {
        let now = chrono::Utc::now();
        let traces = self.storage.list_traces_at_stage(stage_id).await.map_err(EngineError::from)?;
        let total = traces.iter().filter(|t| !t.is_expired(now)).count();
        Ok(HeatLevel::from_count(u32::try_from(total).unwrap_or(u32::MAX)))
    }
}

fn trace_left_event(trace: &Trace) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: trace.theatre_id.clone(),
        at: trace.created_at,
        kind: EventKind::TraceLeft,
        target: Some(EventTarget::stage(trace.stage_id.clone())),
        payload: serde_json::json!({ "trace_id": trace.trace_id, "type": trace.trace_type }),
        produced_by_delta: None,
    }
}

fn trace_discovered_event(trace: &Trace, discoverer_id: &UserId, at: theatreos_types::Instant) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: trace.theatre_id.clone(),
        at,
        kind: EventKind::TraceDiscovered,
        target: Some(EventTarget::stage(trace.stage_id.clone())),
        payload: serde_json::json!({ "trace_id": trace.trace_id, "discoverer_id": discoverer_id }),
        produced_by_delta: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use theatreos_storage::memory::InMemoryStorage;
    use theatreos_storage::NullEventSink;

    fn engine() -> TraceEngine<InMemoryStorage> {
        TraceEngine::new(Arc::new(InMemoryStorage::new()), Arc::new(NullEventSink))
    }

    #[tokio::test]
    async fn leave_sets_ttl_and_default_difficulty_by_type() {
        let engine = engine();
        let trace = engine
            .leave(
                &"t1".into(),
                &"u1".into(),
                &"s1".into(),
                TraceType::Offering,
                Some("a carved token".to_string()),
                TraceVisibility::Public,
                None,
            )
            .await
            .unwrap();
        assert!((trace.discovery_difficulty - 0.7).abs() < 1e-9);
        let ttl = trace.expires_at - trace.created_at;
        assert_eq!(ttl.num_hours(), 168);
    }

    #[tokio::test]
    async fn discover_rejects_second_attempt_regardless_of_outcome() {
        let engine = engine();
        let trace = engine
            .leave(
                &"t1".into(),
                &"u1".into(),
                &"s1".into(),
                TraceType::Footprint,
                None,
                TraceVisibility::Public,
                Some(0.0),
            )
            .await
            .unwrap();

        let outcome = engine.discover(&trace.trace_id, &"u2".into()).await.unwrap();
        assert!(outcome.discovered);

        let err = engine.discover(&trace.trace_id, &"u2".into()).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn discover_rejects_expired_trace() {
        let engine = engine();
        let mut trace = engine
            .leave(
                &"t1".into(),
                &"u1".into(),
                &"s1".into(),
                TraceType::Footprint,
                None,
                TraceVisibility::Public,
                None,
            )
            .await
            .unwrap();
        trace.expires_at = chrono::Utc::now() - chrono::Duration::minutes(1);
        engine.storage.update_trace(trace.clone()).await.unwrap();

        let err = engine.discover(&trace.trace_id, &"u2".into()).await.unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn list_at_stage_hides_private_traces_from_others() {
        let engine = engine();
        let stage: StageId = "s1".into();
        engine
            .leave(
                &"t1".into(),
                &"u1".into(),
                &stage,
                TraceType::Message,
                Some("for crew only".to_string()),
                TraceVisibility::Private,
                None,
            )
            .await
            .unwrap();

        let as_stranger = engine.list_at_stage(&stage, Some(&"u2".into()), false).await.unwrap();
        assert!(as_stranger.is_empty());

        let as_creator = engine.list_at_stage(&stage, Some(&"u1".into()), false).await.unwrap();
        assert_eq!(as_creator.len(), 1);
    }

    #[tokio::test]
    async fn stage_density_buckets_heat_level() {
        let engine = engine();
        let stage: StageId = "s1".into();
        for i in 0..5 {
            engine
                .leave(
                    &"t1".into(),
                    &format!("u{i}").into(),
                    &stage,
                    TraceType::Footprint,
                    None,
                    TraceVisibility::Public,
                    None,
                )
                .await
                .unwrap();
        }
        let density = engine.stage_density(&stage).await.unwrap();
        assert_eq!(density, HeatLevel::Medium);
    }
}
