// SPDX-License-Identifier: Apache-2.0
//! `RumorEngine`: draft, publish, spread, debunk, stage heat (spec §4.6).

use rand::Rng;
use std::sync::Arc;
use theatreos_storage::{EventSink, Storage};
use theatreos_types::rumor::{
    Rumor, RumorStatus, Spread, CREDIBILITY_DECAY_PER_TICK, DEFAULT_EXPIRE_HOURS,
    DRAFT_COOLDOWN_MINUTES, MAX_CONTENT_CHARS, VIRAL_THRESHOLD,
};
use theatreos_types::trace::HeatLevel;
use theatreos_types::{
    CharacterId, EngineError, Event, EventKind, EventTarget, RumorId, StageId, ThreadId, TheatreId,
    UserId,
};
use tracing::{info, instrument};

type EngineResult<T> = Result<T, EngineError>;

/// Outcome of a `debunk` attempt (spec §4.6): the chance-based roll may fail
/// without that being an error.
#[derive(Debug, Clone)]
pub struct DebunkOutcome {
    /// The rumor targeted.
    pub rumor_id: RumorId,
    /// Whether the roll succeeded.
    pub debunked: bool,
}

/// Owns the Rumor Engine over a [`Storage`] backend, publishing realtime
/// notices through an [`EventSink`].
pub struct RumorEngine<S: Storage> {
    storage: Arc<S>,
    events: Arc<dyn EventSink>,
}

impl<S: Storage> RumorEngine<S> {
    /// Construct a Rumor Engine over `storage`, publishing through `events`.
    #[must_use]
    pub fn new(storage: Arc<S>, events: Arc<dyn EventSink>) -> Self {
        Self { storage, events }
    }

    /// Draft a rumor (spec §4.6 "draft"). Rejects content over
    /// [`MAX_CONTENT_CHARS`] and enforces a per-author cooldown of
    /// [`DRAFT_COOLDOWN_MINUTES`] since the author's last draft.
    #[instrument(skip(self, content))]
    pub async fn draft(
        &self,
        theatre_id: &TheatreId,
        author_id: &UserId,
        content: &str,
        target_thread: Option<ThreadId>,
        target_character: Option<CharacterId>,
    ) -> EngineResult<Rumor> {
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(EngineError::Validation(format!(
                "content exceeds {MAX_CONTENT_CHARS} characters"
            )));
        }

        let now = chrono::Utc::now();
        if let Some(last) = self
            .storage
            .last_draft_at(theatre_id, author_id)
            .await
            .map_err(EngineError::from)?
        {
            let cooldown_ends = last + chrono::Duration::minutes(DRAFT_COOLDOWN_MINUTES);
            if now < cooldown_ends {
                return Err(EngineError::RateLimited {
                    retry_after: cooldown_ends.to_rfc3339(),
                });
            }
        }

        let rumor = Rumor {
            rumor_id: RumorId::from(uuid::Uuid::new_v4().to_string()),
            theatre_id: theatre_id.clone(),
            author_id: author_id.clone(),
            content: content.to_string(),
            target_thread,
            target_character,
            status: RumorStatus::Draft,
            credibility: 0.5,
            spread_count: 0,
            created_at: now,
            published_at: None,
            expires_at: now + chrono::Duration::hours(DEFAULT_EXPIRE_HOURS),
        };
        self.storage.put_rumor(rumor.clone()).await.map_err(EngineError::from)?;
        info!(rumor_id = %rumor.rumor_id, "rumor drafted");
        Ok(rumor)
    }

    /// Publish a drafted rumor (spec §4.6 "publish"). Only the author may
    /// publish, and only from `Draft`.
    #[instrument(skip(self))]
    pub async fn publish(&self, rumor_id: &RumorId, author_id: &UserId) -> EngineResult<Rumor> {
        let mut rumor = self.storage.get_rumor(rumor_id).await.map_err(EngineError::from)?;
        if &rumor.author_id != author_id {
            return Err(EngineError::Forbidden("not the author".to_string()));
        }
        if rumor.status != RumorStatus::Draft {
            return Err(EngineError::Conflict("rumor is not in draft status".to_string()));
        }

        let now = chrono::Utc::now();
        rumor.status = RumorStatus::Active;
        rumor.published_at = Some(now);
        self.storage.update_rumor(rumor.clone()).await.map_err(EngineError::from)?;

        self.events.publish(rumor_published_event(&rumor, now)).await;
        info!(rumor_id = %rumor_id, "rumor published");
        Ok(rumor)
    }

    /// Spread a rumor (spec §4.6 "spread"). Requires `Active`/`Viral`, not
    /// expired, and no prior spread by `spreader_id` — a repeat spread is a
    /// `Validation` error, not a `Conflict` (spec end-to-end scenario 6).
    /// Auto-transitions to `Viral` at [`VIRAL_THRESHOLD`] spreads.
    #[instrument(skip(self))]
    pub async fn spread(
        &self,
        rumor_id: &RumorId,
        spreader_id: &UserId,
        stage_id: Option<StageId>,
    ) -> EngineResult<Rumor> {
        let mut rumor = self.storage.get_rumor(rumor_id).await.map_err(EngineError::from)?;
        if !matches!(rumor.status, RumorStatus::Active | RumorStatus::Viral) {
            return Err(EngineError::Conflict("rumor is not active".to_string()));
        }
        let now = chrono::Utc::now();
        if rumor.is_expired(now) {
            return Err(EngineError::Validation("rumor has expired".to_string()));
        }

        if self
            .storage
            .find_spread(rumor_id, spreader_id)
            .await
            .map_err(EngineError::from)?
            .is_some()
        {
            return Err(EngineError::Validation(format!(
                "{spreader_id} has already spread {rumor_id}"
            )));
        }

        self.storage
            .put_spread(Spread {
                spread_id: uuid::Uuid::new_v4().to_string().into(),
                rumor_id: rumor_id.clone(),
                spreader_id: spreader_id.clone(),
                stage_id: stage_id.clone(),
                at: now,
            })
            .await
            .map_err(EngineError::from)?;

        rumor.spread_count += 1;
        let just_turned_viral =
            rumor.status == RumorStatus::Active && rumor.spread_count >= VIRAL_THRESHOLD;
        if just_turned_viral {
            rumor.status = RumorStatus::Viral;
        }
        self.storage.update_rumor(rumor.clone()).await.map_err(EngineError::from)?;

        if just_turned_viral {
            self.events.publish(rumor_viral_event(&rumor, now)).await;
            info!(rumor_id = %rumor_id, "rumor went viral");
        }
        Ok(rumor)
    }

    /// Attempt to debunk a rumor (spec §4.6 "debunk"). Success chance is
    /// `min(0.3 + evidence_count * 0.2, 0.95)`. A failed roll is a normal
    /// outcome, not an error.
    #[instrument(skip(self))]
    pub async fn debunk(
        &self,
        rumor_id: &RumorId,
        debunker_id: &UserId,
        evidence_count: u32,
    ) -> EngineResult<DebunkOutcome> {
        let mut rumor = self.storage.get_rumor(rumor_id).await.map_err(EngineError::from)?;
        if rumor.status == RumorStatus::Debunked {
            return Err(EngineError::Conflict("already debunked".to_string()));
        }

        let success_chance = (0.3 + f64::from(evidence_count) * 0.2).min(0.95);
        let roll = rand::thread_rng().gen_range(0.0..1.0);
        let debunked = roll < success_chance;

        if debunked {
            rumor.status = RumorStatus::Debunked;
            rumor.credibility = 0.0;
            self.storage.update_rumor(rumor.clone()).await.map_err(EngineError::from)?;
            self.events
                .publish(rumor_debunked_event(&rumor, debunker_id, chrono::Utc::now()))
                .await;
            info!(rumor_id = %rumor_id, %debunker_id, "rumor debunked");
        }

        Ok(DebunkOutcome {
            rumor_id: rumor_id.clone(),
            debunked,
        })
    }

    /// Apply one scheduler tick's credibility decay to every rumor that
    /// wasn't spread since the last tick. Callers (the background driver)
    /// decide what "since the last tick" means; this just applies the flat
    /// decrement and floors at zero.
    pub async fn decay_credibility(&self, mut rumor: Rumor) -> EngineResult<Rumor> {
        rumor.credibility = (rumor.credibility - CREDIBILITY_DECAY_PER_TICK).max(0.0);
        self.storage.update_rumor(rumor.clone()).await.map_err(EngineError::from)?;
        Ok(rumor)
    }

    /// Flip every non-terminal rumor in `theatre_id` past `expires_at` to
    /// [`RumorStatus::Expired`] (spec §3 "Lifecycles": expired entities are
    /// read-only). Called by the expiry sweeper driver, not from request
    /// handlers — reads are already expiry-aware via `is_expired`.
    pub async fn sweep_expired(&self, theatre_id: &TheatreId, now: theatreos_types::Instant) -> EngineResult<usize> {
        let rumors = self.storage.list_rumors(theatre_id).await.map_err(EngineError::from)?;
        let mut swept = 0;
        for mut rumor in rumors {
            if rumor.is_expired(now)
                && !matches!(rumor.status, RumorStatus::Expired | RumorStatus::Debunked)
            {
                rumor.status = RumorStatus::Expired;
                self.storage.update_rumor(rumor).await.map_err(EngineError::from)?;
                swept += 1;
            }
        }
        Ok(swept)
    }

    /// List a theatre's rumors (spec §4.6 "list"); by default only
    /// `Active`/`Viral` and non-expired.
    pub async fn list(&self, theatre_id: &TheatreId, include_expired: bool) -> EngineResult<Vec<Rumor>> {
        let now = chrono::Utc::now();
        let rumors = self.storage.list_rumors(theatre_id).await.map_err(EngineError::from)?;
        Ok(rumors
            .into_iter()
            .filter(|r| matches!(r.status, RumorStatus::Active | RumorStatus::Viral))
            .filter(|r| include_expired || !r.is_expired(now))
            .collect())
    }

    /// A stage's rumor-spread heat, bucketed the same way trace density is
    /// (spec §4.6/§4.7 share one heat-level vocabulary).
    pub async fn stage_heat(&self, stage_id: &StageId) -> EngineResult<HeatLevel> {
        let total = self.storage.stage_heat(stage_id).await.map_err(EngineError::from)?;
        Ok(HeatLevel::from_count(total))
    }
}

fn rumor_published_event(rumor: &Rumor, at: theatreos_types::Instant) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: rumor.theatre_id.clone(),
        at,
        kind: EventKind::RumorPublished,
        target: Some(EventTarget::theatre(rumor.theatre_id.clone())),
        payload: serde_json::json!({ "rumor_id": rumor.rumor_id, "content": rumor.content }),
        produced_by_delta: None,
    }
}

fn rumor_viral_event(rumor: &Rumor, at: theatreos_types::Instant) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: rumor.theatre_id.clone(),
        at,
        kind: EventKind::RumorViral,
        target: Some(EventTarget::theatre(rumor.theatre_id.clone())),
        payload: serde_json::json!({ "rumor_id": rumor.rumor_id, "spread_count": rumor.spread_count }),
        produced_by_delta: None,
    }
}

fn rumor_debunked_event(rumor: &Rumor, debunker_id: &UserId, at: theatreos_types::Instant) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: rumor.theatre_id.clone(),
        at,
        kind: EventKind::RumorDebunked,
        target: Some(EventTarget::theatre(rumor.theatre_id.clone())),
        payload: serde_json::json!({ "rumor_id": rumor.rumor_id, "debunker_id": debunker_id }),
        produced_by_delta: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use theatreos_storage::memory::InMemoryStorage;
    use theatreos_storage::NullEventSink;

    fn engine() -> RumorEngine<InMemoryStorage> {
        RumorEngine::new(Arc::new(InMemoryStorage::new()), Arc::new(NullEventSink))
    }

    #[tokio::test]
    async fn draft_rejects_oversized_content() {
        let engine = engine();
        let content = "x".repeat(MAX_CONTENT_CHARS + 1);
        let err = engine
            .draft(&"t1".into(), &"u1".into(), &content, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn draft_enforces_cooldown() {
        let engine = engine();
        engine
            .draft(&"t1".into(), &"u1".into(), "first rumor", None, None)
            .await
            .unwrap();
        let err = engine
            .draft(&"t1".into(), &"u1".into(), "second rumor", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "rate_limited");
    }

    #[tokio::test]
    async fn publish_requires_author_and_draft_status() {
        let engine = engine();
        let rumor = engine
            .draft(&"t1".into(), &"u1".into(), "a claim", None, None)
            .await
            .unwrap();

        let err = engine.publish(&rumor.rumor_id, &"u2".into()).await.unwrap_err();
        assert_eq!(err.kind(), "forbidden");

        let published = engine.publish(&rumor.rumor_id, &"u1".into()).await.unwrap();
        assert_eq!(published.status, RumorStatus::Active);

        let err = engine.publish(&rumor.rumor_id, &"u1".into()).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn scenario_6_spread_to_viral_then_repeat_spreader_rejected() {
        let engine = engine();
        let rumor = engine
            .draft(&"t1".into(), &"u1".into(), "a claim", None, None)
            .await
            .unwrap();
        let published = engine.publish(&rumor.rumor_id, &"u1".into()).await.unwrap();

        let stage: StageId = "s1".into();
        let mut last = published;
        for i in 0..VIRAL_THRESHOLD {
            let spreader: UserId = format!("spreader-{i}").into();
            last = engine
                .spread(&rumor.rumor_id, &spreader, Some(stage.clone()))
                .await
                .unwrap();
        }
        assert_eq!(last.status, RumorStatus::Viral);
        assert_eq!(last.spread_count, VIRAL_THRESHOLD);

        let heat = engine.stage_heat(&stage).await.unwrap();
        assert_eq!(heat, HeatLevel::High);

        let err = engine
            .spread(&rumor.rumor_id, &"spreader-0".into(), Some(stage))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn debunk_rejects_once_already_debunked() {
        let engine = engine();
        let rumor = engine
            .draft(&"t1".into(), &"u1".into(), "a claim", None, None)
            .await
            .unwrap();
        engine.publish(&rumor.rumor_id, &"u1".into()).await.unwrap();

        // evidence_count high enough to force success_chance to 0.95, but the
        // roll is still probabilistic; drive status directly to debunked to
        // test the already-debunked guard deterministically.
        let mut r = engine.storage.get_rumor(&rumor.rumor_id).await.unwrap();
        r.status = RumorStatus::Debunked;
        r.credibility = 0.0;
        engine.storage.update_rumor(r).await.unwrap();

        let err = engine
            .debunk(&rumor.rumor_id, &"u2".into(), 5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }
}
