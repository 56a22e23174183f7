// SPDX-License-Identifier: Apache-2.0
//! `EvidenceEngine`: grant, lookup, verify, transfer, consume (spec §4.5).

use sha2::{Digest, Sha256};
use std::sync::Arc;
use theatreos_storage::{EventSink, Storage};
use theatreos_themepack::registry::ThemePackRegistry;
use theatreos_types::evidence::{
    ConsumeResult, Evidence, EvidenceGrade, EvidenceRarity, EvidenceTransfer, VerifyResult,
};
use theatreos_types::{
    EngineError, EvidenceId, EvidenceTypeId, Event, EventKind, EventTarget, Instant, StageId,
    TheatreId, UserId,
};
use tracing::{info, instrument};

type EngineResult<T> = Result<T, EngineError>;

/// Owns the Evidence Engine over a [`Storage`] backend and a
/// [`ThemePackRegistry`] allow-list for evidence types. Does not itself
/// write world state (spec §4.5 "Feedback": Kernel deltas derived from
/// granted evidence are the caller's responsibility, typically a beat
/// effect applied by the Scheduler's content pipeline).
pub struct EvidenceEngine<S: Storage> {
    storage: Arc<S>,
    registry: Arc<ThemePackRegistry>,
    events: Arc<dyn EventSink>,
}

impl<S: Storage> EvidenceEngine<S> {
    /// Construct an Evidence Engine over `storage` and `registry`,
    /// publishing realtime notices through `events`.
    #[must_use]
    pub fn new(storage: Arc<S>, registry: Arc<ThemePackRegistry>, events: Arc<dyn EventSink>) -> Self {
        Self {
            storage,
            registry,
            events,
        }
    }

    /// Grant evidence to `owner_id` (spec §4.5 "grant"). `expires_at` is
    /// set to `now + grade.ttl_hours()`.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, metadata), fields(theatre_id = %theatre_id, owner_id = %owner_id))]
    pub async fn grant(
        &self,
        theatre_id: &TheatreId,
        owner_id: &UserId,
        name: &str,
        grade: EvidenceGrade,
        rarity: EvidenceRarity,
        evidence_type: &EvidenceTypeId,
        source_scene: Option<String>,
        source_stage: Option<StageId>,
        metadata: serde_json::Value,
    ) -> EngineResult<Evidence> {
        if !self
            .registry
            .is_valid_evidence_type(theatre_id, evidence_type.as_str())
            .map_err(|e| EngineError::Validation(e.to_string()))?
        {
            return Err(EngineError::Validation(format!(
                "unknown evidence type {evidence_type}"
            )));
        }

        let now = chrono::Utc::now();
        let evidence = Evidence {
            evidence_id: EvidenceId::from(uuid::Uuid::new_v4().to_string()),
            theatre_id: theatre_id.clone(),
            owner_id: owner_id.clone(),
            name: name.to_string(),
            grade,
            rarity,
            evidence_type: evidence_type.clone(),
            source_scene,
            source_stage,
            obtained_at: now,
            expires_at: now + chrono::Duration::hours(grade.ttl_hours()),
            verified: false,
            tradeable: true,
            consumed: false,
            metadata,
        };
        self.storage
            .put_evidence(evidence.clone())
            .await
            .map_err(EngineError::from)?;

        self.events.publish(evidence_granted_event(&evidence)).await;
        info!(evidence_id = %evidence.evidence_id, grade = %evidence.grade, "evidence granted");
        Ok(evidence)
    }

    /// Fetch one item by id, expired or not (spec §3 "Lifecycles": readable
    /// past expiry).
    pub async fn get(&self, evidence_id: &EvidenceId) -> EngineResult<Evidence> {
        self.storage
            .get_evidence(evidence_id)
            .await
            .map_err(EngineError::from)
    }

    /// List every item owned by `owner_id` within `theatre_id`, expired or
    /// not.
    pub async fn list_for_owner(
        &self,
        theatre_id: &TheatreId,
        owner_id: &UserId,
    ) -> EngineResult<Vec<Evidence>> {
        self.storage
            .list_evidence_for_owner(theatre_id, owner_id)
            .await
            .map_err(EngineError::from)
    }

    /// Items in `theatre_id` expiring within `window` of `now`, not already
    /// consumed (spec §6 `evidence_expiring` event; driven by the expiry
    /// sweeper background driver, not called from request handlers).
    pub async fn expiring_within(
        &self,
        theatre_id: &TheatreId,
        now: Instant,
        window: chrono::Duration,
    ) -> EngineResult<Vec<Evidence>> {
        let items = self
            .storage
            .list_evidence_for_theatre(theatre_id)
            .await
            .map_err(EngineError::from)?;
        let horizon = now + window;
        Ok(items
            .into_iter()
            .filter(|e| !e.consumed && e.expires_at > now && e.expires_at <= horizon)
            .collect())
    }

    /// Publish one `evidence_expiring` notice for `evidence` (spec §6).
    /// Called by the expiry sweeper driver for each item `expiring_within`
    /// surfaces; does not mutate the item.
    pub async fn notify_expiring(&self, evidence: &Evidence) {
        self.events.publish(evidence_expiring_event(evidence)).await;
    }

    /// Verify authenticity (spec §4.5 "verify"). Without a challenge,
    /// returns the template-independent default confidence `0.95`. With a
    /// challenge, compares the supplied `response` against
    /// `sha256(evidence_id ‖ metadata.secret)` truncated to 8 hex chars.
    #[instrument(skip(self, challenge_response))]
    pub async fn verify(
        &self,
        evidence_id: &EvidenceId,
        challenge_response: Option<&str>,
    ) -> EngineResult<VerifyResult> {
        let mut evidence = self.storage.get_evidence(evidence_id).await.map_err(EngineError::from)?;
        let now = chrono::Utc::now();
        if evidence.is_expired(now) {
            return Err(EngineError::Validation("evidence has expired".to_string()));
        }
        if evidence.consumed {
            return Err(EngineError::Validation("evidence has been consumed".to_string()));
        }

        let (is_authentic, confidence) = match challenge_response {
            Some(response) => {
                let secret = evidence
                    .metadata
                    .get("secret")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("");
                let expected = challenge_digest(evidence_id, secret);
                let ok = response == expected;
                (ok, if ok { 1.0 } else { 0.0 })
            }
            None => (true, 0.95),
        };

        evidence.verified = is_authentic;
        self.storage
            .update_evidence(evidence.clone())
            .await
            .map_err(EngineError::from)?;

        Ok(VerifyResult {
            evidence_id: evidence_id.clone(),
            is_authentic,
            confidence,
            grade_bonus: if is_authentic { evidence.grade.verify_bonus() } else { 0.0 },
        })
    }

    /// Transfer ownership (spec §4.5 "transfer"): atomic owner-change plus
    /// audit record. Requires `from_user_id` is the current owner, the
    /// item isn't expired or consumed, and `tradeable`.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        evidence_id: &EvidenceId,
        from_user_id: &UserId,
        to_user_id: &UserId,
    ) -> EngineResult<Evidence> {
        let mut evidence = self.storage.get_evidence(evidence_id).await.map_err(EngineError::from)?;
        if &evidence.owner_id != from_user_id {
            return Err(EngineError::Forbidden("not the owner".to_string()));
        }
        if !evidence.tradeable {
            return Err(EngineError::Validation("evidence is not tradeable".to_string()));
        }
        let now = chrono::Utc::now();
        if evidence.is_expired(now) {
            return Err(EngineError::Validation("evidence has expired".to_string()));
        }
        if evidence.consumed {
            return Err(EngineError::Validation("evidence has been consumed".to_string()));
        }

        evidence.owner_id = to_user_id.clone();
        self.storage
            .update_evidence(evidence.clone())
            .await
            .map_err(EngineError::from)?;
        self.storage
            .put_evidence_transfer(EvidenceTransfer {
                evidence_id: evidence_id.clone(),
                from_user_id: from_user_id.clone(),
                to_user_id: to_user_id.clone(),
                at: now,
            })
            .await
            .map_err(EngineError::from)?;

        self.events
            .publish(evidence_transferred_event(&evidence, from_user_id, now))
            .await;
        info!(evidence_id = %evidence_id, to = %to_user_id, "evidence transferred");
        Ok(evidence)
    }

    /// Consume an item one-way (spec §4.5 "consume"): requires ownership,
    /// not already consumed, not expired. Reports the value returned
    /// (`grade.base_trade_value() * rarity.value_multiplier()`), from the
    /// original's `GRADE_CONFIG`/`RARITY_CONFIG` product.
    #[instrument(skip(self))]
    pub async fn consume(
        &self,
        evidence_id: &EvidenceId,
        user_id: &UserId,
        purpose: &str,
    ) -> EngineResult<ConsumeResult> {
        let mut evidence = self.storage.get_evidence(evidence_id).await.map_err(EngineError::from)?;
        if &evidence.owner_id != user_id {
            return Err(EngineError::Forbidden("not the owner".to_string()));
        }
        if evidence.consumed {
            return Err(EngineError::Validation("already consumed".to_string()));
        }
        let now = chrono::Utc::now();
        if evidence.is_expired(now) {
            return Err(EngineError::Validation("evidence has expired".to_string()));
        }

        evidence.consumed = true;
        self.storage
            .update_evidence(evidence.clone())
            .await
            .map_err(EngineError::from)?;

        let value_returned = evidence.grade.base_trade_value() * evidence.rarity.value_multiplier();
        info!(evidence_id = %evidence_id, value_returned, "evidence consumed");
        Ok(ConsumeResult {
            evidence_id: evidence_id.clone(),
            purpose: purpose.to_string(),
            value_returned,
        })
    }
}

/// `sha256(evidence_id ‖ ":" ‖ secret)` truncated to the first 8 hex
/// characters.
fn challenge_digest(evidence_id: &EvidenceId, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(evidence_id.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 8)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut s = String::with_capacity(chars);
    for b in bytes {
        if s.len() >= chars {
            break;
        }
        s.push_str(&format!("{b:02x}"));
    }
    s.truncate(chars);
    s
}

fn evidence_granted_event(evidence: &Evidence) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: evidence.theatre_id.clone(),
        at: evidence.obtained_at,
        kind: EventKind::EvidenceGranted,
        target: Some(EventTarget::user(evidence.owner_id.clone())),
        payload: serde_json::json!({
            "evidence_id": evidence.evidence_id,
            "grade": evidence.grade,
            "rarity": evidence.rarity,
        }),
        produced_by_delta: None,
    }
}

fn evidence_expiring_event(evidence: &Evidence) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: evidence.theatre_id.clone(),
        at: chrono::Utc::now(),
        kind: EventKind::EvidenceExpiring,
        target: Some(EventTarget::user(evidence.owner_id.clone())),
        payload: serde_json::json!({
            "evidence_id": evidence.evidence_id,
            "expires_at": evidence.expires_at,
        }),
        produced_by_delta: None,
    }
}

fn evidence_transferred_event(evidence: &Evidence, from_user_id: &UserId, at: Instant) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: evidence.theatre_id.clone(),
        at,
        kind: EventKind::EvidenceTransferred,
        target: Some(EventTarget::theatre(evidence.theatre_id.clone())),
        payload: serde_json::json!({
            "evidence_id": evidence.evidence_id,
            "from_user_id": from_user_id,
            "to_user_id": evidence.owner_id,
        }),
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

    fn write_pack(dir: &std::path::Path, body: &str) {
        let mut f = fs::File::create(dir.join("p1.json")).unwrap();
        f.write_all(body.as_bytes()).unwrap();
    }

    async fn test_engine() -> (EvidenceEngine<InMemoryStorage>, tempfile::TempDir, TheatreId) {
        let dir = tempfile::tempdir().unwrap();
        write_pack(
            dir.path(),
            r#"{
                "metadata": {"pack_id": "p1", "name": "Test"},
                "characters": [{"character_id": "c1", "name": "Ada"}],
                "threads": [{"thread_id": "t1", "name": "Main"}],
                "beat_templates": [{"beat_id": "b1", "thread_id": "t1"}],
                "evidence_types": [{"evidence_type_id": "et1", "name": "Letter"}]
            }"#,
        );
        let registry = Arc::new(ThemePackRegistry::new(dir.path(), "p1"));
        let theatre_id: TheatreId = "t1".into();
        registry.bind_theatre(&theatre_id, Some("p1")).unwrap();
        let storage = Arc::new(InMemoryStorage::new());
        let engine = EvidenceEngine::new(storage, registry, Arc::new(NullEventSink));
        (engine, dir, theatre_id)
    }

    #[tokio::test]
    async fn grant_rejects_unknown_evidence_type() {
        let (engine, _dir, theatre_id) = test_engine().await;
        let err = engine
            .grant(
                &theatre_id,
                &"u1".into(),
                "Mystery item",
                EvidenceGrade::C,
                EvidenceRarity::Common,
                &"unknown".into(),
                None,
                None,
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn scenario_5_transfer_then_expire() {
        let (engine, _dir, theatre_id) = test_engine().await;
        let u1: UserId = "u1".into();
        let u2: UserId = "u2".into();
        let u3: UserId = "u3".into();

        let evidence = engine
            .grant(
                &theatre_id,
                &u1,
                "Torn ticket stub",
                EvidenceGrade::C,
                EvidenceRarity::Common,
                &"et1".into(),
                None,
                None,
                serde_json::json!({}),
            )
            .await
            .unwrap();
        assert_eq!(evidence.grade.ttl_hours(), 24);

        let transferred = engine.transfer(&evidence.evidence_id, &u1, &u2).await.unwrap();
        assert_eq!(transferred.owner_id, u2);

        // simulate past expiry by writing the item back expired.
        let mut expired = transferred.clone();
        expired.expires_at = chrono::Utc::now() - chrono::Duration::minutes(1);
        engine.storage.update_evidence(expired).await.unwrap();

        let err = engine
            .transfer(&evidence.evidence_id, &u2, &u3)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let fetched = engine.get(&evidence.evidence_id).await.unwrap();
        assert!(fetched.is_expired(chrono::Utc::now()));
        assert_eq!(fetched.owner_id, u2);
    }

    #[tokio::test]
    async fn consume_is_one_way() {
        let (engine, _dir, theatre_id) = test_engine().await;
        let u1: UserId = "u1".into();
        let evidence = engine
            .grant(
                &theatre_id,
                &u1,
                "Bloodied note",
                EvidenceGrade::A,
                EvidenceRarity::Rare,
                &"et1".into(),
                None,
                None,
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let result = engine.consume(&evidence.evidence_id, &u1, "submit").await.unwrap();
        assert!((result.value_returned - 250.0).abs() < 1e-9);

        let err = engine.consume(&evidence.evidence_id, &u1, "submit").await.unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let err = engine
            .transfer(&evidence.evidence_id, &u1, &"u2".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn verify_with_challenge_checks_digest() {
        let (engine, _dir, theatre_id) = test_engine().await;
        let u1: UserId = "u1".into();
        let evidence = engine
            .grant(
                &theatre_id,
                &u1,
                "Coded letter",
                EvidenceGrade::B,
                EvidenceRarity::Uncommon,
                &"et1".into(),
                None,
                None,
                serde_json::json!({"secret": "midnight"}),
            )
            .await
            .unwrap();

        let expected = challenge_digest(&evidence.evidence_id, "midnight");
        let result = engine
            .verify(&evidence.evidence_id, Some(&expected))
            .await
            .unwrap();
        assert!(result.is_authentic);
        assert!((result.grade_bonus - 2.0).abs() < 1e-9);

        let bad = engine
            .verify(&evidence.evidence_id, Some("wrong"))
            .await
            .unwrap();
        assert!(!bad.is_authentic);
        assert_eq!(bad.confidence, 0.0);
    }
}
