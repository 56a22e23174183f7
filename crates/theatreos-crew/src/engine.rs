// SPDX-License-Identifier: Apache-2.0
//! `CrewEngine`: create, invite, leave, collective actions, shared pool
//! (spec §4.8).

use std::sync::Arc;
use theatreos_storage::{EventSink, Storage};
use theatreos_types::crew::{Crew, CrewAction, CrewActionState, CrewRole, CrewTier, Membership, SharedResource};
use theatreos_types::{
    CrewActionId, CrewId, EngineError, Event, EventKind, EventTarget, SharedResourceId, TheatreId,
    UserId,
};
use tracing::{info, instrument};

type EngineResult<T> = Result<T, EngineError>;

/// Default deadline for a collective action (spec §4.8).
const DEFAULT_ACTION_DEADLINE_HOURS: i64 = 24;

/// Contribution earned per unit of resource shared (spec §4.8).
const CONTRIBUTION_PER_UNIT: u64 = 10;

/// Owns the Crew Engine over a [`Storage`] backend, publishing realtime
/// notices through an [`EventSink`].
pub struct CrewEngine<S: Storage> {
    storage: Arc<S>,
    events: Arc<dyn EventSink>,
}

impl<S: Storage> CrewEngine<S> {
    /// Construct a Crew Engine over `storage`, publishing through `events`.
    #[must_use]
    pub fn new(storage: Arc<S>, events: Arc<dyn EventSink>) -> Self {
        Self { storage, events }
    }

    /// Create a crew with `leader_id` as its sole `Leader` member (spec
    /// §4.8 "create"). Rejects a leader who already belongs to a crew in
    /// this theatre.
    #[instrument(skip(self))]
    pub async fn create_crew(
        &self,
        theatre_id: &TheatreId,
        leader_id: &UserId,
        name: &str,
        motto: Option<String>,
    ) -> EngineResult<Crew> {
        if self
            .storage
            .get_membership(theatre_id, leader_id)
            .await
            .map_err(EngineError::from)?
            .is_some()
        {
            return Err(EngineError::Conflict(
                "already in a crew in this theatre".to_string(),
            ));
        }

        let now = chrono::Utc::now();
        let crew = Crew {
            crew_id: CrewId::from(uuid::Uuid::new_v4().to_string()),
            theatre_id: theatre_id.clone(),
            name: name.to_string(),
            tier: CrewTier::Tier1,
            reputation: 0.0,
            total_contribution: 0,
            motto,
            settings: serde_json::json!({}),
            created_at: now,
        };
        self.storage.put_crew(crew.clone()).await.map_err(EngineError::from)?;
        self.storage
            .put_membership(Membership {
                crew_id: crew.crew_id.clone(),
                user_id: leader_id.clone(),
                role: CrewRole::Leader,
                contribution: 0,
                joined_at: now,
            })
            .await
            .map_err(EngineError::from)?;

        info!(crew_id = %crew.crew_id, "crew created");
        Ok(crew)
    }

    /// Invite `invitee_id` into `crew_id` (spec §4.8 "invite"). Requires
    /// `inviter_id` to be `Leader` or `Officer`, the invitee to have no
    /// existing membership in the crew, and the crew to be under its
    /// tier's `max_members`.
    #[instrument(skip(self))]
    pub async fn invite(
        &self,
        crew_id: &CrewId,
        inviter_id: &UserId,
        invitee_id: &UserId,
    ) -> EngineResult<Membership> {
        let crew = self.storage.get_crew(crew_id).await.map_err(EngineError::from)?;
        let members = self.storage.list_memberships(crew_id).await.map_err(EngineError::from)?;

        let inviter = members.iter().find(|m| &m.user_id == inviter_id);
        match inviter {
            Some(m) if matches!(m.role, CrewRole::Leader | CrewRole::Officer) => {}
            _ => return Err(EngineError::Forbidden("no permission to invite".to_string())),
        }

        if members.iter().any(|m| &m.user_id == invitee_id) {
            return Err(EngineError::Conflict("user already in crew".to_string()));
        }
        if u32::try_from(members.len()).unwrap_or(u32::MAX) >= crew.tier.max_members() {
            return Err(EngineError::Conflict(format!(
                "crew is full (max {} members)",
                crew.tier.max_members()
            )));
        }

        let membership = Membership {
            crew_id: crew_id.clone(),
            user_id: invitee_id.clone(),
            role: CrewRole::Member,
            contribution: 0,
            joined_at: chrono::Utc::now(),
        };
        self.storage
            .put_membership(membership.clone())
            .await
            .map_err(EngineError::from)?;
        info!(crew_id = %crew_id, %invitee_id, "member invited");
        Ok(membership)
    }

    /// Leave a crew (spec §4.8 "leave"). A `Leader` with other members
    /// present must transfer leadership first; a sole-member `Leader`
    /// disbands the crew.
    #[instrument(skip(self))]
    pub async fn leave(&self, crew_id: &CrewId, user_id: &UserId) -> EngineResult<()> {
        let members = self.storage.list_memberships(crew_id).await.map_err(EngineError::from)?;
        let membership = members
            .iter()
            .find(|m| &m.user_id == user_id)
            .ok_or_else(|| EngineError::NotFound("not a member of this crew".to_string()))?;

        if membership.role == CrewRole::Leader && members.len() > 1 {
            return Err(EngineError::Conflict(
                "leader must transfer leadership before leaving".to_string(),
            ));
        }

        if membership.role == CrewRole::Leader {
            for m in &members {
                self.storage
                    .remove_membership(crew_id, &m.user_id)
                    .await
                    .map_err(EngineError::from)?;
            }
            self.storage.remove_crew(crew_id).await.map_err(EngineError::from)?;
            info!(crew_id = %crew_id, "crew disbanded");
            return Ok(());
        }

        self.storage
            .remove_membership(crew_id, user_id)
            .await
            .map_err(EngineError::from)?;
        info!(crew_id = %crew_id, %user_id, "member left crew");
        Ok(())
    }

    /// Initiate a collective action (spec §4.8 "initiate_action"). Rejects
    /// an `initiator_id` who isn't a member, or a `kind` not in the crew's
    /// tier's `allowed_actions`. The initiator auto-participates.
    #[instrument(skip(self))]
    pub async fn initiate_action(
        &self,
        crew_id: &CrewId,
        initiator_id: &UserId,
        kind: &str,
        quorum: u32,
    ) -> EngineResult<CrewAction> {
        let crew = self.storage.get_crew(crew_id).await.map_err(EngineError::from)?;
        let membership = self
            .storage
            .get_membership(&crew.theatre_id, initiator_id)
            .await
            .map_err(EngineError::from)?;
        if membership.map(|m| m.crew_id) != Some(crew_id.clone()) {
            return Err(EngineError::Forbidden("not a member of this crew".to_string()));
        }
        if !crew.tier.allowed_actions().contains(&kind) {
            return Err(EngineError::Validation(format!(
                "action kind '{kind}' not available for tier {:?}",
                crew.tier
            )));
        }

        let now = chrono::Utc::now();
        let quorum = quorum.max(1);
        let action = CrewAction {
            action_id: CrewActionId::from(uuid::Uuid::new_v4().to_string()),
            crew_id: crew_id.clone(),
            kind: kind.to_string(),
            initiator_id: initiator_id.clone(),
            participants: vec![initiator_id.clone()],
            quorum,
            deadline: now + chrono::Duration::hours(DEFAULT_ACTION_DEADLINE_HOURS),
            state: if quorum <= 1 {
                CrewActionState::InProgress
            } else {
                CrewActionState::Pending
            },
        };
        self.storage.put_crew_action(action.clone()).await.map_err(EngineError::from)?;

        self.events.publish(crew_action_started_event(&action, &crew.theatre_id, now)).await;
        info!(action_id = %action.action_id, "collective action initiated");
        Ok(action)
    }

    /// Join a pending collective action (spec §4.8 "join_action"). Requires
    /// membership in the action's crew; transitions to `InProgress` once
    /// `quorum` is met.
    #[instrument(skip(self))]
    pub async fn join_action(&self, action_id: &CrewActionId, user_id: &UserId) -> EngineResult<CrewAction> {
        let mut action = self.storage.get_crew_action(action_id).await.map_err(EngineError::from)?;
        if action.state != CrewActionState::Pending {
            return Err(EngineError::Conflict("action is not pending".to_string()));
        }

        let crew = self.storage.get_crew(&action.crew_id).await.map_err(EngineError::from)?;
        let membership = self
            .storage
            .get_membership(&crew.theatre_id, user_id)
            .await
            .map_err(EngineError::from)?;
        if membership.map(|m| m.crew_id) != Some(action.crew_id.clone()) {
            return Err(EngineError::Forbidden("not a member of this crew".to_string()));
        }

        action.participants.push(user_id.clone());
        if u32::try_from(action.participants.len()).unwrap_or(u32::MAX) >= action.quorum {
            action.state = CrewActionState::InProgress;
        }
        self.storage.update_crew_action(action.clone()).await.map_err(EngineError::from)?;

        if action.state == CrewActionState::InProgress {
            self.events
                .publish(crew_action_completed_event(&action, &crew.theatre_id, chrono::Utc::now()))
                .await;
        }
        Ok(action)
    }

    /// Share a unit of resource into the crew's pool (spec §4.8
    /// "share_resource"). Requires membership; credits `quantity * 10`
    /// contribution to the sharer.
    #[instrument(skip(self))]
    pub async fn share_resource(
        &self,
        crew_id: &CrewId,
        contributor_id: &UserId,
        kind: &str,
        quantity: u64,
    ) -> EngineResult<SharedResource> {
        let crew = self.storage.get_crew(crew_id).await.map_err(EngineError::from)?;
        let mut membership = self
            .storage
            .get_membership(&crew.theatre_id, contributor_id)
            .await
            .map_err(EngineError::from)?
            .filter(|m| &m.crew_id == crew_id)
            .ok_or_else(|| EngineError::Forbidden("not a member of this crew".to_string()))?;

        let resource = SharedResource {
            resource_id: SharedResourceId::from(uuid::Uuid::new_v4().to_string()),
            crew_id: crew_id.clone(),
            kind: kind.to_string(),
            amount: quantity,
            contributor_id: contributor_id.clone(),
            claimed_by: None,
            shared_at: chrono::Utc::now(),
        };
        self.storage.put_shared_resource(resource.clone()).await.map_err(EngineError::from)?;

        membership.contribution += quantity * CONTRIBUTION_PER_UNIT;
        self.storage.update_membership(membership).await.map_err(EngineError::from)?;

        let mut crew = crew;
        crew.total_contribution += quantity * CONTRIBUTION_PER_UNIT;
        self.storage.update_crew(crew).await.map_err(EngineError::from)?;

        info!(resource_id = %resource.resource_id, "resource shared");
        Ok(resource)
    }

    /// Claim an unclaimed shared resource (spec §4.8 "claim_resource").
    /// Requires membership in the resource's crew.
    #[instrument(skip(self))]
    pub async fn claim_resource(
        &self,
        resource_id: &SharedResourceId,
        claimer_id: &UserId,
    ) -> EngineResult<SharedResource> {
        let mut resource = self
            .storage
            .get_shared_resource(resource_id)
            .await
            .map_err(EngineError::from)?;
        if resource.claimed_by.is_some() {
            return Err(EngineError::Conflict("resource already claimed".to_string()));
        }

        let crew = self.storage.get_crew(&resource.crew_id).await.map_err(EngineError::from)?;
        let membership = self
            .storage
            .get_membership(&crew.theatre_id, claimer_id)
            .await
            .map_err(EngineError::from)?;
        if membership.map(|m| m.crew_id) != Some(resource.crew_id.clone()) {
            return Err(EngineError::Forbidden("not a member of this crew".to_string()));
        }

        resource.claimed_by = Some(claimer_id.clone());
        self.storage
            .update_shared_resource(resource.clone())
            .await
            .map_err(EngineError::from)?;
        Ok(resource)
    }
}

fn crew_action_started_event(action: &CrewAction, theatre_id: &TheatreId, at: theatreos_types::Instant) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: theatre_id.clone(),
        at,
        kind: EventKind::CrewActionStarted,
        target: Some(EventTarget::theatre(theatre_id.clone())),
        payload: serde_json::json!({ "action_id": action.action_id, "crew_id": action.crew_id, "kind": action.kind }),
        produced_by_delta: None,
    }
}

fn crew_action_completed_event(action: &CrewAction, theatre_id: &TheatreId, at: theatreos_types::Instant) -> Event {
    Event {
        event_id: uuid::Uuid::new_v4().to_string().into(),
        theatre_id: theatre_id.clone(),
        at,
        kind: EventKind::CrewActionCompleted,
        target: Some(EventTarget::theatre(theatre_id.clone())),
        payload: serde_json::json!({ "action_id": action.action_id, "crew_id": action.crew_id }),
        produced_by_delta: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use theatreos_storage::memory::InMemoryStorage;
    use theatreos_storage::NullEventSink;

    fn engine() -> CrewEngine<InMemoryStorage> {
        CrewEngine::new(Arc::new(InMemoryStorage::new()), Arc::new(NullEventSink))
    }

    #[tokio::test]
    async fn create_crew_rejects_existing_membership() {
        let engine = engine();
        let theatre: TheatreId = "t1".into();
        let leader: UserId = "u1".into();
        engine.create_crew(&theatre, &leader, "Night Watch", None).await.unwrap();

        let err = engine
            .create_crew(&theatre, &leader, "Second Crew", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn invite_respects_role_and_capacity() {
        let engine = engine();
        let theatre: TheatreId = "t1".into();
        let leader: UserId = "u1".into();
        let crew = engine.create_crew(&theatre, &leader, "Night Watch", None).await.unwrap();

        let member: UserId = "member".into();
        let err = engine.invite(&crew.crew_id, &member, &"u2".into()).await.unwrap_err();
        assert_eq!(err.kind(), "forbidden");

        engine.invite(&crew.crew_id, &leader, &member).await.unwrap();
        let err = engine.invite(&crew.crew_id, &leader, &member).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn leader_must_transfer_before_leaving_nonempty_crew() {
        let engine = engine();
        let theatre: TheatreId = "t1".into();
        let leader: UserId = "u1".into();
        let crew = engine.create_crew(&theatre, &leader, "Night Watch", None).await.unwrap();
        engine.invite(&crew.crew_id, &leader, &"u2".into()).await.unwrap();

        let err = engine.leave(&crew.crew_id, &leader).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn sole_leader_leaving_disbands_crew() {
        let engine = engine();
        let theatre: TheatreId = "t1".into();
        let leader: UserId = "u1".into();
        let crew = engine.create_crew(&theatre, &leader, "Night Watch", None).await.unwrap();

        engine.leave(&crew.crew_id, &leader).await.unwrap();
        let err = engine.storage.get_crew(&crew.crew_id).await.unwrap_err();
        assert!(matches!(err, theatreos_storage::StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn initiate_action_gates_on_tier_allowed_actions() {
        let engine = engine();
        let theatre: TheatreId = "t1".into();
        let leader: UserId = "u1".into();
        let crew = engine.create_crew(&theatre, &leader, "Night Watch", None).await.unwrap();

        let err = engine
            .initiate_action(&crew.crew_id, &leader, "territory_claim", 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let action = engine
            .initiate_action(&crew.crew_id, &leader, "group_vote", 1)
            .await
            .unwrap();
        assert_eq!(action.state, CrewActionState::InProgress);
    }

    #[tokio::test]
    async fn join_action_reaches_quorum() {
        let engine = engine();
        let theatre: TheatreId = "t1".into();
        let leader: UserId = "u1".into();
        let crew = engine.create_crew(&theatre, &leader, "Night Watch", None).await.unwrap();
        let member: UserId = "u2".into();
        engine.invite(&crew.crew_id, &leader, &member).await.unwrap();

        let action = engine
            .initiate_action(&crew.crew_id, &leader, "group_vote", 2)
            .await
            .unwrap();
        assert_eq!(action.state, CrewActionState::Pending);

        let joined = engine.join_action(&action.action_id, &member).await.unwrap();
        assert_eq!(joined.state, CrewActionState::InProgress);
    }

    #[tokio::test]
    async fn share_resource_credits_contribution() {
        let engine = engine();
        let theatre: TheatreId = "t1".into();
        let leader: UserId = "u1".into();
        let crew = engine.create_crew(&theatre, &leader, "Night Watch", None).await.unwrap();

        let resource = engine
            .share_resource(&crew.crew_id, &leader, "evidence_pool", 3)
            .await
            .unwrap();
        assert_eq!(resource.amount, 3);

        let members = engine.storage.list_memberships(&crew.crew_id).await.unwrap();
        assert_eq!(members[0].contribution, 30);

        let claimed = engine.claim_resource(&resource.resource_id, &leader).await.unwrap();
        assert_eq!(claimed.claimed_by, Some(leader));

        let err = engine.claim_resource(&resource.resource_id, &"u2".into()).await.unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }
}
