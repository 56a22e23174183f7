// SPDX-License-Identifier: Apache-2.0
//! HTTP handlers. One route per engine operation, composed as a flat
//! `Router::new().route(...)` chain with one route group per engine.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use theatreos_crew::CrewEngine;
use theatreos_evidence::EvidenceEngine;
use theatreos_gate::GateEngine;
use theatreos_rumor::RumorEngine;
use theatreos_storage::Storage;
use theatreos_trace::TraceEngine;
use theatreos_types::crew::{Crew, CrewAction, SharedResource};
use theatreos_types::evidence::{Evidence, EvidenceGrade, EvidenceRarity};
use theatreos_types::gate::{GateInstance, Stake, Vote};
use theatreos_types::plan::HourPlan;
use theatreos_types::rumor::Rumor;
use theatreos_types::trace::{Trace, TraceType, TraceVisibility};
use theatreos_types::world::{ApplyDeltaRequest, Snapshot, WorldState};
use theatreos_types::{
    CharacterId, CrewActionId, CrewId, EvidenceId, EvidenceTypeId, GateId, IdempotencyKey,
    OptionId, RumorId, SharedResourceId, StageId, TheatreId, ThreadId, TraceId, UserId,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::ws::{sse_handler, ws_handler};

/// Build the full HTTP/WS/SSE router over one [`AppState`], mounted at the
/// root path (spec §7 "implemented in `theatreos-server`'s transport
/// layer").
pub fn build_router<S: Storage>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/theatres/:theatre_id/world", get(get_world_state::<S>))
        .route("/v1/theatres/:theatre_id/deltas", post(apply_delta::<S>))
        .route(
            "/v1/theatres/:theatre_id/snapshot",
            post(take_snapshot::<S>),
        )
        .route("/v1/theatres/:theatre_id/plan", post(generate_plan::<S>))
        .route("/v1/gates/:gate_id/vote", post(cast_vote::<S>))
        .route("/v1/gates/:gate_id/stake", post(place_stake::<S>))
        .route("/v1/gates/:gate_id/cancel", post(cancel_gate::<S>))
        .route("/v1/gates/:gate_id/resolve", post(resolve_gate::<S>))
        .route("/v1/evidence", post(grant_evidence::<S>))
        .route("/v1/evidence/:evidence_id/verify", post(verify_evidence::<S>))
        .route(
            "/v1/evidence/:evidence_id/transfer",
            post(transfer_evidence::<S>),
        )
        .route(
            "/v1/evidence/:evidence_id/consume",
            post(consume_evidence::<S>),
        )
        .route("/v1/rumors", post(draft_rumor::<S>))
        .route("/v1/rumors/:rumor_id/publish", post(publish_rumor::<S>))
        .route("/v1/rumors/:rumor_id/spread", post(spread_rumor::<S>))
        .route("/v1/rumors/:rumor_id/debunk", post(debunk_rumor::<S>))
        .route("/v1/traces", post(leave_trace::<S>))
        .route("/v1/traces/:trace_id/discover", post(discover_trace::<S>))
        .route("/v1/crews", post(create_crew::<S>))
        .route("/v1/crews/:crew_id/invite", post(invite_to_crew::<S>))
        .route("/v1/crews/:crew_id/leave", post(leave_crew::<S>))
        .route(
            "/v1/crews/:crew_id/actions",
            post(initiate_crew_action::<S>),
        )
        .route(
            "/v1/crew-actions/:action_id/join",
            post(join_crew_action::<S>),
        )
        .route(
            "/v1/crews/:crew_id/resources",
            post(share_crew_resource::<S>),
        )
        .route(
            "/v1/resources/:resource_id/claim",
            post(claim_crew_resource::<S>),
        )
        .route("/v1/stream/ws", get(ws_handler::<S>))
        .route("/v1/stream/sse", get(sse_handler::<S>))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_world_state<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(theatre_id): Path<String>,
) -> ApiResult<Json<WorldState>> {
    let theatre_id: TheatreId = theatre_id.into();
    Ok(Json(state.kernel.get_state(&theatre_id).await.map_err(ApiError::from)?))
}

async fn apply_delta<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(theatre_id): Path<String>,
    Json(mut req): Json<ApplyDeltaRequest>,
) -> ApiResult<Json<theatreos_types::world::AppliedDeltaRecord>> {
    req.theatre_id = theatre_id.into();
    Ok(Json(
        state.kernel.apply_delta(req).await.map_err(ApiError::from)?,
    ))
}

async fn take_snapshot<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(theatre_id): Path<String>,
) -> ApiResult<Json<Snapshot>> {
    let theatre_id: TheatreId = theatre_id.into();
    Ok(Json(
        state.kernel.snapshot(&theatre_id).await.map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct GeneratePlanRequest {
    slot_start: theatreos_types::Instant,
    #[serde(default)]
    overrides: OverridesRequest,
}

#[derive(Debug, Deserialize, Default)]
struct OverridesRequest {
    #[serde(default)]
    pin_thread: Option<ThreadId>,
    #[serde(default)]
    force_rescue: bool,
}

async fn generate_plan<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(theatre_id): Path<String>,
    Json(req): Json<GeneratePlanRequest>,
) -> ApiResult<Json<HourPlan>> {
    let theatre_id: TheatreId = theatre_id.into();
    let overrides = theatreos_scheduler::OverrideSet {
        pin_thread: req.overrides.pin_thread,
        force_rescue: req.overrides.force_rescue,
        ..Default::default()
    };
    Ok(Json(
        state
            .scheduler
            .generate_plan(&theatre_id, req.slot_start, &overrides)
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    user_id: UserId,
    option_id: OptionId,
    idempotency_key: IdempotencyKey,
}

async fn cast_vote<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(gate_id): Path<String>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<Json<Vote>> {
    let gate_id: GateId = gate_id.into();
    Ok(Json(
        state
            .gate
            .vote(&gate_id, &req.user_id, &req.option_id, &req.idempotency_key)
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct StakeRequest {
    user_id: UserId,
    option_id: OptionId,
    amount: u64,
    idempotency_key: IdempotencyKey,
}

async fn place_stake<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(gate_id): Path<String>,
    Json(req): Json<StakeRequest>,
) -> ApiResult<Json<Stake>> {
    let gate_id: GateId = gate_id.into();
    Ok(Json(
        state
            .gate
            .stake(&gate_id, &req.user_id, &req.option_id, req.amount, &req.idempotency_key)
            .await
            .map_err(ApiError::from)?,
    ))
}

async fn cancel_gate<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(gate_id): Path<String>,
) -> ApiResult<Json<GateInstance>> {
    let gate_id: GateId = gate_id.into();
    Ok(Json(state.gate.cancel(&gate_id).await.map_err(ApiError::from)?))
}

async fn resolve_gate<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(gate_id): Path<String>,
) -> ApiResult<Json<theatreos_gate::engine::ExplainCard>> {
    let gate_id: GateId = gate_id.into();
    Ok(Json(state.gate.resolve(&gate_id).await.map_err(ApiError::from)?))
}

#[derive(Debug, Deserialize)]
struct GrantEvidenceRequest {
    theatre_id: TheatreId,
    owner_id: UserId,
    name: String,
    grade: EvidenceGrade,
    rarity: EvidenceRarity,
    evidence_type: EvidenceTypeId,
    #[serde(default)]
    source_scene: Option<String>,
    #[serde(default)]
    source_stage: Option<StageId>,
    #[serde(default)]
    metadata: serde_json::Value,
}

async fn grant_evidence<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<GrantEvidenceRequest>,
) -> ApiResult<Json<Evidence>> {
    Ok(Json(
        state
            .evidence
            .grant(
                &req.theatre_id,
                &req.owner_id,
                &req.name,
                req.grade,
                req.rarity,
                &req.evidence_type,
                req.source_scene,
                req.source_stage,
                req.metadata,
            )
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize, Default)]
struct VerifyEvidenceRequest {
    #[serde(default)]
    challenge_response: Option<String>,
}

async fn verify_evidence<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(evidence_id): Path<String>,
    Json(req): Json<VerifyEvidenceRequest>,
) -> ApiResult<Json<theatreos_evidence::engine::VerifyResult>> {
    let evidence_id: EvidenceId = evidence_id.into();
    Ok(Json(
        state
            .evidence
            .verify(&evidence_id, req.challenge_response.as_deref())
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct TransferEvidenceRequest {
    from_user_id: UserId,
    to_user_id: UserId,
}

async fn transfer_evidence<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(evidence_id): Path<String>,
    Json(req): Json<TransferEvidenceRequest>,
) -> ApiResult<Json<Evidence>> {
    let evidence_id: EvidenceId = evidence_id.into();
    Ok(Json(
        state
            .evidence
            .transfer(&evidence_id, &req.from_user_id, &req.to_user_id)
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct ConsumeEvidenceRequest {
    user_id: UserId,
    purpose: String,
}

async fn consume_evidence<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(evidence_id): Path<String>,
    Json(req): Json<ConsumeEvidenceRequest>,
) -> ApiResult<Json<theatreos_evidence::engine::ConsumeResult>> {
    let evidence_id: EvidenceId = evidence_id.into();
    Ok(Json(
        state
            .evidence
            .consume(&evidence_id, &req.user_id, &req.purpose)
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct DraftRumorRequest {
    theatre_id: TheatreId,
    author_id: UserId,
    content: String,
    #[serde(default)]
    target_thread: Option<ThreadId>,
    #[serde(default)]
    target_character: Option<CharacterId>,
}

async fn draft_rumor<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<DraftRumorRequest>,
) -> ApiResult<Json<Rumor>> {
    Ok(Json(
        state
            .rumor
            .draft(
                &req.theatre_id,
                &req.author_id,
                &req.content,
                req.target_thread,
                req.target_character,
            )
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct PublishRumorRequest {
    author_id: UserId,
}

async fn publish_rumor<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(rumor_id): Path<String>,
    Json(req): Json<PublishRumorRequest>,
) -> ApiResult<Json<Rumor>> {
    let rumor_id: RumorId = rumor_id.into();
    Ok(Json(
        state.rumor.publish(&rumor_id, &req.author_id).await.map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct SpreadRumorRequest {
    spreader_id: UserId,
    #[serde(default)]
    stage_id: Option<StageId>,
}

async fn spread_rumor<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(rumor_id): Path<String>,
    Json(req): Json<SpreadRumorRequest>,
) -> ApiResult<Json<Rumor>> {
    let rumor_id: RumorId = rumor_id.into();
    Ok(Json(
        state
            .rumor
            .spread(&rumor_id, &req.spreader_id, req.stage_id)
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct DebunkRumorRequest {
    debunker_id: UserId,
    evidence_count: u32,
}

async fn debunk_rumor<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(rumor_id): Path<String>,
    Json(req): Json<DebunkRumorRequest>,
) -> ApiResult<Json<theatreos_rumor::engine::DebunkOutcome>> {
    let rumor_id: RumorId = rumor_id.into();
    Ok(Json(
        state
            .rumor
            .debunk(&rumor_id, &req.debunker_id, req.evidence_count)
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct LeaveTraceRequest {
    theatre_id: TheatreId,
    creator_id: UserId,
    stage_id: StageId,
    #[serde(rename = "type")]
    trace_type: TraceType,
    #[serde(default)]
    content: Option<String>,
    visibility: TraceVisibility,
    #[serde(default)]
    difficulty_override: Option<f64>,
}

async fn leave_trace<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<LeaveTraceRequest>,
) -> ApiResult<Json<Trace>> {
    Ok(Json(
        state
            .trace
            .leave(
                &req.theatre_id,
                &req.creator_id,
                &req.stage_id,
                req.trace_type,
                req.content,
                req.visibility,
                req.difficulty_override,
            )
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct DiscoverTraceRequest {
    discoverer_id: UserId,
}

async fn discover_trace<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(trace_id): Path<String>,
    Json(req): Json<DiscoverTraceRequest>,
) -> ApiResult<Json<theatreos_trace::engine::DiscoveryOutcome>> {
    let trace_id: TraceId = trace_id.into();
    Ok(Json(
        state
            .trace
            .discover(&trace_id, &req.discoverer_id)
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct CreateCrewRequest {
    theatre_id: TheatreId,
    leader_id: UserId,
    name: String,
    #[serde(default)]
    motto: Option<String>,
}

async fn create_crew<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateCrewRequest>,
) -> ApiResult<Json<Crew>> {
    Ok(Json(
        state
            .crew
            .create_crew(&req.theatre_id, &req.leader_id, &req.name, req.motto)
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct InviteRequest {
    inviter_id: UserId,
    invitee_id: UserId,
}

async fn invite_to_crew<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(crew_id): Path<String>,
    Json(req): Json<InviteRequest>,
) -> ApiResult<Json<theatreos_types::crew::Membership>> {
    let crew_id: CrewId = crew_id.into();
    Ok(Json(
        state
            .crew
            .invite(&crew_id, &req.inviter_id, &req.invitee_id)
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct LeaveCrewRequest {
    user_id: UserId,
}

async fn leave_crew<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(crew_id): Path<String>,
    Json(req): Json<LeaveCrewRequest>,
) -> ApiResult<()> {
    let crew_id: CrewId = crew_id.into();
    state.crew.leave(&crew_id, &req.user_id).await.map_err(ApiError::from)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct InitiateActionRequest {
    initiator_id: UserId,
    kind: String,
    quorum: u32,
}

async fn initiate_crew_action<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(crew_id): Path<String>,
    Json(req): Json<InitiateActionRequest>,
) -> ApiResult<Json<CrewAction>> {
    let crew_id: CrewId = crew_id.into();
    Ok(Json(
        state
            .crew
            .initiate_action(&crew_id, &req.initiator_id, &req.kind, req.quorum)
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct JoinActionRequest {
    user_id: UserId,
}

async fn join_crew_action<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(action_id): Path<String>,
    Json(req): Json<JoinActionRequest>,
) -> ApiResult<Json<CrewAction>> {
    let action_id: CrewActionId = action_id.into();
    Ok(Json(
        state.crew.join_action(&action_id, &req.user_id).await.map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct ShareResourceRequest {
    contributor_id: UserId,
    kind: String,
    quantity: u64,
}

async fn share_crew_resource<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(crew_id): Path<String>,
    Json(req): Json<ShareResourceRequest>,
) -> ApiResult<Json<SharedResource>> {
    let crew_id: CrewId = crew_id.into();
    Ok(Json(
        state
            .crew
            .share_resource(&crew_id, &req.contributor_id, &req.kind, req.quantity)
            .await
            .map_err(ApiError::from)?,
    ))
}

#[derive(Debug, Deserialize)]
struct ClaimResourceRequest {
    claimer_id: UserId,
}

async fn claim_crew_resource<S: Storage>(
    State(state): State<Arc<AppState<S>>>,
    Path(resource_id): Path<String>,
    Json(req): Json<ClaimResourceRequest>,
) -> ApiResult<Json<SharedResource>> {
    let resource_id: SharedResourceId = resource_id.into();
    Ok(Json(
        state
            .crew
            .claim_resource(&resource_id, &req.claimer_id)
            .await
            .map_err(ApiError::from)?,
    ))
}
