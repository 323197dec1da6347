use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::access::{classify_role_change, BlockAction};
use super::adoption::Decision;
use super::context::RequestContext;
use super::domain::{
    AdoptionId, BusinessProfile, EntityId, EntityKind, PetId, PetListing, PetStatus, Role, UserId,
};
use super::error::LifecycleError;
use super::notify::Notifier;
use super::store::LifecycleStore;
use super::LifecycleServices;

type Services<S, N> = State<Arc<LifecycleServices<S, N>>>;

/// HTTP surface for pets, adoptions, verification and administration.
pub fn lifecycle_router<S, N>(services: Arc<LifecycleServices<S, N>>) -> Router
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/pets", post(create_pet_handler::<S, N>))
        .route("/api/v1/pets/:pet_id", delete(remove_pet_handler::<S, N>))
        .route(
            "/api/v1/pets/:pet_id/status",
            patch(pet_status_handler::<S, N>),
        )
        .route(
            "/api/v1/pets/:pet_id/adoptions",
            post(submit_adoption_handler::<S, N>).get(list_adoptions_handler::<S, N>),
        )
        .route(
            "/api/v1/adoptions/:adoption_id/decision",
            post(decide_adoption_handler::<S, N>),
        )
        .route("/api/v1/verifications", post(apply_handler::<S, N>))
        .route(
            "/api/v1/verifications/:entity_id/decision",
            post(decide_verification_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/users/:user_id/block-state",
            post(block_state_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/users/:user_id/role",
            post(change_role_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/users/:user_id/audit",
            get(audit_trail_handler::<S, N>),
        )
        .route(
            "/api/v1/admin/role-changes/classify",
            get(classify_handler),
        )
        .with_state(services)
}

#[derive(Debug, Deserialize)]
pub struct PetStatusRequest {
    pub status: PetStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitAdoptionRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerificationRequest {
    pub kind: EntityKind,
    #[serde(flatten)]
    pub profile: BusinessProfile,
}

#[derive(Debug, Deserialize)]
pub struct BlockStateRequest {
    pub action: BlockAction,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleChangeRequest {
    pub role: Role,
    #[serde(default)]
    pub reason: String,
    /// Operator acknowledged the classification warning for a critical change.
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyQuery {
    pub from: Role,
    pub to: Role,
}

pub(crate) async fn create_pet_handler<S, N>(
    State(services): Services<S, N>,
    context: RequestContext,
    Json(listing): Json<PetListing>,
) -> Result<Response, LifecycleError>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    let pet = services.pets.create(&context.actor, listing)?;
    Ok((StatusCode::CREATED, Json(pet)).into_response())
}

pub(crate) async fn pet_status_handler<S, N>(
    State(services): Services<S, N>,
    context: RequestContext,
    Path(pet_id): Path<String>,
    Json(request): Json<PetStatusRequest>,
) -> Result<Response, LifecycleError>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    let pet = services
        .pets
        .transition(&context.actor, &PetId::new(pet_id), request.status)?;
    Ok(Json(pet).into_response())
}

pub(crate) async fn remove_pet_handler<S, N>(
    State(services): Services<S, N>,
    context: RequestContext,
    Path(pet_id): Path<String>,
) -> Result<Response, LifecycleError>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    let removal = services.pets.remove(&context.actor, &PetId::new(pet_id))?;
    Ok(Json(removal).into_response())
}

pub(crate) async fn submit_adoption_handler<S, N>(
    State(services): Services<S, N>,
    context: RequestContext,
    Path(pet_id): Path<String>,
    Json(request): Json<SubmitAdoptionRequest>,
) -> Result<Response, LifecycleError>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    let adoption =
        services
            .adoptions
            .submit(&context.actor, &PetId::new(pet_id), request.message)?;
    Ok((StatusCode::CREATED, Json(adoption)).into_response())
}

pub(crate) async fn list_adoptions_handler<S, N>(
    State(services): Services<S, N>,
    context: RequestContext,
    Path(pet_id): Path<String>,
) -> Result<Response, LifecycleError>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    let applications = services
        .adoptions
        .applications_for_pet(&context.actor, &PetId::new(pet_id))?;
    Ok(Json(applications).into_response())
}

pub(crate) async fn decide_adoption_handler<S, N>(
    State(services): Services<S, N>,
    context: RequestContext,
    Path(adoption_id): Path<String>,
    Json(request): Json<DecisionRequest>,
) -> Result<Response, LifecycleError>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    let outcome = services.adoptions.decide(
        &context.actor,
        &AdoptionId::new(adoption_id),
        request.decision,
        request.reason,
    )?;
    Ok(Json(outcome).into_response())
}

pub(crate) async fn apply_handler<S, N>(
    State(services): Services<S, N>,
    context: RequestContext,
    Json(request): Json<VerificationRequest>,
) -> Result<Response, LifecycleError>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    let entity = services
        .verification
        .apply(&context.actor, request.kind, request.profile)?;
    Ok((StatusCode::CREATED, Json(entity)).into_response())
}

pub(crate) async fn decide_verification_handler<S, N>(
    State(services): Services<S, N>,
    context: RequestContext,
    Path(entity_id): Path<String>,
    Json(request): Json<DecisionRequest>,
) -> Result<Response, LifecycleError>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    let outcome = services.verification.decide(
        &context.actor,
        &EntityId::new(entity_id),
        request.decision,
        request.reason.as_deref(),
        context.origin,
    )?;
    Ok(Json(outcome.entity).into_response())
}

pub(crate) async fn block_state_handler<S, N>(
    State(services): Services<S, N>,
    context: RequestContext,
    Path(user_id): Path<String>,
    Json(request): Json<BlockStateRequest>,
) -> Result<Response, LifecycleError>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    let outcome = services.access.set_block_state(
        &context.actor,
        &UserId::new(user_id),
        request.action,
        &request.reason,
        context.origin,
    )?;
    let payload = json!({
        "user": outcome.user,
        "audit": outcome.audit.view(),
    });
    Ok(Json(payload).into_response())
}

pub(crate) async fn change_role_handler<S, N>(
    State(services): Services<S, N>,
    context: RequestContext,
    Path(user_id): Path<String>,
    Json(request): Json<RoleChangeRequest>,
) -> Result<Response, LifecycleError>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    let target = UserId::new(user_id);
    // An unconfirmed change commits only against the role it was classified
    // from, so a concurrent role change cannot turn it critical unnoticed.
    let mut expected_current = None;
    if !request.confirmed {
        let classification = services.access.preview_role_change(
            &context.actor,
            &target,
            request.role,
            &request.reason,
        )?;
        expected_current = Some(classification.from);
        if classification.requires_confirmation {
            let payload = json!({
                "error": {
                    "kind": "validation",
                    "code": "CONFIRMATION_REQUIRED",
                    "message": classification.message,
                    "details": classification,
                }
            });
            return Ok((StatusCode::PRECONDITION_REQUIRED, Json(payload)).into_response());
        }
    }

    let outcome = services.access.change_role(
        &context.actor,
        &target,
        request.role,
        expected_current,
        &request.reason,
        context.origin,
    )?;
    let payload = json!({
        "user": outcome.user,
        "classification": outcome.classification,
        "audit": outcome.audit.view(),
    });
    Ok(Json(payload).into_response())
}

pub(crate) async fn audit_trail_handler<S, N>(
    State(services): Services<S, N>,
    context: RequestContext,
    Path(user_id): Path<String>,
) -> Result<Response, LifecycleError>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    let records = services.audit.trail(&context.actor, &UserId::new(user_id))?;
    let views: Vec<_> = records.iter().map(|record| record.view()).collect();
    Ok(Json(views).into_response())
}

pub(crate) async fn classify_handler(Query(query): Query<ClassifyQuery>) -> Response {
    Json(classify_role_change(query.from, query.to)).into_response()
}
