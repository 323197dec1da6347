use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use super::domain::{AdoptionId, AdoptionStatus, EntityId, PetId, PetStatus, Role, UserId};
use super::store::{Constraint, StoreError};

/// Failure classes callers reconcile differently. Only `Transient` is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    Conflict,
    NotFound,
    Transient,
}

/// Capability an operation demanded of the acting user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Admin,
    Role(Role),
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("invalid {field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    #[error("request is not associated with an active account")]
    Unauthenticated,
    #[error("operation not permitted for this account")]
    Forbidden { required: Capability },
    #[error("only the shelter that lists this pet may act on it")]
    NotPetOwner,
    #[error("administrators cannot block or unblock themselves")]
    SelfBlockForbidden,
    #[error("administrators cannot change their own role")]
    SelfRoleChangeForbidden,
    #[error("administrator accounts cannot be blocked")]
    AdminProtected,
    #[error("{entity} has not been verified yet")]
    EntityNotVerified { entity: EntityId },

    #[error("pet {pet} is not available for adoption (status {status})")]
    PetUnavailable { pet: PetId, status: PetStatus },
    #[error("you already applied for this pet; current status is {status}")]
    DuplicateApplication {
        existing: AdoptionId,
        status: AdoptionStatus,
    },
    #[error("application {adoption} was already decided (status {status})")]
    AdoptionAlreadyDecided {
        adoption: AdoptionId,
        status: AdoptionStatus,
    },
    #[error("pet {pet} already has an approved application")]
    PetAlreadyApproved { pet: PetId, approved: AdoptionId },
    #[error("pet status cannot move from {from} to {to}")]
    IllegalPetTransition { from: PetStatus, to: PetStatus },
    #[error("pet {pet} has an approved application and cannot be made available")]
    PetHasApproval { pet: PetId },
    #[error("{entity} is already verified")]
    AlreadyApproved { entity: EntityId },
    #[error("{entity} is still awaiting a verification decision")]
    VerificationPending { entity: EntityId },
    #[error("verification may be resubmitted after {available_at}")]
    ReapplyCooldown {
        entity: EntityId,
        available_at: DateTime<Utc>,
    },
    #[error("role of {user} changed to {current} since it was classified as {expected}")]
    RoleChanged {
        user: UserId,
        expected: Role,
        current: Role,
    },
    #[error("requested change does not alter the current state: {detail}")]
    NoOpRejected { detail: String },
    #[error("datastore rejected the write: {0}")]
    ConstraintViolated(Constraint),

    #[error("pet {0} not found")]
    PetNotFound(PetId),
    #[error("adoption application {0} not found")]
    AdoptionNotFound(AdoptionId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("business profile {0} not found")]
    EntityNotFound(EntityId),

    #[error("temporary failure, retry later")]
    Transient(#[source] StoreError),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::InvalidInput { .. } => ErrorKind::Validation,
            LifecycleError::Unauthenticated
            | LifecycleError::Forbidden { .. }
            | LifecycleError::NotPetOwner
            | LifecycleError::SelfBlockForbidden
            | LifecycleError::SelfRoleChangeForbidden
            | LifecycleError::AdminProtected
            | LifecycleError::EntityNotVerified { .. } => ErrorKind::Authorization,
            LifecycleError::PetUnavailable { .. }
            | LifecycleError::DuplicateApplication { .. }
            | LifecycleError::AdoptionAlreadyDecided { .. }
            | LifecycleError::PetAlreadyApproved { .. }
            | LifecycleError::IllegalPetTransition { .. }
            | LifecycleError::PetHasApproval { .. }
            | LifecycleError::AlreadyApproved { .. }
            | LifecycleError::VerificationPending { .. }
            | LifecycleError::ReapplyCooldown { .. }
            | LifecycleError::RoleChanged { .. }
            | LifecycleError::NoOpRejected { .. }
            | LifecycleError::ConstraintViolated(_) => ErrorKind::Conflict,
            LifecycleError::PetNotFound(_)
            | LifecycleError::AdoptionNotFound(_)
            | LifecycleError::UserNotFound(_)
            | LifecycleError::EntityNotFound(_) => ErrorKind::NotFound,
            LifecycleError::Transient(_) => ErrorKind::Transient,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            LifecycleError::InvalidInput { .. } => "INVALID_INPUT",
            LifecycleError::Unauthenticated => "UNAUTHENTICATED",
            LifecycleError::Forbidden { .. } => "FORBIDDEN",
            LifecycleError::NotPetOwner => "NOT_PET_OWNER",
            LifecycleError::SelfBlockForbidden => "SELF_BLOCK_FORBIDDEN",
            LifecycleError::SelfRoleChangeForbidden => "SELF_ROLE_CHANGE_FORBIDDEN",
            LifecycleError::AdminProtected => "ADMIN_PROTECTED",
            LifecycleError::EntityNotVerified { .. } => "ENTITY_NOT_VERIFIED",
            LifecycleError::PetUnavailable { .. } => "PET_UNAVAILABLE",
            LifecycleError::DuplicateApplication { .. } => "DUPLICATE_APPLICATION",
            LifecycleError::AdoptionAlreadyDecided { .. } => "ADOPTION_ALREADY_DECIDED",
            LifecycleError::PetAlreadyApproved { .. } => "PET_ALREADY_APPROVED",
            LifecycleError::IllegalPetTransition { .. } => "ILLEGAL_PET_TRANSITION",
            LifecycleError::PetHasApproval { .. } => "PET_HAS_APPROVAL",
            LifecycleError::AlreadyApproved { .. } => "ALREADY_APPROVED",
            LifecycleError::VerificationPending { .. } => "VERIFICATION_PENDING",
            LifecycleError::ReapplyCooldown { .. } => "REAPPLY_COOLDOWN",
            LifecycleError::RoleChanged { .. } => "ROLE_CHANGED",
            LifecycleError::NoOpRejected { .. } => "NO_OP_REJECTED",
            LifecycleError::ConstraintViolated(_) => "CONSTRAINT_VIOLATED",
            LifecycleError::PetNotFound(_) => "PET_NOT_FOUND",
            LifecycleError::AdoptionNotFound(_) => "ADOPTION_NOT_FOUND",
            LifecycleError::UserNotFound(_) => "USER_NOT_FOUND",
            LifecycleError::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            LifecycleError::Transient(_) => "TEMPORARILY_UNAVAILABLE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            LifecycleError::InvalidInput { .. }
            | LifecycleError::SelfBlockForbidden
            | LifecycleError::SelfRoleChangeForbidden
            | LifecycleError::PetUnavailable { .. }
            | LifecycleError::NoOpRejected { .. } => StatusCode::BAD_REQUEST,
            LifecycleError::Unauthenticated => StatusCode::UNAUTHORIZED,
            LifecycleError::Forbidden { .. }
            | LifecycleError::NotPetOwner
            | LifecycleError::AdminProtected
            | LifecycleError::EntityNotVerified { .. } => StatusCode::FORBIDDEN,
            LifecycleError::DuplicateApplication { .. }
            | LifecycleError::AdoptionAlreadyDecided { .. }
            | LifecycleError::PetAlreadyApproved { .. }
            | LifecycleError::IllegalPetTransition { .. }
            | LifecycleError::PetHasApproval { .. }
            | LifecycleError::AlreadyApproved { .. }
            | LifecycleError::VerificationPending { .. }
            | LifecycleError::ReapplyCooldown { .. }
            | LifecycleError::RoleChanged { .. }
            | LifecycleError::ConstraintViolated(_) => StatusCode::CONFLICT,
            LifecycleError::PetNotFound(_)
            | LifecycleError::AdoptionNotFound(_)
            | LifecycleError::UserNotFound(_)
            | LifecycleError::EntityNotFound(_) => StatusCode::NOT_FOUND,
            LifecycleError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Identifiers and current state a caller needs to reconcile the failure.
    pub fn details(&self) -> Value {
        match self {
            LifecycleError::InvalidInput { field, .. } => json!({ "field": field }),
            LifecycleError::Forbidden { required } => json!({ "required": required }),
            LifecycleError::EntityNotVerified { entity } => json!({ "entity_id": entity }),
            LifecycleError::PetUnavailable { pet, status } => {
                json!({ "pet_id": pet, "status": status })
            }
            LifecycleError::DuplicateApplication { existing, status } => {
                json!({ "adoption_id": existing, "status": status })
            }
            LifecycleError::AdoptionAlreadyDecided { adoption, status } => {
                json!({ "adoption_id": adoption, "status": status })
            }
            LifecycleError::PetAlreadyApproved { pet, approved } => {
                json!({ "pet_id": pet, "approved_adoption_id": approved })
            }
            LifecycleError::IllegalPetTransition { from, to } => {
                json!({ "from": from, "to": to })
            }
            LifecycleError::PetHasApproval { pet } => json!({ "pet_id": pet }),
            LifecycleError::AlreadyApproved { entity }
            | LifecycleError::VerificationPending { entity } => json!({ "entity_id": entity }),
            LifecycleError::ReapplyCooldown {
                entity,
                available_at,
            } => json!({ "entity_id": entity, "available_at": available_at }),
            LifecycleError::RoleChanged {
                user,
                expected,
                current,
            } => json!({ "user_id": user, "expected_role": expected, "current_role": current }),
            LifecycleError::ConstraintViolated(constraint) => {
                json!({ "constraint": constraint })
            }
            LifecycleError::PetNotFound(pet) => json!({ "pet_id": pet }),
            LifecycleError::AdoptionNotFound(adoption) => json!({ "adoption_id": adoption }),
            LifecycleError::UserNotFound(user) => json!({ "user_id": user }),
            LifecycleError::EntityNotFound(entity) => json!({ "entity_id": entity }),
            LifecycleError::Unauthenticated
            | LifecycleError::NotPetOwner
            | LifecycleError::SelfBlockForbidden
            | LifecycleError::SelfRoleChangeForbidden
            | LifecycleError::AdminProtected
            | LifecycleError::NoOpRejected { .. }
            | LifecycleError::Transient(_) => Value::Null,
        }
    }
}

impl LifecycleError {
    /// Log a datastore failure together with the operation it interrupted.
    /// Every other error passes through silently.
    pub(crate) fn traced(
        self,
        operation: &'static str,
        actor: &UserId,
        subject: &dyn fmt::Display,
    ) -> Self {
        if let LifecycleError::Transient(source) = &self {
            tracing::error!(
                operation,
                actor = %actor,
                subject = %subject,
                error = %source,
                "lifecycle operation failed on the datastore"
            );
        }
        self
    }
}

impl From<StoreError> for LifecycleError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Constraint(constraint) => Self::ConstraintViolated(constraint),
            other => Self::Transient(other),
        }
    }
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "kind": self.kind(),
            "code": self.code(),
            "message": self.to_string(),
        });
        let details = self.details();
        if !details.is_null() {
            error["details"] = details;
        }

        (self.status(), Json(json!({ "error": error }))).into_response()
    }
}
