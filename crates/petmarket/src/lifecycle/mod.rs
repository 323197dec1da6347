//! Adoption, verification and account-access lifecycles.
//!
//! Each service resolves the acting account from the store, validates and
//! authorizes before opening a transaction, then applies every related write
//! (including the audit record for privileged changes) atomically.

pub mod access;
pub mod adoption;
pub mod audit;
pub(crate) mod authz;
pub mod context;
pub mod domain;
pub mod error;
pub mod notify;
pub mod pets;
pub mod router;
pub mod store;
pub mod verification;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use access::{
    classify_role_change, AccessControl, BlockAction, BlockOutcome, RoleChangeClass,
    RoleChangeOutcome,
};
pub use adoption::{project_pet_status, AdoptionEngine, Cascade, Decision, DecisionOutcome};
pub use audit::{AuditAction, AuditLog, AuditRecord, AuditRecordView, RequestOrigin};
pub use authz::Actor;
pub use context::RequestContext;
pub use domain::{
    AccountState, Adoption, AdoptionId, AdoptionStatus, BusinessProfile, EntityId, EntityKind,
    Pet, PetId, PetListing, PetStatus, Reason, Role, Sex, User, UserId, UserView,
    VerifiableEntity, VerificationState,
};
pub use error::{Capability, ErrorKind, LifecycleError};
pub use notify::{Notification, Notifier, NotifyError};
pub use pets::{pet_transition_allowed, PetCatalog, PetRemoval};
pub use router::lifecycle_router;
pub use store::{Constraint, LifecycleStore, MemoryStore, StoreError, Transaction};
pub use verification::{VerificationOutcome, VerificationWorkflow};

use crate::config::PolicyConfig;

/// Every lifecycle service wired against one store and notifier.
pub struct LifecycleServices<S, N> {
    pub pets: PetCatalog<S>,
    pub adoptions: AdoptionEngine<S>,
    pub verification: VerificationWorkflow<S, N>,
    pub access: AccessControl<S, N>,
    pub audit: AuditLog<S>,
}

impl<S, N> LifecycleServices<S, N>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, policy: PolicyConfig) -> Self {
        Self {
            pets: PetCatalog::new(store.clone()),
            adoptions: AdoptionEngine::new(store.clone(), policy.clone()),
            verification: VerificationWorkflow::new(
                store.clone(),
                notifier.clone(),
                policy.clone(),
            ),
            access: AccessControl::new(store.clone(), notifier, policy),
            audit: AuditLog::new(store),
        }
    }
}
