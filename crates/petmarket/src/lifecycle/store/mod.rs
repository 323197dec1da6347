//! Transactional datastore contract consumed by the lifecycle services.
//!
//! Every mutating operation runs inside [`LifecycleStore::transaction`]: the
//! closure sees a consistent [`Transaction`] and its writes become visible only
//! when it returns `Ok`. Implementations must enforce the [`Constraint`]s
//! themselves rather than relying on callers reading before writing.

mod memory;

use std::fmt;

use serde::Serialize;

use super::audit::AuditRecord;
use super::domain::{
    Adoption, AdoptionId, EntityId, EntityKind, Pet, PetId, User, UserId, VerifiableEntity,
};

pub use memory::MemoryStore;

/// Structural guarantees the datastore enforces on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Constraint {
    /// At most one application per (adopter, pet).
    UniqueApplication { adopter: UserId, pet: PetId },
    /// At most one APPROVED application per pet.
    SingleApprovalPerPet { pet: PetId },
    /// At most one business profile of each kind per owner.
    UniqueEntityPerOwner { owner: UserId, kind: EntityKind },
    /// Primary key collision.
    DuplicateKey { key: String },
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::UniqueApplication { adopter, pet } => {
                write!(f, "application for ({adopter}, {pet}) already exists")
            }
            Constraint::SingleApprovalPerPet { pet } => {
                write!(f, "pet {pet} already has an approved application")
            }
            Constraint::UniqueEntityPerOwner { owner, kind } => {
                write!(f, "{owner} already owns a {} profile", kind.label())
            }
            Constraint::DuplicateKey { key } => write!(f, "key {key} already exists"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("constraint violated: {0}")]
    Constraint(Constraint),
    #[error("record {0} not found")]
    Missing(String),
    #[error("datastore unavailable: {0}")]
    Unavailable(String),
    #[error("transaction aborted: {0}")]
    Aborted(String),
}

/// Datastore able to run multi-statement atomic transactions.
pub trait LifecycleStore: Send + Sync {
    /// Run `work` atomically. Writes commit only when `work` returns `Ok`;
    /// any error discards every write made through the transaction.
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StoreError>;
}

/// Reads and writes available inside a transaction.
///
/// Audit records can only be appended and read; there is deliberately no way
/// to change or remove one.
pub trait Transaction {
    fn user(&self, id: &UserId) -> Result<Option<User>, StoreError>;
    fn insert_user(&mut self, user: User) -> Result<(), StoreError>;
    fn update_user(&mut self, user: User) -> Result<(), StoreError>;

    fn pet(&self, id: &PetId) -> Result<Option<Pet>, StoreError>;
    fn insert_pet(&mut self, pet: Pet) -> Result<(), StoreError>;
    fn update_pet(&mut self, pet: Pet) -> Result<(), StoreError>;
    fn remove_pet(&mut self, id: &PetId) -> Result<Option<Pet>, StoreError>;

    fn adoption(&self, id: &AdoptionId) -> Result<Option<Adoption>, StoreError>;
    fn adoption_for(
        &self,
        adopter: &UserId,
        pet: &PetId,
    ) -> Result<Option<Adoption>, StoreError>;
    fn adoptions_for_pet(&self, pet: &PetId) -> Result<Vec<Adoption>, StoreError>;
    fn insert_adoption(&mut self, adoption: Adoption) -> Result<(), StoreError>;
    fn update_adoption(&mut self, adoption: Adoption) -> Result<(), StoreError>;
    fn remove_adoption(&mut self, id: &AdoptionId) -> Result<Option<Adoption>, StoreError>;

    fn entity(&self, id: &EntityId) -> Result<Option<VerifiableEntity>, StoreError>;
    fn entity_for_owner(
        &self,
        owner: &UserId,
        kind: EntityKind,
    ) -> Result<Option<VerifiableEntity>, StoreError>;
    fn insert_entity(&mut self, entity: VerifiableEntity) -> Result<(), StoreError>;
    fn update_entity(&mut self, entity: VerifiableEntity) -> Result<(), StoreError>;

    fn append_audit(&mut self, record: AuditRecord) -> Result<(), StoreError>;
    /// Records about `subject`, newest first.
    fn audit_for(&self, subject: &UserId) -> Result<Vec<AuditRecord>, StoreError>;
}
