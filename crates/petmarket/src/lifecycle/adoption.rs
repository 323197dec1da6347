//! Adoption applications and their effect on pet availability.
//!
//! `Pet::status` is a projection of the applications that reference the pet.
//! Every decision recomputes it with [`project_pet_status`] inside the same
//! transaction that changed the application, and the datastore's
//! single-approval constraint backs up the explicit check made before approving.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::authz::{authorize, owns_pet, require_pet_owner};
use super::domain::{Adoption, AdoptionId, AdoptionStatus, PetId, PetStatus, Role, UserId};
use super::error::{Capability, LifecycleError};
use super::store::{LifecycleStore, StoreError, Transaction};
use crate::config::PolicyConfig;

/// Outcome chosen by a reviewer for a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

/// Which write invalidated the pet status projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cascade {
    /// An application was just approved and the pet moved to IN_PROCESS.
    Approval,
    /// An application was just rejected.
    Rejection,
}

/// Pet status implied by `approved` APPROVED applications after `cascade`.
pub fn project_pet_status(cascade: Cascade, current: PetStatus, approved: usize) -> PetStatus {
    match cascade {
        Cascade::Approval if approved == 1 => PetStatus::Adopted,
        Cascade::Approval => PetStatus::InProcess,
        Cascade::Rejection if approved == 0 && current == PetStatus::InProcess => {
            PetStatus::Available
        }
        Cascade::Rejection => current,
    }
}

/// Result of a shelter decision, including the adopter to notify downstream.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionOutcome {
    pub adoption: Adoption,
    pub previous_pet_status: PetStatus,
    pub pet_status: PetStatus,
    pub adopter: UserId,
}

pub struct AdoptionEngine<S> {
    store: Arc<S>,
    policy: PolicyConfig,
}

impl<S> AdoptionEngine<S>
where
    S: LifecycleStore + 'static,
{
    pub fn new(store: Arc<S>, policy: PolicyConfig) -> Self {
        Self { store, policy }
    }

    /// File an application for an AVAILABLE pet.
    pub fn submit(
        &self,
        adopter: &UserId,
        pet_id: &PetId,
        message: Option<String>,
    ) -> Result<Adoption, LifecycleError> {
        let message = self.optional_text("message", message)?;
        let actor = authorize(&*self.store, adopter, Capability::Role(Role::Adopter))?;

        let adoption = self.store.transaction(|tx| {
            let pet = tx
                .pet(pet_id)?
                .ok_or_else(|| LifecycleError::PetNotFound(pet_id.clone()))?;

            if let Some(existing) = tx.adoption_for(&actor.id, pet_id)? {
                return Err(LifecycleError::DuplicateApplication {
                    existing: existing.id,
                    status: existing.status,
                });
            }
            if pet.status != PetStatus::Available {
                return Err(LifecycleError::PetUnavailable {
                    pet: pet.id,
                    status: pet.status,
                });
            }
            match tx.entity(&pet.shelter)? {
                Some(shelter) if shelter.verified => {}
                _ => {
                    return Err(LifecycleError::EntityNotVerified {
                        entity: pet.shelter,
                    })
                }
            }

            let now = Utc::now();
            let adoption = Adoption {
                id: AdoptionId::generate(),
                adopter: actor.id.clone(),
                pet: pet.id,
                status: AdoptionStatus::Pending,
                message,
                rejection_reason: None,
                created_at: now,
                updated_at: now,
                decided_at: None,
            };
            tx.insert_adoption(adoption.clone())?;
            Ok::<_, LifecycleError>(adoption)
        })
        .map_err(|error| error.traced("submit_adoption", &actor.id, pet_id))?;

        info!(
            adoption = %adoption.id,
            pet = %adoption.pet,
            adopter = %adoption.adopter,
            "adoption application submitted"
        );
        Ok(adoption)
    }

    /// Approve or reject a pending application on behalf of the pet's shelter.
    pub fn decide(
        &self,
        shelter_user: &UserId,
        adoption_id: &AdoptionId,
        decision: Decision,
        reason: Option<String>,
    ) -> Result<DecisionOutcome, LifecycleError> {
        let rejection_reason = match decision {
            Decision::Reject => Some(self.required_text("reason", reason)?),
            Decision::Approve => None,
        };
        let actor = authorize(&*self.store, shelter_user, Capability::Role(Role::Shelter))?;

        let outcome = self.store.transaction(|tx| {
            // Applications are private to the listing shelter; a foreign one
            // reads as missing.
            let not_found = || LifecycleError::AdoptionNotFound(adoption_id.clone());
            let mut adoption = tx.adoption(adoption_id)?.ok_or_else(not_found)?;
            let mut pet = match tx.pet(&adoption.pet)? {
                Some(pet) if owns_pet(tx, &actor, &pet)? => pet,
                _ => return Err(not_found()),
            };

            if adoption.status != AdoptionStatus::Pending {
                return Err(LifecycleError::AdoptionAlreadyDecided {
                    adoption: adoption.id,
                    status: adoption.status,
                });
            }

            let previous_pet_status = pet.status;
            let now = Utc::now();
            adoption.updated_at = now;
            adoption.decided_at = Some(now);

            match decision {
                Decision::Approve => {
                    if let Some(approved) = approved_other_than(tx, &pet.id, &adoption.id)? {
                        return Err(LifecycleError::PetAlreadyApproved {
                            pet: pet.id,
                            approved,
                        });
                    }
                    adoption.status = AdoptionStatus::Approved;
                    tx.update_adoption(adoption.clone())?;

                    pet.status = PetStatus::InProcess;
                    pet.updated_at = now;
                    tx.update_pet(pet.clone())?;

                    let approved = count_approved(tx, &pet.id)?;
                    let projected = project_pet_status(Cascade::Approval, pet.status, approved);
                    if projected != pet.status {
                        pet.status = projected;
                        tx.update_pet(pet.clone())?;
                    }
                }
                Decision::Reject => {
                    adoption.status = AdoptionStatus::Rejected;
                    adoption.rejection_reason = rejection_reason;
                    tx.update_adoption(adoption.clone())?;

                    let approved = count_approved(tx, &pet.id)?;
                    let projected = project_pet_status(Cascade::Rejection, pet.status, approved);
                    if projected != pet.status {
                        pet.status = projected;
                        pet.updated_at = now;
                        tx.update_pet(pet.clone())?;
                    }
                }
            }

            Ok::<_, LifecycleError>(DecisionOutcome {
                adopter: adoption.adopter.clone(),
                adoption,
                previous_pet_status,
                pet_status: pet.status,
            })
        })
        .map_err(|error| error.traced("decide_adoption", &actor.id, adoption_id))?;

        info!(
            adoption = %outcome.adoption.id,
            status = %outcome.adoption.status,
            pet = %outcome.adoption.pet,
            from = %outcome.previous_pet_status,
            to = %outcome.pet_status,
            "adoption application decided"
        );
        Ok(outcome)
    }

    /// Applications for a pet, visible to the owning shelter only.
    pub fn applications_for_pet(
        &self,
        shelter_user: &UserId,
        pet_id: &PetId,
    ) -> Result<Vec<Adoption>, LifecycleError> {
        let actor = authorize(&*self.store, shelter_user, Capability::Role(Role::Shelter))?;
        self.store.transaction(|tx| {
            let pet = tx
                .pet(pet_id)?
                .ok_or_else(|| LifecycleError::PetNotFound(pet_id.clone()))?;
            require_pet_owner(tx, &actor, &pet)?;
            let mut applications = tx.adoptions_for_pet(pet_id)?;
            applications.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok::<_, LifecycleError>(applications)
        })
        .map_err(|error| error.traced("list_adoptions", &actor.id, pet_id))
    }

    fn optional_text(
        &self,
        field: &'static str,
        value: Option<String>,
    ) -> Result<Option<String>, LifecycleError> {
        let Some(value) = value else {
            return Ok(None);
        };
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let length = trimmed.chars().count();
        if length > self.policy.message_max_chars {
            return Err(LifecycleError::InvalidInput {
                field,
                message: format!(
                    "must be at most {} characters (got {length})",
                    self.policy.message_max_chars
                ),
            });
        }
        Ok(Some(trimmed.to_string()))
    }

    fn required_text(
        &self,
        field: &'static str,
        value: Option<String>,
    ) -> Result<String, LifecycleError> {
        self.optional_text(field, value)?
            .ok_or_else(|| LifecycleError::InvalidInput {
                field,
                message: "is required when rejecting".to_string(),
            })
    }
}

fn count_approved(tx: &mut dyn Transaction, pet: &PetId) -> Result<usize, StoreError> {
    Ok(tx
        .adoptions_for_pet(pet)?
        .iter()
        .filter(|adoption| adoption.status == AdoptionStatus::Approved)
        .count())
}

fn approved_other_than(
    tx: &mut dyn Transaction,
    pet: &PetId,
    adoption: &AdoptionId,
) -> Result<Option<AdoptionId>, StoreError> {
    Ok(tx
        .adoptions_for_pet(pet)?
        .into_iter()
        .find(|other| other.status == AdoptionStatus::Approved && &other.id != adoption)
        .map(|other| other.id))
}
