use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::authz::{authorize, require_pet_owner, verified_shelter};
use super::domain::{AdoptionStatus, Pet, PetId, PetListing, PetStatus, Role, UserId};
use super::error::{Capability, LifecycleError};
use super::store::LifecycleStore;

/// Legal manual pet-status moves, independent of adoption cascades.
///
/// AVAILABLE ⇄ IN_PROCESS ⇄ ADOPTED, plus ADOPTED → AVAILABLE to reopen a
/// listing. AVAILABLE → ADOPTED must go through IN_PROCESS.
pub fn pet_transition_allowed(from: PetStatus, to: PetStatus) -> bool {
    use PetStatus::{Adopted, Available, InProcess};

    matches!(
        (from, to),
        (Available, InProcess)
            | (InProcess, Available)
            | (InProcess, Adopted)
            | (Adopted, InProcess)
            | (Adopted, Available)
    )
}

/// Result of removing a listing together with its applications.
#[derive(Debug, Clone, Serialize)]
pub struct PetRemoval {
    pub pet: Pet,
    pub removed_applications: usize,
}

/// Shelter-facing listing operations.
pub struct PetCatalog<S> {
    store: Arc<S>,
}

impl<S> PetCatalog<S>
where
    S: LifecycleStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// List a new pet under the actor's verified shelter.
    pub fn create(&self, shelter_user: &UserId, listing: PetListing) -> Result<Pet, LifecycleError> {
        require_text("name", &listing.name)?;
        require_text("species", &listing.species)?;
        let listing_name = listing.name.trim().to_string();
        let actor = authorize(&*self.store, shelter_user, Capability::Role(Role::Shelter))?;

        let pet = self.store.transaction(|tx| {
            let shelter = verified_shelter(tx, &actor)?;
            let now = Utc::now();
            let pet = Pet {
                id: PetId::generate(),
                shelter: shelter.id,
                name: listing.name.trim().to_string(),
                species: listing.species.trim().to_string(),
                breed: listing.breed,
                age_months: listing.age_months,
                sex: listing.sex,
                description: listing.description,
                images: listing.images,
                status: PetStatus::Available,
                created_at: now,
                updated_at: now,
            };
            tx.insert_pet(pet.clone())?;
            Ok::<_, LifecycleError>(pet)
        })
        .map_err(|error| error.traced("create_pet", &actor.id, &listing_name))?;

        info!(pet = %pet.id, shelter = %pet.shelter, "pet listed");
        Ok(pet)
    }

    /// Manually move a pet along the transition table.
    pub fn transition(
        &self,
        shelter_user: &UserId,
        pet_id: &PetId,
        to: PetStatus,
    ) -> Result<Pet, LifecycleError> {
        let actor = authorize(&*self.store, shelter_user, Capability::Role(Role::Shelter))?;

        let (pet, from) = self.store.transaction(|tx| {
            let mut pet = tx
                .pet(pet_id)?
                .ok_or_else(|| LifecycleError::PetNotFound(pet_id.clone()))?;
            require_pet_owner(tx, &actor, &pet)?;

            let from = pet.status;
            if from == to {
                return Err(LifecycleError::NoOpRejected {
                    detail: format!("pet is already {to}"),
                });
            }
            if !pet_transition_allowed(from, to) {
                return Err(LifecycleError::IllegalPetTransition { from, to });
            }
            if to == PetStatus::Available
                && tx
                    .adoptions_for_pet(pet_id)?
                    .iter()
                    .any(|adoption| adoption.status == AdoptionStatus::Approved)
            {
                return Err(LifecycleError::PetHasApproval {
                    pet: pet_id.clone(),
                });
            }

            pet.status = to;
            pet.updated_at = Utc::now();
            tx.update_pet(pet.clone())?;
            Ok::<_, LifecycleError>((pet, from))
        })
        .map_err(|error| error.traced("transition_pet", &actor.id, pet_id))?;

        info!(pet = %pet.id, %from, to = %pet.status, "pet status changed by shelter");
        Ok(pet)
    }

    /// Delete a listing and every application that references it.
    pub fn remove(&self, shelter_user: &UserId, pet_id: &PetId) -> Result<PetRemoval, LifecycleError> {
        let actor = authorize(&*self.store, shelter_user, Capability::Role(Role::Shelter))?;

        let removal = self.store.transaction(|tx| {
            let pet = tx
                .pet(pet_id)?
                .ok_or_else(|| LifecycleError::PetNotFound(pet_id.clone()))?;
            require_pet_owner(tx, &actor, &pet)?;

            let applications = tx.adoptions_for_pet(pet_id)?;
            for adoption in &applications {
                tx.remove_adoption(&adoption.id)?;
            }
            tx.remove_pet(pet_id)?;
            Ok::<_, LifecycleError>(PetRemoval {
                pet,
                removed_applications: applications.len(),
            })
        })
        .map_err(|error| error.traced("remove_pet", &actor.id, pet_id))?;

        info!(
            pet = %removal.pet.id,
            removed_applications = removal.removed_applications,
            "pet listing removed"
        );
        Ok(removal)
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), LifecycleError> {
    if value.trim().is_empty() {
        return Err(LifecycleError::InvalidInput {
            field,
            message: "must not be empty".to_string(),
        });
    }
    Ok(())
}
