//! Capability checks shared by every lifecycle operation.
//!
//! The request context only carries an identity; the role is always read from
//! the datastore so a demoted or blocked account loses its privileges on the
//! next request.

use serde::Serialize;

use super::domain::{EntityKind, Pet, Role, UserId, VerifiableEntity};
use super::error::{Capability, LifecycleError};
use super::store::{LifecycleStore, StoreError, Transaction};

/// Authenticated account acting on the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn holds(&self, capability: Capability) -> bool {
        match capability {
            Capability::Admin => self.role == Role::Admin,
            Capability::Role(role) => self.role == role,
        }
    }
}

pub(crate) fn resolve_actor<S>(store: &S, id: &UserId) -> Result<Actor, LifecycleError>
where
    S: LifecycleStore + ?Sized,
{
    store
        .transaction(|tx| resolve_in(tx, id))
        .map_err(|error| error.traced("resolve_actor", id, id))
}

fn resolve_in(tx: &mut dyn Transaction, id: &UserId) -> Result<Actor, LifecycleError> {
    match tx.user(id)? {
        Some(user) if user.is_active() => Ok(Actor {
            id: user.id,
            role: user.role,
        }),
        _ => Err(LifecycleError::Unauthenticated),
    }
}

/// Resolve the acting account and require `capability` before any mutation.
pub(crate) fn authorize<S>(
    store: &S,
    id: &UserId,
    capability: Capability,
) -> Result<Actor, LifecycleError>
where
    S: LifecycleStore + ?Sized,
{
    let actor = resolve_actor(store, id)?;
    if actor.holds(capability) {
        Ok(actor)
    } else {
        Err(LifecycleError::Forbidden {
            required: capability,
        })
    }
}

/// The verified shelter profile owned by `actor`.
pub(crate) fn verified_shelter(
    tx: &mut dyn Transaction,
    actor: &Actor,
) -> Result<VerifiableEntity, LifecycleError> {
    let entity = tx
        .entity_for_owner(&actor.id, EntityKind::Shelter)?
        .ok_or(LifecycleError::Forbidden {
            required: Capability::Role(Role::Shelter),
        })?;
    if !entity.verified {
        return Err(LifecycleError::EntityNotVerified { entity: entity.id });
    }
    Ok(entity)
}

/// Whether `actor` owns the shelter listing `pet`.
pub(crate) fn owns_pet(
    tx: &mut dyn Transaction,
    actor: &Actor,
    pet: &Pet,
) -> Result<bool, StoreError> {
    Ok(tx
        .entity(&pet.shelter)?
        .is_some_and(|shelter| shelter.owner == actor.id))
}

/// Require that `actor` owns the shelter listing `pet`. Pets are public
/// listings, so refusing a foreign one reveals nothing new.
pub(crate) fn require_pet_owner(
    tx: &mut dyn Transaction,
    actor: &Actor,
    pet: &Pet,
) -> Result<(), LifecycleError> {
    if owns_pet(tx, actor, pet)? {
        Ok(())
    } else {
        Err(LifecycleError::NotPetOwner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::domain::{BlockMetadata, User};
    use crate::lifecycle::store::MemoryStore;
    use chrono::Utc;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .transaction(|tx| {
                tx.insert_user(User::new(UserId::new("usr-admin"), "Root", "root@test", Role::Admin))?;
                let mut blocked =
                    User::new(UserId::new("usr-blocked"), "Bo", "bo@test", Role::Admin);
                blocked.block = Some(BlockMetadata {
                    blocked_at: Utc::now(),
                    blocked_by: UserId::new("usr-admin"),
                    reason: "Compromised account".to_string(),
                });
                tx.insert_user(blocked)?;
                tx.insert_user(User::new(UserId::new("usr-ada"), "Ada", "ada@test", Role::Adopter))
            })
            .expect("seed succeeds");
        store
    }

    #[test]
    fn unknown_and_blocked_actors_are_unauthenticated() {
        let store = seeded();
        assert!(matches!(
            resolve_actor(&store, &UserId::new("usr-ghost")),
            Err(LifecycleError::Unauthenticated)
        ));
        assert!(matches!(
            authorize(&store, &UserId::new("usr-blocked"), Capability::Admin),
            Err(LifecycleError::Unauthenticated)
        ));
    }

    #[test]
    fn capability_mismatch_is_forbidden() {
        let store = seeded();
        match authorize(&store, &UserId::new("usr-ada"), Capability::Admin) {
            Err(LifecycleError::Forbidden { required }) => assert_eq!(required, Capability::Admin),
            other => panic!("expected forbidden, got {other:?}"),
        }
        let admin = authorize(&store, &UserId::new("usr-admin"), Capability::Admin)
            .expect("admin passes");
        assert_eq!(admin.role, Role::Admin);
    }
}
