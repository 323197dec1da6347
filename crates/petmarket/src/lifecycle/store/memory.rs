use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use super::{Constraint, LifecycleStore, StoreError, Transaction};
use crate::lifecycle::audit::AuditRecord;
use crate::lifecycle::domain::{
    Adoption, AdoptionId, AdoptionStatus, EntityId, EntityKind, Pet, PetId, User, UserId,
    VerifiableEntity,
};

/// Mutable tables. Each map is shared with the committed state until the
/// first write to it inside a transaction.
#[derive(Debug, Default, Clone)]
struct Tables {
    users: Arc<BTreeMap<UserId, User>>,
    pets: Arc<BTreeMap<PetId, Pet>>,
    adoptions: Arc<BTreeMap<AdoptionId, Adoption>>,
    entities: Arc<BTreeMap<EntityId, VerifiableEntity>>,
}

#[derive(Debug, Default)]
struct Committed {
    tables: Tables,
    audit: Vec<AuditRecord>,
}

/// In-process datastore with serializable transactions.
///
/// The lock is held for the whole transaction. Writes go to copy-on-write
/// tables and audit appends to a pending list; both replace or extend the
/// committed state only on success.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<Committed>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LifecycleStore for MemoryStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut committed = self
            .state
            .lock()
            .map_err(|_| StoreError::Unavailable("table lock poisoned".to_string()))?;

        let mut working = MemoryTransaction {
            tables: committed.tables.clone(),
            audit: &committed.audit,
            appended: Vec::new(),
        };
        let value = work(&mut working)?;
        let MemoryTransaction {
            tables, appended, ..
        } = working;
        committed.tables = tables;
        committed.audit.extend(appended);
        Ok(value)
    }
}

struct MemoryTransaction<'a> {
    tables: Tables,
    audit: &'a [AuditRecord],
    appended: Vec<AuditRecord>,
}

fn missing(kind: &str, id: &str) -> StoreError {
    StoreError::Missing(format!("{kind} {id}"))
}

impl MemoryTransaction<'_> {
    fn check_single_approval(&self, adoption: &Adoption) -> Result<(), StoreError> {
        if adoption.status != AdoptionStatus::Approved {
            return Ok(());
        }
        let clash = self.tables.adoptions.values().any(|other| {
            other.pet == adoption.pet
                && other.id != adoption.id
                && other.status == AdoptionStatus::Approved
        });
        if clash {
            return Err(StoreError::Constraint(Constraint::SingleApprovalPerPet {
                pet: adoption.pet.clone(),
            }));
        }
        Ok(())
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.tables.users.get(id).cloned())
    }

    fn insert_user(&mut self, user: User) -> Result<(), StoreError> {
        if self.tables.users.contains_key(&user.id) {
            return Err(StoreError::Constraint(Constraint::DuplicateKey {
                key: user.id.to_string(),
            }));
        }
        Arc::make_mut(&mut self.tables.users).insert(user.id.clone(), user);
        Ok(())
    }

    fn update_user(&mut self, user: User) -> Result<(), StoreError> {
        match Arc::make_mut(&mut self.tables.users).get_mut(&user.id) {
            Some(slot) => {
                *slot = user;
                Ok(())
            }
            None => Err(missing("user", user.id.as_str())),
        }
    }

    fn pet(&self, id: &PetId) -> Result<Option<Pet>, StoreError> {
        Ok(self.tables.pets.get(id).cloned())
    }

    fn insert_pet(&mut self, pet: Pet) -> Result<(), StoreError> {
        if self.tables.pets.contains_key(&pet.id) {
            return Err(StoreError::Constraint(Constraint::DuplicateKey {
                key: pet.id.to_string(),
            }));
        }
        Arc::make_mut(&mut self.tables.pets).insert(pet.id.clone(), pet);
        Ok(())
    }

    fn update_pet(&mut self, pet: Pet) -> Result<(), StoreError> {
        match Arc::make_mut(&mut self.tables.pets).get_mut(&pet.id) {
            Some(slot) => {
                *slot = pet;
                Ok(())
            }
            None => Err(missing("pet", pet.id.as_str())),
        }
    }

    fn remove_pet(&mut self, id: &PetId) -> Result<Option<Pet>, StoreError> {
        Ok(Arc::make_mut(&mut self.tables.pets).remove(id))
    }

    fn adoption(&self, id: &AdoptionId) -> Result<Option<Adoption>, StoreError> {
        Ok(self.tables.adoptions.get(id).cloned())
    }

    fn adoption_for(
        &self,
        adopter: &UserId,
        pet: &PetId,
    ) -> Result<Option<Adoption>, StoreError> {
        Ok(self
            .tables
            .adoptions
            .values()
            .find(|adoption| &adoption.adopter == adopter && &adoption.pet == pet)
            .cloned())
    }

    fn adoptions_for_pet(&self, pet: &PetId) -> Result<Vec<Adoption>, StoreError> {
        Ok(self
            .tables
            .adoptions
            .values()
            .filter(|adoption| &adoption.pet == pet)
            .cloned()
            .collect())
    }

    fn insert_adoption(&mut self, adoption: Adoption) -> Result<(), StoreError> {
        if self.tables.adoptions.contains_key(&adoption.id) {
            return Err(StoreError::Constraint(Constraint::DuplicateKey {
                key: adoption.id.to_string(),
            }));
        }
        if self.adoption_for(&adoption.adopter, &adoption.pet)?.is_some() {
            return Err(StoreError::Constraint(Constraint::UniqueApplication {
                adopter: adoption.adopter.clone(),
                pet: adoption.pet.clone(),
            }));
        }
        self.check_single_approval(&adoption)?;
        Arc::make_mut(&mut self.tables.adoptions).insert(adoption.id.clone(), adoption);
        Ok(())
    }

    fn update_adoption(&mut self, adoption: Adoption) -> Result<(), StoreError> {
        if !self.tables.adoptions.contains_key(&adoption.id) {
            return Err(missing("adoption", adoption.id.as_str()));
        }
        self.check_single_approval(&adoption)?;
        Arc::make_mut(&mut self.tables.adoptions).insert(adoption.id.clone(), adoption);
        Ok(())
    }

    fn remove_adoption(&mut self, id: &AdoptionId) -> Result<Option<Adoption>, StoreError> {
        Ok(Arc::make_mut(&mut self.tables.adoptions).remove(id))
    }

    fn entity(&self, id: &EntityId) -> Result<Option<VerifiableEntity>, StoreError> {
        Ok(self.tables.entities.get(id).cloned())
    }

    fn entity_for_owner(
        &self,
        owner: &UserId,
        kind: EntityKind,
    ) -> Result<Option<VerifiableEntity>, StoreError> {
        Ok(self
            .tables
            .entities
            .values()
            .find(|entity| &entity.owner == owner && entity.kind == kind)
            .cloned())
    }

    fn insert_entity(&mut self, entity: VerifiableEntity) -> Result<(), StoreError> {
        if self.tables.entities.contains_key(&entity.id) {
            return Err(StoreError::Constraint(Constraint::DuplicateKey {
                key: entity.id.to_string(),
            }));
        }
        if self.entity_for_owner(&entity.owner, entity.kind)?.is_some() {
            return Err(StoreError::Constraint(Constraint::UniqueEntityPerOwner {
                owner: entity.owner.clone(),
                kind: entity.kind,
            }));
        }
        Arc::make_mut(&mut self.tables.entities).insert(entity.id.clone(), entity);
        Ok(())
    }

    fn update_entity(&mut self, entity: VerifiableEntity) -> Result<(), StoreError> {
        match Arc::make_mut(&mut self.tables.entities).get_mut(&entity.id) {
            Some(slot) => {
                *slot = entity;
                Ok(())
            }
            None => Err(missing("entity", entity.id.as_str())),
        }
    }

    fn append_audit(&mut self, record: AuditRecord) -> Result<(), StoreError> {
        let duplicate = self
            .audit
            .iter()
            .chain(&self.appended)
            .any(|existing| existing.id == record.id);
        if duplicate {
            return Err(StoreError::Constraint(Constraint::DuplicateKey {
                key: record.id.to_string(),
            }));
        }
        self.appended.push(record);
        Ok(())
    }

    fn audit_for(&self, subject: &UserId) -> Result<Vec<AuditRecord>, StoreError> {
        Ok(self
            .audit
            .iter()
            .chain(&self.appended)
            .rev()
            .filter(|record| &record.subject == subject)
            .cloned()
            .collect())
    }
}
