use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::Utc;
use serde_json::Value;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::PolicyConfig;
use crate::lifecycle::audit::{AuditRecord, RequestOrigin};
use crate::lifecycle::domain::{
    Adoption, AdoptionId, BusinessProfile, EntityId, EntityKind, Pet, PetId, PetStatus, Role, Sex,
    User, UserId, VerifiableEntity,
};
use crate::lifecycle::notify::{Notification, Notifier, NotifyError};
use crate::lifecycle::store::{LifecycleStore, MemoryStore, StoreError, Transaction};
use crate::lifecycle::LifecycleServices;

pub(super) fn admin() -> UserId {
    UserId::new("usr-admin")
}

pub(super) fn second_admin() -> UserId {
    UserId::new("usr-admin-2")
}

pub(super) fn ada() -> UserId {
    UserId::new("usr-ada")
}

pub(super) fn ben() -> UserId {
    UserId::new("usr-ben")
}

pub(super) fn cy() -> UserId {
    UserId::new("usr-cy")
}

pub(super) fn shelter_user() -> UserId {
    UserId::new("usr-shelter")
}

pub(super) fn rival_shelter_user() -> UserId {
    UserId::new("usr-shelter-2")
}

pub(super) fn unverified_shelter_user() -> UserId {
    UserId::new("usr-new-shelter")
}

pub(super) fn vendor_user() -> UserId {
    UserId::new("usr-vendor")
}

pub(super) fn shelter() -> EntityId {
    EntityId::new("ent-shelter")
}

pub(super) fn unverified_shelter() -> EntityId {
    EntityId::new("ent-new-shelter")
}

/// AVAILABLE pet listed by the verified shelter.
pub(super) fn rex() -> PetId {
    PetId::new("pet-rex")
}

/// AVAILABLE pet whose shelter has not been verified.
pub(super) fn luna() -> PetId {
    PetId::new("pet-luna")
}

pub(super) fn origin() -> RequestOrigin {
    RequestOrigin {
        ip_address: Some("198.51.100.20".to_string()),
        client: Some("admin-console/2.1".to_string()),
    }
}

pub(super) fn profile(name: &str) -> BusinessProfile {
    BusinessProfile {
        name: name.to_string(),
        contact_email: "hello@happytails.test".to_string(),
        phone: Some("+1 515 555 0100".to_string()),
        address: None,
        registration_number: Some("IA-44120".to_string()),
    }
}

fn entity(id: EntityId, kind: EntityKind, owner: UserId, verified: bool) -> VerifiableEntity {
    VerifiableEntity {
        id,
        kind,
        owner,
        profile: profile("Happy Tails Rescue"),
        verified,
        rejection_reason: None,
        submitted_at: Utc::now(),
        decided_at: verified.then(Utc::now),
    }
}

fn pet(id: PetId, shelter: EntityId, name: &str) -> Pet {
    let now = Utc::now();
    Pet {
        id,
        shelter,
        name: name.to_string(),
        species: "dog".to_string(),
        breed: Some("Beagle".to_string()),
        age_months: Some(18),
        sex: Sex::Male,
        description: "Friendly and house trained.".to_string(),
        images: Vec::new(),
        status: PetStatus::Available,
        created_at: now,
        updated_at: now,
    }
}

pub(super) fn seed(store: &MemoryStore) {
    let users = [
        (admin(), "Avery Admin", Role::Admin),
        (second_admin(), "Blair Admin", Role::Admin),
        (ada(), "Ada", Role::Adopter),
        (ben(), "Ben", Role::Adopter),
        (cy(), "Cy", Role::Adopter),
        (shelter_user(), "Happy Tails", Role::Shelter),
        (rival_shelter_user(), "Paws Place", Role::Shelter),
        (unverified_shelter_user(), "New Leash", Role::Shelter),
        (vendor_user(), "Kibble Co", Role::Vendor),
    ];

    store
        .transaction(|tx| {
            for (id, name, role) in users {
                let email = format!("{}@petmarket.test", id.as_str());
                tx.insert_user(User::new(id, name, email, role))?;
            }
            tx.insert_entity(entity(shelter(), EntityKind::Shelter, shelter_user(), true))?;
            tx.insert_entity(entity(
                EntityId::new("ent-shelter-2"),
                EntityKind::Shelter,
                rival_shelter_user(),
                true,
            ))?;
            tx.insert_entity(entity(
                unverified_shelter(),
                EntityKind::Shelter,
                unverified_shelter_user(),
                false,
            ))?;
            tx.insert_pet(pet(rex(), shelter(), "Rex"))?;
            tx.insert_pet(pet(luna(), unverified_shelter(), "Luna"))?;
            Ok::<_, StoreError>(())
        })
        .expect("seed succeeds");
}

pub(super) struct Marketplace {
    pub(super) store: Arc<MemoryStore>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) services: Arc<LifecycleServices<MemoryStore, RecordingNotifier>>,
}

pub(super) fn marketplace() -> Marketplace {
    marketplace_with(PolicyConfig::default())
}

pub(super) fn marketplace_with(policy: PolicyConfig) -> Marketplace {
    let store = Arc::new(MemoryStore::new());
    seed(&store);
    let notifier = Arc::new(RecordingNotifier::default());
    let services = Arc::new(LifecycleServices::new(
        store.clone(),
        notifier.clone(),
        policy,
    ));
    Marketplace {
        store,
        notifier,
        services,
    }
}

impl Marketplace {
    pub(super) fn pet(&self, id: &PetId) -> Option<Pet> {
        read(&*self.store, |tx| tx.pet(id))
    }

    pub(super) fn pet_status(&self, id: &PetId) -> PetStatus {
        self.pet(id).expect("pet present").status
    }

    pub(super) fn adoption(&self, id: &AdoptionId) -> Option<Adoption> {
        read(&*self.store, |tx| tx.adoption(id))
    }

    pub(super) fn adoptions_for(&self, pet: &PetId) -> Vec<Adoption> {
        read(&*self.store, |tx| tx.adoptions_for_pet(pet))
    }

    pub(super) fn user(&self, id: &UserId) -> User {
        read(&*self.store, |tx| tx.user(id)).expect("user present")
    }

    pub(super) fn entity(&self, id: &EntityId) -> VerifiableEntity {
        read(&*self.store, |tx| tx.entity(id)).expect("entity present")
    }

    pub(super) fn audit_for(&self, subject: &UserId) -> Vec<AuditRecord> {
        read(&*self.store, |tx| tx.audit_for(subject))
    }
}

pub(super) fn read<S, T>(
    store: &S,
    query: impl FnOnce(&mut dyn Transaction) -> Result<T, StoreError>,
) -> T
where
    S: LifecycleStore + ?Sized,
{
    store.transaction(query).expect("read succeeds")
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn dispatch(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn dispatch(&self, _notification: Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay refused connection".to_string()))
    }
}

/// Store whose audit table rejects every append, to prove the surrounding
/// write is rolled back with it.
pub(super) struct AuditOutageStore {
    pub(super) inner: MemoryStore,
}

impl LifecycleStore for AuditOutageStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.inner.transaction(|tx| {
            let mut guarded = NoAudit { inner: tx };
            work(&mut guarded)
        })
    }
}

struct NoAudit<'a> {
    inner: &'a mut dyn Transaction,
}

impl Transaction for NoAudit<'_> {
    fn user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        self.inner.user(id)
    }

    fn insert_user(&mut self, user: User) -> Result<(), StoreError> {
        self.inner.insert_user(user)
    }

    fn update_user(&mut self, user: User) -> Result<(), StoreError> {
        self.inner.update_user(user)
    }

    fn pet(&self, id: &PetId) -> Result<Option<Pet>, StoreError> {
        self.inner.pet(id)
    }

    fn insert_pet(&mut self, pet: Pet) -> Result<(), StoreError> {
        self.inner.insert_pet(pet)
    }

    fn update_pet(&mut self, pet: Pet) -> Result<(), StoreError> {
        self.inner.update_pet(pet)
    }

    fn remove_pet(&mut self, id: &PetId) -> Result<Option<Pet>, StoreError> {
        self.inner.remove_pet(id)
    }

    fn adoption(&self, id: &AdoptionId) -> Result<Option<Adoption>, StoreError> {
        self.inner.adoption(id)
    }

    fn adoption_for(
        &self,
        adopter: &UserId,
        pet: &PetId,
    ) -> Result<Option<Adoption>, StoreError> {
        self.inner.adoption_for(adopter, pet)
    }

    fn adoptions_for_pet(&self, pet: &PetId) -> Result<Vec<Adoption>, StoreError> {
        self.inner.adoptions_for_pet(pet)
    }

    fn insert_adoption(&mut self, adoption: Adoption) -> Result<(), StoreError> {
        self.inner.insert_adoption(adoption)
    }

    fn update_adoption(&mut self, adoption: Adoption) -> Result<(), StoreError> {
        self.inner.update_adoption(adoption)
    }

    fn remove_adoption(&mut self, id: &AdoptionId) -> Result<Option<Adoption>, StoreError> {
        self.inner.remove_adoption(id)
    }

    fn entity(&self, id: &EntityId) -> Result<Option<VerifiableEntity>, StoreError> {
        self.inner.entity(id)
    }

    fn entity_for_owner(
        &self,
        owner: &UserId,
        kind: EntityKind,
    ) -> Result<Option<VerifiableEntity>, StoreError> {
        self.inner.entity_for_owner(owner, kind)
    }

    fn insert_entity(&mut self, entity: VerifiableEntity) -> Result<(), StoreError> {
        self.inner.insert_entity(entity)
    }

    fn update_entity(&mut self, entity: VerifiableEntity) -> Result<(), StoreError> {
        self.inner.update_entity(entity)
    }

    fn append_audit(&mut self, _record: AuditRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("audit table offline".to_string()))
    }

    fn audit_for(&self, subject: &UserId) -> Result<Vec<AuditRecord>, StoreError> {
        self.inner.audit_for(subject)
    }
}

/// Store that cannot open a transaction at all.
pub(super) struct UnavailableStore;

impl LifecycleStore for UnavailableStore {
    fn transaction<T, E, F>(&self, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        Err(E::from(StoreError::Unavailable(
            "connection pool exhausted".to_string(),
        )))
    }
}

/// Store that rewrites one user's role right before its n-th transaction
/// opens, standing in for another admin acting between two requests' reads.
pub(super) struct RoleFlipStore {
    pub(super) inner: MemoryStore,
    target: UserId,
    role: Role,
    flip_before: usize,
    opened: AtomicUsize,
}

impl RoleFlipStore {
    pub(super) fn new(inner: MemoryStore, target: UserId, role: Role, flip_before: usize) -> Self {
        Self {
            inner,
            target,
            role,
            flip_before,
            opened: AtomicUsize::new(0),
        }
    }
}

impl LifecycleStore for RoleFlipStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        if self.opened.fetch_add(1, Ordering::SeqCst) == self.flip_before {
            self.inner.transaction(|tx| {
                let mut user = tx
                    .user(&self.target)?
                    .ok_or_else(|| StoreError::Missing(self.target.to_string()))?;
                user.role = self.role;
                tx.update_user(user)
            })?;
        }
        self.inner.transaction(work)
    }
}

/// Log sink for asserting on emitted events.
#[derive(Clone, Default)]
pub(super) struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub(super) fn contents(&self) -> String {
        let buffer = self.buffer.lock().expect("log buffer poisoned");
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .expect("log buffer poisoned")
            .extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
