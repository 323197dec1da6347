use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::LifecycleError;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn generate() -> Self {
                static SEQUENCE: AtomicU64 = AtomicU64::new(1);
                let id = SEQUENCE.fetch_add(1, Ordering::Relaxed);
                Self(format!(concat!($prefix, "-{:06}"), id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Account identity shared by adopters, shelters, vendors and admins.
    UserId,
    "usr"
);
identifier!(PetId, "pet");
identifier!(AdoptionId, "adp");
identifier!(
    /// Identity of a shelter or vendor business profile.
    EntityId,
    "ent"
);
identifier!(AuditId, "aud");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Adopter,
    Shelter,
    Vendor,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Adopter => "ADOPTER",
            Role::Shelter => "SHELTER",
            Role::Vendor => "VENDOR",
            Role::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PetStatus {
    Available,
    InProcess,
    Adopted,
}

impl PetStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PetStatus::Available => "AVAILABLE",
            PetStatus::InProcess => "IN_PROCESS",
            PetStatus::Adopted => "ADOPTED",
        }
    }
}

impl fmt::Display for PetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdoptionStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl AdoptionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AdoptionStatus::Pending => "PENDING",
            AdoptionStatus::Approved => "APPROVED",
            AdoptionStatus::Rejected => "REJECTED",
            AdoptionStatus::Completed => "COMPLETED",
            AdoptionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for AdoptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sex {
    Male,
    Female,
    Unknown,
}

/// Adoptable animal listed by a shelter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub id: PetId,
    pub shelter: EntityId,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub age_months: Option<u16>,
    pub sex: Sex,
    pub description: String,
    pub images: Vec<String>,
    pub status: PetStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing fields supplied by a shelter when creating a pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetListing {
    pub name: String,
    pub species: String,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub age_months: Option<u16>,
    pub sex: Sex,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// One adopter's request for one pet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adoption {
    pub id: AdoptionId,
    pub adopter: UserId,
    pub pet: PetId,
    pub status: AdoptionStatus,
    pub message: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Block metadata recorded while an account is suspended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub blocked_at: DateTime<Utc>,
    pub blocked_by: UserId,
    pub reason: String,
}

/// Marketplace account. An account is active exactly when it carries no block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub block: Option<BlockMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        id: UserId,
        display_name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            display_name: display_name.into(),
            email: email.into(),
            role,
            block: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.block.is_none()
    }

    pub fn view(&self) -> UserView {
        UserView {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
            is_active: self.is_active(),
            blocked_at: self.block.as_ref().map(|block| block.blocked_at),
            block_reason: self.block.as_ref().map(|block| block.reason.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountState {
    Active,
    Blocked,
}

impl AccountState {
    pub const fn label(self) -> &'static str {
        match self {
            AccountState::Active => "ACTIVE",
            AccountState::Blocked => "BLOCKED",
        }
    }
}

/// Safe projection of a user returned to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub display_name: String,
    pub role: Role,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Shelter,
    Vendor,
}

impl EntityKind {
    /// Role an owner must hold to apply for this kind of profile.
    pub const fn owner_role(self) -> Role {
        match self {
            EntityKind::Shelter => Role::Shelter,
            EntityKind::Vendor => Role::Vendor,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            EntityKind::Shelter => "shelter",
            EntityKind::Vendor => "vendor",
        }
    }
}

/// Business details submitted with a verification application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessProfile {
    pub name: String,
    pub contact_email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
}

/// Where a verifiable entity sits in its review lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationState {
    PendingApproval,
    Approved,
    Rejected,
}

/// Shelter or vendor business profile awaiting or holding verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiableEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub owner: UserId,
    pub profile: BusinessProfile,
    pub verified: bool,
    pub rejection_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl VerifiableEntity {
    pub fn state(&self) -> VerificationState {
        match (self.verified, &self.rejection_reason) {
            (true, _) => VerificationState::Approved,
            (false, Some(_)) => VerificationState::Rejected,
            (false, None) => VerificationState::PendingApproval,
        }
    }
}

/// Operator justification, trimmed and bounded by character count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reason(String);

impl Reason {
    pub fn parse(
        field: &'static str,
        raw: &str,
        min_chars: usize,
        max_chars: usize,
    ) -> Result<Self, LifecycleError> {
        let trimmed = raw.trim();
        let length = trimmed.chars().count();
        if length < min_chars || length > max_chars {
            return Err(LifecycleError::InvalidInput {
                field,
                message: format!(
                    "must be between {min_chars} and {max_chars} characters (got {length})"
                ),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Server-authored justification that bypasses operator bounds.
    pub(crate) fn fixed(text: &'static str) -> Self {
        Self(text.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
