use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::authz::authorize;
use super::domain::{AccountState, AuditId, EntityId, EntityKind, Reason, Role, UserId};
use super::error::{Capability, LifecycleError};
use super::store::{LifecycleStore, StoreError, Transaction};

/// Network origin of the request that triggered a privileged change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOrigin {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

impl RequestOrigin {
    pub fn is_empty(&self) -> bool {
        self.ip_address.is_none() && self.client.is_none()
    }
}

/// What a privileged change did. Each kind carries only the fields it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Block,
    Unblock,
    RoleChange {
        from: Role,
        to: Role,
    },
    VerificationApproved {
        entity: EntityId,
        entity_kind: EntityKind,
    },
    VerificationRejected {
        entity: EntityId,
        entity_kind: EntityKind,
    },
}

impl AuditAction {
    pub const fn label(&self) -> &'static str {
        match self {
            AuditAction::Block => "BLOCK",
            AuditAction::Unblock => "UNBLOCK",
            AuditAction::RoleChange { .. } => "ROLE_CHANGE",
            AuditAction::VerificationApproved { .. } => "VERIFICATION_APPROVED",
            AuditAction::VerificationRejected { .. } => "VERIFICATION_REJECTED",
        }
    }

    pub fn old_value(&self) -> &'static str {
        match self {
            AuditAction::Block => AccountState::Active.label(),
            AuditAction::Unblock => AccountState::Blocked.label(),
            AuditAction::RoleChange { from, .. } => from.label(),
            AuditAction::VerificationApproved { .. }
            | AuditAction::VerificationRejected { .. } => "UNVERIFIED",
        }
    }

    pub fn new_value(&self) -> &'static str {
        match self {
            AuditAction::Block => AccountState::Blocked.label(),
            AuditAction::Unblock => AccountState::Active.label(),
            AuditAction::RoleChange { to, .. } => to.label(),
            AuditAction::VerificationApproved { .. } => "VERIFIED",
            AuditAction::VerificationRejected { .. } => "REJECTED",
        }
    }
}

/// Immutable audit entry as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditId,
    #[serde(flatten)]
    pub action: AuditAction,
    pub reason: Reason,
    pub actor: UserId,
    pub subject: UserId,
    #[serde(default, skip_serializing_if = "RequestOrigin::is_empty")]
    pub origin: RequestOrigin,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn view(&self) -> AuditRecordView {
        AuditRecordView {
            id: self.id.clone(),
            action: self.action.label(),
            old_value: self.action.old_value(),
            new_value: self.action.new_value(),
            reason: self.reason.to_string(),
            actor: self.actor.clone(),
            subject: self.subject.clone(),
            origin: self.origin.clone(),
            recorded_at: self.recorded_at,
        }
    }
}

/// Flat audit representation for operator tooling.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecordView {
    pub id: AuditId,
    pub action: &'static str,
    pub old_value: &'static str,
    pub new_value: &'static str,
    pub reason: String,
    pub actor: UserId,
    pub subject: UserId,
    #[serde(skip_serializing_if = "RequestOrigin::is_empty")]
    pub origin: RequestOrigin,
    pub recorded_at: DateTime<Utc>,
}

/// Caller-supplied part of an audit record; id and timestamp are assigned on append.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: AuditAction,
    pub reason: Reason,
    pub actor: UserId,
    pub subject: UserId,
    pub origin: RequestOrigin,
}

/// Append `entry` inside the caller's transaction.
pub fn append(tx: &mut dyn Transaction, entry: AuditEntry) -> Result<AuditRecord, StoreError> {
    let record = AuditRecord {
        id: AuditId::generate(),
        action: entry.action,
        reason: entry.reason,
        actor: entry.actor,
        subject: entry.subject,
        origin: entry.origin,
        recorded_at: Utc::now(),
    };
    tx.append_audit(record.clone())?;
    Ok(record)
}

/// Read access to the audit trail for administrators.
pub struct AuditLog<S> {
    store: Arc<S>,
}

impl<S> AuditLog<S>
where
    S: LifecycleStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Records about `subject`, newest first.
    pub fn trail(
        &self,
        admin: &UserId,
        subject: &UserId,
    ) -> Result<Vec<AuditRecord>, LifecycleError> {
        authorize(&*self.store, admin, Capability::Admin)?;
        self.store.transaction(|tx| {
            if tx.user(subject)?.is_none() {
                return Err(LifecycleError::UserNotFound(subject.clone()));
            }
            Ok(tx.audit_for(subject)?)
        })
        .map_err(|error| error.traced("audit_trail", admin, subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_change_values_mirror_roles() {
        let action = AuditAction::RoleChange {
            from: Role::Vendor,
            to: Role::Adopter,
        };
        assert_eq!(action.old_value(), "VENDOR");
        assert_eq!(action.new_value(), "ADOPTER");
        assert_eq!(action.label(), "ROLE_CHANGE");
    }

    #[test]
    fn block_and_unblock_are_inverse() {
        assert_eq!(AuditAction::Block.old_value(), AuditAction::Unblock.new_value());
        assert_eq!(AuditAction::Block.new_value(), AuditAction::Unblock.old_value());
    }

    #[test]
    fn serialized_record_is_tagged_by_action() {
        let record = AuditRecord {
            id: AuditId::new("aud-1"),
            action: AuditAction::RoleChange {
                from: Role::Adopter,
                to: Role::Admin,
            },
            reason: Reason::parse("reason", "Promoted to moderation team", 10, 500)
                .expect("valid reason"),
            actor: UserId::new("usr-admin"),
            subject: UserId::new("usr-2"),
            origin: RequestOrigin::default(),
            recorded_at: Utc::now(),
        };
        let value = serde_json::to_value(&record).expect("serializes");
        assert_eq!(value["action"], "ROLE_CHANGE");
        assert_eq!(value["from"], "ADOPTER");
        assert_eq!(value["to"], "ADMIN");
        assert!(value.get("origin").is_none());
    }
}
