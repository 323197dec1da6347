use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::adoption::Decision;
use super::audit::{self, AuditAction, AuditEntry, RequestOrigin};
use super::authz::{authorize, resolve_actor};
use super::domain::{
    BusinessProfile, EntityId, EntityKind, Reason, Role, UserId, VerifiableEntity,
    VerificationState,
};
use super::error::{Capability, LifecycleError};
use super::notify::{dispatch_detached, Notification, Notifier};
use super::store::LifecycleStore;
use crate::config::PolicyConfig;

/// Decision result plus the message handed to the notification channel.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOutcome {
    pub entity: VerifiableEntity,
    pub notification: Notification,
}

/// Review workflow gating shelter and vendor privileges.
pub struct VerificationWorkflow<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    policy: PolicyConfig,
}

impl<S, N> VerificationWorkflow<S, N>
where
    S: LifecycleStore + 'static,
    N: Notifier + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, policy: PolicyConfig) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    /// Submit a business profile for review, or resubmit after a rejection.
    pub fn apply(
        &self,
        owner: &UserId,
        kind: EntityKind,
        profile: BusinessProfile,
    ) -> Result<VerifiableEntity, LifecycleError> {
        validate_profile(&profile)?;
        // Verification precedes the role promotion, so adopters may apply too.
        let required = Capability::Role(kind.owner_role());
        let actor = resolve_actor(&*self.store, owner)?;
        if !(actor.holds(required) || actor.holds(Capability::Role(Role::Adopter))) {
            return Err(LifecycleError::Forbidden { required });
        }
        let cooldown = self.policy.reapply_cooldown;

        let entity = self.store.transaction(|tx| {
            let now = Utc::now();
            let Some(mut entity) = tx.entity_for_owner(&actor.id, kind)? else {
                let entity = VerifiableEntity {
                    id: EntityId::generate(),
                    kind,
                    owner: actor.id.clone(),
                    profile,
                    verified: false,
                    rejection_reason: None,
                    submitted_at: now,
                    decided_at: None,
                };
                tx.insert_entity(entity.clone())?;
                return Ok(entity);
            };

            match entity.state() {
                VerificationState::Approved => {
                    return Err(LifecycleError::AlreadyApproved { entity: entity.id })
                }
                VerificationState::PendingApproval => {
                    return Err(LifecycleError::VerificationPending { entity: entity.id })
                }
                VerificationState::Rejected => {}
            }
            if let (Some(cooldown), Some(decided_at)) = (cooldown, entity.decided_at) {
                let available_at = decided_at + cooldown;
                if now < available_at {
                    return Err(LifecycleError::ReapplyCooldown {
                        entity: entity.id,
                        available_at,
                    });
                }
            }

            entity.profile = profile;
            entity.rejection_reason = None;
            entity.submitted_at = now;
            entity.decided_at = None;
            tx.update_entity(entity.clone())?;
            Ok::<_, LifecycleError>(entity)
        })
        .map_err(|error| error.traced("apply_verification", &actor.id, &kind.label()))?;

        info!(
            entity = %entity.id,
            kind = entity.kind.label(),
            owner = %entity.owner,
            "verification submitted"
        );
        Ok(entity)
    }

    /// Approve or reject a pending business profile.
    pub fn decide(
        &self,
        admin: &UserId,
        entity_id: &EntityId,
        decision: Decision,
        reason: Option<&str>,
        origin: RequestOrigin,
    ) -> Result<VerificationOutcome, LifecycleError> {
        let reason = match decision {
            Decision::Reject => {
                let raw = reason.ok_or_else(|| LifecycleError::InvalidInput {
                    field: "reason",
                    message: "is required when rejecting".to_string(),
                })?;
                Some(self.reason(raw)?)
            }
            Decision::Approve => None,
        };
        let actor = authorize(&*self.store, admin, Capability::Admin)?;

        let entity = self.store.transaction(|tx| {
            let mut entity = tx
                .entity(entity_id)?
                .ok_or_else(|| LifecycleError::EntityNotFound(entity_id.clone()))?;
            if entity.verified {
                return Err(LifecycleError::AlreadyApproved { entity: entity.id });
            }

            let (action, audit_reason) = match reason {
                None => {
                    entity.verified = true;
                    entity.rejection_reason = None;
                    let action = AuditAction::VerificationApproved {
                        entity: entity.id.clone(),
                        entity_kind: entity.kind,
                    };
                    (action, Reason::fixed("Verification approved by administrator"))
                }
                Some(reason) => {
                    entity.rejection_reason = Some(reason.to_string());
                    let action = AuditAction::VerificationRejected {
                        entity: entity.id.clone(),
                        entity_kind: entity.kind,
                    };
                    (action, reason)
                }
            };
            entity.decided_at = Some(Utc::now());
            tx.update_entity(entity.clone())?;

            audit::append(
                tx,
                AuditEntry {
                    action,
                    reason: audit_reason,
                    actor: actor.id.clone(),
                    subject: entity.owner.clone(),
                    origin,
                },
            )?;
            Ok::<_, LifecycleError>(entity)
        })
        .map_err(|error| error.traced("decide_verification", &actor.id, entity_id))?;

        let notification = decision_notification(&entity);
        info!(
            entity = %entity.id,
            state = ?entity.state(),
            admin = %actor.id,
            "verification decided"
        );
        dispatch_detached(&*self.notifier, notification.clone());

        Ok(VerificationOutcome {
            entity,
            notification,
        })
    }

    fn reason(&self, raw: &str) -> Result<Reason, LifecycleError> {
        Reason::parse(
            "reason",
            raw,
            self.policy.reason_min_chars,
            self.policy.reason_max_chars,
        )
    }
}

fn validate_profile(profile: &BusinessProfile) -> Result<(), LifecycleError> {
    if profile.name.trim().is_empty() {
        return Err(LifecycleError::InvalidInput {
            field: "name",
            message: "must not be empty".to_string(),
        });
    }
    let email = profile.contact_email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(LifecycleError::InvalidInput {
            field: "contact_email",
            message: "must be an email address".to_string(),
        });
    }
    Ok(())
}

fn decision_notification(entity: &VerifiableEntity) -> Notification {
    let kind = entity.kind.label();
    let message = match &entity.rejection_reason {
        None => format!(
            "Your {kind} profile \"{}\" has been verified. You can now publish listings.",
            entity.profile.name
        ),
        Some(reason) => format!(
            "Your {kind} profile \"{}\" was not approved: {reason}. You may update it and apply again.",
            entity.profile.name
        ),
    };
    Notification {
        recipient: entity.owner.clone(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(email: &str) -> BusinessProfile {
        BusinessProfile {
            name: "Happy Tails Rescue".to_string(),
            contact_email: email.to_string(),
            phone: None,
            address: None,
            registration_number: None,
        }
    }

    #[test]
    fn profile_requires_plausible_email() {
        assert!(validate_profile(&profile("team@happytails.org")).is_ok());
        for bad in ["", "happytails.org", "@happytails.org", "team@localhost"] {
            assert!(
                validate_profile(&profile(bad)).is_err(),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejection_notification_quotes_reason() {
        let entity = VerifiableEntity {
            id: EntityId::new("ent-1"),
            kind: EntityKind::Vendor,
            owner: UserId::new("usr-9"),
            profile: profile("shop@kibble.example"),
            verified: false,
            rejection_reason: Some("Missing legal registration".to_string()),
            submitted_at: Utc::now(),
            decided_at: Some(Utc::now()),
        };
        let notification = decision_notification(&entity);
        assert_eq!(notification.recipient, UserId::new("usr-9"));
        assert!(notification.message.contains("vendor profile"));
        assert!(notification.message.contains("Missing legal registration"));
    }
}
