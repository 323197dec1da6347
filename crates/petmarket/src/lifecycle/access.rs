//! Account suspension and role management for administrators.
//!
//! Every successful change writes exactly one audit record in the same
//! transaction as the user update.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::audit::{self, AuditAction, AuditEntry, AuditRecord, RequestOrigin};
use super::authz::authorize;
use super::domain::{BlockMetadata, Reason, Role, User, UserId, UserView};
use super::error::{Capability, LifecycleError};
use super::notify::{dispatch_detached, Notification, Notifier};
use super::store::LifecycleStore;
use crate::config::PolicyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockAction {
    Block,
    Unblock,
}

/// Confirmation requirement for a role transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleChangeClass {
    pub from: Role,
    pub to: Role,
    pub requires_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

/// Classify a role transition. Boundaries must obtain explicit operator
/// confirmation for every pair flagged here before calling
/// [`AccessControl::change_role`].
pub fn classify_role_change(from: Role, to: Role) -> RoleChangeClass {
    let message = match (from, to) {
        (from, Role::Admin) if from != Role::Admin => Some(
            "Granting administrator access gives full control over users, verification and audit data.",
        ),
        (Role::Shelter, Role::Adopter) => Some(
            "Demoting a shelter to adopter removes its ability to manage pets and adoption requests.",
        ),
        (Role::Vendor, Role::Adopter) => Some(
            "Demoting a vendor to adopter removes its ability to manage products and orders.",
        ),
        _ => None,
    };
    RoleChangeClass {
        from,
        to,
        requires_confirmation: message.is_some(),
        message,
    }
}

/// Committed role change with the audit record it produced.
#[derive(Debug, Clone, Serialize)]
pub struct RoleChangeOutcome {
    pub user: UserView,
    pub classification: RoleChangeClass,
    pub audit: AuditRecord,
}

/// Committed block or unblock with the audit record it produced.
#[derive(Debug, Clone, Serialize)]
pub struct BlockOutcome {
    pub user: UserView,
    pub audit: AuditRecord,
}

pub struct AccessControl<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    policy: PolicyConfig,
}

impl<S, N> AccessControl<S, N>
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

    /// Block or unblock `target`. Checks run in order: target exists, target is
    /// not the caller, target is not an admin, the action changes state.
    pub fn set_block_state(
        &self,
        admin: &UserId,
        target: &UserId,
        action: BlockAction,
        reason: &str,
        origin: RequestOrigin,
    ) -> Result<BlockOutcome, LifecycleError> {
        let reason = self.reason(reason)?;
        let actor = authorize(&*self.store, admin, Capability::Admin)?;

        let (user, audit) = self.store.transaction(|tx| {
            let mut user = tx
                .user(target)?
                .ok_or_else(|| LifecycleError::UserNotFound(target.clone()))?;
            if user.id == actor.id {
                return Err(LifecycleError::SelfBlockForbidden);
            }
            if user.role == Role::Admin {
                return Err(LifecycleError::AdminProtected);
            }

            let now = Utc::now();
            let audit_action = match (action, user.is_active()) {
                (BlockAction::Block, true) => {
                    user.block = Some(BlockMetadata {
                        blocked_at: now,
                        blocked_by: actor.id.clone(),
                        reason: reason.to_string(),
                    });
                    AuditAction::Block
                }
                (BlockAction::Unblock, false) => {
                    user.block = None;
                    AuditAction::Unblock
                }
                (BlockAction::Block, false) => {
                    return Err(LifecycleError::NoOpRejected {
                        detail: "user is already blocked".to_string(),
                    })
                }
                (BlockAction::Unblock, true) => {
                    return Err(LifecycleError::NoOpRejected {
                        detail: "user is already active".to_string(),
                    })
                }
            };
            user.updated_at = now;
            tx.update_user(user.clone())?;

            let record = audit::append(
                tx,
                AuditEntry {
                    action: audit_action,
                    reason,
                    actor: actor.id.clone(),
                    subject: user.id.clone(),
                    origin,
                },
            )?;
            Ok::<_, LifecycleError>((user, record))
        })
        .map_err(|error| error.traced("set_block_state", &actor.id, target))?;

        info!(
            target = %user.id,
            admin = %actor.id,
            action = audit.action.label(),
            audit = %audit.id,
            "account access changed"
        );
        dispatch_detached(&*self.notifier, block_notification(&user, action));

        Ok(BlockOutcome {
            user: user.view(),
            audit,
        })
    }

    /// Classify a pending role change against the target's stored role so a
    /// boundary can ask for confirmation. Validates and authorizes exactly as
    /// [`Self::change_role`] does, without writing.
    pub fn preview_role_change(
        &self,
        admin: &UserId,
        target: &UserId,
        new_role: Role,
        reason: &str,
    ) -> Result<RoleChangeClass, LifecycleError> {
        self.reason(reason)?;
        authorize(&*self.store, admin, Capability::Admin)?;
        let current = self
            .store
            .transaction(|tx| {
                tx.user(target)?
                    .map(|user| user.role)
                    .ok_or_else(|| LifecycleError::UserNotFound(target.clone()))
            })
            .map_err(|error| error.traced("preview_role_change", admin, target))?;
        Ok(classify_role_change(current, new_role))
    }

    /// Change `target`'s role. Critical pairs (see [`classify_role_change`])
    /// are expected to have been confirmed by the operator already.
    ///
    /// `expected_current` is the role the caller classified the change
    /// against; if the stored role differs when the transaction runs, nothing
    /// is written and [`LifecycleError::RoleChanged`] is returned.
    pub fn change_role(
        &self,
        admin: &UserId,
        target: &UserId,
        new_role: Role,
        expected_current: Option<Role>,
        reason: &str,
        origin: RequestOrigin,
    ) -> Result<RoleChangeOutcome, LifecycleError> {
        let reason = self.reason(reason)?;
        let actor = authorize(&*self.store, admin, Capability::Admin)?;

        let (user, previous, audit) = self
            .store
            .transaction(|tx| {
                let mut user = tx
                    .user(target)?
                    .ok_or_else(|| LifecycleError::UserNotFound(target.clone()))?;
                if let Some(expected) = expected_current {
                    if user.role != expected {
                        return Err(LifecycleError::RoleChanged {
                            user: user.id,
                            expected,
                            current: user.role,
                        });
                    }
                }
                if user.role == new_role {
                    return Err(LifecycleError::NoOpRejected {
                        detail: format!("user already has role {new_role}"),
                    });
                }
                if user.id == actor.id {
                    return Err(LifecycleError::SelfRoleChangeForbidden);
                }

                let previous = user.role;
                user.role = new_role;
                user.updated_at = Utc::now();
                tx.update_user(user.clone())?;

                let record = audit::append(
                    tx,
                    AuditEntry {
                        action: AuditAction::RoleChange {
                            from: previous,
                            to: new_role,
                        },
                        reason,
                        actor: actor.id.clone(),
                        subject: user.id.clone(),
                        origin,
                    },
                )?;
                Ok::<_, LifecycleError>((user, previous, record))
            })
            .map_err(|error| error.traced("change_role", &actor.id, target))?;

        let classification = classify_role_change(previous, new_role);
        info!(
            target = %user.id,
            admin = %actor.id,
            from = %previous,
            to = %new_role,
            critical = classification.requires_confirmation,
            audit = %audit.id,
            "role changed"
        );

        Ok(RoleChangeOutcome {
            user: user.view(),
            classification,
            audit,
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

fn block_notification(user: &User, action: BlockAction) -> Notification {
    let message = match (action, &user.block) {
        (BlockAction::Block, Some(block)) => format!(
            "Your account has been suspended by an administrator. Reason: {}",
            block.reason
        ),
        _ => "Your account has been reactivated. You can sign in again.".to_string(),
    };
    Notification {
        recipient: user.id.clone(),
        message,
    }
}
