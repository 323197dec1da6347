use metrics_exporter_prometheus::PrometheusHandle;
use petmarket::lifecycle::{
    LifecycleError, LifecycleServices, LifecycleStore, MemoryStore, Notification, Notifier,
    NotifyError, Role, StoreError, User, UserId,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Marketplace = LifecycleServices<MemoryStore, InMemoryNotifier>;

/// Outbox standing in for the email/in-app delivery channel.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotifier {
    outbox: Arc<Mutex<Vec<Notification>>>,
}

impl Notifier for InMemoryNotifier {
    fn dispatch(&self, notification: Notification) -> Result<(), NotifyError> {
        let mut guard = self
            .outbox
            .lock()
            .map_err(|_| NotifyError::Transport("outbox mutex poisoned".to_string()))?;
        info!(recipient = %notification.recipient, "notification queued");
        guard.push(notification);
        Ok(())
    }
}

impl InMemoryNotifier {
    pub(crate) fn outbox(&self) -> Vec<Notification> {
        self.outbox
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Accounts created directly in the store, bypassing the lifecycle services.
pub(crate) fn seed_users(
    store: &MemoryStore,
    users: &[(&str, &str, Role)],
) -> Result<(), LifecycleError> {
    store.transaction(|tx| {
        for (id, name, role) in users {
            let email = format!("{id}@petmarket.local");
            tx.insert_user(User::new(UserId::new(*id), *name, email, *role))?;
        }
        Ok::<_, StoreError>(())
    })?;
    Ok(())
}
