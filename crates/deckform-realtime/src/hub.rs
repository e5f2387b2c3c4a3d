use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use deckform_core::models::{EventScope, HubEvent};

/// Fan-out hub for live client connections.
///
/// Each subscriber gets its own bounded broadcast channel, so one slow
/// client lags (and loses its oldest buffered events) without affecting
/// anyone else. Connection state lives only in memory; a restart drops all
/// subscriptions and clients are expected to resubscribe and pull current
/// state.
pub struct NotificationHub {
    connections: Mutex<HashMap<u64, Connection>>,
    next_id: AtomicU64,
    buffer: usize,
}

struct Connection {
    tenant_id: Uuid,
    user_id: Uuid,
    tx: broadcast::Sender<HubEvent>,
    assemblies: HashSet<Uuid>,
    tasks: HashSet<Uuid>,
}

impl Connection {
    fn wants(&self, tenant_id: Uuid, scope: EventScope) -> bool {
        if self.tenant_id != tenant_id {
            return false;
        }
        match scope {
            EventScope::Tenant => true,
            EventScope::Assembly(id) => self.assemblies.contains(&id),
            EventScope::Task(id) => self.tasks.contains(&id),
        }
    }
}

impl NotificationHub {
    /// `buffer` bounds each subscriber's event queue. A full queue evicts
    /// the oldest event on the next send.
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer,
        }
    }

    /// Register a connection for a user. The returned handle deregisters
    /// on drop; the receiver yields events matching the connection's tenant
    /// and interest set.
    pub fn subscribe(
        self: &Arc<Self>,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> (SubscriptionHandle, broadcast::Receiver<HubEvent>) {
        let (tx, rx) = broadcast::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut connections = self.lock_connections();
            connections.insert(
                id,
                Connection {
                    tenant_id,
                    user_id,
                    tx,
                    assemblies: HashSet::new(),
                    tasks: HashSet::new(),
                },
            );
            debug!(
                tenant_id = %tenant_id,
                user_id = %user_id,
                total = connections.len(),
                "hub connection opened"
            );
        }
        (
            SubscriptionHandle {
                hub: Arc::clone(self),
                id,
            },
            rx,
        )
    }

    /// Deliver an event to every connection of `tenant_id` whose interest
    /// set covers the event's scope. Sends never block; a lagging receiver
    /// observes a gap instead.
    pub fn publish(&self, tenant_id: Uuid, event: HubEvent) {
        let scope = event.scope();
        let targets: Vec<broadcast::Sender<HubEvent>> = {
            let connections = self.lock_connections();
            connections
                .values()
                .filter(|c| c.wants(tenant_id, scope))
                .map(|c| c.tx.clone())
                .collect()
        };
        let mut delivered = 0usize;
        for tx in targets {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        debug!(tenant_id = %tenant_id, kind = event.kind(), delivered, "hub event published");
    }

    /// Distinct users of `tenant_id` currently watching `assembly_id`.
    pub fn active_users(&self, tenant_id: Uuid, assembly_id: Uuid) -> Vec<Uuid> {
        let connections = self.lock_connections();
        Self::active_users_locked(&connections, tenant_id, assembly_id)
    }

    fn active_users_locked(
        connections: &HashMap<u64, Connection>,
        tenant_id: Uuid,
        assembly_id: Uuid,
    ) -> Vec<Uuid> {
        let mut users: Vec<Uuid> = connections
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.assemblies.contains(&assembly_id))
            .map(|c| c.user_id)
            .collect();
        users.sort();
        users.dedup();
        users
    }

    fn watch_assembly(&self, id: u64, assembly_id: Uuid) {
        let presence = {
            let mut connections = self.lock_connections();
            let Some(conn) = connections.get_mut(&id) else {
                return;
            };
            let tenant_id = conn.tenant_id;
            if !conn.assemblies.insert(assembly_id) {
                return;
            }
            Some((
                tenant_id,
                Self::active_users_locked(&connections, tenant_id, assembly_id),
            ))
        };
        if let Some((tenant_id, active_users)) = presence {
            self.publish(
                tenant_id,
                HubEvent::PresenceChanged {
                    assembly_id,
                    active_users,
                },
            );
        }
    }

    fn unwatch_assembly(&self, id: u64, assembly_id: Uuid) {
        let presence = {
            let mut connections = self.lock_connections();
            let Some(conn) = connections.get_mut(&id) else {
                return;
            };
            let tenant_id = conn.tenant_id;
            if !conn.assemblies.remove(&assembly_id) {
                return;
            }
            Some((
                tenant_id,
                Self::active_users_locked(&connections, tenant_id, assembly_id),
            ))
        };
        if let Some((tenant_id, active_users)) = presence {
            self.publish(
                tenant_id,
                HubEvent::PresenceChanged {
                    assembly_id,
                    active_users,
                },
            );
        }
    }

    fn watch_task(&self, id: u64, task_id: Uuid) {
        let mut connections = self.lock_connections();
        if let Some(conn) = connections.get_mut(&id) {
            conn.tasks.insert(task_id);
        }
    }

    fn unwatch_task(&self, id: u64, task_id: Uuid) {
        let mut connections = self.lock_connections();
        if let Some(conn) = connections.get_mut(&id) {
            conn.tasks.remove(&task_id);
        }
    }

    fn remove(&self, id: u64) {
        let departed = {
            let mut connections = self.lock_connections();
            let Some(conn) = connections.remove(&id) else {
                return;
            };
            debug!(
                tenant_id = %conn.tenant_id,
                total = connections.len(),
                "hub connection closed"
            );
            let presences: Vec<(Uuid, Vec<Uuid>)> = conn
                .assemblies
                .iter()
                .map(|&assembly_id| {
                    (
                        assembly_id,
                        Self::active_users_locked(&connections, conn.tenant_id, assembly_id),
                    )
                })
                .collect();
            (conn.tenant_id, presences)
        };
        let (tenant_id, presences) = departed;
        for (assembly_id, active_users) in presences {
            self.publish(
                tenant_id,
                HubEvent::PresenceChanged {
                    assembly_id,
                    active_users,
                },
            );
        }
    }

    fn lock_connections(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Connection>> {
        match self.connections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("hub connection map mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Keeps a hub connection registered; dropping it deregisters the
/// connection and announces updated presence for any watched assemblies.
pub struct SubscriptionHandle {
    hub: Arc<NotificationHub>,
    id: u64,
}

impl SubscriptionHandle {
    pub fn watch_assembly(&self, assembly_id: Uuid) {
        self.hub.watch_assembly(self.id, assembly_id);
    }

    pub fn unwatch_assembly(&self, assembly_id: Uuid) {
        self.hub.unwatch_assembly(self.id, assembly_id);
    }

    pub fn watch_task(&self, task_id: Uuid) {
        self.hub.watch_task(self.id, task_id);
    }

    pub fn unwatch_task(&self, task_id: Uuid) {
        self.hub.unwatch_task(self.id, task_id);
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.hub.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckform_core::models::TaskStatus;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn task_event(task_id: Uuid, progress: f64) -> HubEvent {
        HubEvent::TaskProgress {
            task_id,
            status: TaskStatus::Processing,
            progress,
            message: None,
        }
    }

    fn assembly_event(assembly_id: Uuid) -> HubEvent {
        HubEvent::AssemblyChanged {
            assembly_id,
            resulting_order: vec![],
            changed_by: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn events_do_not_cross_tenants() {
        let hub = Arc::new(NotificationHub::new(8));
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        let assembly_id = Uuid::new_v4();

        let (handle_a, mut rx_a) = hub.subscribe(tenant_a, Uuid::new_v4());
        let (handle_b, mut rx_b) = hub.subscribe(tenant_b, Uuid::new_v4());
        handle_a.watch_assembly(assembly_id);
        handle_b.watch_assembly(assembly_id);
        // drain the presence announcements from the watch calls
        while rx_a.try_recv().is_ok() {}
        while rx_b.try_recv().is_ok() {}

        hub.publish(tenant_a, assembly_event(assembly_id));

        let got = rx_a.recv().await.unwrap();
        assert_eq!(got.kind(), "ASSEMBLY_CHANGED");
        assert!(matches!(rx_b.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn task_events_require_task_interest() {
        let hub = Arc::new(NotificationHub::new(8));
        let tenant_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();

        let (watcher, mut watcher_rx) = hub.subscribe(tenant_id, Uuid::new_v4());
        let (_bystander, mut bystander_rx) = hub.subscribe(tenant_id, Uuid::new_v4());
        watcher.watch_task(task_id);

        hub.publish(tenant_id, task_event(task_id, 0.25));

        assert_eq!(watcher_rx.recv().await.unwrap().kind(), "TASK_PROGRESS");
        assert!(matches!(bystander_rx.try_recv(), Err(TryRecvError::Empty)));

        watcher.unwatch_task(task_id);
        hub.publish(tenant_id, task_event(task_id, 0.5));
        assert!(matches!(watcher_rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn slow_subscriber_loses_oldest_events() {
        let hub = Arc::new(NotificationHub::new(2));
        let tenant_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();

        let (handle, mut rx) = hub.subscribe(tenant_id, Uuid::new_v4());
        handle.watch_task(task_id);

        for i in 0..5 {
            hub.publish(tenant_id, task_event(task_id, f64::from(i) / 5.0));
        }

        // the gap is reported once, then the newest buffered events follow
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        let got = rx.recv().await.unwrap();
        assert!(matches!(
            got,
            HubEvent::TaskProgress { progress, .. } if (progress - 0.6).abs() < 1e-9
        ));
        let got = rx.recv().await.unwrap();
        assert!(matches!(
            got,
            HubEvent::TaskProgress { progress, .. } if (progress - 0.8).abs() < 1e-9
        ));
    }

    #[tokio::test]
    async fn presence_tracks_watch_and_disconnect() {
        let hub = Arc::new(NotificationHub::new(8));
        let tenant_id = Uuid::new_v4();
        let assembly_id = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (alice_handle, mut alice_rx) = hub.subscribe(tenant_id, alice);
        alice_handle.watch_assembly(assembly_id);
        let got = alice_rx.recv().await.unwrap();
        assert!(matches!(
            got,
            HubEvent::PresenceChanged { ref active_users, .. } if active_users == &[alice]
        ));

        let (bob_handle, _bob_rx) = hub.subscribe(tenant_id, bob);
        bob_handle.watch_assembly(assembly_id);
        let got = alice_rx.recv().await.unwrap();
        assert!(matches!(
            got,
            HubEvent::PresenceChanged { ref active_users, .. } if active_users.len() == 2
        ));

        drop(bob_handle);
        let got = alice_rx.recv().await.unwrap();
        assert!(matches!(
            got,
            HubEvent::PresenceChanged { ref active_users, .. } if active_users == &[alice]
        ));
        assert_eq!(hub.active_users(tenant_id, assembly_id), vec![alice]);
    }

    #[tokio::test]
    async fn dropped_handle_deregisters_connection() {
        let hub = Arc::new(NotificationHub::new(8));
        let tenant_id = Uuid::new_v4();
        let task_id = Uuid::new_v4();

        let (handle, mut rx) = hub.subscribe(tenant_id, Uuid::new_v4());
        handle.watch_task(task_id);
        drop(handle);

        hub.publish(tenant_id, task_event(task_id, 1.0));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Closed)));
    }
}
