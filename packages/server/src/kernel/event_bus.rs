//! In-process pub/sub for live run updates.
//!
//! Each live connection (one SSE stream) belongs to an owner and sees every
//! event for that owner's runs. A connection can also opt in to individual
//! runs by id. Publishing takes the union of both scopes, so a connection gets
//! at most one copy of each event.
//!
//! Delivery is best-effort: events go out on a bounded channel per connection
//! with `try_send`. A full or closed channel drops the event for that
//! connection, and nothing is buffered for connections that open later. The
//! run store stays the source of truth; reconnecting clients re-fetch.
//!
//! # Usage
//!
//! ```ignore
//! let mut sub = bus.connect(owner_id);
//! bus.subscribe(sub.id(), run_id);
//! while let Some(event) = sub.recv().await { /* forward */ }
//! // dropping `sub` unregisters the connection
//! ```

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::common::{ConnectionId, OwnerId, RunId};
use crate::domains::runs::events::RunEvent;

/// Per-connection channel capacity.
pub const CONNECTION_BUFFER: usize = 256;

/// Where the controller sends run events.
pub trait RunEventPublisher: Send + Sync {
    /// Returns the number of connections the event was handed to.
    fn publish(&self, event: RunEvent) -> usize;
}

struct Connection {
    owner_id: OwnerId,
    runs: HashSet<RunId>,
    tx: mpsc::Sender<RunEvent>,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    by_owner: HashMap<OwnerId, HashSet<ConnectionId>>,
    by_run: HashMap<RunId, HashSet<ConnectionId>>,
}

impl Registry {
    fn remove_connection(&mut self, connection_id: ConnectionId) -> bool {
        let Some(connection) = self.connections.remove(&connection_id) else {
            return false;
        };

        if let Some(ids) = self.by_owner.get_mut(&connection.owner_id) {
            ids.remove(&connection_id);
            if ids.is_empty() {
                self.by_owner.remove(&connection.owner_id);
            }
        }
        for run_id in connection.runs {
            self.remove_run_link(run_id, connection_id);
        }
        true
    }

    fn remove_run_link(&mut self, run_id: RunId, connection_id: ConnectionId) {
        if let Some(ids) = self.by_run.get_mut(&run_id) {
            ids.remove(&connection_id);
            if ids.is_empty() {
                self.by_run.remove(&run_id);
            }
        }
    }
}

/// Cloneable handle to the shared subscriber registry.
#[derive(Clone)]
pub struct EventBus {
    registry: Arc<RwLock<Registry>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CONNECTION_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            capacity: capacity.max(1),
        }
    }

    /// Register a live connection scoped to `owner_id`.
    pub fn connect(&self, owner_id: OwnerId) -> Subscription {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.capacity);

        {
            let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
            registry.connections.insert(
                id,
                Connection {
                    owner_id,
                    runs: HashSet::new(),
                    tx,
                },
            );
            registry.by_owner.entry(owner_id).or_default().insert(id);
        }

        debug!(connection_id = %id, owner_id = %owner_id, "Live connection opened");
        Subscription {
            id,
            owner_id,
            rx,
            bus: self.clone(),
        }
    }

    /// Opt a connection in to a run. Idempotent. `false` if the connection is gone.
    pub fn subscribe(&self, connection_id: ConnectionId, run_id: RunId) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        let Some(connection) = registry.connections.get_mut(&connection_id) else {
            return false;
        };
        connection.runs.insert(run_id);
        registry.by_run.entry(run_id).or_default().insert(connection_id);
        true
    }

    /// Idempotent. `false` if the connection is gone.
    pub fn unsubscribe(&self, connection_id: ConnectionId, run_id: RunId) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(|e| e.into_inner());
        let Some(connection) = registry.connections.get_mut(&connection_id) else {
            return false;
        };
        connection.runs.remove(&run_id);
        registry.remove_run_link(run_id, connection_id);
        true
    }

    pub fn owner_of(&self, connection_id: ConnectionId) -> Option<OwnerId> {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
        registry.connections.get(&connection_id).map(|c| c.owner_id)
    }

    pub fn disconnect(&self, connection_id: ConnectionId) {
        let removed = self
            .registry
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove_connection(connection_id);
        if removed {
            debug!(connection_id = %connection_id, "Live connection closed");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .connections
            .len()
    }

    fn deliver(&self, event: RunEvent) -> usize {
        let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());

        let mut targets: HashSet<ConnectionId> = HashSet::new();
        if let Some(ids) = registry.by_owner.get(&event.owner_id) {
            targets.extend(ids);
        }
        if let Some(ids) = registry.by_run.get(&event.run_id) {
            targets.extend(ids);
        }

        let mut delivered = 0;
        for connection_id in targets {
            let Some(connection) = registry.connections.get(&connection_id) else {
                continue;
            };
            match connection.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    debug!(
                        connection_id = %connection_id,
                        run_id = %event.run_id,
                        event = event.kind.as_str(),
                        error = %err,
                        "Dropping run event for connection"
                    );
                }
            }
        }

        trace!(
            run_id = %event.run_id,
            event = event.kind.as_str(),
            delivered,
            "Published run event"
        );
        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RunEventPublisher for EventBus {
    fn publish(&self, event: RunEvent) -> usize {
        self.deliver(event)
    }
}

/// Receiving end of a live connection. Dropping it disconnects.
pub struct Subscription {
    id: ConnectionId,
    owner_id: OwnerId,
    rx: mpsc::Receiver<RunEvent>,
    bus: EventBus,
}

impl Subscription {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub async fn recv(&mut self) -> Option<RunEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RunEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = RunEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RunEvent>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.disconnect(self.id);
    }
}
