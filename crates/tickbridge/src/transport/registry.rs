//! Bookkeeping for open connections.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;

use tokio::task::AbortHandle;
use tracing::info;

use crate::health::HealthReporter;

use super::TRANSPORT_TARGET;

/// Identifier assigned to each accepted connection, unique per service run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Numeric value of the identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug)]
struct Entry {
    peer: SocketAddr,
    task: Option<AbortHandle>,
}

#[derive(Debug)]
struct RegistryState {
    next_id: u64,
    entries: BTreeMap<ConnectionId, Entry>,
}

/// Tracks open connections so they can be counted and closed on shutdown.
#[derive(Clone)]
pub(crate) struct ConnectionRegistry {
    state: Rc<RefCell<RegistryState>>,
    reporter: Arc<dyn HealthReporter>,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    pub(crate) fn new(reporter: Arc<dyn HealthReporter>) -> Self {
        Self {
            state: Rc::new(RefCell::new(RegistryState {
                next_id: 1,
                entries: BTreeMap::new(),
            })),
            reporter,
        }
    }

    /// Records a new connection. Dropping the returned guard unregisters it.
    pub(crate) fn register(&self, peer: SocketAddr) -> RegistrationGuard {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = ConnectionId::new(state.next_id);
            state.next_id += 1;
            state.entries.insert(id, Entry { peer, task: None });
            id
        };
        info!(
            target: TRANSPORT_TARGET,
            connection = %id,
            peer = %peer,
            "connection opened"
        );
        self.reporter.connection_opened(id, peer);
        RegistrationGuard {
            registry: self.clone(),
            id,
        }
    }

    /// Associates the task serving `id` so shutdown can abort it.
    pub(crate) fn attach_task(&self, id: ConnectionId, task: AbortHandle) {
        match self.state.borrow_mut().entries.get_mut(&id) {
            Some(entry) => entry.task = Some(task),
            // The task already finished and unregistered itself.
            None => task.abort(),
        }
    }

    /// Forgets `id`, reporting the closure if it was still registered.
    pub(crate) fn remove(&self, id: ConnectionId) {
        let removed = self.state.borrow_mut().entries.remove(&id);
        if let Some(entry) = removed {
            self.report_closed(id, entry.peer);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    #[cfg(test)]
    pub(crate) fn peers(&self) -> Vec<(ConnectionId, SocketAddr)> {
        self.state
            .borrow()
            .entries
            .iter()
            .map(|(id, entry)| (*id, entry.peer))
            .collect()
    }

    /// Aborts every connection task and empties the registry.
    ///
    /// Sockets are released once the event loop next polls the aborted tasks.
    pub(crate) fn close_all(&self) -> usize {
        let entries = std::mem::take(&mut self.state.borrow_mut().entries);
        let count = entries.len();
        for (id, entry) in entries {
            if let Some(task) = entry.task {
                task.abort();
            }
            self.report_closed(id, entry.peer);
        }
        count
    }

    fn report_closed(&self, id: ConnectionId, peer: SocketAddr) {
        info!(
            target: TRANSPORT_TARGET,
            connection = %id,
            peer = %peer,
            "connection closed"
        );
        self.reporter.connection_closed(id, peer);
    }
}

/// Removes its connection from the registry when dropped.
#[derive(Debug)]
pub(crate) struct RegistrationGuard {
    registry: ConnectionRegistry,
    id: ConnectionId,
}

impl RegistrationGuard {
    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
