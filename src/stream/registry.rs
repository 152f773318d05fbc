//! Membership of live observer sessions.
//!
//! The map lock is only ever taken for short, synchronous sections and is
//! never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pending broadcast messages a session may queue before it is dropped.
const OUTBOX_CAPACITY: usize = 64;

struct SessionEntry {
    connected_at: DateTime<Utc>,
    outbox: mpsc::Sender<String>,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Thread-safe set of active sessions with fan-out broadcast.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Dropping the returned [`Registration`] removes it again.
    pub fn register(&self) -> Registration {
        let id = Uuid::new_v4();
        let (outbox, inbox) = mpsc::channel(OUTBOX_CAPACITY);
        let cancel = CancellationToken::new();
        let entry = SessionEntry {
            connected_at: Utc::now(),
            outbox,
            cancel: cancel.clone(),
        };

        let total = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            sessions.insert(id, entry);
            sessions.len()
        };
        info!(session = %id, total, "session registered");

        Registration {
            id,
            inbox,
            cancel,
            registry: self.clone(),
        }
    }

    /// Remove a session and cancel its task. Returns false if it was already gone.
    pub fn deregister(&self, id: Uuid) -> bool {
        let (removed, total) = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            let removed = sessions.remove(&id);
            (removed, sessions.len())
        };
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                info!(session = %id, total, "session deregistered");
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<SessionInfo> = sessions
            .iter()
            .map(|(id, entry)| SessionInfo {
                id: *id,
                connected_at: entry.connected_at,
            })
            .collect();
        list.sort_by_key(|s| s.connected_at);
        list
    }

    /// Queue `message` for every session.
    ///
    /// Sessions whose outbox is closed or full are deregistered; delivery to
    /// the rest continues.
    pub fn broadcast(&self, message: &str) -> BroadcastReport {
        let targets: Vec<(Uuid, mpsc::Sender<String>)> = {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            sessions
                .iter()
                .map(|(id, entry)| (*id, entry.outbox.clone()))
                .collect()
        };

        let mut report = BroadcastReport::default();
        for (id, outbox) in targets {
            match outbox.try_send(message.to_string()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    let reason = match e {
                        TrySendError::Full(_) => "outbox full",
                        TrySendError::Closed(_) => "outbox closed",
                    };
                    warn!(session = %id, reason, "broadcast failed, dropping session");
                    self.deregister(id);
                    report.dropped += 1;
                }
            }
        }
        debug!(delivered = report.delivered, dropped = report.dropped, "broadcast sent");
        report
    }

    /// Cancel and remove every session.
    pub fn shutdown(&self) {
        let drained: Vec<(Uuid, SessionEntry)> = {
            let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
            sessions.drain().collect()
        };
        for (_, entry) in &drained {
            entry.cancel.cancel();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "cancelled all sessions");
        }
    }
}

/// A live membership. Deregisters on drop, exactly once.
pub struct Registration {
    pub id: Uuid,
    pub inbox: mpsc::Receiver<String>,
    pub cancel: CancellationToken,
    registry: SessionRegistry,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}
