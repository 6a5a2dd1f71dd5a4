use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::kernel::session::SessionSnapshot;
use crate::storage::{KeyValueStore, StoreError};

pub const OFFLINE_QUEUE_KEY: &str = "offline_sessions";

/// Bounded FIFO of undelivered sessions. Oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct OfflineQueue {
    entries: VecDeque<SessionSnapshot>,
    capacity: usize,
}

impl OfflineQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    /// Appends `snapshot`; returns whatever had to be evicted to stay in bounds.
    pub fn push(&mut self, snapshot: SessionSnapshot) -> Vec<SessionSnapshot> {
        self.entries.push_back(snapshot);
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            if let Some(oldest) = self.entries.pop_front() {
                evicted.push(oldest);
            }
        }
        evicted
    }

    pub fn front(&self) -> Option<&SessionSnapshot> {
        self.entries.front()
    }

    /// Removes the oldest entry carrying `session_id`.
    pub fn remove_first(&mut self, session_id: Uuid) -> Option<SessionSnapshot> {
        let index = self.entries.iter().position(|s| s.session_id == session_id)?;
        self.entries.remove(index)
    }

    /// Removes every entry carrying `session_id`. Returns how many went.
    pub fn remove_all(&mut self, session_id: Uuid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|s| s.session_id != session_id);
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionSnapshot> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
struct QueueBlob {
    sessions: Vec<SessionSnapshot>,
}

/// [`OfflineQueue`] mirrored into a [`KeyValueStore`] after every mutation.
///
/// Persistence is best effort: a failed write is logged and the in-memory
/// queue stays authoritative for the rest of the process.
pub struct PersistentQueue {
    queue: OfflineQueue,
    store: Arc<dyn KeyValueStore>,
}

impl PersistentQueue {
    /// Loads the persisted blob once. Unreadable or corrupt data yields an
    /// empty queue. Loaded entries beyond `capacity` are trimmed oldest first.
    pub fn load(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        let mut queue = OfflineQueue::new(capacity);

        match store.get(OFFLINE_QUEUE_KEY) {
            Ok(Some(blob)) if !blob.trim().is_empty() => {
                match serde_json::from_str::<QueueBlob>(&blob) {
                    Ok(parsed) => {
                        for session in parsed.sessions {
                            queue.push(session);
                        }
                        info!(queued = queue.len(), "loaded offline sessions");
                    }
                    Err(e) => warn!(error = %e, "discarding unreadable offline queue"),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to read offline queue"),
        }

        Self { queue, store }
    }

    /// Appends and persists. Returns the ids of evicted sessions.
    pub fn enqueue(&mut self, snapshot: SessionSnapshot) -> Vec<Uuid> {
        let evicted: Vec<Uuid> = self
            .queue
            .push(snapshot)
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        for id in &evicted {
            warn!(session_id = %id, "offline queue full; evicted oldest session");
        }
        self.persist();
        evicted
    }

    /// Removes the oldest copy of a delivered session and persists.
    pub fn remove_delivered(&mut self, session_id: Uuid) -> bool {
        let removed = self.queue.remove_first(session_id).is_some();
        if removed {
            self.persist();
        }
        removed
    }

    /// Removes every copy of `session_id` and persists. Returns the count.
    pub fn remove_session(&mut self, session_id: Uuid) -> usize {
        let removed = self.queue.remove_all(session_id);
        if removed > 0 {
            self.persist();
        }
        removed
    }

    pub fn front(&self) -> Option<&SessionSnapshot> {
        self.queue.front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    fn persist(&self) {
        let result = if self.queue.is_empty() {
            self.store.remove(OFFLINE_QUEUE_KEY)
        } else {
            let blob = QueueBlob {
                sessions: self.queue.iter().cloned().collect(),
            };
            serde_json::to_string(&blob)
                .map_err(StoreError::from)
                .and_then(|json| self.store.set(OFFLINE_QUEUE_KEY, &json))
        };
        if let Err(e) = result {
            warn!(error = %e, queued = self.queue.len(), "failed to persist offline queue");
        }
    }
}
