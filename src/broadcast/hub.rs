use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::broadcast::models::{Connection, ConnectionId, PublishReport, ServerMessage};
use crate::tally::{Snapshot, TallyCache};

/// Fan-out of tally snapshots to live subscribers.
///
/// Every subscriber owns an unbounded channel drained by its session, so a
/// burst of votes never disconnects a healthy viewer. Publishing never
/// awaits: a subscriber whose channel is closed is dropped from the set
/// after the pass, and the remaining subscribers still get the message.
pub struct BroadcastHub {
    cache: Arc<TallyCache>,
    connections: Mutex<HashMap<ConnectionId, mpsc::UnboundedSender<Arc<str>>>>,
    // Highest snapshot total sent so far. Held for a whole pass so every
    // subscriber sees non-decreasing tallies.
    sequencer: Mutex<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BroadcastHub {
    pub fn new(cache: Arc<TallyCache>) -> Self {
        Self {
            cache,
            connections: Mutex::new(HashMap::new()),
            sequencer: Mutex::new(0),
        }
    }

    /// Registers a subscriber whose first queued message is the current snapshot.
    pub fn subscribe(&self) -> Connection {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        let mut last_total = lock(&self.sequencer);
        let snapshot = self.cache.snapshot();
        *last_total = (*last_total).max(snapshot.total());

        match ServerMessage::ResultsUpdate(snapshot).to_text() {
            // The receiver is still held here, so this cannot fail.
            Ok(text) => {
                let _ = sender.send(text);
            }
            Err(e) => error!(connection_id = %id, error = %e, "Failed to serialize initial snapshot"),
        }

        lock(&self.connections).insert(id, sender);
        drop(last_total);

        debug!(connection_id = %id, "Subscriber registered");
        Connection::new(id, receiver)
    }

    /// Removes a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: ConnectionId) -> bool {
        let removed = lock(&self.connections).remove(&id).is_some();
        if removed {
            debug!(connection_id = %id, "Subscriber removed");
        }
        removed
    }

    pub fn publish(&self, snapshot: &Snapshot) -> PublishReport {
        let mut last_total = lock(&self.sequencer);

        // A concurrent vote already went out with newer counts.
        let fresher;
        let snapshot = if snapshot.total() < *last_total {
            fresher = self.cache.snapshot();
            &fresher
        } else {
            snapshot
        };
        *last_total = (*last_total).max(snapshot.total());

        let text = match ServerMessage::ResultsUpdate(snapshot.clone()).to_text() {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Failed to serialize results update");
                return PublishReport::default();
            }
        };

        let recipients: Vec<(ConnectionId, mpsc::UnboundedSender<Arc<str>>)> = lock(&self.connections)
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        let mut report = PublishReport::default();
        let mut failed = Vec::new();

        for (id, sender) in recipients {
            match sender.send(Arc::clone(&text)) {
                Ok(()) => report.delivered += 1,
                Err(_) => {
                    debug!(connection_id = %id, "Subscriber channel closed");
                    failed.push(id);
                }
            }
        }
        drop(last_total);

        if !failed.is_empty() {
            let mut connections = lock(&self.connections);
            for id in &failed {
                connections.remove(id);
            }
        }
        report.dropped = failed.len();

        debug!(
            delivered = report.delivered,
            dropped = report.dropped,
            "Published results update"
        );
        report
    }

    pub fn len(&self) -> usize {
        lock(&self.connections).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
