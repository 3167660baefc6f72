use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::tally::Snapshot;

pub type ConnectionId = Uuid;

/// Envelope pushed to subscribers: `{"type":"results_update","data":{...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    ResultsUpdate(Snapshot),
}

impl ServerMessage {
    pub fn to_text(&self) -> Result<Arc<str>, serde_json::Error> {
        serde_json::to_string(self).map(Arc::from)
    }
}

/// Receiving side of one subscriber.
///
/// Dropping it closes the channel; the hub notices on its next publish.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    receiver: mpsc::UnboundedReceiver<Arc<str>>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, receiver: mpsc::UnboundedReceiver<Arc<str>>) -> Self {
        Self { id, receiver }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next serialized message, or `None` once the hub removed this connection.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}
