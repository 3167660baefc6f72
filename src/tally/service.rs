use std::sync::Arc;
use tracing::{debug, warn};

use crate::broadcast::{BroadcastHub, Connection, ConnectionId};
use crate::error::TallyError;
use crate::tally::{Snapshot, TallyCache};

/// Entry point for the handler layer. Holds no state of its own.
#[derive(Clone)]
pub struct TallyService {
    cache: Arc<TallyCache>,
    hub: Arc<BroadcastHub>,
}

impl TallyService {
    pub fn new(cache: Arc<TallyCache>, hub: Arc<BroadcastHub>) -> Self {
        Self { cache, hub }
    }

    /// Counts a vote in memory and pushes the new tallies to subscribers.
    pub fn cast_vote(&self, option: &str) -> Result<Snapshot, TallyError> {
        if !self.cache.contains(option) {
            warn!(option = %option, "Rejected vote for unknown option");
            return Err(TallyError::InvalidOption(option.to_string()));
        }

        let snapshot = self.cache.increment(option)?;
        let report = self.hub.publish(&snapshot);
        debug!(
            option = %option,
            count = snapshot.get(option).unwrap_or_default(),
            delivered = report.delivered,
            "Vote recorded"
        );

        Ok(snapshot)
    }

    pub fn current_results(&self) -> Snapshot {
        self.cache.snapshot()
    }

    pub fn on_subscribe(&self) -> Connection {
        self.hub.subscribe()
    }

    pub fn on_disconnect(&self, id: ConnectionId) {
        self.hub.unsubscribe(id);
    }

    pub fn subscribers(&self) -> usize {
        self.hub.len()
    }
}
