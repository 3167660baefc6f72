pub mod cache;
pub mod reconciler;
pub mod service;

pub use cache::TallyCache;
pub use reconciler::{FlushOutcome, Reconciler, ReconcilerConfig};
pub use service::TallyService;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time counts for every valid option.
///
/// Produced only by [`TallyCache::snapshot`], so it always carries every
/// option of the poll, including those that were never voted on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, u64>);

impl Snapshot {
    pub fn get(&self, option: &str) -> Option<u64> {
        self.0.get(option).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

impl FromIterator<(String, u64)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Snapshot(iter.into_iter().collect())
    }
}
