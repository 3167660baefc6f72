use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::error::TallyError;
use crate::tally::Snapshot;

/// Live vote counters, one lock-free atomic per option.
///
/// The option set is fixed when the cache is built; counters are kept sorted
/// by name so lookups are a binary search over a handful of entries.
#[derive(Debug)]
pub struct TallyCache {
    counters: Vec<(String, AtomicU64)>,
}

impl TallyCache {
    pub fn new<I, S>(options: I) -> Result<Self, TallyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut counters = Vec::new();

        for option in options {
            let option = option.into();
            if option.is_empty() {
                return Err(TallyError::Config("option names must not be empty".into()));
            }
            if !seen.insert(option.clone()) {
                return Err(TallyError::Config(format!("duplicate option: {option}")));
            }
            counters.push((option, AtomicU64::new(0)));
        }

        if counters.is_empty() {
            return Err(TallyError::Config("a poll needs at least one option".into()));
        }

        counters.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(Self { counters })
    }

    fn counter(&self, option: &str) -> Option<&AtomicU64> {
        self.counters
            .binary_search_by(|(name, _)| name.as_str().cmp(option))
            .ok()
            .map(|index| &self.counters[index].1)
    }

    pub fn contains(&self, option: &str) -> bool {
        self.counter(option).is_some()
    }

    pub fn options(&self) -> impl Iterator<Item = &str> {
        self.counters.iter().map(|(name, _)| name.as_str())
    }

    /// Loads persisted counts. Rows for options outside the poll are ignored.
    ///
    /// Returns the number of options that were seeded.
    pub fn seed(&self, initial: &HashMap<String, u64>) -> usize {
        let mut seeded = 0;
        for (option, count) in initial {
            match self.counter(option) {
                Some(counter) => {
                    counter.store(*count, Ordering::Relaxed);
                    seeded += 1;
                }
                None => warn!(option = %option, count, "Ignoring stored count for unknown option"),
            }
        }
        seeded
    }

    pub fn increment(&self, option: &str) -> Result<Snapshot, TallyError> {
        let counter = self
            .counter(option)
            .ok_or_else(|| TallyError::InvalidOption(option.to_string()))?;
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(self.snapshot())
    }

    pub fn snapshot(&self) -> Snapshot {
        self.counters
            .iter()
            .map(|(name, counter)| (name.clone(), counter.load(Ordering::Relaxed)))
            .collect()
    }
}
