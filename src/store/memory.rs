use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::TallyError;
use crate::store::TallyStore;
use crate::tally::Snapshot;

/// In-process test double for the durable store.
///
/// Can be switched offline to simulate an unreachable database.
#[derive(Debug)]
pub struct MemoryStore {
    rows: Mutex<HashMap<String, u64>>,
    available: AtomicBool,
    writes: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn with_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        let store = Self::new();
        store
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(counts.into_iter().map(|(name, count)| (name.into(), count)));
        store
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn counts(&self) -> HashMap<String, u64> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of successful write calls, single or batched.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), TallyError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TallyError::StoreUnavailable("memory store offline".into()))
        }
    }
}

#[async_trait]
impl TallyStore for MemoryStore {
    async fn read_all_counts(&self) -> Result<HashMap<String, u64>, TallyError> {
        self.check_available()?;
        Ok(self.counts())
    }

    async fn upsert_count(&self, option: &str, count: u64) -> Result<(), TallyError> {
        self.check_available()?;
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(option.to_string(), count);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert_counts(&self, snapshot: &Snapshot) -> Result<(), TallyError> {
        self.check_available()?;
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        for (option, count) in snapshot.iter() {
            rows.insert(option.to_string(), count);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
