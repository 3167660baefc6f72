//! Durable mirror of the tally cache.
//!
//! The store is read once at startup to seed the cache and written only by
//! the reconciler. Handlers never touch it on the vote path.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgTallyStore;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::TallyError;
use crate::tally::Snapshot;

#[async_trait]
pub trait TallyStore: Send + Sync {
    async fn read_all_counts(&self) -> Result<HashMap<String, u64>, TallyError>;

    async fn upsert_count(&self, option: &str, count: u64) -> Result<(), TallyError>;

    /// Writes every option of the snapshot.
    async fn upsert_counts(&self, snapshot: &Snapshot) -> Result<(), TallyError> {
        for (option, count) in snapshot.iter() {
            self.upsert_count(option, count).await?;
        }
        Ok(())
    }
}
