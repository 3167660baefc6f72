use async_trait::async_trait;
use std::collections::HashMap;
use tracing::warn;

use crate::db::{self, DbPool};
use crate::error::TallyError;
use crate::store::TallyStore;
use crate::tally::Snapshot;

#[derive(Clone)]
pub struct PgTallyStore {
    pool: DbPool,
}

impl PgTallyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_column(count: u64) -> Result<i64, TallyError> {
    i64::try_from(count)
        .map_err(|_| TallyError::StoreUnavailable(format!("count {count} exceeds BIGINT")))
}

#[async_trait]
impl TallyStore for PgTallyStore {
    async fn read_all_counts(&self) -> Result<HashMap<String, u64>, TallyError> {
        let rows = db::get_all_counts(&self.pool).await?;

        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            match u64::try_from(row.vote_count) {
                Ok(count) => {
                    counts.insert(row.option_name, count);
                }
                Err(_) => warn!(
                    option = %row.option_name,
                    count = row.vote_count,
                    "Skipping negative stored count"
                ),
            }
        }

        Ok(counts)
    }

    async fn upsert_count(&self, option: &str, count: u64) -> Result<(), TallyError> {
        db::upsert_count(&self.pool, option, to_column(count)?).await?;
        Ok(())
    }

    async fn upsert_counts(&self, snapshot: &Snapshot) -> Result<(), TallyError> {
        let counts = snapshot
            .iter()
            .map(|(option, count)| to_column(count).map(|count| (option, count)))
            .collect::<Result<Vec<_>, _>>()?;

        db::upsert_counts(&self.pool, &counts).await?;
        Ok(())
    }
}
