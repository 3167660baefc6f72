use crate::db::connection::DbPool;
use crate::db::models::OptionCount;
use sqlx::{Error, Executor, Postgres};

pub async fn get_all_counts(pool: &DbPool) -> Result<Vec<OptionCount>, Error> {
    let rows = sqlx::query_as::<_, OptionCount>(
        "SELECT option_name, vote_count FROM poll_options ORDER BY option_name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Overwrites the stored count. The cache is authoritative, so this never adds.
pub async fn upsert_count<'e, E>(executor: E, option_name: &str, vote_count: i64) -> Result<(), Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO poll_options (option_name, vote_count) VALUES ($1, $2)
        ON CONFLICT (option_name) DO UPDATE SET vote_count = EXCLUDED.vote_count
        "#,
    )
    .bind(option_name)
    .bind(vote_count)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn upsert_counts(pool: &DbPool, counts: &[(&str, i64)]) -> Result<(), Error> {
    let mut tx = pool.begin().await?;

    for (option_name, vote_count) in counts {
        upsert_count(&mut *tx, option_name, *vote_count).await?;
    }

    tx.commit().await?;
    Ok(())
}
