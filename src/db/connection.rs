use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

pub type DbPool = Pool<Postgres>;

/// Connects to Postgres, creates the tally table and inserts a zero row for
/// every configured option that is not stored yet.
pub async fn init_db(
    database_url: &str,
    max_connections: u32,
    options: &[String],
) -> Result<DbPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .max_lifetime(Duration::from_secs(30 * 60))
        .idle_timeout(Duration::from_secs(10 * 60))
        .connect(database_url)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS poll_options (
            option_name VARCHAR(255) PRIMARY KEY,
            vote_count BIGINT NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(&pool)
    .await?;

    for option in options {
        sqlx::query(
            "INSERT INTO poll_options (option_name, vote_count) VALUES ($1, 0) ON CONFLICT (option_name) DO NOTHING",
        )
        .bind(option)
        .execute(&pool)
        .await?;
    }

    Ok(pool)
}

pub fn get_pool_stats(pool: &DbPool) -> String {
    let size = pool.size() as usize;
    let num_idle = pool.num_idle();
    format!(
        "Pool stats: size={}, idle={}, in_use={}",
        size,
        num_idle,
        size.saturating_sub(num_idle)
    )
}
