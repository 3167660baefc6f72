use crate::broadcast::BroadcastHub;
use crate::config::Config;
use crate::db::{get_pool_stats, init_db};
use crate::error::TallyError;
use crate::store::{PgTallyStore, TallyStore};
use crate::tally::{Reconciler, TallyCache, TallyService};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub service: TallyService,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Connects to Postgres and seeds the cache from it.
    ///
    /// Any failure here is fatal: the service never starts with an unseeded
    /// cache.
    pub async fn new(
        config: &Config,
        shutdown: CancellationToken,
    ) -> Result<(Self, Reconciler), TallyError> {
        let pool = init_db(&config.database_url, config.db_max_connections, &config.options).await?;
        info!("{}", get_pool_stats(&pool));

        let store: Arc<dyn TallyStore> = Arc::new(PgTallyStore::new(pool));
        Self::with_store(store, config, shutdown).await
    }

    pub async fn with_store(
        store: Arc<dyn TallyStore>,
        config: &Config,
        shutdown: CancellationToken,
    ) -> Result<(Self, Reconciler), TallyError> {
        let cache = Arc::new(TallyCache::new(config.options.iter().cloned())?);

        let initial = store.read_all_counts().await?;
        let seeded = cache.seed(&initial);
        info!(seeded, total = cache.snapshot().total(), "Loaded tallies into cache");

        let hub = Arc::new(BroadcastHub::new(Arc::clone(&cache)));
        let service = TallyService::new(Arc::clone(&cache), hub);
        let reconciler = Reconciler::new(cache, store, config.reconciler(), shutdown.clone());

        Ok((AppState { service, shutdown }, reconciler))
    }
}
