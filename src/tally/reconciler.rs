use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TallyError;
use crate::store::TallyStore;
use crate::tally::{Snapshot, TallyCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub period: Duration,
    /// 0 retries forever.
    pub max_consecutive_failures: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(10),
            max_consecutive_failures: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Number of option rows written.
    Written(usize),
    Unchanged,
}

/// Periodically mirrors the cache into the durable store.
///
/// A single task owns the loop, so flushes never overlap; a flush that
/// outlasts the period makes the next ticks get skipped.
pub struct Reconciler {
    cache: Arc<TallyCache>,
    store: Arc<dyn TallyStore>,
    config: ReconcilerConfig,
    shutdown: CancellationToken,
    last_flushed: Option<Snapshot>,
}

impl Reconciler {
    pub fn new(
        cache: Arc<TallyCache>,
        store: Arc<dyn TallyStore>,
        config: ReconcilerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cache,
            store,
            config,
            shutdown,
            last_flushed: None,
        }
    }

    pub async fn flush_once(&mut self) -> Result<FlushOutcome, TallyError> {
        let snapshot = self.cache.snapshot();
        if self.last_flushed.as_ref() == Some(&snapshot) {
            debug!("Tallies unchanged since last sync");
            return Ok(FlushOutcome::Unchanged);
        }

        self.store.upsert_counts(&snapshot).await?;

        let written = snapshot.len();
        info!(options = written, total = snapshot.total(), "Synchronized tallies to store");
        self.last_flushed = Some(snapshot);
        Ok(FlushOutcome::Written(written))
    }

    /// Runs until the shutdown token fires, then flushes one last time.
    ///
    /// An in-flight flush is abandoned on shutdown, and the final flush is
    /// bounded by one period, so a hung store cannot block process exit.
    pub async fn run(mut self) -> Result<(), TallyError> {
        let period = self.config.period.max(Duration::from_millis(1));
        let shutdown = self.shutdown.clone();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the cache was just seeded.
        ticker.tick().await;

        let mut failures = 0u32;
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    warn!("Shutdown during tally sync, abandoning it");
                    break;
                }
                outcome = self.flush_once() => outcome,
            };

            match outcome {
                Ok(_) => failures = 0,
                Err(e) => {
                    failures += 1;
                    error!(error = %e, failures, "Tally sync failed, retrying next period");
                    let limit = self.config.max_consecutive_failures;
                    if limit > 0 && failures >= limit {
                        error!(failures, "Giving up on tally sync");
                        return Err(TallyError::ReconcilerGaveUp { failures });
                    }
                }
            }
        }

        info!("Reconciler stopping, running final sync");
        match timeout(period, self.flush_once()).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => {
                error!(timeout = ?period, "Final tally sync timed out");
                Err(TallyError::StoreUnavailable("final sync timed out".into()))
            }
        }
    }

    pub fn spawn(self) -> JoinHandle<Result<(), TallyError>> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Store whose every call never completes.
    struct StalledStore;

    #[async_trait]
    impl TallyStore for StalledStore {
        async fn read_all_counts(&self) -> Result<HashMap<String, u64>, TallyError> {
            std::future::pending().await
        }

        async fn upsert_count(&self, _option: &str, _count: u64) -> Result<(), TallyError> {
            std::future::pending().await
        }
    }

    fn setup(config: ReconcilerConfig) -> (Arc<TallyCache>, Arc<MemoryStore>, CancellationToken, Reconciler) {
        let cache = Arc::new(TallyCache::new(["A", "B"]).unwrap());
        let store = Arc::new(MemoryStore::new());
        let shutdown = CancellationToken::new();
        let reconciler = Reconciler::new(
            Arc::clone(&cache),
            Arc::clone(&store) as Arc<dyn TallyStore>,
            config,
            shutdown.clone(),
        );
        (cache, store, shutdown, reconciler)
    }

    fn fast() -> ReconcilerConfig {
        ReconcilerConfig {
            period: Duration::from_millis(10),
            max_consecutive_failures: 0,
        }
    }

    #[tokio::test]
    async fn flush_mirrors_snapshot_and_repeats_as_noop() {
        let (cache, store, _, mut reconciler) = setup(fast());
        cache.increment("A").unwrap();
        cache.increment("A").unwrap();

        assert_eq!(reconciler.flush_once().await.unwrap(), FlushOutcome::Written(2));
        assert_eq!(
            store.counts(),
            HashMap::from([("A".to_string(), 2), ("B".to_string(), 0)])
        );

        assert_eq!(reconciler.flush_once().await.unwrap(), FlushOutcome::Unchanged);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn flush_overwrites_instead_of_adding() {
        let (cache, store, _, mut reconciler) = setup(fast());
        cache.increment("B").unwrap();
        reconciler.flush_once().await.unwrap();
        cache.increment("B").unwrap();
        reconciler.flush_once().await.unwrap();

        assert_eq!(store.counts().get("B"), Some(&2));
    }

    #[tokio::test]
    async fn failed_flush_is_retried_later() {
        let (cache, store, _, mut reconciler) = setup(fast());
        cache.increment("A").unwrap();

        store.set_available(false);
        assert!(matches!(
            reconciler.flush_once().await,
            Err(TallyError::StoreUnavailable(_))
        ));
        assert!(store.counts().is_empty());

        store.set_available(true);
        assert_eq!(reconciler.flush_once().await.unwrap(), FlushOutcome::Written(2));
        assert_eq!(store.counts().get("A"), Some(&1));
    }

    #[tokio::test]
    async fn run_gives_up_after_consecutive_failures() {
        let (cache, store, _, reconciler) = setup(ReconcilerConfig {
            period: Duration::from_millis(5),
            max_consecutive_failures: 3,
        });
        cache.increment("A").unwrap();
        store.set_available(false);

        let result = tokio::time::timeout(Duration::from_secs(5), reconciler.spawn())
            .await
            .expect("reconciler should stop on its own")
            .unwrap();

        assert!(matches!(result, Err(TallyError::ReconcilerGaveUp { failures: 3 })));
    }

    #[tokio::test]
    async fn cancellation_runs_a_final_flush() {
        let (cache, store, shutdown, reconciler) = setup(ReconcilerConfig {
            period: Duration::from_secs(3600),
            max_consecutive_failures: 0,
        });
        let handle = reconciler.spawn();

        cache.increment("B").unwrap();
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reconciler should stop after cancellation")
            .unwrap()
            .unwrap();
        assert_eq!(store.counts().get("B"), Some(&1));
    }

    #[tokio::test]
    async fn periodic_ticks_persist_new_votes() {
        let (cache, store, shutdown, reconciler) = setup(fast());
        let handle = reconciler.spawn();

        cache.increment("A").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.counts().get("A"), Some(&1));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stalled_store_does_not_block_shutdown() {
        let cache = Arc::new(TallyCache::new(["A"]).unwrap());
        let shutdown = CancellationToken::new();
        let reconciler = Reconciler::new(
            Arc::clone(&cache),
            Arc::new(StalledStore),
            ReconcilerConfig {
                period: Duration::from_millis(20),
                max_consecutive_failures: 0,
            },
            shutdown.clone(),
        );
        cache.increment("A").unwrap();
        let handle = reconciler.spawn();

        // Let the first periodic flush start and hang.
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("reconciler must stop despite the stalled store")
            .unwrap();
        assert!(matches!(result, Err(TallyError::StoreUnavailable(_))));
    }
}
