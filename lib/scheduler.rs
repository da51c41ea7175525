//! The Scheduler (C7): a validated interval ticker driving the Reconciler, with live
//! reconfiguration and cancellation wiring.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::persistence::ConfigStore;
use crate::reconciler::Reconciler;
use crate::{RegicacheError, RegicacheResult};

/// The sync interval values the scheduler accepts, in minutes.
pub const VALID_INTERVALS_MINUTES: [u64; 4] = [5, 15, 30, 60];

/// The default interval used when `sync_interval` is absent or invalid.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 5;

/// Drives periodic `PerformSync` calls on a validated, live-reconfigurable interval.
pub struct Scheduler {
    reconciler: Reconciler,
    config: std::sync::Arc<dyn ConfigStore>,
    interval: watch::Sender<Duration>,
    stop: watch::Sender<bool>,
}

impl Scheduler {
    /// Reads `sync_interval` from `config` (defaulting to, and persisting,
    /// `default_minutes` when absent — or the hardcoded fallback when absent and
    /// `default_minutes` is itself outside the allowed set), and returns a scheduler
    /// ready to `start`. `default_minutes` is the operator-configured seed used only the
    /// first time a database is opened (spec.md 6, `RegicacheConfig::default_sync_interval`).
    pub async fn new(
        reconciler: Reconciler,
        config: std::sync::Arc<dyn ConfigStore>,
        default_minutes: u64,
    ) -> RegicacheResult<Self> {
        let seed = if VALID_INTERVALS_MINUTES.contains(&default_minutes) {
            default_minutes
        } else {
            warn!(value = default_minutes, "invalid configured default sync interval, using hardcoded default");
            DEFAULT_INTERVAL_MINUTES
        };

        let minutes = match config.get("sync_interval").await? {
            Some(raw) => match raw.parse::<u64>() {
                Ok(n) if VALID_INTERVALS_MINUTES.contains(&n) => n,
                _ => {
                    warn!(value = %raw, "invalid stored sync_interval, resetting to default");
                    seed
                }
            },
            None => {
                config.update("sync_interval", &seed.to_string()).await?;
                seed
            }
        };

        let (interval_tx, _) = watch::channel(Duration::from_secs(minutes * 60));
        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            reconciler,
            config,
            interval: interval_tx,
            stop: stop_tx,
        })
    }

    /// Spawns the worker task: performs one sync immediately, then repeats on every tick
    /// until `stop` is called or the returned handle is dropped without being awaited.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let reconciler = self.reconciler.clone();
        let mut interval_rx = self.interval.subscribe();
        let mut stop_rx = self.stop.subscribe();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(*interval_rx.borrow());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            run_sync_logging_errors(&reconciler).await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_sync_logging_errors(&reconciler).await;
                    }
                    changed = interval_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        ticker = tokio::time::interval(*interval_rx.borrow());
                        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            info!("scheduler worker stopping");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Validates `n`, persists it, and resets the running ticker's period.
    pub async fn update_sync_interval(&self, n: u64) -> RegicacheResult<()> {
        if !VALID_INTERVALS_MINUTES.contains(&n) {
            return Err(RegicacheError::InvalidInterval(n));
        }

        self.config.update("sync_interval", &n.to_string()).await?;
        self.interval
            .send(Duration::from_secs(n * 60))
            .map_err(|e| RegicacheError::custom(e))?;

        Ok(())
    }

    /// Triggers `PerformSync` on the wrapped Reconciler (used by the manual `POST /sync`
    /// handler; the worker loop calls the Reconciler directly).
    pub async fn perform_sync(&self) -> RegicacheResult<()> {
        self.reconciler.perform_sync().await
    }

    /// Reads the last recorded sync time, as Unix seconds, if any sync has run.
    pub async fn last_sync_time(&self) -> RegicacheResult<Option<i64>> {
        Ok(self
            .config
            .get("last_sync_time")
            .await?
            .and_then(|raw| raw.parse::<i64>().ok()))
    }

    /// Closes the stop channel. Calling this a second time is a caller bug (spec.md 4.7).
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

async fn run_sync_logging_errors(reconciler: &Reconciler) {
    if let Err(e) = reconciler.perform_sync().await {
        if matches!(e, RegicacheError::SyncBusy) {
            warn!("scheduled sync skipped: a sync was already in progress");
        } else {
            error!(error = %e, "scheduled sync failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;
    use crate::models::{Image, NewTagMetadata, Repository, Tag, TagWithMetadata};
    use crate::persistence::{ImageStore, RepositoryStore, TagStore};
    use crate::registry::{RegistryAuth, RegistryClient};

    #[derive(Default)]
    struct InMemoryConfig {
        values: AsyncMutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl ConfigStore for InMemoryConfig {
        async fn get(&self, key: &str) -> RegicacheResult<Option<String>> {
            Ok(self.values.lock().await.get(key).cloned())
        }

        async fn update(&self, key: &str, value: &str) -> RegicacheResult<()> {
            self.values.lock().await.insert(key.to_owned(), value.to_owned());
            Ok(())
        }

        async fn list(&self) -> RegicacheResult<Vec<(String, String)>> {
            Ok(self.values.lock().await.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        }
    }

    struct UnusedStore;

    #[async_trait]
    impl RepositoryStore for UnusedStore {
        async fn list(&self, _: u32, _: u32, _: Option<&str>) -> RegicacheResult<Vec<Repository>> {
            unreachable!("not exercised by scheduler interval tests")
        }
        async fn get(&self, _: &str) -> RegicacheResult<Option<Repository>> {
            unreachable!()
        }
        async fn create(&self, _: &str) -> RegicacheResult<Repository> {
            unreachable!()
        }
        async fn update(&self, _: &Repository) -> RegicacheResult<()> {
            unreachable!()
        }
        async fn delete(&self, _: &str) -> RegicacheResult<()> {
            unreachable!()
        }
    }

    #[async_trait]
    impl ImageStore for UnusedStore {
        async fn list(&self, _: &str) -> RegicacheResult<Vec<Image>> {
            unreachable!()
        }
        async fn get(&self, _: &str, _: &str) -> RegicacheResult<Option<Image>> {
            unreachable!()
        }
        async fn create(&self, _: i64, _: &str, _: &str) -> RegicacheResult<Image> {
            unreachable!()
        }
        async fn update(&self, _: &Image) -> RegicacheResult<()> {
            unreachable!()
        }
        async fn delete(&self, _: &str, _: &str) -> RegicacheResult<()> {
            unreachable!()
        }
    }

    #[async_trait]
    impl TagStore for UnusedStore {
        async fn list(&self, _: &str, _: &str) -> RegicacheResult<Vec<Tag>> {
            unreachable!()
        }
        async fn get(&self, _: &str, _: &str, _: &str) -> RegicacheResult<Option<TagWithMetadata>> {
            unreachable!()
        }
        async fn create(
            &self,
            _: i64,
            _: &str,
            _: &str,
            _: Option<&NewTagMetadata>,
        ) -> RegicacheResult<Tag> {
            unreachable!()
        }
        async fn update(&self, _: &Tag, _: Option<&NewTagMetadata>) -> RegicacheResult<()> {
            unreachable!()
        }
        async fn delete(&self, _: &str, _: &str, _: &str) -> RegicacheResult<()> {
            unreachable!()
        }
    }

    fn fake_reconciler(config: Arc<dyn ConfigStore>) -> Reconciler {
        let registry = RegistryClient::new("http://127.0.0.1:0", RegistryAuth::default())
            .expect("building a client performs no I/O");
        Reconciler::new(
            registry,
            Arc::new(UnusedStore),
            Arc::new(UnusedStore),
            Arc::new(UnusedStore),
            config,
        )
    }

    #[tokio::test]
    async fn defaults_and_persists_sync_interval_when_unset() {
        let config: Arc<dyn ConfigStore> = Arc::new(InMemoryConfig::default());
        let scheduler = Scheduler::new(fake_reconciler(config.clone()), config.clone(), DEFAULT_INTERVAL_MINUTES)
            .await
            .unwrap();

        assert_eq!(
            config.get("sync_interval").await.unwrap(),
            Some(DEFAULT_INTERVAL_MINUTES.to_string())
        );
        scheduler.stop();
    }

    #[tokio::test]
    async fn seeds_configured_default_interval_on_fresh_database() {
        let config: Arc<dyn ConfigStore> = Arc::new(InMemoryConfig::default());
        let scheduler = Scheduler::new(fake_reconciler(config.clone()), config.clone(), 30)
            .await
            .unwrap();

        assert_eq!(config.get("sync_interval").await.unwrap(), Some("30".to_owned()));
        scheduler.stop();
    }

    #[tokio::test]
    async fn falls_back_to_hardcoded_default_when_configured_seed_is_invalid() {
        let config: Arc<dyn ConfigStore> = Arc::new(InMemoryConfig::default());
        let scheduler = Scheduler::new(fake_reconciler(config.clone()), config.clone(), 9001)
            .await
            .unwrap();

        assert_eq!(
            config.get("sync_interval").await.unwrap(),
            Some(DEFAULT_INTERVAL_MINUTES.to_string())
        );
        scheduler.stop();
    }

    #[tokio::test]
    async fn resets_invalid_stored_interval_to_default() {
        let config: Arc<dyn ConfigStore> = Arc::new(InMemoryConfig::default());
        config.update("sync_interval", "9001").await.unwrap();

        let scheduler = Scheduler::new(fake_reconciler(config.clone()), config.clone(), DEFAULT_INTERVAL_MINUTES)
            .await
            .unwrap();
        assert_eq!(scheduler.last_sync_time().await.unwrap(), None);

        // An invalid stored value falls back to the default in memory but is left
        // untouched on disk; only a subsequent `update_sync_interval` call persists a
        // corrected value.
        scheduler.update_sync_interval(DEFAULT_INTERVAL_MINUTES).await.unwrap();
        assert_eq!(
            config.get("sync_interval").await.unwrap(),
            Some(DEFAULT_INTERVAL_MINUTES.to_string())
        );
    }

    #[tokio::test]
    async fn rejects_interval_outside_the_allowed_set() {
        let config: Arc<dyn ConfigStore> = Arc::new(InMemoryConfig::default());
        let scheduler = Scheduler::new(fake_reconciler(config.clone()), config, DEFAULT_INTERVAL_MINUTES).await.unwrap();

        let err = scheduler.update_sync_interval(42).await.unwrap_err();
        assert!(matches!(err, RegicacheError::InvalidInterval(42)));
    }

    #[tokio::test]
    async fn accepts_and_persists_a_valid_interval() {
        let config: Arc<dyn ConfigStore> = Arc::new(InMemoryConfig::default());
        let scheduler = Scheduler::new(fake_reconciler(config.clone()), config.clone(), DEFAULT_INTERVAL_MINUTES)
            .await
            .unwrap();

        scheduler.update_sync_interval(30).await.unwrap();
        assert_eq!(config.get("sync_interval").await.unwrap(), Some("30".to_owned()));
    }
}
