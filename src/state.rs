use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::error::ConfigError;
use crate::store::StateStore;
use crate::types::{normalize_name, AutoScanConfig, ScanAggregate};

/// Shared, independently locked holder of the auto-scan config.
///
/// When both are needed, the config lock is taken before the results lock.
pub struct ConfigHandle {
    inner: RwLock<AutoScanConfig>,
    store: Arc<dyn StateStore>,
}

impl ConfigHandle {
    /// Load the persisted config, falling back to `default_range` with auto-scan off.
    ///
    /// The effective config is written back so a repaired file is left on disk.
    pub fn load(store: Arc<dyn StateStore>, default_range: &str) -> Self {
        let cfg = match store.load_config().map(AutoScanConfig::validate) {
            Some(Ok(cfg)) => cfg,
            Some(Err(e)) => {
                warn!(error = %e, "config invalid, reverting to defaults");
                AutoScanConfig::with_range(default_range)
            }
            None => AutoScanConfig::with_range(default_range),
        };
        if let Err(e) = store.save_config(&cfg) {
            warn!(error = %e, "failed to persist config");
        }
        Self {
            inner: RwLock::new(cfg),
            store,
        }
    }

    pub async fn get(&self) -> AutoScanConfig {
        self.inner.read().await.clone()
    }

    pub async fn auto_scan(&self) -> (bool, u64) {
        let cfg = self.inner.read().await;
        (cfg.auto_scan_enabled, cfg.auto_scan_interval_seconds)
    }

    /// Shared read access, e.g. to look up names while taking the results lock.
    pub async fn read(&self) -> RwLockReadGuard<'_, AutoScanConfig> {
        self.inner.read().await
    }

    /// Validate and replace the whole config.
    pub async fn replace(&self, cfg: AutoScanConfig) -> Result<AutoScanConfig, ConfigError> {
        let cfg = cfg.validate()?;
        let mut guard = self.inner.write().await;
        *guard = cfg.clone();
        self.persist(&guard);
        Ok(cfg)
    }

    /// Set or (with an empty name) clear a manual device name.
    ///
    /// Returns the stored name together with the still-held write guard, so the
    /// caller can apply the same name to the results before another rename runs.
    pub async fn set_device_name(
        &self,
        ip: Ipv4Addr,
        name: &str,
    ) -> Result<(String, RwLockWriteGuard<'_, AutoScanConfig>), ConfigError> {
        let name = normalize_name(name)?;
        let mut guard = self.inner.write().await;
        if name.is_empty() {
            guard.device_names.remove(&ip);
        } else {
            guard.device_names.insert(ip, name.clone());
        }
        self.persist(&guard);
        Ok((name, guard))
    }

    fn persist(&self, cfg: &AutoScanConfig) {
        if let Err(e) = self.store.save_config(cfg) {
            warn!(error = %e, "failed to persist config");
        }
    }
}

/// Shared holder of the current scan aggregate.
///
/// Readers take a cheap `Arc` snapshot; writers mutate through
/// `Arc::make_mut`, so a snapshot already handed out is never changed.
/// Persistence runs after the write lock is released, on the blocking pool.
pub struct ResultsHandle {
    inner: RwLock<Arc<ScanAggregate>>,
    store: Arc<dyn StateStore>,
    /// Bumped under the write lock on every change.
    revision: AtomicU64,
    /// Revision of the last value handed to the store.
    persisted: Mutex<u64>,
}

impl ResultsHandle {
    /// Load the last persisted aggregate, or an empty one.
    pub fn load(store: Arc<dyn StateStore>) -> Self {
        let agg = match store.load_aggregate() {
            Some(agg) if agg.is_consistent() => {
                if agg.scanning {
                    warn!("previous scan was interrupted, keeping its partial results");
                }
                ScanAggregate {
                    scanning: false,
                    ..agg
                }
            }
            Some(_) => {
                warn!("results file inconsistent, resetting");
                let empty = ScanAggregate::default();
                if let Err(e) = store.save_aggregate(&empty) {
                    warn!(error = %e, "failed to persist results");
                }
                empty
            }
            None => ScanAggregate::default(),
        };
        Self {
            inner: RwLock::new(Arc::new(agg)),
            store,
            revision: AtomicU64::new(0),
            persisted: Mutex::new(0),
        }
    }

    pub async fn snapshot(&self) -> Arc<ScanAggregate> {
        self.inner.read().await.clone()
    }

    /// Swap in a new aggregate and persist it.
    pub async fn publish(&self, agg: ScanAggregate) -> Arc<ScanAggregate> {
        let mut results = self.lock().await;
        *results.guard = Arc::new(agg);
        results.commit().await
    }

    /// Exclusive access for an in-place update; call [`ResultsGuard::commit`] to persist.
    pub async fn lock(&self) -> ResultsGuard<'_> {
        ResultsGuard {
            guard: self.inner.write().await,
            handle: self,
        }
    }

    /// Write `agg` unless a newer revision already reached the store.
    async fn persist(&self, revision: u64, agg: Arc<ScanAggregate>) {
        let mut persisted = self.persisted.lock().await;
        if revision <= *persisted {
            return;
        }
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.save_aggregate(&agg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to persist results"),
            Err(e) => warn!(error = %e, "results writer task failed"),
        }
        *persisted = revision;
    }
}

/// Write access to the current aggregate.
pub struct ResultsGuard<'a> {
    guard: RwLockWriteGuard<'a, Arc<ScanAggregate>>,
    handle: &'a ResultsHandle,
}

impl ResultsGuard<'_> {
    pub fn get(&self) -> &ScanAggregate {
        &self.guard
    }

    pub fn get_mut(&mut self) -> &mut ScanAggregate {
        Arc::make_mut(&mut self.guard)
    }

    /// Apply a manual name to every item for `ip`. Counters are untouched.
    ///
    /// Returns whether any item matched.
    pub fn rename(&mut self, ip: Ipv4Addr, name: &str) -> bool {
        if !self.get().items.iter().any(|item| item.ip == ip) {
            return false;
        }
        for item in self.get_mut().items.iter_mut().filter(|item| item.ip == ip) {
            item.manual_name = name.to_string();
        }
        true
    }

    /// Release the lock, then persist the committed value.
    ///
    /// Readers see the new value as soon as the lock drops; they never wait on
    /// the store. An older revision never overwrites a newer one on disk.
    pub async fn commit(self) -> Arc<ScanAggregate> {
        let ResultsGuard { guard, handle } = self;
        let snapshot = Arc::clone(&guard);
        let revision = handle.revision.fetch_add(1, Ordering::SeqCst) + 1;
        drop(guard);
        handle.persist(revision, snapshot.clone()).await;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::ProbeOutcome;

    fn outcome(ip: Ipv4Addr, online: bool) -> ProbeOutcome {
        ProbeOutcome {
            ip,
            online,
            latency_ms: online.then_some(1.5),
            hostname: String::new(),
            manual_name: String::new(),
            observed_at: String::new(),
        }
    }

    #[tokio::test]
    async fn invalid_stored_config_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        store
            .save_config(&AutoScanConfig::with_range("not-a-range"))
            .unwrap();
        let handle = ConfigHandle::load(store.clone(), "192.168.1.0/24");
        assert_eq!(handle.get().await.ip_range, "192.168.1.0/24");
        assert_eq!(store.load_config().unwrap().ip_range, "192.168.1.0/24");
    }

    #[tokio::test]
    async fn interrupted_scan_is_not_reported_as_running() {
        let store = Arc::new(MemoryStore::new());
        let mut agg = ScanAggregate::started(3, "t0".into());
        agg.items.push(outcome(Ipv4Addr::new(10, 0, 0, 1), true));
        agg.completed = 1;
        agg.online_count = 1;
        store.save_aggregate(&agg).unwrap();

        let results = ResultsHandle::load(store);
        let snap = results.snapshot().await;
        assert!(!snap.scanning);
        assert_eq!(snap.completed, 1);
    }

    #[tokio::test]
    async fn snapshots_are_immutable() {
        let results = ResultsHandle::load(Arc::new(MemoryStore::new()));
        let before = results.snapshot().await;

        let mut guard = results.lock().await;
        guard.get_mut().items.push(outcome(Ipv4Addr::new(10, 0, 0, 1), false));
        guard.get_mut().completed = 1;
        guard.get_mut().offline_count = 1;
        guard.commit().await;

        assert!(before.items.is_empty());
        assert_eq!(results.snapshot().await.items.len(), 1);
    }

    #[tokio::test]
    async fn rename_keeps_probe_fields() {
        let results = ResultsHandle::load(Arc::new(MemoryStore::new()));
        let ip = Ipv4Addr::new(10, 0, 0, 2);
        let mut agg = ScanAggregate::started(1, "t0".into());
        agg.items.push(outcome(ip, true));
        agg.completed = 1;
        agg.online_count = 1;
        results.publish(agg).await;

        let mut guard = results.lock().await;
        assert!(guard.rename(ip, "printer"));
        assert!(!guard.rename(Ipv4Addr::new(10, 0, 0, 9), "nobody"));
        guard.commit().await;
        let snap = results.snapshot().await;
        assert_eq!(snap.items[0].manual_name, "printer");
        assert!(snap.items[0].online);
        assert_eq!(snap.items[0].latency_ms, Some(1.5));
        assert_eq!(snap.online_count, 1);
    }

    #[tokio::test]
    async fn stale_revision_is_not_written_over_newer_one() {
        let store = Arc::new(MemoryStore::new());
        let results = ResultsHandle::load(store.clone());

        let mut newer = ScanAggregate::started(2, "t1".into());
        newer.duration_ms = 7;
        results.persist(2, Arc::new(newer)).await;
        results
            .persist(1, Arc::new(ScanAggregate::started(1, "t0".into())))
            .await;

        assert_eq!(store.aggregate_saves(), 1);
        assert_eq!(store.load_aggregate().unwrap().started_at, "t1");
    }

    #[tokio::test]
    async fn config_lock_is_held_across_rename() {
        let handle = ConfigHandle::load(Arc::new(MemoryStore::new()), "10.0.0.0/30");
        let ip = Ipv4Addr::new(10, 0, 0, 1);
        let (name, guard) = handle.set_device_name(ip, "  nas ").await.unwrap();
        assert_eq!(name, "nas");
        assert!(handle.inner.try_read().is_err());
        drop(guard);
        assert_eq!(handle.read().await.device_names.get(&ip).unwrap(), "nas");
    }
}
