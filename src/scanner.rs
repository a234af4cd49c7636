use ::time::{format_description::well_known, OffsetDateTime};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{ConfigError, ScanError};
use crate::probe::{Prober, Reachability, SystemProber};
use crate::range;
use crate::resolve::{Resolver, SystemResolver};
use crate::state::{ConfigHandle, ResultsHandle};
use crate::store::StateStore;
use crate::types::{AutoScanConfig, ProbeOutcome, ScanAggregate};

pub const DEFAULT_TIMEOUT_MS: u64 = 500;
pub const MIN_TIMEOUT_MS: u64 = 50;
pub const DEFAULT_CONCURRENCY: usize = 50;
pub const DEFAULT_RANGE: &str = "192.168.1.0/24";

/// Process-wide scan tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    pub timeout: Duration,
    pub concurrency: usize,
    pub default_range: String,
}

impl ScanSettings {
    /// Apply the floors: timeout at least 50ms, concurrency at least 1.
    pub fn new(timeout_ms: u64, concurrency: usize, default_range: impl Into<String>) -> Self {
        Self {
            timeout: Duration::from_millis(timeout_ms.max(MIN_TIMEOUT_MS)),
            concurrency: concurrency.max(1),
            default_range: default_range.into(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS, DEFAULT_CONCURRENCY, DEFAULT_RANGE)
    }
}

/// Owns the scan lifecycle and the shared config/result state.
///
/// At most one scan probes at a time; concurrent callers of [`Scanner::run_scan`]
/// queue on the scan lock instead of being rejected. Readers never wait for probing.
pub struct Scanner {
    settings: ScanSettings,
    prober: Arc<dyn Prober>,
    resolver: Arc<dyn Resolver>,
    config: ConfigHandle,
    results: ResultsHandle,
    scan_lock: Mutex<()>,
}

impl Scanner {
    /// Build a scanner around a state store, using the system prober and resolver.
    pub fn new(settings: ScanSettings, store: Arc<dyn StateStore>) -> Self {
        Self::with_backends(
            settings,
            store,
            Arc::new(SystemProber::new()),
            Arc::new(SystemResolver::default()),
        )
    }

    pub fn with_backends(
        settings: ScanSettings,
        store: Arc<dyn StateStore>,
        prober: Arc<dyn Prober>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        let config = ConfigHandle::load(store.clone(), &settings.default_range);
        let results = ResultsHandle::load(store);
        Self {
            settings,
            prober,
            resolver,
            config,
            results,
            scan_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub async fn config(&self) -> AutoScanConfig {
        self.config.get().await
    }

    /// Validate and store a new config. A running scan keeps its own range snapshot.
    pub async fn update_config(&self, cfg: AutoScanConfig) -> Result<AutoScanConfig, ConfigError> {
        let cfg = self.config.replace(cfg).await?;
        info!(
            ip_range = %cfg.ip_range,
            auto_scan_enabled = cfg.auto_scan_enabled,
            interval_secs = cfg.auto_scan_interval_seconds,
            "config updated"
        );
        Ok(cfg)
    }

    /// Set or clear the manual name for `ip` and apply it to the current results.
    ///
    /// The config write lock is held until the results lock is taken, so
    /// renames reach the results in the order they reached the config.
    pub async fn set_device_name(&self, ip: Ipv4Addr, name: &str) -> Result<String, ConfigError> {
        let (name, config) = self.config.set_device_name(ip, name).await?;
        let mut results = self.results.lock().await;
        drop(config);
        if results.rename(ip, &name) {
            results.commit().await;
        }
        Ok(name)
    }

    /// Whether auto-scan is on, and its interval in seconds.
    pub async fn auto_scan(&self) -> (bool, u64) {
        self.config.auto_scan().await
    }

    /// Latest published aggregate, partial while a scan is running.
    pub async fn results(&self) -> Arc<ScanAggregate> {
        self.results.snapshot().await
    }

    /// Run one full scan of the configured range and return the final aggregate.
    pub async fn run_scan(&self) -> Result<Arc<ScanAggregate>, ScanError> {
        let _owner = self.scan_lock.lock().await;
        let start = Instant::now();

        let cfg = self.config.get().await;
        let targets = range::expand(&cfg.ip_range)?;
        let total = targets.len();
        info!(ip_range = %cfg.ip_range, total, "scan started");

        self.results
            .publish(ScanAggregate::started(total, now_rfc3339()))
            .await;

        let sem = Arc::new(Semaphore::new(self.settings.concurrency));
        let mut set = JoinSet::new();
        for (idx, &ip) in targets.iter().enumerate() {
            let sem = sem.clone();
            let prober = self.prober.clone();
            let resolver = self.resolver.clone();
            let timeout = self.settings.timeout;
            set.spawn(async move {
                // The semaphore is never closed.
                let _permit = sem.acquire_owned().await.ok();
                (idx, scan_one(ip, prober.as_ref(), resolver.as_ref(), timeout).await)
            });
        }

        let mut merged = vec![false; total];
        let mut positions: Vec<usize> = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => {
                    self.merge(idx, outcome, &mut positions).await;
                    merged[idx] = true;
                }
                Err(e) => warn!(error = %e, "probe task failed"),
            }
        }

        // Any address whose task died is recorded offline so the counts add up.
        for (idx, &ip) in targets.iter().enumerate() {
            if !merged[idx] {
                self.merge(idx, offline_outcome(ip), &mut positions).await;
            }
        }

        let mut results = self.results.lock().await;
        let agg = results.get_mut();
        agg.scanning = false;
        agg.finished_at = now_rfc3339();
        agg.duration_ms = start.elapsed().as_millis() as u64;
        let final_agg = results.commit().await;

        info!(
            ip_range = %cfg.ip_range,
            duration_ms = final_agg.duration_ms,
            online = final_agg.online_count,
            offline = final_agg.offline_count,
            "scan complete"
        );
        Ok(final_agg)
    }

    /// Insert `outcome` at its address-order position and bump the counters.
    async fn merge(&self, idx: usize, mut outcome: ProbeOutcome, positions: &mut Vec<usize>) {
        let names = self.config.read().await;
        let mut results = self.results.lock().await;
        outcome.manual_name = names
            .device_names
            .get(&outcome.ip)
            .cloned()
            .unwrap_or_default();
        drop(names);

        let at = positions.partition_point(|&p| p < idx);
        positions.insert(at, idx);

        let agg = results.get_mut();
        if outcome.online {
            agg.online_count += 1;
        } else {
            agg.offline_count += 1;
        }
        agg.completed += 1;
        agg.items.insert(at, outcome);
        results.commit().await;
    }
}

/// Probe one address and, if it answers, resolve its name.
async fn scan_one(
    ip: Ipv4Addr,
    prober: &dyn Prober,
    resolver: &dyn Resolver,
    timeout: Duration,
) -> ProbeOutcome {
    let verdict = prober.probe(ip, timeout).await;
    let hostname = match verdict {
        Reachability::Online { .. } => resolver.resolve(ip).await,
        Reachability::Offline => String::new(),
    };
    ProbeOutcome {
        ip,
        online: verdict.is_online(),
        latency_ms: verdict.latency_ms(),
        hostname,
        manual_name: String::new(),
        observed_at: now_rfc3339(),
    }
}

fn offline_outcome(ip: Ipv4Addr) -> ProbeOutcome {
    ProbeOutcome {
        ip,
        online: false,
        latency_ms: None,
        hostname: String::new(),
        manual_name: String::new(),
        observed_at: now_rfc3339(),
    }
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
