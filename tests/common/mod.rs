#![allow(dead_code)]

use async_trait::async_trait;
use lan_sweep_rs::probe::{Prober, Reachability};
use lan_sweep_rs::resolve::Resolver;
use lan_sweep_rs::scanner::{ScanSettings, Scanner};
use lan_sweep_rs::store::{MemoryStore, StateStore};
use lan_sweep_rs::types::AutoScanConfig;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scripted prober: selected hosts answer, each after a per-address delay.
pub struct FakeProber {
    online: HashSet<Ipv4Addr>,
    delay: Box<dyn Fn(Ipv4Addr) -> Duration + Send + Sync>,
    panic_on: Option<Ipv4Addr>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeProber {
    pub fn new(online: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        Self {
            online: online.into_iter().collect(),
            delay: Box::new(|_| Duration::ZERO),
            panic_on: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, f: impl Fn(Ipv4Addr) -> Duration + Send + Sync + 'static) -> Self {
        self.delay = Box::new(f);
        self
    }

    /// The task checking `ip` panics instead of answering.
    pub fn with_panic_on(mut self, ip: Ipv4Addr) -> Self {
        self.panic_on = Some(ip);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, ip: Ipv4Addr, _timeout: Duration) -> Reachability {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = (self.delay)(ip);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.panic_on == Some(ip) {
            panic!("scripted failure for {ip}");
        }
        if self.online.contains(&ip) {
            Reachability::Online { latency_ms: 1.25 }
        } else {
            Reachability::Offline
        }
    }
}

/// Names every host `host-<last octet>`, counting lookups.
#[derive(Default)]
pub struct FakeResolver {
    pub lookups: AtomicUsize,
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolve(&self, ip: Ipv4Addr) -> String {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        format!("host-{}", ip.octets()[3])
    }
}

pub fn ip(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 0, 0, last)
}

/// Scanner over an in-memory store whose config is seeded with `range`.
pub fn scanner_with(
    range: &str,
    prober: Arc<FakeProber>,
    resolver: Arc<FakeResolver>,
    concurrency: usize,
) -> (Arc<Scanner>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store
        .save_config(&AutoScanConfig::with_range(range))
        .expect("memory store");
    let scanner = Scanner::with_backends(
        ScanSettings::new(100, concurrency, "192.168.1.0/24"),
        store.clone(),
        prober,
        resolver,
    );
    (Arc::new(scanner), store)
}
