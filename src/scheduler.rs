use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::ScanError;
use crate::scanner::Scanner;

/// Granularity at which the enable flag is polled.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Source of delays for the scheduler loop.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[async_trait]
impl<C: Clock + ?Sized> Clock for Arc<C> {
    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await;
    }
}

/// Real time via `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// The work the scheduler drives: an enable flag with an interval, and a scan.
#[async_trait]
pub trait ScanJob: Send + Sync {
    /// Whether auto-scan is on, and its interval in seconds.
    async fn auto_scan(&self) -> (bool, u64);
    async fn run(&self) -> Result<(), ScanError>;
}

#[async_trait]
impl ScanJob for Scanner {
    async fn auto_scan(&self) -> (bool, u64) {
        Scanner::auto_scan(self).await
    }

    async fn run(&self) -> Result<(), ScanError> {
        self.run_scan().await.map(|_| ())
    }
}

/// What a single scheduler cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Auto-scan is off; nothing armed.
    Idle,
    /// Armed, but auto-scan was disabled before the interval elapsed.
    Skipped,
    Scanned,
    Failed(String),
}

/// Periodically re-runs the scan while auto-scan is enabled.
pub struct AutoScanner<C = TokioClock> {
    job: Arc<dyn ScanJob>,
    clock: C,
}

impl AutoScanner<TokioClock> {
    pub fn new(job: Arc<dyn ScanJob>) -> Self {
        Self::with_clock(job, TokioClock)
    }
}

impl<C: Clock> AutoScanner<C> {
    pub fn with_clock(job: Arc<dyn ScanJob>, clock: C) -> Self {
        Self { job, clock }
    }

    /// One poll cycle.
    ///
    /// Waits one poll interval and reads the enable flag. When enabled, sleeps
    /// the configured interval and checks the flag again right before scanning.
    pub async fn tick(&self) -> TickOutcome {
        self.clock.sleep(POLL_INTERVAL).await;
        let (enabled, interval_secs) = self.job.auto_scan().await;
        if !enabled {
            return TickOutcome::Idle;
        }

        debug!(interval_secs, "auto-scan armed");
        self.clock.sleep(Duration::from_secs(interval_secs)).await;

        let (still_enabled, _) = self.job.auto_scan().await;
        if !still_enabled {
            info!("auto-scan disabled during wait, skipping");
            return TickOutcome::Skipped;
        }

        info!("auto-scan triggered");
        match self.job.run().await {
            Ok(()) => TickOutcome::Scanned,
            Err(e) => {
                error!(error = %e, "auto-scan failed");
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    /// Loop until `shutdown` fires. Scan errors never end the loop.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.tick() => {}
            }
        }
        debug!("auto-scan loop stopped");
    }
}
