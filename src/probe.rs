use async_trait::async_trait;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::{self, Instant};
use tracing::debug;

/// Ports tried, in order, when the ICMP probe gets no answer.
pub const FALLBACK_PORTS: &[u16] = &[80, 443, 22, 445];

/// Lower bound for the ICMP deadline.
const MIN_PING_DEADLINE: Duration = Duration::from_millis(100);
/// Extra time granted to the ping process on top of its own `-W` deadline.
const PING_SLACK: Duration = Duration::from_millis(500);

/// Liveness verdict for one address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reachability {
    Online { latency_ms: f64 },
    Offline,
}

impl Reachability {
    pub fn is_online(&self) -> bool {
        matches!(self, Reachability::Online { .. })
    }

    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            Reachability::Online { latency_ms } => Some(*latency_ms),
            Reachability::Offline => None,
        }
    }
}

/// Why a single probing strategy came back negative.
#[derive(Error, Debug)]
pub enum ProbeFailure {
    #[error("probe mechanism unavailable: {0}")]
    Unavailable(#[source] io::Error),
    #[error("no reply (exit status {0:?})")]
    NoReply(Option<i32>),
    #[error("deadline of {0:?} exceeded")]
    TimedOut(Duration),
    #[error("no port accepted a connection")]
    NoOpenPort,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Determines whether an address is reachable.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, ip: Ipv4Addr, timeout: Duration) -> Reachability;
}

/// ICMP echo through the system `ping` binary, falling back to TCP connects.
#[derive(Debug, Clone)]
pub struct SystemProber {
    ping_program: String,
    fallback_ports: Vec<u16>,
}

impl Default for SystemProber {
    fn default() -> Self {
        Self {
            ping_program: "ping".to_string(),
            fallback_ports: FALLBACK_PORTS.to_vec(),
        }
    }
}

impl SystemProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ping_program(mut self, program: impl Into<String>) -> Self {
        self.ping_program = program.into();
        self
    }

    pub fn with_fallback_ports(mut self, ports: Vec<u16>) -> Self {
        self.fallback_ports = ports;
        self
    }

    /// One echo request; returns the round trip in milliseconds.
    ///
    /// The child is killed and reaped if it outlives its deadline.
    pub async fn ping(&self, ip: Ipv4Addr, timeout: Duration) -> Result<f64, ProbeFailure> {
        let deadline = timeout.max(MIN_PING_DEADLINE);
        let wait_secs = deadline.as_secs().max(1);

        let mut child = Command::new(&self.ping_program)
            .args(["-c", "1", "-W", &wait_secs.to_string(), &ip.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProbeFailure::Unavailable)?;

        let start = Instant::now();
        let waited = time::timeout(deadline + PING_SLACK, child.wait()).await;
        match waited {
            Ok(Ok(status)) if status.success() => Ok(round_ms(start.elapsed())),
            Ok(Ok(status)) => Err(ProbeFailure::NoReply(status.code())),
            Ok(Err(e)) => Err(ProbeFailure::Io(e)),
            Err(_) => {
                // kill() also waits, so the process is reaped here.
                let _ = child.kill().await;
                Err(ProbeFailure::TimedOut(deadline + PING_SLACK))
            }
        }
    }

    /// Connect to the fallback ports in order; the first success gives the latency.
    pub async fn tcp_probe(&self, ip: Ipv4Addr, timeout: Duration) -> Result<f64, ProbeFailure> {
        for &port in &self.fallback_ports {
            let addr = SocketAddr::new(ip.into(), port);
            let start = Instant::now();
            match time::timeout(timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    let latency = round_ms(start.elapsed());
                    drop(stream);
                    return Ok(latency);
                }
                Ok(Err(e)) => debug!(%ip, port, error = %e, "tcp connect failed"),
                Err(_) => debug!(%ip, port, "tcp connect timed out"),
            }
        }
        Err(ProbeFailure::NoOpenPort)
    }
}

#[async_trait]
impl Prober for SystemProber {
    async fn probe(&self, ip: Ipv4Addr, timeout: Duration) -> Reachability {
        match self.ping(ip, timeout).await {
            Ok(latency_ms) => return Reachability::Online { latency_ms },
            Err(e) => debug!(%ip, error = %e, "icmp probe negative, trying tcp"),
        }
        match self.tcp_probe(ip, timeout).await {
            Ok(latency_ms) => Reachability::Online { latency_ms },
            Err(e) => {
                debug!(%ip, error = %e, "tcp probe negative");
                Reachability::Offline
            }
        }
    }
}

/// Milliseconds rounded to two decimals.
fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}
