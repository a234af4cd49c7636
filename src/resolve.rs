use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tokio::time;
use tracing::debug;

/// Best-effort reverse name lookup. Returns an empty string when nothing resolves.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, ip: Ipv4Addr) -> String;
}

/// Reverse lookup through the system resolver, run on the blocking pool.
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
        }
    }
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, ip: Ipv4Addr) -> String {
        let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&IpAddr::V4(ip)));
        match time::timeout(self.timeout, lookup).await {
            Ok(Ok(Ok(name))) => clean_hostname(ip, name),
            Ok(Ok(Err(e))) => {
                debug!(%ip, error = %e, "reverse lookup failed");
                String::new()
            }
            Ok(Err(e)) => {
                debug!(%ip, error = %e, "reverse lookup task failed");
                String::new()
            }
            Err(_) => {
                debug!(%ip, "reverse lookup timed out");
                String::new()
            }
        }
    }
}

// getnameinfo falls back to the numeric form when there is no PTR record.
fn clean_hostname(ip: Ipv4Addr, name: String) -> String {
    let name = name.trim_end_matches('.');
    if name.is_empty() || name == ip.to_string() {
        String::new()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_answer_means_no_name() {
        let ip = Ipv4Addr::new(10, 0, 0, 7);
        assert_eq!(clean_hostname(ip, "10.0.0.7".into()), "");
        assert_eq!(clean_hostname(ip, "nas.lan.".into()), "nas.lan");
    }
}
