use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::error::ConfigError;
use crate::range;

pub const MIN_RANGE_LEN: usize = 7;
pub const MAX_RANGE_LEN: usize = 64;
pub const MIN_INTERVAL_SECS: u64 = 5;
pub const MAX_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const MAX_NAME_LEN: usize = 64;

/// Result of probing a single address during one scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub ip: Ipv4Addr,
    pub online: bool,
    /// Round-trip sample in milliseconds; `None` iff the host is offline.
    pub latency_ms: Option<f64>,
    /// Reverse-resolved name; empty unless online and resolvable.
    #[serde(default)]
    pub hostname: String,
    /// User-assigned display name, joined from config.
    #[serde(default)]
    pub manual_name: String,
    pub observed_at: String,
}

/// Progress counters and ordered outcomes of the current (or last) scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ScanAggregate {
    pub started_at: String,
    /// Empty while the scan is in progress.
    pub finished_at: String,
    pub duration_ms: u64,
    pub total: u64,
    pub completed: u64,
    pub online_count: u64,
    pub offline_count: u64,
    pub scanning: bool,
    pub items: Vec<ProbeOutcome>,
}

impl ScanAggregate {
    /// Fresh aggregate announcing a scan of `total` addresses.
    pub fn started(total: usize, started_at: String) -> Self {
        Self {
            started_at,
            total: total as u64,
            scanning: true,
            ..Self::default()
        }
    }

    /// Check the counter invariants; used when loading persisted state.
    pub fn is_consistent(&self) -> bool {
        self.online_count + self.offline_count == self.completed
            && self.completed <= self.total
            && self.items.len() as u64 <= self.completed
    }
}

/// User-editable scan configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AutoScanConfig {
    pub ip_range: String,
    #[serde(default)]
    pub auto_scan_enabled: bool,
    #[serde(default = "default_interval")]
    pub auto_scan_interval_seconds: u64,
    #[serde(default)]
    pub device_names: BTreeMap<Ipv4Addr, String>,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl AutoScanConfig {
    pub fn with_range(ip_range: impl Into<String>) -> Self {
        Self {
            ip_range: ip_range.into(),
            auto_scan_enabled: false,
            auto_scan_interval_seconds: DEFAULT_INTERVAL_SECS,
            device_names: BTreeMap::new(),
        }
    }

    /// Validate bounds and the range spec; trims device names and drops empty ones.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let len = self.ip_range.chars().count();
        if !(MIN_RANGE_LEN..=MAX_RANGE_LEN).contains(&len) {
            return Err(ConfigError::RangeLength {
                min: MIN_RANGE_LEN,
                max: MAX_RANGE_LEN,
            });
        }
        range::expand(&self.ip_range)?;

        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&self.auto_scan_interval_seconds) {
            return Err(ConfigError::Interval {
                min: MIN_INTERVAL_SECS,
                max: MAX_INTERVAL_SECS,
            });
        }

        let mut cleaned = BTreeMap::new();
        for (ip, name) in self.device_names {
            let name = normalize_name(&name)?;
            if !name.is_empty() {
                cleaned.insert(ip, name);
            }
        }
        self.device_names = cleaned;
        Ok(self)
    }
}

/// Trim a manual device name and enforce its length bound.
pub fn normalize_name(name: &str) -> Result<String, ConfigError> {
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ConfigError::NameTooLong { max: MAX_NAME_LEN });
    }
    Ok(name.trim().to_string())
}
