use thiserror::Error;

/// A range spec that cannot be turned into a list of IPv4 addresses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid IPv4 network: {0}")]
    InvalidNetwork(String),
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),
    #[error("only IPv4 ranges are supported")]
    NotIpv4,
    #[error("range start must be <= range end")]
    Reversed,
    #[error("range too large (max {max} addresses, got {size})")]
    TooLarge { size: u64, max: u64 },
}

/// Rejections from config and device-name updates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error("ip_range must be between {min} and {max} characters")]
    RangeLength { min: usize, max: usize },
    #[error("auto_scan_interval_seconds must be between {min} and {max}")]
    Interval { min: u64, max: u64 },
    #[error("invalid device address: {0}")]
    DeviceAddress(String),
    #[error("device name too long (max {max} characters)")]
    NameTooLong { max: usize },
}

/// Errors surfaced to callers of `Scanner::run_scan`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error(transparent)]
    InvalidRange(#[from] RangeError),
}
