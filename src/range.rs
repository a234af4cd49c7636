use ipnet::{IpNet, Ipv4Net};
use std::net::{IpAddr, Ipv4Addr};

use crate::error::RangeError;

/// Largest number of addresses a range spec may expand to.
pub const MAX_RANGE_SIZE: u64 = 65_536;

/// Expand a range spec into the ordered list of IPv4 addresses it denotes.
///
/// Supported forms, tried in order:
/// - CIDR: `192.168.1.0/24` (usable hosts only, network/broadcast excluded)
/// - inclusive dash range: `10.0.0.1-10.0.0.20`
/// - single address: `10.0.0.5`
///
/// Surrounding whitespace is ignored, including around the dash.
pub fn expand(spec: &str) -> Result<Vec<Ipv4Addr>, RangeError> {
    let spec = spec.trim();

    if spec.contains('/') {
        let net: IpNet = spec
            .parse::<IpNet>()
            .map_err(|e| RangeError::InvalidNetwork(format!("{spec}: {e}")))?;
        let IpNet::V4(n4) = net else {
            return Err(RangeError::NotIpv4);
        };
        let size = host_count(n4);
        if size > MAX_RANGE_SIZE {
            return Err(RangeError::TooLarge {
                size,
                max: MAX_RANGE_SIZE,
            });
        }
        return Ok(ipv4net_hosts(n4));
    }

    if let Some((a, b)) = spec.split_once('-') {
        let start = parse_v4(a.trim())?;
        let end = parse_v4(b.trim())?;
        return dash_range(start, end);
    }

    Ok(vec![parse_v4(spec)?])
}

/// Inclusive range `start..=end`, bounded by [`MAX_RANGE_SIZE`].
pub fn dash_range(start: Ipv4Addr, end: Ipv4Addr) -> Result<Vec<Ipv4Addr>, RangeError> {
    let (lo, hi) = (u32::from(start), u32::from(end));
    if lo > hi {
        return Err(RangeError::Reversed);
    }
    let size = u64::from(hi) - u64::from(lo) + 1;
    if size > MAX_RANGE_SIZE {
        return Err(RangeError::TooLarge {
            size,
            max: MAX_RANGE_SIZE,
        });
    }
    Ok((lo..=hi).map(Ipv4Addr::from).collect())
}

/// Host addresses of an IPv4 network.
///
/// Network and broadcast are skipped for prefixes up to /30; a /31 yields both
/// point-to-point addresses and a /32 yields the single address.
pub fn ipv4net_hosts(net: Ipv4Net) -> Vec<Ipv4Addr> {
    let start = u32::from(net.network());
    let end = u32::from(net.broadcast());
    match net.prefix_len() {
        32 => vec![net.network()],
        31 => vec![Ipv4Addr::from(start), Ipv4Addr::from(end)],
        _ => (start + 1..end).map(Ipv4Addr::from).collect(),
    }
}

/// Number of addresses [`ipv4net_hosts`] yields, without building them.
pub fn host_count(net: Ipv4Net) -> u64 {
    match net.prefix_len() {
        32 => 1,
        31 => 2,
        p => (1u64 << (32 - u32::from(p))) - 2,
    }
}

fn parse_v4(s: &str) -> Result<Ipv4Addr, RangeError> {
    match s.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => Ok(v4),
        Ok(IpAddr::V6(_)) => Err(RangeError::NotIpv4),
        Err(_) => Err(RangeError::InvalidAddress(s.to_string())),
    }
}
