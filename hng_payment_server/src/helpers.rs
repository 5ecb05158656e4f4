use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use log::{debug, trace, warn};
use regex::Regex;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            // Proxies append; the first entry is the original client.
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        let re = Regex::new(r#"for=(?P<ip>[^;,]+)"#).expect("valid regex literal");
        result = req
            .headers()
            .get("Forwarded")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| re.captures(v))
            .and_then(|caps| caps.name("ip"))
            .map(|m| m.as_str().trim_matches(|c| c == '"' || c == '[' || c == ']'))
            .and_then(|s| IpAddr::from_str(s).ok());
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.peer_addr().map(|a| a.ip());
        trace!("Using peer address for remote address: {:?}", peer_addr);
        peer_addr
    })
}

//-------------------------------------------------  CidrRange  --------------------------------------------------------

/// A whitelist entry: either a single address (`18.230.10.5`) or a CIDR range (`18.230.0.0/16`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix: u8,
}

impl CidrRange {
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = if self.prefix == 0 { 0 } else { u32::MAX << (32 - u32::from(self.prefix)) };
                (u32::from(net) & mask) == (u32::from(ip) & mask)
            },
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = if self.prefix == 0 { 0 } else { u128::MAX << (128 - u32::from(self.prefix)) };
                (u128::from(net) & mask) == (u128::from(ip) & mask)
            },
            _ => false,
        }
    }
}

impl FromStr for CidrRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => {
                let prefix = prefix.parse::<u8>().map_err(|e| format!("Invalid prefix length in {s}: {e}"))?;
                (addr, Some(prefix))
            },
            None => (s, None),
        };
        let network = IpAddr::from_str(addr.trim()).map_err(|e| format!("Invalid IP address in {s}: {e}"))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = prefix.unwrap_or(max);
        if prefix > max {
            return Err(format!("Prefix length {prefix} is too long for {addr}"));
        }
        Ok(Self { network, prefix })
    }
}

/// True when `ip` matches any entry of the whitelist. An empty whitelist matches nothing.
pub fn ip_whitelisted(ip: IpAddr, whitelist: &[CidrRange]) -> bool {
    let allowed = whitelist.iter().any(|range| range.contains(ip));
    if !allowed {
        warn!("Address {ip} is not on the whitelist. Denying access.");
    }
    allowed
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_address_range() {
        let range: CidrRange = "18.230.10.5".parse().unwrap();
        assert!(range.contains("18.230.10.5".parse().unwrap()));
        assert!(!range.contains("18.230.10.6".parse().unwrap()));
    }

    #[test]
    fn cidr_membership() {
        let range: CidrRange = "18.230.0.0/16".parse().unwrap();
        assert!(range.contains("18.230.255.1".parse().unwrap()));
        assert!(!range.contains("18.231.0.1".parse().unwrap()));
        let all: CidrRange = "0.0.0.0/0".parse().unwrap();
        assert!(all.contains("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn v6_and_mixed() {
        let range: CidrRange = "2001:db8::/32".parse().unwrap();
        assert!(range.contains("2001:db8::1".parse().unwrap()));
        assert!(!range.contains("2001:db9::1".parse().unwrap()));
        // A v4 address never matches a v6 range.
        assert!(!range.contains("18.230.10.5".parse().unwrap()));
    }

    #[test]
    fn bad_entries_are_rejected() {
        assert!("not-an-ip".parse::<CidrRange>().is_err());
        assert!("10.0.0.0/33".parse::<CidrRange>().is_err());
    }

    #[test]
    fn empty_whitelist_denies() {
        assert!(!ip_whitelisted("10.0.0.1".parse().unwrap(), &[]));
    }
}
