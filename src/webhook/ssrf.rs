//! SSRF mitigation for webhook URLs (spec.md §4.7): scheme restricted to
//! `http`/`https`, target addresses resolved and checked against
//! loopback/private/link-local/CGNAT/IPv6-ULA ranges.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::{AppError, AppResult};

pub fn validate_scheme(url: &url::Url) -> AppResult<()> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(AppError::InvalidInput(format!(
            "webhook url scheme must be http or https, got '{other}'"
        ))),
    }
}

/// True if `addr` must be rejected as an SSRF target.
pub fn is_forbidden_address(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_forbidden_v4(v4),
        IpAddr::V6(v6) => is_forbidden_v6(v6),
    }
}

fn is_forbidden_v4(addr: Ipv4Addr) -> bool {
    addr.is_loopback()
        || addr.is_link_local()
        || addr.is_private() // RFC 1918
        || addr.is_broadcast()
        || addr.is_documentation()
        || is_cgnat(addr)
        || addr.is_unspecified()
}

/// 100.64.0.0/10, RFC 6598 — shared address space used by carrier-grade NAT.
fn is_cgnat(addr: Ipv4Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 100 && (octets[1] & 0b1100_0000) == 0b0100_0000
}

fn is_forbidden_v6(addr: Ipv6Addr) -> bool {
    addr.is_loopback()
        || addr.is_unspecified()
        || is_unique_local(addr)
        || is_ipv6_link_local(addr)
        || addr.to_ipv4_mapped().is_some_and(is_forbidden_v4)
}

/// fc00::/7 — IPv6 unique local addresses (RFC 4193).
fn is_unique_local(addr: Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xfe00) == 0xfc00
}

/// fe80::/10.
fn is_ipv6_link_local(addr: Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Validates the URL's scheme and every resolved address for its host.
/// Called once per delivery attempt — DNS can change between attempts, so
/// this is not cached.
pub async fn validate_url(raw_url: &str) -> AppResult<url::Url> {
    let url = url::Url::parse(raw_url)
        .map_err(|e| AppError::InvalidInput(format!("invalid webhook url: {e}")))?;
    validate_scheme(&url)?;

    let host = url
        .host_str()
        .ok_or_else(|| AppError::InvalidInput("webhook url has no host".to_string()))?;
    let port = url.port_or_known_default().unwrap_or(443);

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| AppError::InvalidInput(format!("failed to resolve webhook host: {e}")))?;

    let mut any_resolved = false;
    for addr in addrs {
        any_resolved = true;
        if is_forbidden_address(addr.ip()) {
            return Err(AppError::InvalidInput(format!(
                "webhook url resolves to a disallowed address: {}",
                addr.ip()
            )));
        }
    }
    if !any_resolved {
        return Err(AppError::InvalidInput(
            "webhook host did not resolve to any address".to_string(),
        ));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_loopback_and_private_ranges() {
        assert!(is_forbidden_address("127.0.0.1".parse().unwrap()));
        assert!(is_forbidden_address("10.0.0.5".parse().unwrap()));
        assert!(is_forbidden_address("192.168.1.1".parse().unwrap()));
        assert!(is_forbidden_address("169.254.1.1".parse().unwrap()));
        assert!(is_forbidden_address("100.64.0.1".parse().unwrap()));
    }

    #[test]
    fn allows_public_v4_address() {
        assert!(!is_forbidden_address("93.184.216.34".parse().unwrap()));
    }

    #[test]
    fn rejects_ipv6_loopback_and_ula() {
        assert!(is_forbidden_address("::1".parse().unwrap()));
        assert!(is_forbidden_address("fc00::1".parse().unwrap()));
        assert!(is_forbidden_address("fe80::1".parse().unwrap()));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let url = url::Url::parse("ftp://example.com").unwrap();
        assert!(validate_scheme(&url).is_err());
    }
}
