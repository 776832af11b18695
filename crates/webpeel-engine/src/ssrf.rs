//! SSRF defense: reject any URL whose host resolves, in any notation, to a
//! non-public address.
//!
//! An allowlist/blocklist shape generalized from a fixed prefix list
//! to full IPv4/IPv6 parsing (dotted/hex/octal/decimal/mixed notations) via
//! `ipnet`'s CIDR containment checks, since the demo's literal-prefix
//! matching cannot catch e.g. `0x7f000001` or `2130706433`.

use ipnet::{Ipv4Net, Ipv6Net};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use webpeel_core::{Error, Result};

fn v4_blocked_nets() -> &'static [Ipv4Net] {
    use std::sync::OnceLock;
    static NETS: OnceLock<Vec<Ipv4Net>> = OnceLock::new();
    NETS.get_or_init(|| {
        [
            "127.0.0.0/8",   // loopback
            "10.0.0.0/8",    // private
            "172.16.0.0/12", // private
            "192.168.0.0/16",// private
            "169.254.0.0/16",// link-local
            "0.0.0.0/8",     // "this network"
            "255.255.255.255/32", // broadcast
        ]
        .iter()
        .map(|s| Ipv4Net::from_str(s).expect("static cidr"))
        .collect()
    })
}

fn v6_blocked_nets() -> &'static [Ipv6Net] {
    use std::sync::OnceLock;
    static NETS: OnceLock<Vec<Ipv6Net>> = OnceLock::new();
    NETS.get_or_init(|| {
        [
            "::1/128",   // loopback
            "fe80::/10", // link-local
            "fc00::/7",  // unique-local
        ]
        .iter()
        .map(|s| Ipv6Net::from_str(s).expect("static cidr"))
        .collect()
    })
}

fn v4_is_blocked(ip: Ipv4Addr) -> bool {
    v4_blocked_nets().iter().any(|n| n.contains(&ip))
}

fn v6_is_blocked(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return v4_is_blocked(mapped);
    }
    v6_blocked_nets().iter().any(|n| n.contains(&ip))
}

/// Parse a hostname as an IPv4 address in any of the notations browsers and
/// curl historically accept: dotted-decimal, dotted-hex/octal per-octet,
/// pure decimal (`2130706433`), and pure hex (`0x7f000001`). Mixed-radix
/// per-octet forms (e.g. `127.0.0x0.1`) are also accepted since each octet
/// is parsed independently.
pub fn parse_ipv4_any_notation(host: &str) -> Option<Ipv4Addr> {
    // Reject obvious non-IP hostnames fast: a real IPv4 host here is all
    // digits/dots/hex-prefix-chars.
    if host.is_empty() || !host.chars().all(|c| c.is_ascii_hexdigit() || c == '.' || c == 'x' || c == 'X') {
        return None;
    }

    fn parse_octet(s: &str) -> Option<u64> {
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return u64::from_str_radix(hex, 16).ok();
        }
        if s.len() > 1 && s.starts_with('0') && s.chars().all(|c| c.is_ascii_digit()) {
            return u64::from_str_radix(s, 8).ok();
        }
        s.parse::<u64>().ok()
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    let mut nums = Vec::with_capacity(parts.len());
    for p in &parts {
        nums.push(parse_octet(p)?);
    }

    // Classic BSD `inet_aton` rule: the last part absorbs whatever bits the
    // earlier (full-octet) parts didn't claim.
    let value: u64 = match nums.as_slice() {
        [a] => *a,
        [a, b] if *a <= 255 && *b <= 0x00FF_FFFF => (a << 24) | b,
        [a, b, c] if *a <= 255 && *b <= 255 && *c <= 0xFFFF => (a << 24) | (b << 16) | c,
        [a, b, c, d] if *a <= 255 && *b <= 255 && *c <= 255 && *d <= 255 => {
            (a << 24) | (b << 16) | (c << 8) | d
        }
        _ => return None,
    };
    if value > u32::MAX as u64 {
        return None;
    }
    Some(Ipv4Addr::from(value as u32))
}

/// Resolve a hostname string (as it appears in a URL) to an `IpAddr` if it
/// parses as *any* literal IP notation. Returns `None` for real DNS names
/// (those are not SSRF-checked here — only literal-IP evasion is in scope
/// for this parser; DNS-level rebinding is out of scope).
pub fn literal_ip_host(host: &str) -> Option<IpAddr> {
    let h = host.trim();
    let h = h.strip_prefix('[').and_then(|s| s.strip_suffix(']')).unwrap_or(h);

    if let Ok(v6) = Ipv6Addr::from_str(h) {
        return Some(IpAddr::V6(v6));
    }
    if let Ok(v4) = Ipv4Addr::from_str(h) {
        return Some(IpAddr::V4(v4));
    }
    if let Some(v4) = parse_ipv4_any_notation(h) {
        return Some(IpAddr::V4(v4));
    }
    None
}

fn is_blocked_addr(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4_is_blocked(v4),
        IpAddr::V6(v6) => v6_is_blocked(v6),
    }
}

/// Validate a URL against the SSRF policy. A rejected URL must never be
/// dispatched to any fetcher, including after a redirect — call this both
/// before the first dispatch and after resolving every `Location` header.
pub fn validate_url(url: &url::Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::Validation(format!("unsupported scheme: {other}")));
        }
    }
    let host = url
        .host_str()
        .ok_or_else(|| Error::Validation("url has no host".to_string()))?;

    if let Some(addr) = literal_ip_host(host) {
        if is_blocked_addr(addr) {
            return Err(Error::Validation(format!(
                "SSRF target rejected: {addr} is not a publicly routable address"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(u: &str) -> Result<()> {
        validate_url(&url::Url::parse(u).unwrap())
    }

    #[test]
    fn rejects_dotted_loopback() {
        assert!(v("http://127.0.0.1/").is_err());
    }

    #[test]
    fn rejects_hex_loopback() {
        assert!(v("http://0x7f000001/").is_err());
    }

    #[test]
    fn rejects_octal_loopback() {
        assert!(v("http://0177.0.0.1/").is_err());
    }

    #[test]
    fn rejects_decimal_integer_loopback() {
        assert!(v("http://2130706433/").is_err());
    }

    #[test]
    fn rejects_mixed_notation_loopback() {
        assert!(v("http://127.0.0x0.1/").is_err());
    }

    #[test]
    fn rejects_ipv6_loopback() {
        assert!(v("http://[::1]/").is_err());
    }

    #[test]
    fn rejects_ipv4_mapped_ipv6_loopback() {
        assert!(v("http://[::ffff:127.0.0.1]/").is_err());
    }

    #[test]
    fn rejects_private_ranges() {
        assert!(v("http://10.0.0.5/").is_err());
        assert!(v("http://172.16.0.5/").is_err());
        assert!(v("http://192.168.1.1/").is_err());
    }

    #[test]
    fn rejects_link_local() {
        assert!(v("http://169.254.169.254/").is_err());
        assert!(v("http://[fe80::1]/").is_err());
    }

    #[test]
    fn rejects_unique_local_v6() {
        assert!(v("http://[fc00::1]/").is_err());
    }

    #[test]
    fn rejects_zero_slash_eight() {
        assert!(v("http://0.1.2.3/").is_err());
    }

    #[test]
    fn allows_public_hostname() {
        assert!(v("https://example.com/").is_ok());
    }

    #[test]
    fn allows_public_ip() {
        assert!(v("http://93.184.216.34/").is_ok());
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(v("ftp://example.com/").is_err());
    }
}
