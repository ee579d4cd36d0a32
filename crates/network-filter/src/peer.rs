//! Caller checks for the loopback-only listener.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Returns `true` only for `127.0.0.1`, `::1`, or the IPv4-mapped form
/// `::ffff:127.0.0.1`. Other `127.0.0.0/8` addresses are refused.
#[must_use]
pub fn is_loopback_peer(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => *v4 == Ipv4Addr::LOCALHOST,
        IpAddr::V6(v6) => {
            *v6 == Ipv6Addr::LOCALHOST || v6.to_ipv4_mapped() == Some(Ipv4Addr::LOCALHOST)
        },
    }
}
