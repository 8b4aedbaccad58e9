//! Addresses printed when the server is up.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddresses {
    /// Loopback address for the local browser
    pub address: String,
    /// Address other machines on the network can use
    pub network_address: String,
}

/// Local and network addresses for `port`.
///
/// The network host is `host` when given, otherwise the first non-loopback
/// IPv4 address of this machine.
pub fn server_addresses(port: u16, host: Option<&str>, proto: &str) -> ServerAddresses {
    let network_host = match host {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => local_ip().unwrap_or(Ipv4Addr::LOCALHOST).to_string(),
    };
    ServerAddresses {
        address: format!("{proto}://localhost:{port}/"),
        network_address: format!("{proto}://{network_host}:{port}/"),
    }
}

/// LAN IPv4 of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn local_ip() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_host() {
        let addresses = server_addresses(6006, Some("0.0.0.0"), "http");
        assert_eq!(addresses.address, "http://localhost:6006/");
        assert_eq!(addresses.network_address, "http://0.0.0.0:6006/");
    }

    #[test]
    fn test_detected_host() {
        let addresses = server_addresses(9009, None, "https");
        assert_eq!(addresses.address, "https://localhost:9009/");
        assert!(addresses.network_address.starts_with("https://"));
        assert!(addresses.network_address.ends_with(":9009/"));
    }
}
