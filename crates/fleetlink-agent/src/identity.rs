//! Device identity collection for the relay handshake.

use std::hash::{Hash, Hasher};
use std::net::UdpSocket;

use sysinfo::{Networks, System};
use tracing::warn;

use fleetlink_proto::SystemDescriptor;

/// Gather the host facts sent in the handshake frame.
///
/// The MAC address is the device's natural key on the relay side. When no
/// interface exposes a usable MAC, a stable synthetic one is derived from
/// the hostname so the device still deduplicates across reconnects.
pub fn collect_descriptor() -> SystemDescriptor {
    let hostname = System::host_name().unwrap_or_else(|| "unknown".into());
    let mac_address = detect_mac().unwrap_or_else(|| {
        let synthetic = synthetic_mac(&hostname);
        warn!(
            mac = %synthetic,
            "No network interface with a usable MAC address; using a synthetic identity"
        );
        synthetic
    });

    SystemDescriptor {
        hostname,
        os_info: os_info(),
        local_ip: detect_local_ip(),
        // Public address discovery is out of scope; the relay records it as-is.
        public_ip: "127.0.0.1".into(),
        mac_address,
        agent_version: env!("CARGO_PKG_VERSION").into(),
    }
}

fn os_info() -> String {
    let name = System::name().unwrap_or_else(|| "Unknown".into());
    match System::os_version() {
        Some(version) if !version.is_empty() => format!("{name} {version}"),
        _ => name,
    }
}

/// First non-loopback interface with a non-zero MAC, by interface name.
fn detect_mac() -> Option<String> {
    let networks = Networks::new_with_refreshed_list();
    let mut candidates: Vec<(String, [u8; 6])> = networks
        .iter()
        .filter(|(name, data)| !name.starts_with("lo") && data.mac_address().0 != [0u8; 6])
        .map(|(name, data)| (name.clone(), data.mac_address().0))
        .collect();
    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    candidates.first().map(|(_, mac)| format_mac(mac))
}

fn format_mac(bytes: &[u8; 6]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Deterministic fallback MAC derived from the hostname, with the
/// locally-administered bit set.
fn synthetic_mac(hostname: &str) -> String {
    let mut hasher = std::hash::DefaultHasher::new();
    hostname.hash(&mut hasher);
    let digest = hasher.finish().to_be_bytes();
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&digest[..6]);
    mac[0] |= 0x02;
    format_mac(&mac)
}

/// Routable local address via the UDP-connect trick (no packets are sent).
fn detect_local_ip() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map_or_else(|_| "127.0.0.1".into(), |addr| addr.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_wire_mac(mac: &str) -> bool {
        let parts: Vec<&str> = mac.split(':').collect();
        parts.len() == 6
            && parts.iter().all(|p| {
                p.len() == 2
                    && p.chars()
                        .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase())
            })
    }

    #[test]
    fn descriptor_carries_identity() {
        let descriptor = collect_descriptor();
        assert!(!descriptor.hostname.is_empty());
        assert!(is_wire_mac(&descriptor.mac_address));
        assert_eq!(descriptor.agent_version, env!("CARGO_PKG_VERSION"));
        assert!(descriptor.local_ip.parse::<std::net::IpAddr>().is_ok());
    }

    #[test]
    fn synthetic_mac_is_stable_and_locally_administered() {
        let a = synthetic_mac("host-a");
        let b = synthetic_mac("host-a");
        assert_eq!(a, b);
        assert!(is_wire_mac(&a));

        let first_octet = u8::from_str_radix(&a[..2], 16).unwrap();
        assert_eq!(first_octet & 0x02, 0x02);

        assert_ne!(a, synthetic_mac("host-b"));
    }

    #[test]
    fn mac_formatting_is_uppercase_colon_separated() {
        assert_eq!(
            format_mac(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]),
            "DE:AD:BE:EF:00:01"
        );
    }
}
