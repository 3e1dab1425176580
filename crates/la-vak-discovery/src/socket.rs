use std::net::{Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};

use socket2::{Domain, Protocol, Socket, Type};

use crate::MULTICAST_TTL;

/// Bind a non-blocking UDP socket with address reuse enabled and the
/// multicast TTL set, suitable for handing to `tokio::net::UdpSocket`.
pub fn bind_multicast_socket(addr: SocketAddr) -> std::io::Result<StdUdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

/// Candidate local interfaces to attempt a multicast join on. Always tries
/// the OS-default route (`UNSPECIFIED`, which covers the common
/// single-homed case) plus whatever address the OS reports as the primary
/// outbound interface, so a join failure on one candidate does not prevent
/// joining on another — a multi-homed host may have unjoinable interfaces.
pub fn candidate_interfaces() -> Vec<Ipv4Addr> {
    let mut candidates = vec![Ipv4Addr::UNSPECIFIED];
    if let Some(primary) = primary_outbound_ipv4() {
        if !candidates.contains(&primary) {
            candidates.push(primary);
        }
    }
    candidates
}

/// Best-effort discovery of the primary outbound IPv4 address, using the
/// standard "connect a UDP socket to a public address, read back the
/// local address the kernel chose" trick. No packets are actually sent —
/// `connect` on a UDP socket only consults the routing table.
fn primary_outbound_ipv4() -> Option<Ipv4Addr> {
    let probe = StdUdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    probe.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    match probe.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(v4) => Some(v4),
        std::net::IpAddr::V6(_) => None,
    }
}
