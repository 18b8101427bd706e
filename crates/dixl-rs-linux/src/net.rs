use dixl_rs::{DixlError, NodeId, PeerProbe};
use std::net::{Ipv4Addr, SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;

/// Determines the node's own IPv4 address from the interface a default
/// route would use. No packet is sent.
pub fn local_ipv4() -> Result<NodeId, DixlError> {
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(|_| DixlError::NetworkIfEnumeration)?;
    socket
        .connect("8.8.8.8:80")
        .map_err(|_| DixlError::NetworkIfEnumeration)?;
    match socket.local_addr() {
        Ok(SocketAddr::V4(addr)) if !addr.ip().is_unspecified() => Ok(NodeId(addr.ip().octets())),
        _ => Err(DixlError::NetworkIfEnumeration),
    }
}

/// Reachability probe connecting to the peer's node port once per echo
/// request. The original target used ICMP; the probe contract only asks
/// that every attempt is answered.
pub struct TcpReachabilityProbe {
    pub port: u16,
    pub timeout: Duration,
}

impl PeerProbe for TcpReachabilityProbe {
    fn probe(&mut self, peer: NodeId, packets: u16) -> Result<(), DixlError> {
        let octets = peer.octets();
        let addr = SocketAddr::from((
            Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
            self.port,
        ));
        for _ in 0..packets {
            TcpStream::connect_timeout(&addr, self.timeout)
                .map_err(|_| DixlError::PeerUnreachable(peer))?;
        }
        Ok(())
    }
}
