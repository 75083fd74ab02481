use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};

use crate::error::{GossamerError, Result};

/// Unique identifier for cluster nodes: a 4-byte address and a 2-byte port
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, PartialOrd, Ord, Eq, Hash,
)]
pub struct NodeId {
    addr: [u8; 4],
    port: u16,
}

impl NodeId {
    /// Encoded size on the wire
    pub const WIRE_SIZE: usize = 6;

    /// The all-zero address, never a valid peer
    pub const NULL: NodeId = NodeId {
        addr: [0; 4],
        port: 0,
    };

    pub const fn new(addr: [u8; 4], port: u16) -> Self {
        Self { addr, port }
    }

    /// Well-known introducer used by simulated clusters
    pub const fn default_introducer() -> Self {
        Self::new([1, 0, 0, 0], 0)
    }

    pub fn addr(&self) -> [u8; 4] {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::from(self.addr), self.port)
    }
}

impl From<SocketAddrV4> for NodeId {
    fn from(addr: SocketAddrV4) -> Self {
        NodeId::new(addr.ip().octets(), addr.port())
    }
}

impl From<NodeId> for SocketAddrV4 {
    fn from(id: NodeId) -> Self {
        id.socket_addr()
    }
}

impl TryFrom<SocketAddr> for NodeId {
    type Error = GossamerError;

    fn try_from(addr: SocketAddr) -> Result<Self> {
        match addr {
            SocketAddr::V4(v4) => Ok(v4.into()),
            SocketAddr::V6(v6) => Err(GossamerError::Config(format!(
                "node ids are IPv4 only, got {}",
                v6
            ))),
        }
    }
}

impl std::str::FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse::<SocketAddrV4>()
            .map(NodeId::from)
            .map_err(|e| format!("Invalid node address '{}': {}", s, e))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d] = self.addr;
        write!(f, "{}.{}.{}.{}:{}", a, b, c, d, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_dotted_quad() {
        let id = NodeId::new([10, 0, 0, 7], 8412);
        assert_eq!(id.to_string(), "10.0.0.7:8412");
        assert_eq!(NodeId::default_introducer().to_string(), "1.0.0.0:0");
    }

    #[test]
    fn test_parse_and_socket_addr() {
        let id: NodeId = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(id.addr(), [127, 0, 0, 1]);
        assert_eq!(id.port(), 9000);
        assert_eq!(id.socket_addr().to_string(), "127.0.0.1:9000");
        assert!("not-an-address".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_ipv6_rejected() {
        let addr: SocketAddr = "[::1]:9000".parse().unwrap();
        assert!(NodeId::try_from(addr).is_err());
    }

    #[test]
    fn test_null_address() {
        assert!(NodeId::NULL.is_null());
        assert!(NodeId::default().is_null());
        assert!(!NodeId::default_introducer().is_null());
    }

    #[test]
    fn test_ordering_is_by_address_then_port() {
        let a = NodeId::new([1, 0, 0, 0], 5);
        let b = NodeId::new([1, 0, 0, 1], 0);
        let c = NodeId::new([1, 0, 0, 1], 1);
        assert!(a < b && b < c);
    }
}
