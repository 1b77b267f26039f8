use std::fmt::{Debug, Display, Formatter};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs};

use anyhow::anyhow;
use bytes::{Buf, BufMut};
use tracing::debug;

use crate::error::CodecResult;
use crate::util::buf_ext::{BufExt, BufMutExt};

/// The network endpoint of a remote participant. It is resolved once when the peer joins and
///  never changes afterwards.
///
/// Peers are addressed through IPv4 only, which allows packing the address into a single u32
///  wherever an endpoint is sent over the wire.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PeerAddr {
    addr: Ipv4Addr,
    port: u16,
}

impl PeerAddr {
    pub const SERIALIZED_LEN: usize = size_of::<u32>() + size_of::<u16>();

    pub const fn new(addr: Ipv4Addr, port: u16) -> PeerAddr {
        PeerAddr { addr, port }
    }

    /// Resolves a host name (or a literal address) through the system resolver, using the
    ///  first IPv4 address it returns.
    ///
    /// This may block on DNS - call it while setting up a session, never from the network step.
    pub fn resolve(host: &str, port: u16) -> anyhow::Result<PeerAddr> {
        let resolved = (host, port).to_socket_addrs()?
            .find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(v4),
                SocketAddr::V6(_) => None,
            })
            .ok_or_else(|| anyhow!("{}:{} does not resolve to an IPv4 address", host, port))?;

        debug!("resolved {}:{} to {}", host, port, resolved);
        Ok(resolved.into())
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// the address in its packed 32-bit host representation
    pub fn to_packed(&self) -> u32 {
        self.addr.to_bits()
    }

    pub fn from_packed(packed: u32, port: u16) -> PeerAddr {
        PeerAddr {
            addr: Ipv4Addr::from_bits(packed),
            port,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.addr, self.port))
    }

    pub fn ser(&self, buf: &mut impl BufMut) -> CodecResult<()> {
        buf.check_remaining_mut(Self::SERIALIZED_LEN)?;
        buf.put_u32(self.to_packed());
        buf.put_u16(self.port);
        Ok(())
    }

    pub fn try_deser(buf: &mut impl Buf) -> CodecResult<PeerAddr> {
        buf.check_remaining(Self::SERIALIZED_LEN)?;
        let packed = buf.get_u32();
        let port = buf.get_u16();
        Ok(PeerAddr::from_packed(packed, port))
    }
}

impl From<SocketAddrV4> for PeerAddr {
    fn from(value: SocketAddrV4) -> Self {
        PeerAddr::new(*value.ip(), value.port())
    }
}

impl Debug for PeerAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}]", self.addr, self.port)
    }
}

impl Display for PeerAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use bytes::BytesMut;
    use rstest::rstest;

    #[rstest]
    #[case::localhost(Ipv4Addr::LOCALHOST, 5000, 0x7f00_0001)]
    #[case::zero(Ipv4Addr::UNSPECIFIED, 0, 0)]
    #[case::private(Ipv4Addr::new(192, 168, 1, 20), 5500, 0xc0a8_0114)]
    fn test_packed(#[case] ip: Ipv4Addr, #[case] port: u16, #[case] expected_packed: u32) {
        let addr = PeerAddr::new(ip, port);
        assert_eq!(addr.to_packed(), expected_packed);
        assert_eq!(PeerAddr::from_packed(expected_packed, port), addr);
    }

    #[test]
    fn test_ser() {
        let addr = PeerAddr::new(Ipv4Addr::new(10, 0, 0, 7), 0x1234);
        let mut buf = BytesMut::new();
        addr.ser(&mut buf).unwrap();
        assert_eq!(&buf[..], &[10, 0, 0, 7, 0x12, 0x34]);

        let mut b: &[u8] = &buf;
        assert_eq!(PeerAddr::try_deser(&mut b).unwrap(), addr);
        assert!(b.is_empty());
    }

    #[test]
    fn test_deser_underflow() {
        let mut b: &[u8] = &[10, 0, 0, 7, 0x12];
        assert_eq!(PeerAddr::try_deser(&mut b), Err(CodecError::Underflow { needed: 6, remaining: 5 }));
    }

    #[test]
    fn test_resolve_literal() {
        let addr = PeerAddr::resolve("127.0.0.1", 5000).unwrap();
        assert_eq!(addr, PeerAddr::new(Ipv4Addr::LOCALHOST, 5000));
        assert_eq!(addr.socket_addr(), "127.0.0.1:5000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_debug_display() {
        let addr = PeerAddr::new(Ipv4Addr::new(1, 2, 3, 4), 888);
        assert_eq!(format!("{:?}", addr), "[1.2.3.4:888]");
        assert_eq!(addr.to_string(), "1.2.3.4:888");
    }
}
