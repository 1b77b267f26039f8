mod peer_addr;

pub use peer_addr::PeerAddr;

use std::fmt::{Debug, Display, Formatter};

/// The id a peer is known by on the wire, i.e. in the `source` and `destination` fields of
///  every packet header. It is assigned by the host when a participant joins the session.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct PeerId(pub u16);

impl PeerId {
    /// conventionally the host of a session
    pub const HOST: PeerId = PeerId(0);
}

impl Debug for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl From<u16> for PeerId {
    fn from(value: u16) -> Self {
        PeerId(value)
    }
}
