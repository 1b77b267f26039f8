mod outbound_queue;

pub use outbound_queue::OutboundQueue;

#[cfg(test)] use mockall::automock;

use crate::error::CodecResult;
use crate::peer::PeerId;
use crate::wire::{Priority, WireHeader};

/// The pull-based contract between pending outbound traffic and the transport loop: the
///  transport decides when to send and how much, the packet source only hands out packets.
#[cfg_attr(test, automock)]
pub trait PacketSource {
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Serializes the next packet's payload into `payload_buf`, filling the addressing and
    ///  message type fields of `header`. Returns the payload length, or `None` if there is
    ///  nothing to send.
    ///
    /// Acknowledgements the caller has put into `header.receipt` are kept. A reliable packet
    ///  gets its own confirmation id in slot 0, which turns the header into the receipt shape.
    ///
    /// A payload that does not fit into the buffer is reported as
    ///  [crate::error::CodecError::Overflow], and the message stays at the head of the queue.
    fn get_packet(&mut self, header: &mut WireHeader, payload_buf: &mut [u8]) -> CodecResult<Option<usize>>;

    /// destination and priority of the next packet without removing it
    fn peek_priority(&self) -> Option<(PeerId, Priority)>;

    /// discards the next packet without serializing it, returning false if there was none
    fn skip_packet(&mut self) -> bool;
}
