use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::{CodecError, CodecResult};
use crate::message::NetworkMessage;
use crate::peer::PeerId;
use crate::queue::PacketSource;
use crate::record::FactoryTable;
use crate::wire::{Priority, WireHeader};

/// Pending outbound messages for a single peer, sent in FIFO order.
pub struct OutboundQueue {
    myself: PeerId,
    peer: PeerId,
    table: Arc<FactoryTable>,
    messages: VecDeque<NetworkMessage>,
    next_confirmation_id: u16,
}

impl OutboundQueue {
    pub fn new(myself: PeerId, peer: PeerId, table: Arc<FactoryTable>) -> OutboundQueue {
        OutboundQueue {
            myself,
            peer,
            table,
            messages: VecDeque::new(),
            next_confirmation_id: 1,
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn queue(&mut self, msg: NetworkMessage) {
        if msg.destination != self.peer {
            warn!(peer = ?self.peer, destination = ?msg.destination, "queueing a message addressed to a different peer - it is sent to this queue's peer regardless");
        }
        trace!(peer = ?self.peer, ?msg, "queueing message");
        self.messages.push_back(msg);
    }

    pub fn clear(&mut self) {
        debug!(peer = ?self.peer, "discarding {} queued messages", self.messages.len());
        self.messages.clear();
    }

    /// Confirmation ids are 16 bit and wrap around. 0 is skipped because an empty receipt slot
    ///  is 0.
    fn take_confirmation_id(&mut self) -> u16 {
        let result = self.next_confirmation_id;
        self.next_confirmation_id = self.next_confirmation_id.wrapping_add(1);
        if self.next_confirmation_id == 0 {
            self.next_confirmation_id = 1;
        }
        result
    }
}

impl PacketSource for OutboundQueue {
    fn size(&self) -> usize {
        self.messages.len()
    }

    fn get_packet(&mut self, header: &mut WireHeader, payload_buf: &mut [u8]) -> CodecResult<Option<usize>> {
        let Some(msg) = self.messages.front() else {
            return Ok(None);
        };

        let message_id = self.table.local_id_of(msg.record_type())
            .ok_or(CodecError::UnknownRecordType(msg.record_type()))?;

        let payload_len = match self.table.encode(Some(msg.payload()), payload_buf) {
            Ok(len) => len,
            Err(e) => {
                debug!(peer = ?self.peer, ?msg, "serializing message failed: {}", e);
                return Err(e);
            }
        };
        let priority = msg.priority;

        header.source = self.myself;
        header.destination = self.peer;
        header.message_id = message_id;
        header.priority = priority;
        if priority == Priority::Reliable {
            *header = header.with_confirmation(self.take_confirmation_id());
        }

        let msg = self.messages.pop_front();
        trace!(peer = ?self.peer, ?msg, ?header, payload_len, "dequeued packet");
        Ok(Some(payload_len))
    }

    fn peek_priority(&self) -> Option<(PeerId, Priority)> {
        self.messages.front()
            .map(|msg| (self.peer, msg.priority))
    }

    fn skip_packet(&mut self) -> bool {
        match self.messages.pop_front() {
            Some(msg) => {
                debug!(peer = ?self.peer, ?msg, "skipping packet");
                true
            }
            None => false,
        }
    }
}
