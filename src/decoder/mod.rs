use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::error::CodecResult;
use crate::handler::{HandlerSet, MessageHandler};
use crate::health::LinkHealth;
use crate::message::NetworkMessage;
use crate::record::FactoryTable;
use crate::wire::WireHeader;

/// Turns inbound packets into [NetworkMessage]s and fans them out to all registered handlers.
///
/// Delivery is all-or-nothing per packet: a packet that does not decode completely reaches no
///  handler at all.
pub struct PacketDecoder {
    table: Arc<FactoryTable>,
    handlers: HandlerSet<dyn MessageHandler>,
    health: Arc<LinkHealth>,
    max_payload_len: usize,
}

impl PacketDecoder {
    pub fn new(table: Arc<FactoryTable>, health: Arc<LinkHealth>, max_payload_len: usize) -> PacketDecoder {
        PacketDecoder {
            table,
            handlers: HandlerSet::new(),
            health,
            max_payload_len,
        }
    }

    pub fn add_message_handler(&mut self, handler: Arc<dyn MessageHandler>) -> bool {
        self.handlers.add(handler)
    }

    pub fn remove_message_handler(&mut self, handler: &Arc<dyn MessageHandler>) -> bool {
        self.handlers.remove(handler)
    }

    pub fn has_message_handler(&self, handler: &Arc<dyn MessageHandler>) -> bool {
        self.handlers.contains(handler)
    }

    pub fn table(&self) -> &Arc<FactoryTable> {
        &self.table
    }

    /// Decodes a packet and notifies every handler, returning the number of handlers that took
    ///  the message. Failures are counted and returned, the caller continues with the next packet.
    pub fn handle_packet(&self, header: &WireHeader, payload: &[u8]) -> CodecResult<usize> {
        self.health.packet_received(header.serialized_len() + payload.len());

        let msg = match self.decode(header, payload) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(?header, payload_len = payload.len(), "dropping undecodable packet: {}", e);
                self.health.decode_error();
                return Err(e);
            }
        };
        trace!(?msg, "decoded message");

        let mut num_taken = 0;
        self.handlers.for_each(|h| {
            if h.handle_message(&msg) {
                num_taken += 1;
            }
        });

        if num_taken == 0 {
            debug!(?msg, "no handler took the message");
        }
        Ok(num_taken)
    }

    fn decode(&self, header: &WireHeader, payload: &[u8]) -> CodecResult<NetworkMessage> {
        header.validate_for(payload.len(), self.table.len(), self.max_payload_len)?;

        let record = self.table.decode(header.message_id, payload)?;
        let mut msg = NetworkMessage::from_boxed(header.source, header.destination, header.priority, record);
        msg.local_id = Some(header.message_id);
        Ok(msg)
    }
}
