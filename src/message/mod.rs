use std::fmt::{Debug, Formatter};

use crate::peer::PeerId;
use crate::record::{DynRecord, LocalId, Record, RecordTypeId};
use crate::wire::Priority;

/// The unit that is exchanged between peers: an application record plus addressing and
///  priority.
///
/// Messages are transient. An outbound message is owned by its peer's outbound queue until it
///  is serialized; an inbound message is created by the packet decoder and lent to handlers.
#[derive(Clone)]
pub struct NetworkMessage {
    pub source: PeerId,
    pub destination: PeerId,
    pub priority: Priority,
    /// the record type's id in the scope of the connection the message was received on, if any
    pub local_id: Option<LocalId>,
    payload: Box<dyn DynRecord>,
}

impl Debug for NetworkMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MSG{{{:?}->{:?} {:?}:{:?}}}", self.source, self.destination, self.priority, self.payload)
    }
}

/// The local id is an artifact of the connection a message travelled through, so it is not part
///  of a message's identity
impl PartialEq for NetworkMessage {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.destination == other.destination
            && self.priority == other.priority
            && *self.payload == *other.payload
    }
}

impl NetworkMessage {
    pub fn new<R: Record>(source: PeerId, destination: PeerId, priority: Priority, payload: R) -> NetworkMessage {
        Self::from_boxed(source, destination, priority, Box::new(payload))
    }

    pub fn from_boxed(source: PeerId, destination: PeerId, priority: Priority, payload: Box<dyn DynRecord>) -> NetworkMessage {
        NetworkMessage {
            source,
            destination,
            priority,
            local_id: None,
            payload,
        }
    }

    pub fn record_type(&self) -> RecordTypeId {
        self.payload.record_type()
    }

    pub fn routing_type(&self) -> u16 {
        self.payload.routing_type()
    }

    pub fn dispatch_key(&self) -> Option<u64> {
        self.payload.dispatch_key()
    }

    pub fn payload(&self) -> &dyn DynRecord {
        self.payload.as_ref()
    }

    /// the payload as a concrete record type, or None if it has a different type
    pub fn payload_as<R: Record>(&self) -> Option<&R> {
        self.payload.as_any().downcast_ref::<R>()
    }
}
