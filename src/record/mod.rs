//! Records are the application-level payload of network messages. Their meaning is entirely up
//!  to the application (flight dynamics updates, chat, scenery events, ...): this layer only
//!  needs to serialize them, deserialize them, and know how to route them.
//!
//! Record types are registered globally in a [RecordRegistry] when the application starts. Per
//!  connection, a [FactoryTable] is derived from it which maps each record type to a compact
//!  [LocalId] - that is what goes into a packet's header instead of the full [RecordTypeId].

pub mod record_type_id;
mod registry;
mod factory_table;

pub use factory_table::FactoryTable;
pub use record_type_id::RecordTypeId;
pub use registry::{RecordFactory, RecordRegistry};

use std::any::Any;
use std::fmt::Debug;

use bytes::{Buf, BufMut};

use crate::error::CodecResult;

/// A record type's id in the scope of a single connection
pub type LocalId = u16;


/// Implemented by every application record type that is sent over the network.
///
/// Serialization must go through the checked methods of [crate::util::buf_ext] so that a
///  record that does not fit into a packet is reported rather than truncated.
pub trait Record: Debug + Clone + PartialEq + Send + Sync + 'static {
    const TYPE_ID: RecordTypeId;

    /// the category for flat table-based routing, see [crate::routing::RoutingHandler]
    fn routing_type(&self) -> u16 {
        0
    }

    /// an optional application-specific key (typically a simulation object's id) that becomes
    ///  part of the message's dispatch signature
    fn dispatch_key(&self) -> Option<u64> {
        None
    }

    fn ser(&self, buf: &mut dyn BufMut) -> CodecResult<()>;

    fn deser(buf: &mut impl Buf) -> CodecResult<Self>;
}


/// Object-safe view of a [Record], which is how records are passed around once they are
///  part of a [crate::message::NetworkMessage]. There is a blanket implementation for all
///  [Record] types.
pub trait DynRecord: Debug + Send + Sync + 'static {
    fn record_type(&self) -> RecordTypeId;
    fn routing_type(&self) -> u16;
    fn dispatch_key(&self) -> Option<u64>;
    fn ser(&self, buf: &mut dyn BufMut) -> CodecResult<()>;

    fn box_clone(&self) -> Box<dyn DynRecord>;
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn DynRecord) -> bool;
}

impl <R: Record> DynRecord for R {
    fn record_type(&self) -> RecordTypeId {
        R::TYPE_ID
    }

    fn routing_type(&self) -> u16 {
        Record::routing_type(self)
    }

    fn dispatch_key(&self) -> Option<u64> {
        Record::dispatch_key(self)
    }

    fn ser(&self, buf: &mut dyn BufMut) -> CodecResult<()> {
        Record::ser(self, buf)
    }

    fn box_clone(&self) -> Box<dyn DynRecord> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn DynRecord) -> bool {
        other.as_any()
            .downcast_ref::<R>()
            .map(|other| self == other)
            .unwrap_or(false)
    }
}

impl Clone for Box<dyn DynRecord> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

impl PartialEq for dyn DynRecord {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}
