//! Record types and handlers shared by unit tests

use std::sync::{Mutex, PoisonError};

use bytes::{Buf, BufMut};

use crate::error::CodecResult;
use crate::handler::MessageHandler;
use crate::message::NetworkMessage;
use crate::record::{FactoryTable, Record, RecordRegistry, RecordTypeId};
use crate::util::buf_ext::{BufExt, BufMutExt};


#[derive(Debug, Clone, PartialEq)]
pub struct PingRecord {
    pub seq: u32,
}

impl Record for PingRecord {
    const TYPE_ID: RecordTypeId = RecordTypeId(7);

    fn ser(&self, buf: &mut dyn BufMut) -> CodecResult<()> {
        buf.checked_put_u32(self.seq)
    }

    fn deser(buf: &mut impl Buf) -> CodecResult<Self> {
        Ok(PingRecord { seq: buf.checked_get_u32()? })
    }
}


#[derive(Debug, Clone, PartialEq)]
pub struct ChatRecord {
    pub text: String,
}

impl ChatRecord {
    pub const ROUTING_TYPE: u16 = 2;

    pub fn new(text: &str) -> ChatRecord {
        ChatRecord { text: text.to_string() }
    }
}

impl Record for ChatRecord {
    const TYPE_ID: RecordTypeId = RecordTypeId::named(b"Chat\0\0\0\0");

    fn routing_type(&self) -> u16 {
        Self::ROUTING_TYPE
    }

    fn ser(&self, buf: &mut dyn BufMut) -> CodecResult<()> {
        buf.checked_put_string(&self.text)
    }

    fn deser(buf: &mut impl Buf) -> CodecResult<Self> {
        Ok(ChatRecord { text: buf.checked_get_string()? })
    }
}


#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    pub object_id: u32,
    pub position: [f64; 3],
}

impl PositionRecord {
    pub const ROUTING_TYPE: u16 = 1;

    pub fn new(object_id: u32, position: [f64; 3]) -> PositionRecord {
        PositionRecord { object_id, position }
    }
}

impl Record for PositionRecord {
    const TYPE_ID: RecordTypeId = RecordTypeId::named(b"PosUpd\0\0");

    fn routing_type(&self) -> u16 {
        Self::ROUTING_TYPE
    }

    fn dispatch_key(&self) -> Option<u64> {
        Some(self.object_id as u64)
    }

    fn ser(&self, buf: &mut dyn BufMut) -> CodecResult<()> {
        buf.check_remaining_mut(size_of::<u32>() + 3 * size_of::<f64>())?;
        buf.checked_put_u32(self.object_id)?;
        for coord in self.position {
            buf.checked_put_f64(coord)?;
        }
        Ok(())
    }

    fn deser(buf: &mut impl Buf) -> CodecResult<Self> {
        let object_id = buf.checked_get_u32()?;
        let mut position = [0.0; 3];
        for coord in &mut position {
            *coord = buf.checked_get_f64()?;
        }
        Ok(PositionRecord { object_id, position })
    }
}


pub fn test_registry() -> RecordRegistry {
    RecordRegistry::new()
        .with::<PingRecord>().unwrap()
        .with::<ChatRecord>().unwrap()
        .with::<PositionRecord>().unwrap()
}

pub fn test_table() -> FactoryTable {
    test_registry().build_table().unwrap()
}


/// collects every message it is passed
#[derive(Debug)]
pub struct RecordingHandler {
    accepts: bool,
    received: Mutex<Vec<NetworkMessage>>,
}

impl Default for RecordingHandler {
    fn default() -> Self {
        RecordingHandler {
            accepts: true,
            received: Default::default(),
        }
    }
}

impl RecordingHandler {
    /// a handler that records messages but reports them as not taken
    pub fn rejecting() -> RecordingHandler {
        RecordingHandler {
            accepts: false,
            ..Default::default()
        }
    }

    pub fn received(&self) -> Vec<NetworkMessage> {
        self.received.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn num_received(&self) -> usize {
        self.received.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl MessageHandler for RecordingHandler {
    fn handle_message(&self, msg: &NetworkMessage) -> bool {
        self.received.lock().unwrap_or_else(PoisonError::into_inner).push(msg.clone());
        self.accepts
    }
}
