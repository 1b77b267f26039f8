use std::fmt::{Debug, Formatter};

use bitflags::bitflags;
use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{CodecError, CodecResult};
use crate::peer::PeerId;
use crate::record::LocalId;
use crate::util::buf_ext::{BufExt, BufMutExt};

bitflags! {
    /// The control part of the header's leading 64-bit word. The remaining bits hold the
    ///  connection statistic and the three 16-bit ids.
    #[derive(PartialEq, Eq, Copy, Clone, Debug)]
    struct Flags: u64 {
        const RELIABLE       = 1 << 63;
        const MASK_RESERVED  = 0b11 << 61;
        const MASK_PRIORITY  = 0b11 << 59;
        const STAT_MODE      = 1 << 58;
        const MASK_CONN_STAT = 0x3ff << 48;
    }
}

const SHIFT_PRIORITY: u32 = 59;
const SHIFT_CONN_STAT: u32 = 48;
const SHIFT_SOURCE: u32 = 32;
const SHIFT_DESTINATION: u32 = 16;


/// Transmission priority of a packet, governing both scheduling and load shedding.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Priority {
    #[default]
    NonRealtime = 0,
    RealtimeLow = 1,
    RealtimeHigh = 2,
    Reliable = 3,
}

impl Priority {
    /// Packets of these priorities may be discarded under congestion before they are sent
    pub fn is_droppable(&self) -> bool {
        matches!(self, Priority::NonRealtime | Priority::RealtimeLow)
    }
}


/// The 10-bit connection statistic the sender piggybacks on every packet. Its meaning is
///  selected by the header's stat mode bit.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnStat {
    /// stat mode 0: the send rate the sender would like to use
    DesiredRate(u16),
    /// stat mode 1: the fraction of the receiver's bandwidth allocated to the sender
    Allocation(u16),
}

impl ConnStat {
    pub const MAX_VALUE: u16 = 0x3ff;

    pub fn value(&self) -> u16 {
        match *self {
            ConnStat::DesiredRate(v) => v,
            ConnStat::Allocation(v) => v,
        }
    }
}

impl Default for ConnStat {
    fn default() -> Self {
        ConnStat::DesiredRate(0)
    }
}


/// The header transmitted with every packet, bit-packed into a leading big-endian 64-bit word:
///
/// ```ascii
/// bit 63     reliable - a receipt header (four confirmation ids) follows the word
/// bit 61-62  reserved, must be 0
/// bit 59-60  priority
/// bit 58     stat mode (0: desired rate, 1: allocation)
/// bit 48-57  connection statistic
/// bit 32-47  source peer id
/// bit 16-31  destination peer id
/// bit  0-15  message id, i.e. the record type's local id
/// ```
///
/// The receipt variant appends four u16 confirmation ids. When the priority is
///  [Priority::Reliable], the first of them is this packet's own confirmation id; the others
///  acknowledge packets received earlier.
#[derive(Clone, Copy, Eq, PartialEq, Default)]
pub struct WireHeader {
    pub priority: Priority,
    pub conn_stat: ConnStat,
    pub source: PeerId,
    pub destination: PeerId,
    pub message_id: LocalId,
    pub receipt: Option<[u16; 4]>,
}

impl Debug for WireHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let conn_stat = match self.conn_stat {
            ConnStat::DesiredRate(v) => format!("R{}", v),
            ConnStat::Allocation(v) => format!("A{}", v),
        };
        let receipt = self.receipt
            .map(|r| format!("[{},{},{},{}]", r[0], r[1], r[2], r[3]))
            .unwrap_or_default();

        write!(f, "HDR{{P{} {}->{} #{} {}{}}}",
               u8::from(self.priority),
               self.source.0,
               self.destination.0,
               self.message_id,
               conn_stat,
               receipt,
        )
    }
}

impl WireHeader {
    pub const SIMPLE_LEN: usize = size_of::<u64>();
    pub const RECEIPT_LEN: usize = Self::SIMPLE_LEN + 4 * size_of::<u16>();

    pub fn is_reliable(&self) -> bool {
        self.receipt.is_some()
    }

    pub fn serialized_len(&self) -> usize {
        if self.is_reliable() {
            Self::RECEIPT_LEN
        }
        else {
            Self::SIMPLE_LEN
        }
    }

    /// Marks this packet as reliably sent with the given confirmation id. This switches the
    ///  header to the receipt shape, preserving acknowledgements that are already there.
    pub fn with_confirmation(mut self, confirmation_id: u16) -> WireHeader {
        let mut receipt = self.receipt.unwrap_or_default();
        receipt[0] = confirmation_id;
        self.receipt = Some(receipt);
        self
    }

    /// Acknowledges a previously received reliable packet. Slot 0 holds the packet's own
    ///  confirmation id when it is sent reliably, so acknowledgements go to slots 1 to 3 then;
    ///  any other priority has all four slots for acknowledgements.
    pub fn acknowledge(&mut self, slot: usize, confirmation_id: u16) -> CodecResult<()> {
        let first_ack_slot = self.first_ack_slot();
        if !(first_ack_slot..4).contains(&slot) {
            return Err(CodecError::InvalidValue(format!("acknowledgement slot {} is not in {}..=3", slot, first_ack_slot)));
        }
        self.receipt.get_or_insert_with(Default::default)[slot] = confirmation_id;
        Ok(())
    }

    /// this packet's own confirmation id, if it was sent reliably
    pub fn confirmation_id(&self) -> Option<u16> {
        match (self.priority, self.receipt) {
            (Priority::Reliable, Some(receipt)) => Some(receipt[0]),
            _ => None,
        }
    }

    /// confirmation ids of earlier packets acknowledged by this packet, excluding empty slots
    pub fn acknowledged(&self) -> Vec<u16> {
        let Some(receipt) = self.receipt else {
            return vec![];
        };

        receipt[self.first_ack_slot()..].iter()
            .copied()
            .filter(|&id| id != 0)
            .collect()
    }

    fn first_ack_slot(&self) -> usize {
        if self.priority == Priority::Reliable { 1 } else { 0 }
    }

    fn pack(&self) -> CodecResult<u64> {
        if self.priority == Priority::Reliable && self.receipt.is_none() {
            return Err(CodecError::InvalidHeader("reliable priority without a receipt header"));
        }

        let (stat_mode, conn_stat) = match self.conn_stat {
            ConnStat::DesiredRate(v) => (Flags::empty(), v),
            ConnStat::Allocation(v) => (Flags::STAT_MODE, v),
        };
        if conn_stat > ConnStat::MAX_VALUE {
            return Err(CodecError::InvalidValue(format!("connection statistic {} does not fit into 10 bits", conn_stat)));
        }

        let mut flags = stat_mode;
        if self.is_reliable() {
            flags |= Flags::RELIABLE;
        }

        Ok(flags.bits()
            | ((u8::from(self.priority) as u64) << SHIFT_PRIORITY)
            | ((conn_stat as u64) << SHIFT_CONN_STAT)
            | ((self.source.0 as u64) << SHIFT_SOURCE)
            | ((self.destination.0 as u64) << SHIFT_DESTINATION)
            | self.message_id as u64)
    }

    /// returns the number of bytes written; nothing is written if the buffer is too small
    pub fn ser(&self, buf: &mut impl BufMut) -> CodecResult<usize> {
        let packed = self.pack()?;
        buf.check_remaining_mut(self.serialized_len())?;

        buf.put_u64(packed);
        if let Some(receipt) = &self.receipt {
            for id in receipt {
                buf.put_u16(*id);
            }
        }
        Ok(self.serialized_len())
    }

    pub fn deser(buf: &mut impl Buf) -> CodecResult<WireHeader> {
        let packed = buf.checked_get_u64()?;
        let flags = Flags::from_bits_retain(packed);

        if flags.intersects(Flags::MASK_RESERVED) {
            return Err(CodecError::InvalidHeader("reserved bits are set"));
        }

        let priority = Priority::try_from(((flags & Flags::MASK_PRIORITY).bits() >> SHIFT_PRIORITY) as u8)
            .map_err(|_| CodecError::InvalidHeader("invalid priority"))?;

        let conn_stat = ((flags & Flags::MASK_CONN_STAT).bits() >> SHIFT_CONN_STAT) as u16;
        let conn_stat = if flags.contains(Flags::STAT_MODE) {
            ConnStat::Allocation(conn_stat)
        }
        else {
            ConnStat::DesiredRate(conn_stat)
        };

        let receipt = if flags.contains(Flags::RELIABLE) {
            buf.check_remaining(Self::RECEIPT_LEN - Self::SIMPLE_LEN)?;
            Some([buf.get_u16(), buf.get_u16(), buf.get_u16(), buf.get_u16()])
        }
        else {
            None
        };

        if priority == Priority::Reliable && receipt.is_none() {
            return Err(CodecError::InvalidHeader("reliable priority without a receipt header"));
        }

        Ok(WireHeader {
            priority,
            conn_stat,
            source: PeerId((packed >> SHIFT_SOURCE) as u16),
            destination: PeerId((packed >> SHIFT_DESTINATION) as u16),
            message_id: packed as u16,
            receipt,
        })
    }

    /// Checks the header against the payload that came with it and the negotiated factory
    ///  table, before the message id is trusted as a table index.
    pub fn validate_for(&self, payload_len: usize, table_len: usize, max_payload_len: usize) -> CodecResult<()> {
        if self.message_id as usize >= table_len {
            return Err(CodecError::UnknownLocalId { local_id: self.message_id, table_len });
        }
        if payload_len > max_payload_len {
            return Err(CodecError::InvalidHeader("payload exceeds the maximum packet size"));
        }
        Ok(())
    }
}
