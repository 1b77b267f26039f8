use thiserror::Error;

use crate::record::record_type_id::RecordTypeId;

/// Errors at the packet boundary: encoding outbound records, decoding inbound records and
///  parsing wire headers. These are recovered per packet by the network step, they never abort it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer underflow: needed {needed} bytes, {remaining} remaining")]
    Underflow { needed: usize, remaining: usize },

    #[error("buffer overflow: needed {needed} bytes, {remaining} remaining")]
    Overflow { needed: usize, remaining: usize },

    #[error("local id {local_id} is out of range for a factory table of length {table_len}")]
    UnknownLocalId { local_id: u16, table_len: usize },

    #[error("record type {0:?} is not part of the factory table")]
    UnknownRecordType(RecordTypeId),

    #[error("no record to encode")]
    MissingRecord,

    #[error("{0} trailing bytes after decoding the record")]
    TrailingBytes(usize),

    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

pub type CodecResult<T> = Result<T, CodecError>;


#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingError {
    #[error("routing type {routing_type} is out of range for a table of size {table_size}")]
    OutOfRange { routing_type: u16, table_size: usize },
}
