use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::{CodecError, CodecResult};
use crate::record::{DynRecord, LocalId, RecordFactory, RecordTypeId};

/// The record types of a single connection, indexed by [LocalId].
///
/// A table is built once when the connection is set up and is read-only afterwards, so it can
///  be shared between threads without locking.
pub struct FactoryTable {
    factories: Vec<Arc<dyn RecordFactory>>,
    local_ids: FxHashMap<RecordTypeId, LocalId>,
}

impl Debug for FactoryTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FactoryTable{:?}", self.record_types())
    }
}

impl FactoryTable {
    /// callers ensure that the number of factories fits into the local id range
    pub(super) fn new(factories: Vec<Arc<dyn RecordFactory>>) -> FactoryTable {
        let local_ids = factories.iter()
            .enumerate()
            .map(|(idx, f)| (f.record_type(), idx as LocalId))
            .collect();

        FactoryTable {
            factories,
            local_ids,
        }
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn local_id_of(&self, record_type: RecordTypeId) -> Option<LocalId> {
        self.local_ids.get(&record_type).copied()
    }

    pub fn type_of(&self, local_id: LocalId) -> Option<RecordTypeId> {
        self.factories.get(local_id as usize)
            .map(|f| f.record_type())
    }

    pub fn record_types(&self) -> Vec<RecordTypeId> {
        self.factories.iter()
            .map(|f| f.record_type())
            .collect()
    }

    /// Serializes a record into the buffer, returning the number of bytes written. A record that
    ///  does not fit is reported as [CodecError::Overflow] - nothing is ever written past the end
    ///  of the buffer.
    pub fn encode(&self, record: Option<&dyn DynRecord>, buf: &mut [u8]) -> CodecResult<usize> {
        let record = record.ok_or(CodecError::MissingRecord)?;
        if !self.local_ids.contains_key(&record.record_type()) {
            return Err(CodecError::UnknownRecordType(record.record_type()));
        }

        let capacity = buf.len();
        let mut remaining: &mut [u8] = buf;
        record.ser(&mut remaining)?;

        let len = capacity - remaining.len();
        trace!(record_type = ?record.record_type(), len, "encoded record");
        Ok(len)
    }

    /// Reconstructs a record from its serialized form. The payload must be consumed completely.
    pub fn decode(&self, local_id: LocalId, payload: &[u8]) -> CodecResult<Box<dyn DynRecord>> {
        let factory = self.factories.get(local_id as usize)
            .ok_or(CodecError::UnknownLocalId { local_id, table_len: self.factories.len() })?;

        let mut buf = payload;
        let record = factory.deser(&mut buf)?;
        if !buf.is_empty() {
            return Err(CodecError::TrailingBytes(buf.len()));
        }

        trace!(local_id, record_type = ?record.record_type(), "decoded record");
        Ok(record)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::test_util::{test_table, ChatRecord, PingRecord, PositionRecord};
    use rstest::rstest;

    #[rstest]
    #[case::ping(Box::new(PingRecord { seq: 17 }))]
    #[case::chat(Box::new(ChatRecord::new("mayday")))]
    #[case::position(Box::new(PositionRecord::new(3, [1.5, -2.25, 10_000.0])))]
    fn test_encode_decode(#[case] record: Box<dyn DynRecord>) {
        let table = test_table();
        let mut buf = [0u8; 256];

        let len = table.encode(Some(record.as_ref()), &mut buf).unwrap();
        let local_id = table.local_id_of(record.record_type()).unwrap();
        let decoded = table.decode(local_id, &buf[..len]).unwrap();

        assert!(*decoded == *record);
    }

    #[test]
    fn test_encode_missing_record() {
        let table = test_table();
        let mut buf = [0u8; 16];
        assert_eq!(table.encode(None, &mut buf), Err(CodecError::MissingRecord));
    }

    #[test]
    fn test_encode_unknown_type() {
        let table = crate::test_util::test_registry().build_table_for(&[PingRecord::TYPE_ID]).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(table.encode(Some(&ChatRecord::new("x")), &mut buf), Err(CodecError::UnknownRecordType(ChatRecord::TYPE_ID)));
    }

    #[test]
    fn test_encode_overflow() {
        let table = test_table();
        let mut buf = [0u8; 20];
        let record = PositionRecord::new(1, [0.0; 3]);
        assert!(matches!(table.encode(Some(&record), &mut buf), Err(CodecError::Overflow { .. })));
    }

    #[rstest]
    #[case(3)]
    #[case(4)]
    #[case(1000)]
    #[case(u16::MAX)]
    fn test_decode_local_id_out_of_range(#[case] local_id: LocalId) {
        let table = test_table();
        assert_eq!(table.len(), 3);
        assert_eq!(table.decode(local_id, &[0; 8]).err(), Some(CodecError::UnknownLocalId { local_id, table_len: 3 }));
    }

    #[test]
    fn test_decode_underflow() {
        let table = test_table();
        let local_id = table.local_id_of(PingRecord::TYPE_ID).unwrap();
        assert_eq!(table.decode(local_id, &[0, 1]).err(), Some(CodecError::Underflow { needed: 4, remaining: 2 }));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let table = test_table();
        let local_id = table.local_id_of(PingRecord::TYPE_ID).unwrap();
        assert_eq!(table.decode(local_id, &[0, 0, 0, 1, 9, 9]).err(), Some(CodecError::TrailingBytes(2)));
    }

    #[test]
    fn test_type_of() {
        let table = test_table();
        for local_id in 0..table.len() as LocalId {
            let record_type = table.type_of(local_id).unwrap();
            assert_eq!(table.local_id_of(record_type), Some(local_id));
        }
        assert_eq!(table.type_of(table.len() as LocalId), None);
    }
}
