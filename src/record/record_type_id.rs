use std::fmt::{Debug, Formatter};

/// A [RecordTypeId] identifies a record type globally, i.e. across processes and protocol
///  revisions. It is never sent on the wire for individual packets: each connection maps
///  the record types it uses to compact local ids.
///
/// An id is technically a u64, but it is intended to be used as a sequence of up to eight ASCII
///  characters to give it a human-readable name, both for uniqueness and for debugging.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordTypeId(pub u64);

impl RecordTypeId {
    pub const fn named(value: &[u8; 8]) -> RecordTypeId {
        Self(u64::from_be_bytes(*value))
    }
}

impl Debug for RecordTypeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let bytes = self.0.to_be_bytes();
        let used = bytes.iter()
            .position(|&b| b == 0)
            .map(|len| &bytes[..len])
            .unwrap_or(&bytes);

        match std::str::from_utf8(used) {
            Ok(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_graphic()) => write!(f, "0x{:016X}({:?})", self.0, s),
            _ => write!(f, "0x{:016X}", self.0),
        }
    }
}

impl From<u64> for RecordTypeId {
    fn from(value: u64) -> Self {
        RecordTypeId(value)
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use super::*;

    #[rstest]
    #[case::abc(RecordTypeId::named(b"abc\0\0\0\0\0"), "0x6162630000000000(\"abc\")")]
    #[case::full(RecordTypeId::named(b"PosUpdat"), "0x506F735570646174(\"PosUpdat\")")]
    #[case::empty(RecordTypeId::named(b"\0\0\0\0\0\0\0\0"), "0x0000000000000000")]
    #[case::numeric(RecordTypeId(7), "0x0000000000000007")]
    fn test_id_debug(#[case] id: RecordTypeId, #[case] expected: &str) {
        let formatted = format!("{:?}", id);
        assert_eq!(&formatted, expected);
    }
}
