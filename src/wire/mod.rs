mod header;

pub use header::{ConnStat, Priority, WireHeader};
