//! Aids for congestion control: a cheap pseudo-random packet dropper and a median filter for
//!  smoothing noisy measurements, combined in a [CongestionMonitor].

mod drop_random;
mod median9;
mod monitor;

pub use drop_random::{DropRandom, PacketDropper};
pub use median9::Median9;
pub use monitor::CongestionMonitor;
