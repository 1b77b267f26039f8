use tracing::{debug, trace};

use crate::wire::Priority;

/// A 32-bit linear congruential generator. It is not cryptographically secure, and does not
///  need to be: it decides which low-priority packets to drop, and it must be fast.
#[derive(Debug, Clone)]
pub struct DropRandom {
    state: u32,
}

impl DropRandom {
    const MULTIPLIER: u32 = 1664525;
    const INCREMENT: u32 = 1013904223;

    pub fn new(seed: u32) -> DropRandom {
        DropRandom { state: seed }
    }

    pub fn from_entropy() -> DropRandom {
        Self::new(rand::random())
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT);
        self.state
    }

    /// uniformly distributed in `[0, 1)`
    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / (u32::MAX as f64 + 1.0)
    }

    /// true with probability `p`: never for `p <= 0`, always for `p >= 1`
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }
}


/// Decides whether to drop low-priority outbound packets, based on a drop probability that is
///  derived from measured load.
#[derive(Debug, Clone)]
pub struct PacketDropper {
    random: DropRandom,
    drop_probability: f64,
}

impl PacketDropper {
    pub fn new(random: DropRandom) -> PacketDropper {
        PacketDropper {
            random,
            drop_probability: 0.0,
        }
    }

    pub fn drop_probability(&self) -> f64 {
        self.drop_probability
    }

    pub fn set_drop_probability(&mut self, p: f64) {
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        if p != self.drop_probability {
            debug!(old = self.drop_probability, new = p, "changing drop probability");
        }
        self.drop_probability = p;
    }

    /// Packets that are not droppable by priority are never dropped, and do not consume a
    ///  random number.
    pub fn should_drop(&mut self, priority: Priority) -> bool {
        if !priority.is_droppable() || self.drop_probability <= 0.0 {
            return false;
        }
        let result = self.random.chance(self.drop_probability);
        if result {
            trace!(?priority, p = self.drop_probability, "dropping packet");
        }
        result
    }
}
