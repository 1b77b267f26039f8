use std::time::Duration;

use tracing::debug;

use crate::config::NetConfig;
use crate::congestion::{DropRandom, Median9, PacketDropper};
use crate::wire::{ConnStat, Priority};

/// Turns measurements of a link's condition into a drop probability for low-priority packets.
///
/// Round trip times are median-filtered. Below the configured threshold nothing is dropped;
///  above it the drop probability rises linearly, reaching the configured maximum at twice the
///  threshold. An error ratio above the configured maximum adds to that.
pub struct CongestionMonitor {
    rtt: Median9,
    error_ratio: Median9,
    rtt_threshold: Duration,
    max_drop_probability: f64,
    max_error_ratio: f64,
    dropper: PacketDropper,
}

impl CongestionMonitor {
    pub fn new(config: &NetConfig) -> CongestionMonitor {
        let random = match config.drop_seed {
            Some(seed) => DropRandom::new(seed),
            None => DropRandom::from_entropy(),
        };

        CongestionMonitor {
            rtt: Median9::new(),
            error_ratio: Median9::new(),
            rtt_threshold: config.congestion_rtt_threshold,
            max_drop_probability: config.max_drop_probability,
            max_error_ratio: config.max_error_ratio,
            dropper: PacketDropper::new(random),
        }
    }

    pub fn record_rtt(&mut self, rtt: Duration) -> f64 {
        self.rtt.add(rtt.as_secs_f64());
        self.update()
    }

    pub fn record_error_ratio(&mut self, error_ratio: f64) -> f64 {
        self.error_ratio.add(error_ratio.clamp(0.0, 1.0));
        self.update()
    }

    pub fn median_rtt(&self) -> Option<Duration> {
        self.rtt.median()
            .map(Duration::from_secs_f64)
    }

    pub fn median_error_ratio(&self) -> Option<f64> {
        self.error_ratio.median()
    }

    pub fn drop_probability(&self) -> f64 {
        self.dropper.drop_probability()
    }

    pub fn should_drop(&mut self, priority: Priority) -> bool {
        self.dropper.should_drop(priority)
    }

    /// the share of bandwidth this side is willing to receive, for the header's connection statistics
    pub fn conn_stat(&self) -> ConnStat {
        let share = 1.0 - self.drop_probability();
        ConnStat::Allocation((share * ConnStat::MAX_VALUE as f64).round() as u16)
    }

    fn update(&mut self) -> f64 {
        let threshold = self.rtt_threshold.as_secs_f64();
        let rtt_part = match self.rtt.median() {
            Some(rtt) if rtt > threshold => ((rtt - threshold) / threshold).min(1.0) * self.max_drop_probability,
            _ => 0.0,
        };

        let error_part = self.error_ratio.median()
            .map(|ratio| (ratio - self.max_error_ratio).max(0.0))
            .unwrap_or(0.0);

        let p = (rtt_part + error_part).min(self.max_drop_probability);
        if p != self.dropper.drop_probability() {
            debug!(median_rtt = ?self.median_rtt(), median_error_ratio = ?self.median_error_ratio(), p, "congestion changed");
        }
        self.dropper.set_drop_probability(p);
        p
    }
}
