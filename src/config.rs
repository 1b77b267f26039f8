use std::time::Duration;

use anyhow::bail;

use crate::wire::WireHeader;

pub struct NetConfig {
    /// The maximum size of a single datagram including the wire header. Packets are never
    ///  fragmented, so a message whose serialized form does not fit into this size minus the
    ///  header can not be sent at all.
    ///
    /// Choosing this too big causes datagrams to be dropped by the network, choosing it too small
    ///  limits the size of records.
    pub max_packet_size: usize,

    /// The number of bytes sent per network step. Pending packets in excess of this stay queued
    ///  for the next step.
    pub send_budget_per_step: usize,

    /// median round trip time above which low-priority packets start being dropped
    pub congestion_rtt_threshold: Duration,

    /// upper bound for the probability of dropping a low-priority packet, between 0 and 1
    pub max_drop_probability: f64,

    /// number of received packets after which the error ratio is evaluated
    pub health_window: u64,

    /// Ratio of decode errors and unroutable messages to received packets above which a link
    ///  is considered unhealthy. The excess error ratio adds to the drop probability.
    pub max_error_ratio: f64,

    /// fixed seed for the packet dropper's random numbers, `None` for a seed from entropy
    pub drop_seed: Option<u32>,
}

impl NetConfig {
    /// defaults for a LAN with full Ethernet frames, leaving room for IP and UDP headers
    pub fn default_lan() -> NetConfig {
        NetConfig {
            max_packet_size: 1200,
            send_budget_per_step: 16*1024,
            congestion_rtt_threshold: Duration::from_millis(250),
            max_drop_probability: 0.5,
            health_window: 256,
            max_error_ratio: 0.1,
            drop_seed: None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_packet_size < 64 {
            bail!("max packet size {} is too small - it must be at least 64 bytes", self.max_packet_size);
        }
        if self.send_budget_per_step < self.max_packet_size {
            bail!("send budget per step {} is smaller than a single packet of {} bytes", self.send_budget_per_step, self.max_packet_size);
        }
        if self.congestion_rtt_threshold.is_zero() {
            bail!("congestion RTT threshold must not be zero");
        }
        if !(0.0..=1.0).contains(&self.max_drop_probability) {
            bail!("max drop probability {} is not between 0 and 1", self.max_drop_probability);
        }
        if self.health_window == 0 {
            bail!("health window must not be empty");
        }
        if !(0.0..=1.0).contains(&self.max_error_ratio) {
            bail!("max error ratio {} is not between 0 and 1", self.max_error_ratio);
        }
        Ok(())
    }

    /// the maximum payload length, i.e. the packet size without the largest header
    pub fn max_payload_len(&self) -> usize {
        self.max_packet_size.saturating_sub(WireHeader::RECEIPT_LEN)
    }
}
