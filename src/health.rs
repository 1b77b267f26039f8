//! Connection health: counters for everything that can go wrong at the packet boundary.
//!
//! Individual failures are recovered locally (the packet is dropped and the network step goes
//!  on), but their rate is a signal: a peer that keeps sending malformed or unroutable messages
//!  runs a different protocol revision or is misbehaving, and the congestion control takes the
//!  error ratio into account.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

#[derive(Debug, Default)]
pub struct LinkHealth {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    decode_errors: AtomicU64,
    encode_errors: AtomicU64,
    unroutable: AtomicU64,
    dropped: AtomicU64,

    window_received: AtomicU64,
    window_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthSnapshot {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub decode_errors: u64,
    pub encode_errors: u64,
    pub unroutable: u64,
    pub dropped: u64,
}

impl LinkHealth {
    pub fn new() -> LinkHealth {
        Default::default()
    }

    pub fn packet_received(&self, byte_count: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count as u64, Ordering::Relaxed);
        self.window_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_sent(&self, byte_count: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count as u64, Ordering::Relaxed);
    }

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
        self.window_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn encode_error(&self) {
        self.encode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unroutable(&self) {
        self.unroutable.fetch_add(1, Ordering::Relaxed);
        self.window_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// number of packets received in the current window
    pub fn window_len(&self) -> u64 {
        self.window_received.load(Ordering::Relaxed)
    }

    /// Ratio of decode errors and unroutable messages to received packets in the current window.
    ///  An empty window has a ratio of 0.
    pub fn error_ratio(&self) -> f64 {
        let received = self.window_received.load(Ordering::Relaxed);
        if received == 0 {
            return 0.0;
        }
        let errors = self.window_errors.load(Ordering::Relaxed);
        (errors as f64 / received as f64).min(1.0)
    }

    /// returns the current window's error ratio and starts a new window
    pub fn take_window(&self) -> f64 {
        let result = self.error_ratio();
        self.window_received.store(0, Ordering::Relaxed);
        self.window_errors.store(0, Ordering::Relaxed);
        result
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
            unroutable: self.unroutable.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn log_health(&self) {
        let snapshot = self.snapshot();
        info!(
            packets_received = snapshot.packets_received,
            bytes_received = snapshot.bytes_received,
            packets_sent = snapshot.packets_sent,
            bytes_sent = snapshot.bytes_sent,
            decode_errors = snapshot.decode_errors,
            encode_errors = snapshot.encode_errors,
            unroutable = snapshot.unroutable,
            dropped = snapshot.dropped,
            error_ratio = self.error_ratio(),
            "link health"
        );
    }
}
