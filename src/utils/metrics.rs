//! Dispatch Metrics
//!
//! Counters describing how packets moved through a service instance.
//!
//! Uses atomic counters so a snapshot can be taken from any thread while the
//! owning service keeps dispatching.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

use crate::error::FailureStage;

/// Metrics collector for one service instance
#[derive(Debug)]
pub struct Metrics {
    /// Events delivered to the dispatcher (all kinds)
    pub events_dispatched: AtomicU64,
    /// Events rejected by the lifecycle state machine
    pub events_rejected: AtomicU64,
    /// Inbound packets
    pub packets_received: AtomicU64,
    /// Inbound packets with no registration for their opcode
    pub packets_unhandled: AtomicU64,
    /// Packets handled without failure
    pub packets_handled: AtomicU64,
    /// Outbound packets handed to the transport
    pub packets_sent: AtomicU64,
    /// Handler responses sent back automatically
    pub responses_sent: AtomicU64,
    /// Inbound payload bytes
    pub bytes_received: AtomicU64,
    /// Outbound payload bytes
    pub bytes_sent: AtomicU64,
    /// Decode failures
    pub decode_failures: AtomicU64,
    /// Handler failures
    pub handler_failures: AtomicU64,
    /// Response encode failures
    pub encode_failures: AtomicU64,
    /// Response send failures
    pub send_failures: AtomicU64,
    /// Failures delivered to an exception handler
    pub exceptions_routed: AtomicU64,
    /// Failures with no exception handler bound
    pub failures_unrouted: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_dispatched: AtomicU64::new(0),
            events_rejected: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            packets_unhandled: AtomicU64::new(0),
            packets_handled: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            exceptions_routed: AtomicU64::new(0),
            failures_unrouted: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_rejected(&self) {
        self.events_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_received(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn packet_unhandled(&self) {
        self.packets_unhandled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_handled(&self) {
        self.packets_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn response_sent(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a per-packet failure against its stage
    pub fn failure(&self, stage: FailureStage) {
        let counter = match stage {
            FailureStage::Decode => &self.decode_failures,
            FailureStage::Handle => &self.handler_failures,
            FailureStage::Encode => &self.encode_failures,
            FailureStage::Send => &self.send_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn exception_routed(&self) {
        self.exceptions_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_unrouted(&self) {
        self.failures_unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_unhandled: self.packets_unhandled.load(Ordering::Relaxed),
            packets_handled: self.packets_handled.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            exceptions_routed: self.exceptions_routed.load(Ordering::Relaxed),
            failures_unrouted: self.failures_unrouted.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }

    /// Emit the current counters as a single structured log line
    pub fn log_summary(&self, service: &str) {
        let s = self.snapshot();
        info!(
            service,
            uptime_secs = s.uptime_secs,
            events = s.events_dispatched,
            received = s.packets_received,
            unhandled = s.packets_unhandled,
            handled = s.packets_handled,
            sent = s.packets_sent,
            failures = s.total_failures(),
            unrouted = s.failures_unrouted,
            "Service metrics summary"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of [`Metrics`] counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub events_dispatched: u64,
    pub events_rejected: u64,
    pub packets_received: u64,
    pub packets_unhandled: u64,
    pub packets_handled: u64,
    pub packets_sent: u64,
    pub responses_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub decode_failures: u64,
    pub handler_failures: u64,
    pub encode_failures: u64,
    pub send_failures: u64,
    pub exceptions_routed: u64,
    pub failures_unrouted: u64,
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    pub fn total_failures(&self) -> u64 {
        self.decode_failures + self.handler_failures + self.encode_failures + self.send_failures
    }
}
