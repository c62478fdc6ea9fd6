//! Per-segment transfer records read by the adaptation algorithms.

use crate::time::SimTime;

/// Transfer timing of one fully received segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentTransfer {
    /// Segment size in bytes
    pub bytes_received: u64,
    /// When the request left the client
    pub request_sent_at: SimTime,
    /// When the first byte arrived
    pub transfer_start_at: SimTime,
    /// When the last byte arrived
    pub transfer_end_at: SimTime,
}

impl SegmentTransfer {
    /// Throughput from first to last byte in bits per second.
    ///
    /// Returns `None` for zero-length transfers, which carry no rate information.
    pub fn transfer_bps(&self) -> Option<f64> {
        let micros = self
            .transfer_end_at
            .as_micros()
            .saturating_sub(self.transfer_start_at.as_micros());
        (micros > 0).then(|| self.bytes_received as f64 * 8.0 * 1_000_000.0 / micros as f64)
    }

    /// Throughput from request to last byte in bits per second, including latency.
    pub fn request_bps(&self) -> Option<f64> {
        let micros = self
            .transfer_end_at
            .as_micros()
            .saturating_sub(self.request_sent_at.as_micros());
        (micros > 0).then(|| self.bytes_received as f64 * 8.0 * 1_000_000.0 / micros as f64)
    }

    /// Best available throughput measurement, falling back to the request-based one.
    pub fn measured_bps(&self) -> Option<f64> {
        self.transfer_bps().or_else(|| self.request_bps())
    }
}

/// Append-only ledger of segment transfers.
#[derive(Debug, Clone, Default)]
pub struct ThroughputLedger {
    transfers: Vec<SegmentTransfer>,
}

impl ThroughputLedger {
    /// Creates empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed transfer.
    pub fn record(&mut self, transfer: SegmentTransfer) {
        self.transfers.push(transfer);
    }

    /// Returns all transfers in completion order.
    pub fn transfers(&self) -> &[SegmentTransfer] {
        &self.transfers
    }

    /// Number of completed transfers.
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    /// Returns true if no transfer has completed.
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    /// Most recent transfer.
    pub fn last(&self) -> Option<&SegmentTransfer> {
        self.transfers.last()
    }

    /// Throughput of the most recent measurable transfer.
    pub fn last_bps(&self) -> Option<f64> {
        self.transfers.iter().rev().find_map(SegmentTransfer::measured_bps)
    }

    /// Harmonic mean of the last `window` measurable throughputs.
    pub fn harmonic_mean_bps(&self, window: usize) -> Option<f64> {
        let rates: Vec<f64> = self
            .transfers
            .iter()
            .rev()
            .filter_map(SegmentTransfer::measured_bps)
            .filter(|bps| *bps > 0.0)
            .take(window)
            .collect();
        if rates.is_empty() {
            return None;
        }
        let inverse_sum: f64 = rates.iter().map(|bps| 1.0 / bps).sum();
        Some(rates.len() as f64 / inverse_sum)
    }
}
