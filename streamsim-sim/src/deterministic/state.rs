//! Simulation metrics collection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metrics collected during simulation.
///
/// Keyed maps are ordered so that serialized reports of identical runs are
/// byte-identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationMetrics {
    /// Total events processed
    pub events_processed: u64,
    /// Events by type
    pub events_by_type: BTreeMap<String, u64>,
    /// Segment requests answered by the server
    pub requests_served: u64,
    /// Bytes delivered to clients
    pub bytes_delivered: u64,
    /// Deliveries dropped because the client had closed its connection
    pub deliveries_dropped: u64,
    /// Failed connection attempts
    pub connect_failures: u64,
}

impl SimulationMetrics {
    /// Creates new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event occurrence.
    pub fn record_event(&mut self, event_type: &str) {
        self.events_processed += 1;
        *self
            .events_by_type
            .entry(event_type.to_string())
            .or_insert(0) += 1;
    }

    /// Records a served segment request.
    pub fn record_request(&mut self) {
        self.requests_served += 1;
    }

    /// Records bytes handed to a client.
    pub fn record_delivery(&mut self, bytes: u64) {
        self.bytes_delivered += bytes;
    }

    /// Records a delivery to a closed client.
    pub fn record_dropped_delivery(&mut self) {
        self.deliveries_dropped += 1;
    }

    /// Records a failed connection attempt.
    pub fn record_connect_failure(&mut self) {
        self.connect_failures += 1;
    }

    /// Returns count of events of `event_type`.
    pub fn event_count(&self, event_type: &str) -> u64 {
        self.events_by_type.get(event_type).copied().unwrap_or(0)
    }
}
