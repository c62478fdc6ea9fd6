//! Simulated transport: a shared bottleneck link and the segment server behind it.

use std::time::Duration;

use streamsim_core::SimTime;
use streamsim_core::config::NetworkConfig;

use crate::deterministic::DeterministicRng;

/// One chunk arriving at a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Arrival time at the client
    pub at: SimTime,
    /// Chunk size in bytes
    pub bytes: u64,
}

/// Shared FIFO bottleneck link between the server and all clients.
///
/// Chunks of at most one MSS are serialized one after another at the link
/// rate across all clients, then delayed by the one-way latency plus seeded
/// jitter. A rate of zero means an unlimited link that delivers a whole
/// payload as one chunk.
#[derive(Debug, Clone)]
pub struct SharedLink {
    rate_bps: u64,
    latency: Duration,
    max_segment_size: u64,
    jitter: Duration,
    busy_until: SimTime,
}

impl SharedLink {
    /// Creates link from network configuration.
    pub fn new(config: &NetworkConfig) -> Self {
        Self::builder()
            .rate_bps(config.link_rate_bps)
            .latency(config.latency)
            .max_segment_size(u64::from(config.max_segment_size))
            .jitter(config.jitter)
            .build()
    }

    /// Creates builder for custom link parameters.
    pub fn builder() -> SharedLinkBuilder {
        SharedLinkBuilder::default()
    }

    /// One-way propagation latency.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Time a connection handshake takes.
    pub fn round_trip(&self) -> Duration {
        self.latency * 2
    }

    /// Instant the link finishes serializing everything queued so far.
    pub fn busy_until(&self) -> SimTime {
        self.busy_until
    }

    /// Serialization time of `bytes` at the link rate, zero on an unlimited link.
    pub fn transmission_time(&self, bytes: u64) -> Duration {
        if self.rate_bps == 0 {
            return Duration::ZERO;
        }
        let micros = (u128::from(bytes) * 8 * 1_000_000).div_ceil(u128::from(self.rate_bps));
        Duration::from_micros(u64::try_from(micros).unwrap_or(u64::MAX))
    }

    /// Queues `bytes` for one client at `now` and returns the chunk arrivals.
    ///
    /// Arrival times of one payload never decrease, even with jitter. The
    /// returned list is never empty.
    pub fn transmit(
        &mut self,
        now: SimTime,
        bytes: u64,
        rng: &mut DeterministicRng,
    ) -> Vec<Delivery> {
        let chunk_size = if self.rate_bps == 0 {
            bytes.max(1)
        } else {
            self.max_segment_size.max(1)
        };

        let mut deliveries = Vec::with_capacity(bytes.div_ceil(chunk_size).max(1) as usize);
        let mut cursor = self.busy_until.max(now);
        let mut last_arrival = SimTime::ZERO;
        let mut remaining = bytes;

        // An empty payload still produces one (empty) arrival.
        loop {
            let chunk = remaining.min(chunk_size);
            cursor = cursor + self.transmission_time(chunk);
            let jitter = if self.jitter.is_zero() {
                Duration::ZERO
            } else {
                rng.random_duration(self.jitter)
            };
            let at = (cursor + self.latency + jitter).max(last_arrival);
            deliveries.push(Delivery { at, bytes: chunk });
            last_arrival = at;
            remaining -= chunk;
            if remaining == 0 {
                break;
            }
        }

        self.busy_until = cursor;
        deliveries
    }
}

/// Builder for [`SharedLink`].
#[derive(Debug, Clone)]
pub struct SharedLinkBuilder {
    rate_bps: u64,
    latency: Duration,
    max_segment_size: u64,
    jitter: Duration,
}

impl Default for SharedLinkBuilder {
    fn default() -> Self {
        let config = NetworkConfig::default();
        Self {
            rate_bps: config.link_rate_bps,
            latency: config.latency,
            max_segment_size: u64::from(config.max_segment_size),
            jitter: config.jitter,
        }
    }
}

impl SharedLinkBuilder {
    /// Sets link rate in bits per second, 0 for unlimited.
    pub fn rate_bps(mut self, rate_bps: u64) -> Self {
        self.rate_bps = rate_bps;
        self
    }

    /// Sets one-way latency.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Sets maximum chunk size in bytes.
    pub fn max_segment_size(mut self, bytes: u64) -> Self {
        self.max_segment_size = bytes;
        self
    }

    /// Sets upper bound of per-chunk jitter.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Builds the link.
    pub fn build(self) -> SharedLink {
        SharedLink {
            rate_bps: self.rate_bps,
            latency: self.latency,
            max_segment_size: self.max_segment_size,
            jitter: self.jitter,
            busy_until: SimTime::ZERO,
        }
    }
}

/// Server answering every request of `n` bytes with `n` bytes on the link.
#[derive(Debug, Default)]
pub struct SegmentServer {
    requests_served: u64,
    bytes_served: u64,
}

impl SegmentServer {
    /// Creates server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers a request arriving at `now`.
    pub fn serve(
        &mut self,
        now: SimTime,
        bytes: u64,
        link: &mut SharedLink,
        rng: &mut DeterministicRng,
    ) -> Vec<Delivery> {
        self.requests_served += 1;
        self.bytes_served += bytes;
        link.transmit(now, bytes, rng)
    }

    /// Number of requests answered.
    pub fn requests_served(&self) -> u64 {
        self.requests_served
    }

    /// Bytes put on the link.
    pub fn bytes_served(&self) -> u64 {
        self.bytes_served
    }
}
