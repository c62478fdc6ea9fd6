//! Adaptation (bitrate selection) algorithms.
//!
//! Every algorithm implements [`AdaptationAlgorithm`] and is resolved once at
//! session start from a human-readable name through [`AlgorithmKind`].
//! Algorithms read the session histories through [`DecisionContext`] and never
//! mutate controller state. Internal algorithm state is allowed but must be a
//! pure function of the histories seen so far, so identical inputs replay
//! identically.

mod bola;
mod festive;
mod mpc;
mod panda;
mod simple;
mod tobasco;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use bola::BolaAlgorithm;
pub use festive::FestiveAlgorithm;
pub use mpc::MpcAlgorithm;
pub use panda::PandaAlgorithm;
pub use simple::SimpleAlgorithm;
pub use tobasco::TobascoAlgorithm;

use crate::buffer::PlaybackBuffer;
use crate::catalog::VideoCatalog;
use crate::throughput::ThroughputLedger;
use crate::time::SimTime;

/// Errors resolving an adaptation algorithm.
#[derive(Debug, thiserror::Error)]
pub enum AlgorithmError {
    #[error("Unknown adaptation algorithm {name:?}, expected one of: {known}")]
    UnknownAlgorithm { name: String, known: String },
}

/// Read-only view of the session handed to an algorithm.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    /// Video metadata
    pub catalog: &'a VideoCatalog,
    /// Buffer timeline and playback progress
    pub buffer: &'a PlaybackBuffer,
    /// Completed transfers
    pub throughput: &'a ThroughputLedger,
    /// Representation chosen for every segment requested so far
    pub representations: &'a [usize],
    /// Current simulation time
    pub now: SimTime,
}

impl DecisionContext<'_> {
    /// Representation of the previous request, lowest before the first one.
    pub fn previous_representation(&self) -> usize {
        self.representations.last().copied().unwrap_or(0)
    }

    /// Buffered play time drained up to now.
    pub fn buffer_level(&self) -> Duration {
        self.buffer.timeline().level_at(self.now)
    }

    /// Highest representation whose average bitrate fits into `bps`, lowest if none does.
    pub fn highest_fitting(&self, bps: f64) -> usize {
        self.catalog
            .representations()
            .iter()
            .rposition(|rep| rep.average_bitrate as f64 <= bps)
            .unwrap_or(0)
    }

    /// Average bitrate of `representation` in bits per second.
    pub fn bitrate(&self, representation: usize) -> f64 {
        self.catalog.average_bitrate(representation).unwrap_or(0) as f64
    }
}

/// Answer of one algorithm invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlgorithmDecision {
    /// Representation to request next
    pub representation: usize,
    /// Pause imposed before the following request
    pub next_download_delay: Duration,
    /// When the decision was taken
    pub decision_time: SimTime,
    /// Algorithm-specific tag of the selection branch taken
    pub decision_case: u32,
    /// Algorithm-specific tag of the delay branch taken
    pub delay_case: u32,
    /// Bandwidth estimate in bits per second the decision was based on
    pub bandwidth_estimate: f64,
}

impl AlgorithmDecision {
    /// Decision without inter-request delay.
    pub fn immediate(
        ctx: &DecisionContext<'_>,
        representation: usize,
        decision_case: u32,
        bandwidth_estimate: f64,
    ) -> Self {
        Self {
            representation,
            next_download_delay: Duration::ZERO,
            decision_time: ctx.now,
            decision_case,
            delay_case: 0,
            bandwidth_estimate,
        }
    }

    /// Adds an inter-request delay with its case tag.
    pub fn with_delay(mut self, delay: Duration, delay_case: u32) -> Self {
        self.next_download_delay = delay;
        self.delay_case = delay_case;
        self
    }
}

/// Bitrate selection capability.
pub trait AdaptationAlgorithm: Send {
    /// Human-readable identifier.
    fn name(&self) -> &'static str;

    /// Chooses the representation for `segment` and the delay before the next request.
    fn decide(
        &mut self,
        ctx: &DecisionContext<'_>,
        segment: usize,
        client_id: u32,
    ) -> AlgorithmDecision;
}

/// Registry of the available algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmKind {
    /// Last-throughput rule
    Simple,
    /// Harmonic-mean throughput with gradual switching
    Festive,
    /// Probe-and-adapt bandwidth share estimation
    Panda,
    /// Buffer thresholds with throughput cap
    Tobasco,
    /// Model-predictive lookahead
    Mpc,
    /// Lyapunov buffer optimisation
    Bola,
}

impl AlgorithmKind {
    /// All registered algorithms.
    pub const ALL: [AlgorithmKind; 6] = [
        AlgorithmKind::Simple,
        AlgorithmKind::Festive,
        AlgorithmKind::Panda,
        AlgorithmKind::Tobasco,
        AlgorithmKind::Mpc,
        AlgorithmKind::Bola,
    ];

    /// Registry name.
    pub fn as_str(self) -> &'static str {
        match self {
            AlgorithmKind::Simple => "simple",
            AlgorithmKind::Festive => "festive",
            AlgorithmKind::Panda => "panda",
            AlgorithmKind::Tobasco => "tobasco",
            AlgorithmKind::Mpc => "mpc",
            AlgorithmKind::Bola => "bola",
        }
    }

    /// Instantiates the algorithm for a catalog.
    pub fn build(self, catalog: &VideoCatalog) -> Box<dyn AdaptationAlgorithm> {
        match self {
            AlgorithmKind::Simple => Box::new(SimpleAlgorithm::new()),
            AlgorithmKind::Festive => Box::new(FestiveAlgorithm::new()),
            AlgorithmKind::Panda => Box::new(PandaAlgorithm::new(catalog)),
            AlgorithmKind::Tobasco => Box::new(TobascoAlgorithm::new(catalog)),
            AlgorithmKind::Mpc => Box::new(MpcAlgorithm::new()),
            AlgorithmKind::Bola => Box::new(BolaAlgorithm::new(catalog)),
        }
    }

    fn known_names() -> String {
        Self::ALL
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for AlgorithmKind {
    type Err = AlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| AlgorithmError::UnknownAlgorithm {
                name: s.to_string(),
                known: Self::known_names(),
            })
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use crate::buffer::PlaybackBuffer;
    use crate::catalog::VideoCatalog;
    use crate::throughput::{SegmentTransfer, ThroughputLedger};
    use crate::time::SimTime;

    pub const SEGMENT: Duration = Duration::from_secs(2);

    /// Three representations at 1, 2.5 and 5 Mbps, ten segments each.
    pub fn ladder() -> VideoCatalog {
        let line = |bps: u64| {
            let size = bps * 2 / 8;
            let sizes: Vec<String> = (0..10).map(|_| size.to_string()).collect();
            format!("{bps} {}", sizes.join(" "))
        };
        let input = format!(
            "{}\n{}\n{}\n",
            line(1_000_000),
            line(2_500_000),
            line(5_000_000)
        );
        VideoCatalog::parse(&input, SEGMENT).unwrap()
    }

    /// Ledger whose every transfer ran at `bps` for one second.
    pub fn ledger_at(bps: u64, count: usize) -> ThroughputLedger {
        let mut ledger = ThroughputLedger::new();
        for i in 0..count as u64 {
            let start = SimTime::from_secs(i * 2);
            ledger.record(SegmentTransfer {
                bytes_received: bps / 8,
                request_sent_at: start,
                transfer_start_at: start,
                transfer_end_at: start + Duration::from_secs(1),
            });
        }
        ledger
    }

    /// Buffer holding `segments` completed segments with playback running.
    pub fn buffer_with(segments: usize) -> PlaybackBuffer {
        let mut buffer = PlaybackBuffer::new();
        buffer.tick(SimTime::ZERO, usize::MAX);
        for _ in 0..segments {
            buffer.segment_completed(SimTime::ZERO, SEGMENT);
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_resolve_by_name_is_case_insensitive() {
        assert_eq!("BOLA".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::Bola);
        assert_eq!(" mpc ".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::Mpc);
    }

    #[test]
    fn test_unknown_name_lists_known_algorithms() {
        let err = "dynamic".parse::<AlgorithmKind>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("dynamic"));
        assert!(message.contains("simple, festive, panda, tobasco, mpc, bola"));
    }

    #[test]
    fn test_every_algorithm_stays_in_bounds() {
        let catalog = ladder();
        for kind in AlgorithmKind::ALL {
            let mut algorithm = kind.build(&catalog);
            assert_eq!(algorithm.name(), kind.as_str());

            for (buffered, rate) in [(0, 0), (1, 800_000), (3, 3_000_000), (8, 50_000_000)] {
                let buffer = buffer_with(buffered);
                let ledger = ledger_at(rate, if rate == 0 { 0 } else { 4 });
                let history = vec![0; ledger.len()];
                let ctx = DecisionContext {
                    catalog: &catalog,
                    buffer: &buffer,
                    throughput: &ledger,
                    representations: &history,
                    now: SimTime::ZERO,
                };
                let decision = algorithm.decide(&ctx, ledger.len(), 0);
                assert!(
                    decision.representation < catalog.representation_count(),
                    "{kind} returned {}",
                    decision.representation
                );
            }
        }
    }

    #[test]
    fn test_every_algorithm_is_deterministic() {
        let catalog = ladder();
        let buffer = buffer_with(2);
        let ledger = ledger_at(2_000_000, 5);
        let history = vec![1; 5];

        for kind in AlgorithmKind::ALL {
            let ctx = DecisionContext {
                catalog: &catalog,
                buffer: &buffer,
                throughput: &ledger,
                representations: &history,
                now: SimTime::from_secs(10),
            };
            let first = kind.build(&catalog).decide(&ctx, 5, 3);
            let second = kind.build(&catalog).decide(&ctx, 5, 3);
            assert_eq!(first, second, "{kind} is not deterministic");
        }
    }

    #[test]
    fn test_highest_fitting() {
        let catalog = ladder();
        let buffer = PlaybackBuffer::new();
        let ledger = ThroughputLedger::new();
        let ctx = DecisionContext {
            catalog: &catalog,
            buffer: &buffer,
            throughput: &ledger,
            representations: &[],
            now: SimTime::ZERO,
        };
        assert_eq!(ctx.highest_fitting(500_000.0), 0);
        assert_eq!(ctx.highest_fitting(2_600_000.0), 1);
        assert_eq!(ctx.highest_fitting(9_000_000.0), 2);
        assert_eq!(ctx.previous_representation(), 0);
    }
}
