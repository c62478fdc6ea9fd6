//! Lyapunov buffer optimisation (BOLA-BASIC).

use std::time::Duration;

use super::{AdaptationAlgorithm, AlgorithmDecision, DecisionContext};
use crate::catalog::VideoCatalog;

/// Buffer capacity, in segments, the control parameter is tuned for.
const BUFFER_CAPACITY_SEGMENTS: f64 = 6.0;
/// Utility weight of avoiding rebuffering.
const GAMMA_P: f64 = 5.0;

/// Maximises `(V * (utility + gamma_p) - buffer) / size` over representations.
#[derive(Debug)]
pub struct BolaAlgorithm {
    utilities: Vec<f64>,
    control: f64,
}

impl BolaAlgorithm {
    /// Creates the algorithm with logarithmic bitrate utilities.
    pub fn new(catalog: &VideoCatalog) -> Self {
        let lowest = catalog.average_bitrate(0).unwrap_or(1).max(1) as f64;
        let utilities: Vec<f64> = catalog
            .representations()
            .iter()
            .map(|rep| (rep.average_bitrate.max(1) as f64 / lowest).ln())
            .collect();
        let top = utilities.last().copied().unwrap_or(0.0);
        let control = (BUFFER_CAPACITY_SEGMENTS - 1.0) / (top + GAMMA_P);
        Self { utilities, control }
    }
}

impl AdaptationAlgorithm for BolaAlgorithm {
    fn name(&self) -> &'static str {
        "bola"
    }

    fn decide(
        &mut self,
        ctx: &DecisionContext<'_>,
        _segment: usize,
        _client_id: u32,
    ) -> AlgorithmDecision {
        let segment_secs = ctx.catalog.segment_duration().as_secs_f64();
        let buffered_segments = ctx.buffer_level().as_secs_f64() / segment_secs;
        let estimate = ctx.throughput.last_bps().unwrap_or(0.0);

        let mut best = (f64::NEG_INFINITY, 0);
        for (representation, utility) in self.utilities.iter().enumerate() {
            let size = ctx.bitrate(representation).max(1.0);
            let objective = (self.control * (utility + GAMMA_P) - buffered_segments) / size;
            if objective > best.0 {
                best = (objective, representation);
            }
        }

        let decision = AlgorithmDecision::immediate(ctx, best.1, 1, estimate);

        let ceiling = self.control * (self.utilities.last().copied().unwrap_or(0.0) + GAMMA_P);
        if buffered_segments > ceiling {
            let excess = (buffered_segments - ceiling) * segment_secs;
            decision.with_delay(Duration::from_secs_f64(excess), 1)
        } else {
            decision
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::time::SimTime;

    fn decide(buffered: usize) -> AlgorithmDecision {
        let catalog = ladder();
        let buffer = buffer_with(buffered);
        let ledger = ledger_at(3_000_000, 2);
        let ctx = DecisionContext {
            catalog: &catalog,
            buffer: &buffer,
            throughput: &ledger,
            representations: &[0, 0],
            now: SimTime::ZERO,
        };
        BolaAlgorithm::new(&catalog).decide(&ctx, 2, 0)
    }

    #[test]
    fn test_empty_buffer_picks_lowest() {
        assert_eq!(decide(0).representation, 0);
    }

    #[test]
    fn test_quality_rises_with_buffer() {
        let low = decide(1).representation;
        let high = decide(5).representation;
        assert!(high >= low);
        assert_eq!(high, 2);
    }

    #[test]
    fn test_overfull_buffer_delays_next_request() {
        let decision = decide(8);
        assert_eq!(decision.delay_case, 1);
        assert!(decision.next_download_delay > Duration::ZERO);
    }
}
