//! Buffer-threshold adaptation with a throughput cap.

use std::time::Duration;

use super::{AdaptationAlgorithm, AlgorithmDecision, DecisionContext};
use crate::catalog::VideoCatalog;

/// Transfers averaged for the throughput cap.
const ESTIMATION_WINDOW: usize = 5;
/// Share of the estimate usable when the buffer is low.
const LOW_BUFFER_FACTOR: f64 = 0.75;
/// Share of the estimate the next level must fit into to step up.
const STEP_UP_FACTOR: f64 = 0.9;

/// Buffer-driven selection: protect the buffer when low, climb when it is healthy.
#[derive(Debug)]
pub struct TobascoAlgorithm {
    low_buffer: Duration,
    high_buffer: Duration,
}

impl TobascoAlgorithm {
    /// Creates the algorithm with thresholds of two and four segment durations.
    pub fn new(catalog: &VideoCatalog) -> Self {
        Self {
            low_buffer: catalog.segment_duration() * 2,
            high_buffer: catalog.segment_duration() * 4,
        }
    }
}

impl AdaptationAlgorithm for TobascoAlgorithm {
    fn name(&self) -> &'static str {
        "tobasco"
    }

    fn decide(
        &mut self,
        ctx: &DecisionContext<'_>,
        _segment: usize,
        _client_id: u32,
    ) -> AlgorithmDecision {
        let Some(estimate) = ctx.throughput.harmonic_mean_bps(ESTIMATION_WINDOW) else {
            return AlgorithmDecision::immediate(ctx, 0, 0, 0.0);
        };
        let current = ctx.previous_representation();
        let level = ctx.buffer_level();

        if level < self.low_buffer {
            let safe = ctx.highest_fitting(estimate * LOW_BUFFER_FACTOR);
            return AlgorithmDecision::immediate(ctx, safe.min(current), 1, estimate);
        }

        if level < self.high_buffer {
            let next = current + 1;
            if next < ctx.catalog.representation_count()
                && ctx.bitrate(next) <= estimate * STEP_UP_FACTOR
            {
                return AlgorithmDecision::immediate(ctx, next, 2, estimate);
            }
            return AlgorithmDecision::immediate(ctx, current, 3, estimate);
        }

        let representation = current.max(ctx.highest_fitting(estimate));
        AlgorithmDecision::immediate(ctx, representation, 4, estimate)
            .with_delay(level - self.high_buffer, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::time::SimTime;

    fn decide(buffered: usize, rate: u64, current: usize) -> AlgorithmDecision {
        let catalog = ladder();
        let buffer = buffer_with(buffered);
        let ledger = ledger_at(rate, 3);
        let history = [current; 3];
        let ctx = DecisionContext {
            catalog: &catalog,
            buffer: &buffer,
            throughput: &ledger,
            representations: &history,
            now: SimTime::ZERO,
        };
        TobascoAlgorithm::new(&catalog).decide(&ctx, 3, 0)
    }

    #[test]
    fn test_low_buffer_never_switches_up() {
        let decision = decide(1, 50_000_000, 0);
        assert_eq!(decision.representation, 0);
        assert_eq!(decision.decision_case, 1);

        let decision = decide(1, 1_500_000, 2);
        assert_eq!(decision.representation, 0);
    }

    #[test]
    fn test_healthy_buffer_steps_up_one_level() {
        let decision = decide(3, 50_000_000, 0);
        assert_eq!(decision.representation, 1);
        assert_eq!(decision.decision_case, 2);
    }

    #[test]
    fn test_full_buffer_jumps_and_delays() {
        let decision = decide(6, 50_000_000, 0);
        assert_eq!(decision.representation, 2);
        assert_eq!(decision.decision_case, 4);
        assert_eq!(decision.next_download_delay, Duration::from_secs(4));
        assert_eq!(decision.delay_case, 1);
    }
}
