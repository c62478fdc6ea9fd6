//! Model-predictive control: exhaustive lookahead over the next few segments.

use super::{AdaptationAlgorithm, AlgorithmDecision, DecisionContext};

/// Segments considered by the lookahead.
const HORIZON: usize = 3;
/// Transfers averaged for the bandwidth prediction.
const ESTIMATION_WINDOW: usize = 5;
/// Quality units lost per second of rebuffering.
const REBUFFER_PENALTY: f64 = 4.3;
/// Quality units lost per Mbps of switch magnitude.
const SWITCH_PENALTY: f64 = 1.0;

/// Chooses the first step of the representation plan maximising predicted QoE.
#[derive(Debug, Default)]
pub struct MpcAlgorithm;

impl MpcAlgorithm {
    /// Creates the algorithm.
    pub fn new() -> Self {
        Self
    }

    /// Predicted QoE of downloading `plan` starting at `first_segment`.
    fn score(
        ctx: &DecisionContext<'_>,
        plan: &[usize],
        first_segment: usize,
        previous: usize,
        bandwidth_bps: f64,
        buffer_secs: f64,
    ) -> f64 {
        let segment_secs = ctx.catalog.segment_duration().as_secs_f64();
        let mut buffer = buffer_secs;
        let mut last_mbps = ctx.bitrate(previous) / 1e6;
        let mut qoe = 0.0;

        for (offset, &representation) in plan.iter().enumerate() {
            let size = ctx
                .catalog
                .segment_size(representation, first_segment + offset)
                .unwrap_or(0) as f64;
            let download_secs = size * 8.0 / bandwidth_bps;
            let rebuffer = (download_secs - buffer).max(0.0);
            buffer = (buffer - download_secs).max(0.0) + segment_secs;

            let mbps = ctx.bitrate(representation) / 1e6;
            qoe += mbps - REBUFFER_PENALTY * rebuffer - SWITCH_PENALTY * (mbps - last_mbps).abs();
            last_mbps = mbps;
        }
        qoe
    }
}

impl AdaptationAlgorithm for MpcAlgorithm {
    fn name(&self) -> &'static str {
        "mpc"
    }

    fn decide(
        &mut self,
        ctx: &DecisionContext<'_>,
        segment: usize,
        _client_id: u32,
    ) -> AlgorithmDecision {
        let Some(bandwidth) = ctx.throughput.harmonic_mean_bps(ESTIMATION_WINDOW) else {
            return AlgorithmDecision::immediate(ctx, 0, 0, 0.0);
        };

        let levels = ctx.catalog.representation_count();
        let horizon = HORIZON.min(ctx.catalog.segment_count().saturating_sub(segment)).max(1);
        let previous = ctx.previous_representation();
        let buffer_secs = ctx.buffer_level().as_secs_f64();

        let mut best = (f64::NEG_INFINITY, 0);
        let mut plan = vec![0; horizon];
        let combinations = levels.pow(horizon as u32);
        for combination in 0..combinations {
            let mut rest = combination;
            for slot in plan.iter_mut() {
                *slot = rest % levels;
                rest /= levels;
            }
            let qoe = Self::score(ctx, &plan, segment, previous, bandwidth, buffer_secs);
            if qoe > best.0 {
                best = (qoe, plan[0]);
            }
        }

        AlgorithmDecision::immediate(ctx, best.1, 1, bandwidth)
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
        MpcAlgorithm::new().decide(&ctx, 3, 0)
    }

    #[test]
    fn test_plentiful_bandwidth_picks_top() {
        assert_eq!(decide(3, 100_000_000, 2).representation, 2);
    }

    #[test]
    fn test_scarce_bandwidth_with_empty_buffer_picks_lowest() {
        assert_eq!(decide(0, 600_000, 0).representation, 0);
    }

    #[test]
    fn test_lookahead_shrinks_at_stream_end() {
        let catalog = ladder();
        let buffer = buffer_with(2);
        let ledger = ledger_at(100_000_000, 3);
        let ctx = DecisionContext {
            catalog: &catalog,
            buffer: &buffer,
            throughput: &ledger,
            representations: &[2],
            now: SimTime::ZERO,
        };
        let decision = MpcAlgorithm::new().decide(&ctx, 9, 0);
        assert_eq!(decision.representation, 2);
        assert_eq!(decision.decision_case, 1);
    }
}
