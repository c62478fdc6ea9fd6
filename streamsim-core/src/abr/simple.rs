//! Last-throughput rule: pick the highest representation the previous transfer could sustain.

use super::{AdaptationAlgorithm, AlgorithmDecision, DecisionContext};

/// Stateless throughput rule without inter-request delay.
#[derive(Debug, Default)]
pub struct SimpleAlgorithm;

impl SimpleAlgorithm {
    /// Creates the algorithm.
    pub fn new() -> Self {
        Self
    }
}

impl AdaptationAlgorithm for SimpleAlgorithm {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn decide(
        &mut self,
        ctx: &DecisionContext<'_>,
        _segment: usize,
        _client_id: u32,
    ) -> AlgorithmDecision {
        match ctx.throughput.last_bps() {
            None => AlgorithmDecision::immediate(ctx, 0, 0, 0.0),
            Some(bps) => AlgorithmDecision::immediate(ctx, ctx.highest_fitting(bps), 1, bps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::time::SimTime;

    #[test]
    fn test_starts_at_lowest_representation() {
        let catalog = ladder();
        let buffer = buffer_with(0);
        let ledger = ledger_at(0, 0);
        let ctx = DecisionContext {
            catalog: &catalog,
            buffer: &buffer,
            throughput: &ledger,
            representations: &[],
            now: SimTime::ZERO,
        };

        let decision = SimpleAlgorithm::new().decide(&ctx, 0, 0);
        assert_eq!(decision.representation, 0);
        assert_eq!(decision.decision_case, 0);
    }

    #[test]
    fn test_follows_last_throughput() {
        let catalog = ladder();
        let buffer = buffer_with(1);
        let ledger = ledger_at(3_000_000, 2);
        let ctx = DecisionContext {
            catalog: &catalog,
            buffer: &buffer,
            throughput: &ledger,
            representations: &[0, 0],
            now: SimTime::from_secs(4),
        };

        let decision = SimpleAlgorithm::new().decide(&ctx, 2, 0);
        assert_eq!(decision.representation, 1);
        assert_eq!(decision.decision_case, 1);
        assert_eq!(decision.bandwidth_estimate, 3_000_000.0);
        assert_eq!(decision.decision_time, SimTime::from_secs(4));
    }
}
