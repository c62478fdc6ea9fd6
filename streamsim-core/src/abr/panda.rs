//! Probe-and-adapt: additive-increase bandwidth share probing with a dead-zone quantiser.

use std::time::Duration;

use super::{AdaptationAlgorithm, AlgorithmDecision, DecisionContext};
use crate::catalog::VideoCatalog;

/// Probing convergence rate.
const KAPPA: f64 = 0.14;
/// Additive probing increment in bits per second.
const OMEGA: f64 = 300_000.0;
/// Smoothing convergence rate.
const ALPHA: f64 = 0.2;
/// Buffer convergence rate of the request scheduler.
const BETA: f64 = 0.2;
/// Dead-zone width of the up-switch quantiser.
const EPSILON: f64 = 0.15;
/// Minimum buffer, in segments, the scheduler steers towards.
const MIN_BUFFER_SEGMENTS: f64 = 3.0;

/// Bandwidth share estimator that also schedules inter-request pauses.
#[derive(Debug)]
pub struct PandaAlgorithm {
    target_bps: f64,
    smoothed_bps: f64,
    last_interval_secs: f64,
    lowest_bitrate: f64,
}

impl PandaAlgorithm {
    /// Creates the algorithm, seeding the estimate with the lowest bitrate.
    pub fn new(catalog: &VideoCatalog) -> Self {
        let lowest_bitrate = catalog.average_bitrate(0).unwrap_or(0) as f64;
        Self {
            target_bps: lowest_bitrate,
            smoothed_bps: lowest_bitrate,
            last_interval_secs: catalog.segment_duration().as_secs_f64(),
            lowest_bitrate,
        }
    }

    fn quantise(&self, ctx: &DecisionContext<'_>, current: usize) -> (usize, u32) {
        let up = ctx.highest_fitting(self.smoothed_bps * (1.0 - EPSILON));
        let down = ctx.highest_fitting(self.smoothed_bps);
        if current < up {
            (up, 1)
        } else if current <= down {
            (current, 3)
        } else {
            (down, 2)
        }
    }
}

impl AdaptationAlgorithm for PandaAlgorithm {
    fn name(&self) -> &'static str {
        "panda"
    }

    fn decide(
        &mut self,
        ctx: &DecisionContext<'_>,
        _segment: usize,
        _client_id: u32,
    ) -> AlgorithmDecision {
        let Some(last) = ctx.throughput.last() else {
            return AlgorithmDecision::immediate(ctx, 0, 0, self.target_bps);
        };
        let measured = last.request_bps().unwrap_or(self.target_bps);
        let interval = self.last_interval_secs;

        let overshoot = (self.target_bps - measured + OMEGA).max(0.0);
        self.target_bps = (self.target_bps + interval * KAPPA * (OMEGA - overshoot))
            .max(self.lowest_bitrate);
        self.smoothed_bps =
            (self.smoothed_bps - interval * ALPHA * (self.smoothed_bps - self.target_bps)).max(0.0);

        let (representation, case) = self.quantise(ctx, ctx.previous_representation());
        let decision = AlgorithmDecision::immediate(ctx, representation, case, self.target_bps);

        let segment_secs = ctx.catalog.segment_duration().as_secs_f64();
        let download_secs = last
            .transfer_end_at
            .saturating_duration_since(last.request_sent_at)
            .as_secs_f64();
        let buffer_secs = ctx.buffer_level().as_secs_f64();
        let target_interval = ctx.bitrate(representation) * segment_secs / self.target_bps.max(1.0)
            + BETA * (buffer_secs - MIN_BUFFER_SEGMENTS * segment_secs);
        self.last_interval_secs = target_interval.max(download_secs).max(1e-3);

        let pause = target_interval - download_secs;
        if pause > 0.0 {
            decision.with_delay(Duration::from_secs_f64(pause), 1)
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

    #[test]
    fn test_raises_share_on_spare_capacity() {
        let catalog = ladder();
        let buffer = buffer_with(1);
        let ledger = ledger_at(20_000_000, 1);
        let mut algorithm = PandaAlgorithm::new(&catalog);
        let mut history = vec![0];

        let mut estimates = Vec::new();
        for segment in 1..100 {
            let ctx = DecisionContext {
                catalog: &catalog,
                buffer: &buffer,
                throughput: &ledger,
                representations: &history,
                now: SimTime::ZERO,
            };
            let decision = algorithm.decide(&ctx, segment, 0);
            history.push(decision.representation);
            estimates.push(decision.bandwidth_estimate);
        }

        for pair in estimates.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!(*history.last().unwrap() > 0);
    }

    #[test]
    fn test_backs_off_below_measured_rate() {
        let catalog = ladder();
        let buffer = buffer_with(1);
        let ledger = ledger_at(500_000, 1);
        let mut algorithm = PandaAlgorithm::new(&catalog);
        algorithm.target_bps = 6_000_000.0;
        algorithm.smoothed_bps = 6_000_000.0;

        let ctx = DecisionContext {
            catalog: &catalog,
            buffer: &buffer,
            throughput: &ledger,
            representations: &[2],
            now: SimTime::ZERO,
        };
        let decision = algorithm.decide(&ctx, 1, 0);
        assert!(decision.bandwidth_estimate < 6_000_000.0);
    }

    #[test]
    fn test_pauses_when_buffer_is_large() {
        let catalog = ladder();
        let buffer = buffer_with(10);
        let ledger = ledger_at(20_000_000, 1);
        let mut algorithm = PandaAlgorithm::new(&catalog);

        let ctx = DecisionContext {
            catalog: &catalog,
            buffer: &buffer,
            throughput: &ledger,
            representations: &[0],
            now: SimTime::ZERO,
        };
        let decision = algorithm.decide(&ctx, 1, 0);
        assert_eq!(decision.delay_case, 1);
        assert!(decision.next_download_delay > Duration::ZERO);
    }
}
