//! Harmonic-mean throughput estimation with gradual, stability-aware switching.

use std::time::Duration;

use super::{AdaptationAlgorithm, AlgorithmDecision, DecisionContext};

/// Number of past transfers averaged by the harmonic mean.
const ESTIMATION_WINDOW: usize = 20;

/// Fraction of the estimate the chosen bitrate may use.
const SAFETY_FACTOR: f64 = 0.85;

/// Buffered segments above which the next request is deferred.
const TARGET_BUFFER_SEGMENTS: u32 = 5;

/// Throughput-based selection that only steps one level at a time.
///
/// Switching up from level `k` requires the current level to have been held
/// for at least `k + 1` consecutive segments, which makes high levels sticky.
#[derive(Debug, Default)]
pub struct FestiveAlgorithm {
    held_segments: u32,
}

impl FestiveAlgorithm {
    /// Creates the algorithm.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AdaptationAlgorithm for FestiveAlgorithm {
    fn name(&self) -> &'static str {
        "festive"
    }

    fn decide(
        &mut self,
        ctx: &DecisionContext<'_>,
        _segment: usize,
        _client_id: u32,
    ) -> AlgorithmDecision {
        let Some(estimate) = ctx.throughput.harmonic_mean_bps(ESTIMATION_WINDOW) else {
            self.held_segments = 0;
            return AlgorithmDecision::immediate(ctx, 0, 0, 0.0);
        };

        let current = ctx.previous_representation();
        let target = ctx.highest_fitting(estimate * SAFETY_FACTOR);

        let (representation, case) = if target > current {
            if self.held_segments > current as u32 {
                (current + 1, 1)
            } else {
                (current, 3)
            }
        } else if target < current {
            (current - 1, 2)
        } else {
            (current, 3)
        };

        if representation == current {
            self.held_segments += 1;
        } else {
            self.held_segments = 0;
        }

        let decision = AlgorithmDecision::immediate(ctx, representation, case, estimate);
        let target_buffer = ctx.catalog.segment_duration() * TARGET_BUFFER_SEGMENTS;
        let level = ctx.buffer_level();
        if level > target_buffer {
            decision.with_delay(level - target_buffer, 1)
        } else {
            decision.with_delay(Duration::ZERO, 0)
        }
    }
}
