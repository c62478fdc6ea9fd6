//! Playback buffer model: buffered play time, ready segments and underrun detection.

use std::time::Duration;

use crate::time::SimTime;

/// One point of the buffer timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSample {
    /// When the sample was taken
    pub at: SimTime,
    /// Buffered play time at that instant
    pub level: Duration,
}

/// Append-only history of buffered play time.
#[derive(Debug, Clone, Default)]
pub struct BufferTimeline {
    samples: Vec<BufferSample>,
    origin: Option<SimTime>,
    reference: Option<SimTime>,
}

impl BufferTimeline {
    /// Creates empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all samples in append order.
    pub fn samples(&self) -> &[BufferSample] {
        &self.samples
    }

    /// Returns most recent sample.
    pub fn last(&self) -> Option<&BufferSample> {
        self.samples.last()
    }

    /// Returns buffered play time of the most recent sample, zero when empty.
    pub fn current_level(&self) -> Duration {
        self.samples.last().map_or(Duration::ZERO, |s| s.level)
    }

    /// Instant playback started, if it has.
    pub fn origin(&self) -> Option<SimTime> {
        self.origin
    }

    /// Estimates buffered play time at `now` by draining the last sample.
    ///
    /// Before playback starts the buffer does not drain.
    pub fn level_at(&self, now: SimTime) -> Duration {
        let level = self.current_level();
        match (self.origin, self.reference) {
            (Some(_), Some(reference)) => {
                level.saturating_sub(now.saturating_duration_since(reference))
            }
            _ => level,
        }
    }

    fn mark_origin(&mut self, now: SimTime) {
        self.origin = Some(now);
        self.reference = Some(now);
    }

    /// Records a completed segment and returns the appended sample.
    ///
    /// Once playback has started, the previous level is first drained by the
    /// wall-clock time elapsed since the previous reference point (never below
    /// zero), then one segment duration is added.
    pub fn push_segment(&mut self, now: SimTime, segment_duration: Duration) -> BufferSample {
        let drained = if self.samples.is_empty() {
            Duration::ZERO
        } else {
            self.level_at(now)
        };

        let sample = BufferSample {
            at: now,
            level: drained + segment_duration,
        };
        self.samples.push(sample);
        self.reference = Some(now);
        sample
    }
}

/// Outcome of one playback tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackTick {
    /// A buffered segment started playing
    Played {
        /// Index of the segment that started playing
        segment: usize,
        /// Whether this tick ended an underrun
        underrun_ended: bool,
    },
    /// Buffer ran dry before the end of the stream
    UnderrunStarted,
    /// Nothing to play, no state change
    Stalled,
}

impl PlaybackTick {
    /// Returns true if a segment was consumed.
    pub fn progressed(&self) -> bool {
        matches!(self, PlaybackTick::Played { .. })
    }
}

/// Ready-segment bookkeeping driven by playback ticks and completed downloads.
#[derive(Debug, Clone, Default)]
pub struct PlaybackBuffer {
    timeline: BufferTimeline,
    ready_segments: usize,
    playback_index: usize,
    underrun: bool,
    started: bool,
}

impl PlaybackBuffer {
    /// Creates empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns buffer timeline.
    pub fn timeline(&self) -> &BufferTimeline {
        &self.timeline
    }

    /// Number of downloaded, not yet played segments.
    pub fn ready_segments(&self) -> usize {
        self.ready_segments
    }

    /// Index of the next segment to be played.
    pub fn playback_index(&self) -> usize {
        self.playback_index
    }

    /// Returns true while playback is stalled waiting for data.
    pub fn in_underrun(&self) -> bool {
        self.underrun
    }

    /// Returns true once the first tick has run.
    pub fn playback_started(&self) -> bool {
        self.started
    }

    /// Runs one playback tick.
    ///
    /// `segment_count` is the stream end index: once `playback_index` reaches
    /// it an empty buffer is not an underrun.
    pub fn tick(&mut self, now: SimTime, segment_count: usize) -> PlaybackTick {
        if !self.started {
            self.started = true;
            self.timeline.mark_origin(now);
        }

        if self.ready_segments == 0 {
            if self.playback_index < segment_count && !self.underrun {
                self.underrun = true;
                return PlaybackTick::UnderrunStarted;
            }
            return PlaybackTick::Stalled;
        }

        let underrun_ended = std::mem::replace(&mut self.underrun, false);
        let segment = self.playback_index;
        self.ready_segments -= 1;
        self.playback_index += 1;
        PlaybackTick::Played {
            segment,
            underrun_ended,
        }
    }

    /// Adds a fully downloaded segment and returns the new buffer sample.
    pub fn segment_completed(&mut self, now: SimTime, segment_duration: Duration) -> BufferSample {
        self.ready_segments += 1;
        self.timeline.push_segment(now, segment_duration)
    }
}
