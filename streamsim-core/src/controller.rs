//! Download/playback controller state machine.
//!
//! The controller is a pure transition function over [`SessionState`]: it
//! consumes one [`ControllerEvent`] and returns the [`Effect`]s the session
//! must carry out (issue a request, schedule a future event, log a playback
//! tick, stop). It never touches the scheduler or the transport itself.
//!
//! Index semantics: with `N` segments, `segment_counter` runs over `0..=N`
//! where `N` means every segment has been requested, and `playback_index`
//! counts consumed segments. `playback_index <= segment_counter <= N` holds at
//! every event boundary.

use std::fmt;
use std::time::Duration;

use crate::buffer::{BufferSample, PlaybackBuffer, PlaybackTick};
use crate::catalog::VideoCatalog;
use crate::time::SimTime;

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    /// Waiting for the transport connection
    Initial,
    /// A segment is in flight and playback is not ticking
    Downloading,
    /// A segment is in flight (or deferred) while playback ticks
    DownloadingPlaying,
    /// No request in flight, playback ticks
    Playing,
    /// Stream fully played, resources released
    Terminal,
}

impl ControllerState {
    /// Returns string representation for logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            ControllerState::Initial => "initial",
            ControllerState::Downloading => "downloading",
            ControllerState::DownloadingPlaying => "downloading_playing",
            ControllerState::Playing => "playing",
            ControllerState::Terminal => "terminal",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events consumed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerEvent {
    /// Transport connection established
    Init,
    /// Deferred segment request is due
    DelayedSend,
    /// Current segment fully received
    DownloadFinished,
    /// One segment duration of playback elapsed
    PlaybackFinished,
    /// Inter-request delay elapsed
    IrdFinished,
}

impl ControllerEvent {
    /// Returns string representation for logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            ControllerEvent::Init => "init",
            ControllerEvent::DelayedSend => "delayed_send",
            ControllerEvent::DownloadFinished => "download_finished",
            ControllerEvent::PlaybackFinished => "playback_finished",
            ControllerEvent::IrdFinished => "ird_finished",
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Ask the algorithm for a representation and send the request for `segment`
    RequestSegment { segment: usize },
    /// Raise `event` after `after`
    Schedule {
        after: Duration,
        event: ControllerEvent,
    },
    /// A playback tick ran with this outcome
    Playback(PlaybackTick),
    /// Close the transport and release log resources
    Stop,
}

/// Result of feeding one event to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State before the event
    pub from: ControllerState,
    /// State after the event
    pub to: ControllerState,
    /// Effects to execute, in order
    pub effects: Vec<Effect>,
    /// True if the event has no meaning in `from`
    pub ignored: bool,
}

/// Mutable per-client controller state.
#[derive(Debug, Clone)]
pub struct SessionState {
    state: ControllerState,
    segment_counter: usize,
    segment_count: usize,
    current_representation: usize,
    bytes_received: u64,
    next_download_delay: Duration,
    buffer: PlaybackBuffer,
}

impl SessionState {
    /// Creates the initial state for a stream of `segment_count` segments.
    pub fn new(segment_count: usize) -> Self {
        Self {
            state: ControllerState::Initial,
            segment_counter: 0,
            segment_count,
            current_representation: 0,
            bytes_received: 0,
            next_download_delay: Duration::ZERO,
            buffer: PlaybackBuffer::new(),
        }
    }

    /// Current controller state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Segment being or about to be downloaded.
    pub fn segment_counter(&self) -> usize {
        self.segment_counter
    }

    /// Stream end index.
    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    /// Representation of the in-flight or most recent request.
    pub fn current_representation(&self) -> usize {
        self.current_representation
    }

    /// Bytes received of the in-flight segment.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Inter-request delay imposed by the last decision.
    pub fn next_download_delay(&self) -> Duration {
        self.next_download_delay
    }

    /// Playback buffer model.
    pub fn buffer(&self) -> &PlaybackBuffer {
        &self.buffer
    }

    /// Index of the next segment to play.
    pub fn playback_index(&self) -> usize {
        self.buffer.playback_index()
    }

    /// True if the in-flight segment is the final one.
    pub fn at_last_segment(&self) -> bool {
        self.segment_counter + 1 == self.segment_count
    }

    /// Stores the decision for the in-flight request.
    pub fn apply_decision(&mut self, representation: usize, next_download_delay: Duration) {
        self.current_representation = representation;
        self.next_download_delay = next_download_delay;
    }

    /// Adds received bytes to the partial segment counter and returns the new total.
    pub fn add_bytes(&mut self, bytes: u64) -> u64 {
        self.bytes_received += bytes;
        self.bytes_received
    }

    /// Bookkeeping on full reception of the in-flight segment.
    ///
    /// Updates the buffer, resets the partial byte counter and drops any
    /// pending inter-request delay after the final segment. The caller raises
    /// [`ControllerEvent::DownloadFinished`] afterwards.
    pub fn complete_segment(
        &mut self,
        now: SimTime,
        segment_duration: Duration,
    ) -> BufferSample {
        let sample = self.buffer.segment_completed(now, segment_duration);
        self.bytes_received = 0;
        if self.at_last_segment() {
            self.next_download_delay = Duration::ZERO;
        }
        sample
    }

    /// Feeds one event through the transition table.
    pub fn step(
        &mut self,
        event: ControllerEvent,
        now: SimTime,
        catalog: &VideoCatalog,
    ) -> Transition {
        let from = self.state;
        let mut effects = Vec::new();
        let segment_duration = catalog.segment_duration();
        let mut ignored = false;

        match (from, event) {
            (ControllerState::Terminal, _) => ignored = true,

            (ControllerState::Initial, ControllerEvent::Init) => {
                self.state = ControllerState::Downloading;
                self.request_or_defer(now, catalog, &mut effects);
            }

            (ControllerState::Initial, _) => ignored = true,

            (_, ControllerEvent::DelayedSend) => {
                effects.push(Effect::RequestSegment {
                    segment: self.segment_counter,
                });
            }

            (ControllerState::Downloading, ControllerEvent::DownloadFinished) => {
                effects.push(Effect::Playback(
                    self.buffer.tick(now, self.segment_count),
                ));
                self.segment_counter += 1;
                if self.segment_counter < self.segment_count {
                    self.state = ControllerState::DownloadingPlaying;
                    self.request_or_defer(now, catalog, &mut effects);
                } else {
                    self.state = ControllerState::Playing;
                }
                effects.push(Effect::Schedule {
                    after: segment_duration,
                    event: ControllerEvent::PlaybackFinished,
                });
            }

            (ControllerState::DownloadingPlaying, ControllerEvent::DownloadFinished) => {
                if self.segment_counter < self.segment_count {
                    self.segment_counter += 1;
                }
                if !self.next_download_delay.is_zero() && self.segment_counter < self.segment_count
                {
                    self.state = ControllerState::Playing;
                    effects.push(Effect::Schedule {
                        after: self.next_download_delay,
                        event: ControllerEvent::IrdFinished,
                    });
                } else if self.segment_counter == self.segment_count {
                    self.state = ControllerState::Playing;
                } else {
                    self.request_or_defer(now, catalog, &mut effects);
                }
            }

            (ControllerState::DownloadingPlaying, ControllerEvent::PlaybackFinished) => {
                let tick = self.buffer.tick(now, self.segment_count);
                effects.push(Effect::Playback(tick));
                if tick.progressed() {
                    effects.push(Effect::Schedule {
                        after: segment_duration,
                        event: ControllerEvent::PlaybackFinished,
                    });
                } else {
                    // Resumed by the tick run on the next DownloadFinished.
                    self.state = ControllerState::Downloading;
                }
            }

            (ControllerState::Playing, ControllerEvent::IrdFinished) => {
                self.state = ControllerState::DownloadingPlaying;
                self.request_or_defer(now, catalog, &mut effects);
            }

            (ControllerState::Playing, ControllerEvent::PlaybackFinished) => {
                let last = self.buffer.playback_index() >= self.segment_count;
                effects.push(Effect::Playback(
                    self.buffer.tick(now, self.segment_count),
                ));
                if last {
                    self.state = ControllerState::Terminal;
                    effects.push(Effect::Stop);
                } else {
                    effects.push(Effect::Schedule {
                        after: segment_duration,
                        event: ControllerEvent::PlaybackFinished,
                    });
                }
            }

            _ => ignored = true,
        }

        Transition {
            from,
            to: self.state,
            effects,
            ignored,
        }
    }

    /// Requests the current segment now if it is available, otherwise defers it.
    fn request_or_defer(&self, now: SimTime, catalog: &VideoCatalog, effects: &mut Vec<Effect>) {
        let available_at = catalog.availability_time(self.segment_counter);
        let delay = now.signed_micros_until(available_at);
        if delay <= 0 {
            effects.push(Effect::RequestSegment {
                segment: self.segment_counter,
            });
        } else {
            effects.push(Effect::Schedule {
                after: Duration::from_micros(delay as u64),
                event: ControllerEvent::DelayedSend,
            });
        }
    }
}
