//! Streaming session: one client's controller wired to its collaborators.
//!
//! [`StreamingSession`] owns the controller state, histories, adaptation
//! algorithm and record streams of one client. It translates transport
//! callbacks into controller events and executes the resulting effects
//! against a [`SessionRuntime`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::abr::{AdaptationAlgorithm, DecisionContext};
use crate::buffer::PlaybackTick;
use crate::catalog::VideoCatalog;
use crate::controller::{ControllerEvent, ControllerState, Effect, SessionState, Transition};
use crate::runtime::SessionRuntime;
use crate::session_log::SessionLogger;
use crate::throughput::{SegmentTransfer, ThroughputLedger};
use crate::time::SimTime;

/// Errors aborting a streaming session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(
        "Client {client_id}: algorithm chose representation {representation} for segment {segment}, only {available} exist"
    )]
    RepresentationOutOfBounds {
        client_id: u32,
        segment: usize,
        representation: usize,
        available: usize,
    },

    #[error("Client {client_id}: no size for segment {segment} at representation {representation}")]
    MissingSegmentSize {
        client_id: u32,
        segment: usize,
        representation: usize,
    },

    #[error("Client {client_id}: record stream failed: {source}")]
    Log {
        client_id: u32,
        #[source]
        source: std::io::Error,
    },
}

impl SessionError {
    /// Returns true for errors caused by inconsistent session inputs.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            SessionError::RepresentationOutOfBounds { .. } | SessionError::MissingSegmentSize { .. }
        )
    }
}

/// Counters observed by invariant checks after every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub client_id: u32,
    pub state: ControllerState,
    pub segment_counter: usize,
    pub playback_index: usize,
    pub segment_count: usize,
    pub in_underrun: bool,
    pub open_underrun_records: usize,
    pub terminal_entries: u32,
}

/// End-of-run summary of one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub client_id: u32,
    pub algorithm: String,
    pub final_state: String,
    pub connected: bool,
    pub segments_downloaded: usize,
    pub segments_played: usize,
    pub underrun_count: u32,
    pub total_stall_secs: f64,
    pub mean_representation: f64,
}

/// One simulated streaming client.
pub struct StreamingSession {
    client_id: u32,
    catalog: Arc<VideoCatalog>,
    state: SessionState,
    ledger: ThroughputLedger,
    representations: Vec<usize>,
    algorithm: Box<dyn AdaptationAlgorithm>,
    logger: SessionLogger,
    request_sent_at: SimTime,
    transfer_start_at: Option<SimTime>,
    underrun_since: Option<SimTime>,
    underrun_count: u32,
    stall_time: Duration,
    terminal_entries: u32,
    connected: bool,
}

impl StreamingSession {
    /// Creates a session for `client_id` running `algorithm` over `catalog`.
    pub fn new(
        client_id: u32,
        catalog: Arc<VideoCatalog>,
        algorithm: Box<dyn AdaptationAlgorithm>,
        logger: SessionLogger,
    ) -> Self {
        let state = SessionState::new(catalog.segment_count());
        Self {
            client_id,
            catalog,
            state,
            ledger: ThroughputLedger::new(),
            representations: Vec::new(),
            algorithm,
            logger,
            request_sent_at: SimTime::ZERO,
            transfer_start_at: None,
            underrun_since: None,
            underrun_count: 0,
            stall_time: Duration::ZERO,
            terminal_entries: 0,
            connected: false,
        }
    }

    /// Client identifier.
    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// Controller state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Completed transfers.
    pub fn throughput(&self) -> &ThroughputLedger {
        &self.ledger
    }

    /// Representation chosen for every requested segment.
    pub fn representations(&self) -> &[usize] {
        &self.representations
    }

    /// Returns true once the session reached its terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.state() == ControllerState::Terminal
    }

    /// Transport connection established: starts the controller.
    ///
    /// # Errors
    ///
    /// - `SessionError` - First request could not be issued
    pub fn on_connected(&mut self, rt: &mut dyn SessionRuntime) -> Result<(), SessionError> {
        self.connected = true;
        info!(
            client_id = self.client_id,
            algorithm = self.algorithm.name(),
            segments = self.catalog.segment_count(),
            "Client connected"
        );
        self.dispatch(ControllerEvent::Init, rt)
    }

    /// Transport connection failed. The session stays idle and is not retried.
    pub fn on_connect_failed(&mut self, rt: &dyn SessionRuntime) {
        warn!(
            client_id = self.client_id,
            at = %rt.now(),
            "Connection attempt failed, client stays idle"
        );
    }

    /// Accumulates delivered bytes and completes the in-flight segment once all arrived.
    ///
    /// # Errors
    ///
    /// - `SessionError` - Logging failed or the follow-up request could not be issued
    pub fn on_bytes_received(
        &mut self,
        bytes: u64,
        rt: &mut dyn SessionRuntime,
    ) -> Result<(), SessionError> {
        let now = rt.now();
        let segment = self.state.segment_counter();
        let Some(expected) = self.in_flight_size() else {
            warn!(
                client_id = self.client_id,
                bytes,
                state = %self.state.state(),
                "Bytes received with no request in flight"
            );
            return Ok(());
        };

        let transfer_start_at = *self.transfer_start_at.get_or_insert(now);
        let total = self.state.add_bytes(bytes);
        if total < expected {
            return Ok(());
        }
        if total > expected {
            warn!(
                client_id = self.client_id,
                segment, total, expected, "Received more bytes than requested"
            );
        }

        let transfer = SegmentTransfer {
            bytes_received: expected,
            request_sent_at: self.request_sent_at,
            transfer_start_at,
            transfer_end_at: now,
        };
        self.transfer_start_at = None;
        let sample = self
            .state
            .complete_segment(now, self.catalog.segment_duration());
        self.ledger.record(transfer);

        debug!(
            client_id = self.client_id,
            segment,
            bytes = expected,
            buffer_secs = sample.level.as_secs_f64(),
            "Segment downloaded"
        );

        let bps = transfer.measured_bps().unwrap_or(0.0);
        self.log(|logger| logger.download(segment, &transfer))?;
        self.log(|logger| logger.throughput(now, bps))?;
        self.log(|logger| logger.buffer(&sample))?;

        self.dispatch(ControllerEvent::DownloadFinished, rt)
    }

    /// Handles a self-event previously scheduled through the runtime.
    ///
    /// # Errors
    ///
    /// - `SessionError` - Executing an effect failed
    pub fn on_controller_event(
        &mut self,
        event: ControllerEvent,
        rt: &mut dyn SessionRuntime,
    ) -> Result<(), SessionError> {
        self.dispatch(event, rt)
    }

    /// Current counters for invariant checks.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            client_id: self.client_id,
            state: self.state.state(),
            segment_counter: self.state.segment_counter(),
            playback_index: self.state.playback_index(),
            segment_count: self.state.segment_count(),
            in_underrun: self.state.buffer().in_underrun(),
            open_underrun_records: usize::from(self.underrun_since.is_some()),
            terminal_entries: self.terminal_entries,
        }
    }

    /// End-of-run summary. Open underruns are counted up to `now`.
    pub fn summary(&self, now: SimTime) -> SessionSummary {
        let open_stall = self
            .underrun_since
            .map_or(Duration::ZERO, |since| now.saturating_duration_since(since));
        let mean_representation = if self.representations.is_empty() {
            0.0
        } else {
            self.representations.iter().sum::<usize>() as f64 / self.representations.len() as f64
        };

        SessionSummary {
            client_id: self.client_id,
            algorithm: self.algorithm.name().to_string(),
            final_state: self.state.state().to_string(),
            connected: self.connected,
            segments_downloaded: self.ledger.len(),
            segments_played: self.state.playback_index(),
            underrun_count: self.underrun_count,
            total_stall_secs: (self.stall_time + open_stall).as_secs_f64(),
            mean_representation,
        }
    }

    /// Expected size of the in-flight segment, `None` if nothing is in flight.
    fn in_flight_size(&self) -> Option<u64> {
        if self.representations.len() != self.state.segment_counter() + 1 {
            return None;
        }
        self.catalog.segment_size(
            self.state.current_representation(),
            self.state.segment_counter(),
        )
    }

    fn dispatch(
        &mut self,
        event: ControllerEvent,
        rt: &mut dyn SessionRuntime,
    ) -> Result<(), SessionError> {
        let now = rt.now();
        let Transition {
            from,
            to,
            effects,
            ignored,
        } = self.state.step(event, now, &self.catalog);

        if ignored {
            warn!(
                client_id = self.client_id,
                event = event.as_str(),
                state = %from,
                "Event has no transition in current state, ignored"
            );
            return Ok(());
        }
        if from != to {
            debug!(
                client_id = self.client_id,
                event = event.as_str(),
                %from,
                %to,
                "Controller transition"
            );
        }

        for effect in effects {
            self.execute(effect, now, rt)?;
        }
        Ok(())
    }

    fn execute(
        &mut self,
        effect: Effect,
        now: SimTime,
        rt: &mut dyn SessionRuntime,
    ) -> Result<(), SessionError> {
        match effect {
            Effect::RequestSegment { segment } => self.request_segment(segment, now, rt),
            Effect::Schedule { after, event } => {
                rt.schedule_after(after, event);
                Ok(())
            }
            Effect::Playback(tick) => self.record_playback(tick, now),
            Effect::Stop => {
                self.terminal_entries += 1;
                self.close_logs()?;
                rt.close();
                info!(
                    client_id = self.client_id,
                    at = %now,
                    underruns = self.underrun_count,
                    "Playback finished"
                );
                Ok(())
            }
        }
    }

    fn request_segment(
        &mut self,
        segment: usize,
        now: SimTime,
        rt: &mut dyn SessionRuntime,
    ) -> Result<(), SessionError> {
        let ctx = DecisionContext {
            catalog: &self.catalog,
            buffer: self.state.buffer(),
            throughput: &self.ledger,
            representations: &self.representations,
            now,
        };
        let decision = self.algorithm.decide(&ctx, segment, self.client_id);

        let available = self.catalog.representation_count();
        if decision.representation >= available {
            let err = SessionError::RepresentationOutOfBounds {
                client_id: self.client_id,
                segment,
                representation: decision.representation,
                available,
            };
            error!(client_id = self.client_id, "{err}");
            return Err(err);
        }
        let size = self
            .catalog
            .segment_size(decision.representation, segment)
            .ok_or(SessionError::MissingSegmentSize {
                client_id: self.client_id,
                segment,
                representation: decision.representation,
            })?;

        self.state
            .apply_decision(decision.representation, decision.next_download_delay);
        self.representations.push(decision.representation);
        self.log(|logger| logger.adaptation(segment, &decision))?;

        debug!(
            client_id = self.client_id,
            segment,
            representation = decision.representation,
            bytes = size,
            delay_us = decision.next_download_delay.as_micros() as u64,
            "Requesting segment"
        );
        self.request_sent_at = now;
        self.transfer_start_at = None;
        rt.send(size);
        Ok(())
    }

    fn record_playback(&mut self, tick: PlaybackTick, now: SimTime) -> Result<(), SessionError> {
        match tick {
            PlaybackTick::Played {
                segment,
                underrun_ended,
            } => {
                if underrun_ended {
                    if let Some(since) = self.underrun_since.take() {
                        self.stall_time += now.saturating_duration_since(since);
                    }
                    self.log(|logger| logger.underrun_end(now))?;
                    info!(client_id = self.client_id, at = %now, "Buffer underrun ended");
                }
                let representation = self.representations.get(segment).copied().unwrap_or(0);
                let available_at = self.catalog.availability_time(segment);
                self.log(|logger| logger.playback(segment, available_at, now, representation))
            }
            PlaybackTick::UnderrunStarted => {
                self.underrun_count += 1;
                self.underrun_since = Some(now);
                info!(
                    client_id = self.client_id,
                    at = %now,
                    segment = self.state.playback_index(),
                    "Buffer underrun started"
                );
                self.log(|logger| logger.underrun_start(now))
            }
            PlaybackTick::Stalled => {
                debug!(client_id = self.client_id, at = %now, "Playback stalled");
                Ok(())
            }
        }
    }

    fn close_logs(&mut self) -> Result<(), SessionError> {
        self.log(SessionLogger::close)
    }

    fn log(
        &mut self,
        write: impl FnOnce(&mut SessionLogger) -> std::io::Result<()>,
    ) -> Result<(), SessionError> {
        write(&mut self.logger).map_err(|source| SessionError::Log {
            client_id: self.client_id,
            source,
        })
    }
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("client_id", &self.client_id)
            .field("algorithm", &self.algorithm.name())
            .field("state", &self.state.state())
            .field("segment_counter", &self.state.segment_counter())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::abr::{AlgorithmDecision, AlgorithmKind};
    use crate::session_log::{LogKind, MemoryLogs};

    const SEGMENT: Duration = Duration::from_secs(2);

    /// Runtime recording calls; time is advanced by the test.
    #[derive(Default)]
    struct RecordingRuntime {
        now: SimTime,
        scheduled: VecDeque<(SimTime, ControllerEvent)>,
        sent: Vec<u64>,
        closed: bool,
    }

    impl SessionRuntime for RecordingRuntime {
        fn now(&self) -> SimTime {
            self.now
        }

        fn schedule_after(&mut self, delay: Duration, event: ControllerEvent) {
            self.scheduled.push_back((self.now + delay, event));
        }

        fn send(&mut self, bytes: u64) {
            self.sent.push(bytes);
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn catalog(segments: usize) -> Arc<VideoCatalog> {
        let row = |bps: u64, size: u64| {
            let sizes: Vec<String> = (0..segments).map(|_| size.to_string()).collect();
            format!("{bps} {}", sizes.join(" "))
        };
        let input = format!("{}\n{}\n", row(1_000, 100), row(2_000, 200));
        Arc::new(VideoCatalog::parse(&input, SEGMENT).unwrap())
    }

    fn session(segments: usize) -> (StreamingSession, MemoryLogs) {
        let (logger, logs) = SessionLogger::in_memory(SEGMENT);
        let catalog = catalog(segments);
        let algorithm = AlgorithmKind::Simple.build(&catalog);
        let session = StreamingSession::new(0, catalog, algorithm, logger);
        (session, logs)
    }

    /// Drives the session until the runtime has nothing scheduled, delivering
    /// every request instantly.
    fn drive(session: &mut StreamingSession, rt: &mut RecordingRuntime) {
        let mut delivered = 0;
        loop {
            while delivered < rt.sent.len() {
                let bytes = rt.sent[delivered];
                delivered += 1;
                session.on_bytes_received(bytes, rt).unwrap();
            }
            let next = rt
                .scheduled
                .iter()
                .enumerate()
                .min_by_key(|(i, (at, event))| {
                    (*at, *event == ControllerEvent::PlaybackFinished, *i)
                })
                .map(|(i, _)| i);
            let Some(index) = next else { break };
            let Some((at, event)) = rt.scheduled.remove(index) else {
                break;
            };
            rt.now = at;
            session.on_controller_event(event, rt).unwrap();
        }
    }

    #[test]
    fn test_instant_transport_plays_without_underrun() {
        let (mut session, logs) = session(3);
        let mut rt = RecordingRuntime::default();

        session.on_connected(&mut rt).unwrap();
        drive(&mut session, &mut rt);

        assert!(session.is_terminal());
        assert!(rt.closed);
        assert_eq!(rt.sent.len(), 3);
        assert_eq!(logs.get(LogKind::Playback).records().len(), 3);
        assert_eq!(logs.get(LogKind::Download).records().len(), 3);
        assert!(logs.get(LogKind::BufferUnderrun).records().is_empty());

        let summary = session.summary(rt.now);
        assert_eq!(summary.segments_played, 3);
        assert_eq!(summary.underrun_count, 0);
        assert_eq!(summary.final_state, "terminal");
    }

    #[test]
    fn test_partial_bytes_do_not_complete_segment() {
        let (mut session, logs) = session(3);
        let mut rt = RecordingRuntime::default();
        session.on_connected(&mut rt).unwrap();

        session.on_bytes_received(40, &mut rt).unwrap();
        session.on_bytes_received(40, &mut rt).unwrap();
        assert_eq!(session.state().bytes_received(), 80);
        assert!(logs.get(LogKind::Download).records().is_empty());

        rt.now = SimTime::from_micros(300_000);
        session.on_bytes_received(20, &mut rt).unwrap();
        assert_eq!(session.state().bytes_received(), 0);
        assert_eq!(session.throughput().len(), 1);
        assert_eq!(
            logs.get(LogKind::Download).records(),
            vec!["0 0.000000 0.000000 0.300000 100"]
        );
    }

    #[test]
    fn test_stray_bytes_are_ignored() {
        let (mut session, logs) = session(3);
        let mut rt = RecordingRuntime::default();

        session.on_bytes_received(100, &mut rt).unwrap();
        assert_eq!(session.state().state(), ControllerState::Initial);
        assert!(logs.get(LogKind::Download).records().is_empty());
    }

    #[test]
    fn test_over_delivery_completes_segment_at_catalog_size() {
        let (mut session, logs) = session(3);
        let mut rt = RecordingRuntime::default();
        session.on_connected(&mut rt).unwrap();
        assert_eq!(rt.sent, vec![100]);

        rt.now = SimTime::from_micros(200_000);
        session.on_bytes_received(150, &mut rt).unwrap();

        assert_eq!(session.state().bytes_received(), 0);
        assert_eq!(session.state().segment_counter(), 1);
        assert_eq!(session.throughput().len(), 1);
        assert_eq!(
            logs.get(LogKind::Download).records(),
            vec!["0 0.000000 0.000000 0.200000 100"]
        );
        assert_eq!(logs.get(LogKind::Throughput).records().len(), 1);
        assert_eq!(logs.get(LogKind::Playback).records().len(), 1);
    }

    #[test]
    fn test_zero_byte_segment_completes_on_empty_delivery() {
        let catalog =
            Arc::new(VideoCatalog::parse("1000 0 100\n2000 0 200\n", SEGMENT).unwrap());
        let (logger, logs) = SessionLogger::in_memory(SEGMENT);
        let algorithm = AlgorithmKind::Simple.build(&catalog);
        let mut session = StreamingSession::new(0, catalog, algorithm, logger);
        let mut rt = RecordingRuntime::default();

        session.on_connected(&mut rt).unwrap();
        assert_eq!(rt.sent, vec![0]);
        session.on_bytes_received(0, &mut rt).unwrap();
        assert_eq!(
            logs.get(LogKind::Download).records(),
            vec!["0 0.000000 0.000000 0.000000 0"]
        );

        rt.sent.clear();
        drive(&mut session, &mut rt);

        assert!(session.is_terminal());
        assert_eq!(logs.get(LogKind::Download).records().len(), 2);
        assert_eq!(logs.get(LogKind::Playback).records().len(), 2);
        assert!(logs.get(LogKind::BufferUnderrun).records().is_empty());
    }

    #[test]
    fn test_connect_failure_leaves_session_idle() {
        let (mut session, _logs) = session(3);
        let rt = RecordingRuntime::default();
        session.on_connect_failed(&rt);

        let summary = session.summary(SimTime::from_secs(10));
        assert!(!summary.connected);
        assert_eq!(summary.final_state, "initial");
        assert!(rt.sent.is_empty());
    }

    #[test]
    fn test_slow_segment_logs_underrun_interval() {
        let (mut session, logs) = session(3);
        let mut rt = RecordingRuntime::default();
        session.on_connected(&mut rt).unwrap();
        session.on_bytes_received(100, &mut rt).unwrap();

        // Second request is deferred until its availability at 2 s.
        let (at, event) = rt.scheduled.pop_front().unwrap();
        assert_eq!(event, ControllerEvent::DelayedSend);
        rt.now = at;
        session.on_controller_event(event, &mut rt).unwrap();

        // Playback tick at 2 s finds the buffer empty.
        let (at, event) = rt.scheduled.pop_front().unwrap();
        assert_eq!(event, ControllerEvent::PlaybackFinished);
        rt.now = at;
        session.on_controller_event(event, &mut rt).unwrap();
        assert!(session.snapshot().in_underrun);

        rt.now = SimTime::from_micros(3_500_000);
        let size = *rt.sent.last().unwrap();
        session.on_bytes_received(size, &mut rt).unwrap();

        let records = logs.get(LogKind::BufferUnderrun).records();
        assert_eq!(records.len(), 1);
        let fields: Vec<&str> = records[0].split_whitespace().collect();
        assert_eq!(fields, vec!["2.000000", "3.500000"]);
        assert_eq!(session.summary(rt.now).total_stall_secs, 1.5);
    }

    struct OutOfBounds;

    impl AdaptationAlgorithm for OutOfBounds {
        fn name(&self) -> &'static str {
            "out-of-bounds"
        }

        fn decide(
            &mut self,
            ctx: &DecisionContext<'_>,
            _segment: usize,
            _client_id: u32,
        ) -> AlgorithmDecision {
            AlgorithmDecision::immediate(ctx, ctx.catalog.representation_count(), 0, 0.0)
        }
    }

    #[test]
    fn test_out_of_bounds_decision_aborts_before_logging() {
        let (mut session, logs) = session(3);
        session.algorithm = Box::new(OutOfBounds);
        let mut rt = RecordingRuntime::default();

        let err = session.on_connected(&mut rt).unwrap_err();
        assert!(matches!(
            err,
            SessionError::RepresentationOutOfBounds {
                representation: 2,
                available: 2,
                ..
            }
        ));
        assert!(err.is_configuration_error());
        assert!(rt.sent.is_empty());
        assert!(logs.get(LogKind::Adaptation).records().is_empty());
    }
}
