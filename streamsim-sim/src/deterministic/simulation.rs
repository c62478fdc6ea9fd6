//! Discrete-event driver running many streaming clients over one shared link.

use std::collections::BinaryHeap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamsim_core::session_log::MemoryLogs;
use streamsim_core::{
    AdaptationAlgorithm, CatalogError, ControllerEvent, SessionError, SessionLogger,
    SessionRuntime, SessionSummary, SimTime, StreamingSession, StreamsimConfig, VideoCatalog,
};
use thiserror::Error;
use tracing::{debug, error, info, trace};

use super::clock::{DeterministicClock, DeterministicRng};
use super::events::{EventType, SimulationEvent};
use super::invariants::{InvariantViolation, SessionInvariant, default_invariants};
use super::state::SimulationMetrics;
use crate::network::{SegmentServer, SharedLink};

/// Errors that can occur during simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Video catalog could not be loaded
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// A client session aborted
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Per-client record streams could not be opened
    #[error("Cannot open session logs under {path}: {source}")]
    LogSetup {
        /// Log directory
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A session invariant does not hold
    #[error("{0}")]
    InvariantViolated(InvariantViolation),

    /// Event scheduled before the current time
    #[error("Simulation time cannot go backwards from {now} to {target}")]
    TimeWentBackwards {
        /// Current simulation time
        now: SimTime,
        /// Requested time
        target: SimTime,
    },

    /// Simulation configured without clients
    #[error("Simulation needs at least one client")]
    NoClients,

    /// Event refers to a client that does not exist
    #[error("Event for unknown client {client}")]
    UnknownClient {
        /// Client identifier
        client: u32,
    },

    /// Simulation was already executed
    #[error("Simulation already ran")]
    AlreadyRan,

    /// Scenario name not registered
    #[error("Unknown scenario '{name}', expected one of: {known}")]
    UnknownScenario {
        /// Requested name
        name: String,
        /// Registered scenario names
        known: String,
    },
}

impl SimulationError {
    /// Checks if this error stems from bad session-wide inputs.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            SimulationError::Catalog(_)
            | SimulationError::NoClients
            | SimulationError::UnknownScenario { .. } => true,
            SimulationError::Session(e) => e.is_configuration_error(),
            _ => false,
        }
    }
}

/// Destination of the per-client record streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Files under `<dir>/SimID_<id>/`
    Directory(PathBuf),
    /// Shared in-memory buffers readable through [`StreamingSimulation::memory_logs`]
    Memory,
}

/// Result of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Run index
    pub simulation_id: u32,
    /// Seed used for reproduction
    pub seed: u64,
    /// Adaptation algorithm of the first client
    pub algorithm: String,
    /// Simulated time at the end of the run, in seconds
    pub simulated_secs: f64,
    /// True if every client reached its terminal state
    pub completed: bool,
    /// Collected metrics
    pub metrics: SimulationMetrics,
    /// Per-client summaries
    pub clients: Vec<SessionSummary>,
}

impl SimulationReport {
    /// Generates human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!(
            "Simulation {} Report (seed: {}, algorithm: {})\n",
            self.simulation_id, self.seed, self.algorithm
        ));
        summary.push_str(&format!("Simulated time: {:.6}s\n", self.simulated_secs));
        summary.push_str(&format!(
            "Events processed: {}\n",
            self.metrics.events_processed
        ));
        summary.push_str(&format!("Completed: {}\n", self.completed));
        summary.push_str("\nEvent breakdown:\n");

        for (event_type, count) in &self.metrics.events_by_type {
            summary.push_str(&format!("  {event_type}: {count}\n"));
        }

        summary.push_str("\nClients:\n");
        for client in &self.clients {
            summary.push_str(&format!(
                "  client {}: {} played {}/{} underruns {} stalled {:.3}s mean rep {:.2}\n",
                client.client_id,
                client.final_state,
                client.segments_played,
                client.segments_downloaded,
                client.underrun_count,
                client.total_stall_secs,
                client.mean_representation
            ));
        }

        summary
    }

    /// Serializes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// - `serde_json::Error` - Serialization failed
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Min-heap of pending events with insertion ids.
#[derive(Debug, Default)]
struct EventQueue {
    heap: BinaryHeap<SimulationEvent>,
    next_id: u64,
}

impl EventQueue {
    fn push(&mut self, at: SimTime, event_type: EventType) {
        self.heap
            .push(SimulationEvent::new(self.next_id, at, event_type));
        self.next_id += 1;
    }

    fn pop(&mut self) -> Option<SimulationEvent> {
        self.heap.pop()
    }

    fn peek_time(&self) -> Option<SimTime> {
        self.heap.peek().map(|event| event.timestamp)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }
}

struct ClientSlot {
    session: StreamingSession,
    closed: bool,
    failed: bool,
}

impl ClientSlot {
    fn finished(&self) -> bool {
        self.failed || self.session.is_terminal()
    }
}

/// Runtime handed to one session while it handles an event.
struct ClientRuntime<'a> {
    client: u32,
    now: SimTime,
    latency: Duration,
    queue: &'a mut EventQueue,
    closed: &'a mut bool,
}

impl SessionRuntime for ClientRuntime<'_> {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_after(&mut self, delay: Duration, event: ControllerEvent) {
        self.queue.push(
            self.now + delay,
            EventType::Controller {
                client: self.client,
                event,
            },
        );
    }

    fn send(&mut self, bytes: u64) {
        self.queue.push(
            self.now + self.latency,
            EventType::RequestArrived {
                client: self.client,
                bytes,
            },
        );
    }

    fn close(&mut self) {
        *self.closed = true;
    }
}

/// Deterministic simulation of streaming clients sharing one bottleneck link.
pub struct StreamingSimulation {
    config: StreamsimConfig,
    clock: DeterministicClock,
    rng: DeterministicRng,
    queue: EventQueue,
    link: SharedLink,
    server: SegmentServer,
    clients: Vec<ClientSlot>,
    memory_logs: Vec<MemoryLogs>,
    invariants: Vec<Box<dyn SessionInvariant>>,
    metrics: SimulationMetrics,
    ran: bool,
}

impl StreamingSimulation {
    /// Loads the catalog named by the configuration and writes logs to its log directory.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Catalog` - Segment size file unreadable or malformed
    /// - `SimulationError::LogSetup` - Log files cannot be created
    /// - `SimulationError::NoClients` - Client count is zero
    pub fn from_config(config: StreamsimConfig) -> Result<Self, SimulationError> {
        let catalog = VideoCatalog::from_file(
            &config.session.segment_size_file,
            config.session.segment_duration,
        )?;
        let target = LogTarget::Directory(config.session.log_directory.clone());
        Self::new(config, Arc::new(catalog), target)
    }

    /// Creates simulation where every client runs the configured algorithm.
    ///
    /// # Errors
    ///
    /// - `SimulationError::LogSetup` - Log files cannot be created
    /// - `SimulationError::NoClients` - Client count is zero
    pub fn new(
        config: StreamsimConfig,
        catalog: Arc<VideoCatalog>,
        logs: LogTarget,
    ) -> Result<Self, SimulationError> {
        let kind = config.session.algorithm;
        Self::with_algorithms(config, catalog, logs, |_, catalog| kind.build(catalog))
    }

    /// Creates simulation with a custom algorithm per client.
    ///
    /// # Errors
    ///
    /// - `SimulationError::LogSetup` - Log files cannot be created
    /// - `SimulationError::NoClients` - Client count is zero
    pub fn with_algorithms(
        config: StreamsimConfig,
        catalog: Arc<VideoCatalog>,
        logs: LogTarget,
        mut build: impl FnMut(u32, &VideoCatalog) -> Box<dyn AdaptationAlgorithm>,
    ) -> Result<Self, SimulationError> {
        let client_count = config.session.client_count;
        if client_count == 0 {
            return Err(SimulationError::NoClients);
        }

        let segment_duration = catalog.segment_duration();
        let simulation_id = config.simulation.simulation_id;
        let mut clients = Vec::with_capacity(client_count as usize);
        let mut memory_logs = Vec::new();

        for client_id in 0..client_count {
            let logger = match &logs {
                LogTarget::Directory(dir) => {
                    SessionLogger::create(dir, simulation_id, client_id, segment_duration)
                        .map_err(|source| SimulationError::LogSetup {
                            path: dir.clone(),
                            source,
                        })?
                }
                LogTarget::Memory => {
                    let (logger, logs) = SessionLogger::in_memory(segment_duration);
                    memory_logs.push(logs);
                    logger
                }
            };
            let algorithm = build(client_id, &catalog);
            clients.push(ClientSlot {
                session: StreamingSession::new(client_id, Arc::clone(&catalog), algorithm, logger),
                closed: false,
                failed: false,
            });
        }

        let invariants = if config.simulation.check_invariants {
            default_invariants()
        } else {
            Vec::new()
        };

        Ok(Self {
            clock: DeterministicClock::new(),
            rng: DeterministicRng::from_seed(config.simulation.seed),
            queue: EventQueue::default(),
            link: SharedLink::new(&config.network),
            server: SegmentServer::new(),
            clients,
            memory_logs,
            invariants,
            metrics: SimulationMetrics::new(),
            ran: false,
            config,
        })
    }

    /// Returns the seed used for this simulation.
    pub fn simulation_seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Returns current simulation time.
    pub fn simulation_time(&self) -> SimTime {
        self.clock.now()
    }

    /// Adds an invariant to check after every event.
    pub fn add_invariant(&mut self, invariant: Box<dyn SessionInvariant>) {
        self.invariants.push(invariant);
    }

    /// In-memory record streams of `client`, when logging to memory.
    pub fn memory_logs(&self, client: u32) -> Option<&MemoryLogs> {
        self.memory_logs.get(client as usize)
    }

    /// Session of `client`.
    pub fn session(&self, client: u32) -> Option<&StreamingSession> {
        self.clients.get(client as usize).map(|slot| &slot.session)
    }

    /// Runs until the stop time or until every client finished.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Session` - A session aborted
    /// - `SimulationError::InvariantViolated` - A session invariant broke
    /// - `SimulationError::AlreadyRan` - Called a second time
    pub fn run(&mut self) -> Result<SimulationReport, SimulationError> {
        if std::mem::replace(&mut self.ran, true) {
            return Err(SimulationError::AlreadyRan);
        }

        let stop_at = SimTime::ZERO + self.config.simulation.stop_time;
        info!(
            simulation_id = self.config.simulation.simulation_id,
            seed = self.simulation_seed(),
            clients = self.clients.len(),
            algorithm = %self.config.session.algorithm,
            "Simulation started"
        );
        self.schedule_client_starts();

        while self.queue.peek_time().is_some_and(|at| at <= stop_at) {
            let Some(event) = self.queue.pop() else {
                break;
            };
            self.clock.advance_to(event.timestamp)?;
            self.metrics.record_event(event.event_type.as_str());
            trace!(
                at = %event.timestamp,
                event = event.event_type.as_str(),
                client = event.event_type.client(),
                pending = self.queue.len(),
                "Processing event"
            );

            if let Err(err) = self
                .process_event(event.event_type)
                .and_then(|()| self.check_invariants(event.event_type.client()))
            {
                error!(at = %self.clock.now(), "Simulation aborted: {err}");
                return Err(err);
            }

            if self.clients.iter().all(ClientSlot::finished) {
                debug!(at = %self.clock.now(), "Every client finished");
                break;
            }
        }

        let report = self.generate_report();
        info!(
            simulation_id = report.simulation_id,
            simulated_secs = report.simulated_secs,
            events = report.metrics.events_processed,
            completed = report.completed,
            "Simulation finished"
        );
        Ok(report)
    }

    fn schedule_client_starts(&mut self) {
        let stagger = self.config.network.client_start_stagger;
        for client in 0..self.clients.len() as u32 {
            self.queue
                .push(SimTime::ZERO + stagger * client, EventType::ClientStart { client });
        }
    }

    fn process_event(&mut self, event_type: EventType) -> Result<(), SimulationError> {
        let now = self.clock.now();

        match event_type {
            EventType::ClientStart { client } => {
                let probability = self.config.network.connect_failure_probability;
                let fails = probability > 0.0 && self.rng.random_bool(probability);
                let outcome = if fails {
                    EventType::ConnectFailed { client }
                } else {
                    EventType::Connected { client }
                };
                self.queue.push(now + self.link.round_trip(), outcome);
            }
            EventType::Connected { client } => {
                self.with_session(client, |session, rt| session.on_connected(rt))?;
            }
            EventType::ConnectFailed { client } => {
                self.metrics.record_connect_failure();
                let slot = self.slot_mut(client)?;
                slot.failed = true;
                slot.closed = true;
                self.with_session(client, |session, rt| {
                    session.on_connect_failed(rt);
                    Ok(())
                })?;
            }
            EventType::RequestArrived { client, bytes } => {
                self.metrics.record_request();
                let deliveries = self.server.serve(now, bytes, &mut self.link, &mut self.rng);
                for delivery in deliveries {
                    self.queue.push(
                        delivery.at,
                        EventType::BytesDelivered {
                            client,
                            bytes: delivery.bytes,
                        },
                    );
                }
            }
            EventType::BytesDelivered { client, bytes } => {
                if self.slot_mut(client)?.closed {
                    self.metrics.record_dropped_delivery();
                    return Ok(());
                }
                self.metrics.record_delivery(bytes);
                self.with_session(client, |session, rt| session.on_bytes_received(bytes, rt))?;
            }
            EventType::Controller { client, event } => {
                self.with_session(client, |session, rt| session.on_controller_event(event, rt))?;
            }
        }

        Ok(())
    }

    fn slot_mut(&mut self, client: u32) -> Result<&mut ClientSlot, SimulationError> {
        self.clients
            .get_mut(client as usize)
            .ok_or(SimulationError::UnknownClient { client })
    }

    fn with_session(
        &mut self,
        client: u32,
        handle: impl FnOnce(&mut StreamingSession, &mut ClientRuntime<'_>) -> Result<(), SessionError>,
    ) -> Result<(), SimulationError> {
        let now = self.clock.now();
        let latency = self.link.latency();
        let ClientSlot {
            session, closed, ..
        } = self
            .clients
            .get_mut(client as usize)
            .ok_or(SimulationError::UnknownClient { client })?;

        let mut rt = ClientRuntime {
            client,
            now,
            latency,
            queue: &mut self.queue,
            closed,
        };
        handle(session, &mut rt)?;
        Ok(())
    }

    fn check_invariants(&self, client: u32) -> Result<(), SimulationError> {
        let Some(slot) = self.clients.get(client as usize) else {
            return Ok(());
        };
        let snapshot = slot.session.snapshot();
        for invariant in &self.invariants {
            invariant
                .check(&snapshot, self.clock.now())
                .map_err(SimulationError::InvariantViolated)?;
        }
        Ok(())
    }

    fn generate_report(&self) -> SimulationReport {
        let now = self.clock.now();
        let clients: Vec<SessionSummary> = self
            .clients
            .iter()
            .map(|slot| slot.session.summary(now))
            .collect();
        // Clients built by a custom factory may not run the configured algorithm.
        let algorithm = clients
            .first()
            .map_or_else(|| self.config.session.algorithm.to_string(), |c| c.algorithm.clone());
        SimulationReport {
            simulation_id: self.config.simulation.simulation_id,
            seed: self.simulation_seed(),
            algorithm,
            simulated_secs: now.as_secs_f64(),
            completed: self.clients.iter().all(|slot| slot.session.is_terminal()),
            metrics: self.metrics.clone(),
            clients,
        }
    }
}

impl std::fmt::Debug for StreamingSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSimulation")
            .field("now", &self.clock.now())
            .field("seed", &self.rng.seed())
            .field("clients", &self.clients.len())
            .field("pending_events", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use streamsim_core::test_fixtures::uniform_catalog;

    use super::*;

    fn config(clients: u32) -> StreamsimConfig {
        let mut config = StreamsimConfig::for_testing();
        config.session.client_count = clients;
        config
    }

    fn catalog(segments: usize) -> Arc<VideoCatalog> {
        Arc::new(uniform_catalog(
            &[1_000_000, 3_000_000],
            segments,
            Duration::from_secs(2),
        ))
    }

    #[test]
    fn test_simulation_initialization() {
        let sim = StreamingSimulation::new(config(3), catalog(4), LogTarget::Memory).unwrap();
        assert_eq!(sim.simulation_seed(), 42);
        assert_eq!(sim.simulation_time(), SimTime::ZERO);
        assert!(sim.memory_logs(2).is_some());
        assert!(sim.memory_logs(3).is_none());
    }

    #[test]
    fn test_zero_clients_is_configuration_error() {
        let err = StreamingSimulation::new(config(0), catalog(4), LogTarget::Memory).unwrap_err();
        assert!(matches!(err, SimulationError::NoClients));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_run_twice_fails() {
        let mut sim = StreamingSimulation::new(config(1), catalog(2), LogTarget::Memory).unwrap();
        sim.run().unwrap();
        assert!(matches!(sim.run(), Err(SimulationError::AlreadyRan)));
    }

    #[test]
    fn test_stop_time_bounds_run() {
        let mut config = config(1);
        config.simulation.stop_time = Duration::from_secs(5);
        let mut sim = StreamingSimulation::new(config, catalog(100), LogTarget::Memory).unwrap();

        let report = sim.run().unwrap();
        assert!(!report.completed);
        assert!(report.simulated_secs <= 5.0);
        assert_eq!(report.clients[0].final_state, "downloading_playing");
    }

    #[test]
    fn test_failed_connection_keeps_client_idle() {
        let mut config = config(2);
        config.network.connect_failure_probability = 1.0;
        let mut sim = StreamingSimulation::new(config, catalog(3), LogTarget::Memory).unwrap();

        let report = sim.run().unwrap();
        assert_eq!(report.metrics.connect_failures, 2);
        assert!(report.clients.iter().all(|c| !c.connected));
        assert_eq!(report.metrics.requests_served, 0);
    }
}
