//! Streamsim Simulation Framework - Deterministic runs of adaptive streaming clients.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]
//!
//! This crate drives any number of [`StreamingSession`]s from
//! `streamsim-core` against a simulated segment server behind one shared
//! bottleneck link. Every source of randomness is seeded, so a run is fully
//! reproducible from its configuration.
//!
//! # Features
//!
//! - **Deterministic Execution**: Same seed always produces identical logs and reports
//! - **Event-Based Simulation**: Events ordered by time, priority and insertion
//! - **Network Simulation**: Shared link rate, latency, jitter and connect failures
//! - **Invariant Checking**: Controller invariants validated after every event
//! - **Scenario Library**: Pre-built conditions that need no input files
//!
//! # Example
//!
//! ```rust,no_run
//! use streamsim_core::AlgorithmKind;
//! use streamsim_sim::{LogTarget, ScenarioKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scenario = ScenarioKind::Congested.build(12345, AlgorithmKind::Panda)?;
//! let mut sim = scenario.simulation(LogTarget::Memory)?;
//!
//! let report = sim.run()?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! [`StreamingSession`]: streamsim_core::StreamingSession

pub mod deterministic;
pub mod network;
pub mod scenarios;

pub use deterministic::{
    DeterministicClock, DeterministicRng, EventPriority, EventType, IndexOrderingInvariant,
    InvariantViolation, LogTarget, SessionInvariant, SimulationError, SimulationEvent,
    SimulationMetrics, SimulationReport, StreamingSimulation, TerminalOnceInvariant,
    UnderrunIntervalInvariant, default_invariants,
};
pub use network::{Delivery, SegmentServer, SharedLink, SharedLinkBuilder};
pub use scenarios::{Scenario, ScenarioKind};
