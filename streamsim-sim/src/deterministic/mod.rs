//! Deterministic discrete-event simulation of streaming clients.
//!
//! Time only advances by popping the next event, ties at one instant are
//! ordered by priority and then insertion, and all randomness comes from one
//! seeded generator, so a seed fully determines a run.

mod clock;
mod events;
mod invariants;
mod simulation;
mod state;

// Re-export core types for public API
pub use clock::{DeterministicClock, DeterministicRng};
pub use events::{EventPriority, EventType, SimulationEvent};
pub use invariants::{
    IndexOrderingInvariant, InvariantViolation, SessionInvariant, TerminalOnceInvariant,
    UnderrunIntervalInvariant, default_invariants,
};
pub use simulation::{LogTarget, SimulationError, SimulationReport, StreamingSimulation};
pub use state::SimulationMetrics;
