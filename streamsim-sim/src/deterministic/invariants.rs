//! Session invariants checked after every simulation event.

use std::fmt;

use serde::Serialize;
use streamsim_core::{ControllerState, SessionSnapshot, SimTime};

/// Violation of a session invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: String,
    /// Client whose session broke it
    pub client_id: u32,
    /// Detailed description of the violation
    pub description: String,
    /// When the violation was observed
    pub timestamp: SimTime,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invariant '{}' violated by client {} at {}: {}",
            self.invariant, self.client_id, self.timestamp, self.description
        )
    }
}

/// Trait for checking session invariants.
pub trait SessionInvariant: Send + Sync {
    /// Checks if invariant holds for a session at `now`.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if the invariant condition is not met.
    fn check(&self, session: &SessionSnapshot, now: SimTime) -> Result<(), InvariantViolation>;

    /// Returns name of this invariant.
    fn name(&self) -> &str;

    /// Builds a violation of this invariant.
    fn violation(
        &self,
        session: &SessionSnapshot,
        now: SimTime,
        description: String,
    ) -> InvariantViolation {
        InvariantViolation {
            invariant: self.name().to_string(),
            client_id: session.client_id,
            description,
            timestamp: now,
        }
    }
}

/// `playback_index <= segment_counter <= segment_count`.
pub struct IndexOrderingInvariant;

impl SessionInvariant for IndexOrderingInvariant {
    fn check(&self, session: &SessionSnapshot, now: SimTime) -> Result<(), InvariantViolation> {
        if session.playback_index > session.segment_counter
            || session.segment_counter > session.segment_count
        {
            return Err(self.violation(
                session,
                now,
                format!(
                    "playback index {} / segment counter {} / stream end {} out of order",
                    session.playback_index, session.segment_counter, session.segment_count
                ),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "IndexOrdering"
    }
}

/// Terminal is entered at most once and only after the whole stream played.
pub struct TerminalOnceInvariant;

impl SessionInvariant for TerminalOnceInvariant {
    fn check(&self, session: &SessionSnapshot, now: SimTime) -> Result<(), InvariantViolation> {
        if session.terminal_entries > 1 {
            return Err(self.violation(
                session,
                now,
                format!("terminal entered {} times", session.terminal_entries),
            ));
        }
        let terminal = session.state == ControllerState::Terminal;
        if terminal != (session.terminal_entries == 1) {
            return Err(self.violation(
                session,
                now,
                format!(
                    "state {} disagrees with {} terminal entries",
                    session.state, session.terminal_entries
                ),
            ));
        }
        if terminal && session.playback_index != session.segment_count {
            return Err(self.violation(
                session,
                now,
                format!(
                    "terminal with {} of {} segments played",
                    session.playback_index, session.segment_count
                ),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "TerminalOnce"
    }
}

/// At most one underrun interval is open, and only while playback is stalled.
pub struct UnderrunIntervalInvariant;

impl SessionInvariant for UnderrunIntervalInvariant {
    fn check(&self, session: &SessionSnapshot, now: SimTime) -> Result<(), InvariantViolation> {
        if session.open_underrun_records > 1 {
            return Err(self.violation(
                session,
                now,
                format!("{} open underrun intervals", session.open_underrun_records),
            ));
        }
        if (session.open_underrun_records == 1) != session.in_underrun {
            return Err(self.violation(
                session,
                now,
                "underrun record disagrees with buffer state".to_string(),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "UnderrunInterval"
    }
}

/// The invariants every simulation checks by default.
pub fn default_invariants() -> Vec<Box<dyn SessionInvariant>> {
    vec![
        Box::new(IndexOrderingInvariant),
        Box::new(TerminalOnceInvariant),
        Box::new(UnderrunIntervalInvariant),
    ]
}
