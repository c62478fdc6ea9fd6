//! Simulation runtime seam used by a streaming session.

use std::time::Duration;

use crate::controller::ControllerEvent;
use crate::time::SimTime;

/// Scheduler and transport operations available to one session.
///
/// Implemented by the discrete-event driver. Calls never block: delays are
/// expressed by scheduling a future self-event and byte delivery is reported
/// back through the session's receive handler.
pub trait SessionRuntime {
    /// Current simulation time.
    fn now(&self) -> SimTime;

    /// Raises `event` for this session after `delay`. Zero runs at the current instant.
    fn schedule_after(&mut self, delay: Duration, event: ControllerEvent);

    /// Sends a segment request asking the server for `bytes` bytes.
    fn send(&mut self, bytes: u64);

    /// Closes the transport connection. Later deliveries are dropped.
    fn close(&mut self);
}
