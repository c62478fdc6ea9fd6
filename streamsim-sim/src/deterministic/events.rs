//! Event types and ordering for the streaming simulation.

use std::cmp::Ordering;

use streamsim_core::{ControllerEvent, SimTime};

/// Priority levels for simulation events.
///
/// Lower numeric values have higher priority when events
/// occur at the same timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    Critical = 0, // Connection results
    High = 1,     // Byte delivery, server receipt
    Normal = 2,   // Controller self-events
    Low = 3,      // Playback ticks
}

/// Types of events that can occur in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Client opens its connection
    ClientStart { client: u32 },
    /// Connection established
    Connected { client: u32 },
    /// Connection attempt failed
    ConnectFailed { client: u32 },
    /// Segment request reached the server
    RequestArrived { client: u32, bytes: u64 },
    /// Chunk of a segment reached the client
    BytesDelivered { client: u32, bytes: u64 },
    /// Self-event scheduled by a client controller
    Controller { client: u32, event: ControllerEvent },
}

impl EventType {
    /// Returns string representation of event type for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ClientStart { .. } => "ClientStart",
            EventType::Connected { .. } => "Connected",
            EventType::ConnectFailed { .. } => "ConnectFailed",
            EventType::RequestArrived { .. } => "RequestArrived",
            EventType::BytesDelivered { .. } => "BytesDelivered",
            EventType::Controller { event, .. } => match event {
                ControllerEvent::Init => "Init",
                ControllerEvent::DelayedSend => "DelayedSend",
                ControllerEvent::DownloadFinished => "DownloadFinished",
                ControllerEvent::PlaybackFinished => "PlaybackFinished",
                ControllerEvent::IrdFinished => "IrdFinished",
            },
        }
    }

    /// Client the event belongs to.
    pub fn client(&self) -> u32 {
        match *self {
            EventType::ClientStart { client }
            | EventType::Connected { client }
            | EventType::ConnectFailed { client }
            | EventType::RequestArrived { client, .. }
            | EventType::BytesDelivered { client, .. }
            | EventType::Controller { client, .. } => client,
        }
    }

    /// Default priority of this event type.
    pub fn priority(&self) -> EventPriority {
        match self {
            EventType::Connected { .. } | EventType::ConnectFailed { .. } => {
                EventPriority::Critical
            }
            EventType::RequestArrived { .. } | EventType::BytesDelivered { .. } => {
                EventPriority::High
            }
            EventType::Controller {
                event: ControllerEvent::PlaybackFinished,
                ..
            } => EventPriority::Low,
            EventType::ClientStart { .. } | EventType::Controller { .. } => EventPriority::Normal,
        }
    }
}

/// Simulation event with timestamp and priority.
#[derive(Debug, Clone)]
pub struct SimulationEvent {
    /// Unique event ID for deterministic ordering
    pub id: u64,
    /// Scheduled execution time
    pub timestamp: SimTime,
    /// Type of event
    pub event_type: EventType,
    /// Priority for events at same timestamp
    pub priority: EventPriority,
}

impl SimulationEvent {
    /// Creates new simulation event with the type's default priority.
    pub fn new(id: u64, timestamp: SimTime, event_type: EventType) -> Self {
        Self {
            id,
            timestamp,
            priority: event_type.priority(),
            event_type,
        }
    }
}

impl Eq for SimulationEvent {}

impl PartialEq for SimulationEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Ord for SimulationEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed throughout: BinaryHeap is a max-heap and the earliest,
        // highest-priority, first-inserted event must pop first.
        self.timestamp
            .cmp(&other.timestamp)
            .then(self.priority.cmp(&other.priority))
            .then(self.id.cmp(&other.id))
            .reverse()
    }
}

impl PartialOrd for SimulationEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    fn tick(client: u32) -> EventType {
        EventType::Controller {
            client,
            event: ControllerEvent::PlaybackFinished,
        }
    }

    #[test]
    fn test_event_priority_ordering() {
        let now = SimTime::from_secs(1);
        let delivery = SimulationEvent::new(2, now, EventType::BytesDelivered { client: 0, bytes: 1 });
        let playback = SimulationEvent::new(1, now, tick(0));

        // Delivery must pop before the playback tick at the same instant
        assert!(delivery > playback);
    }

    #[test]
    fn test_event_timestamp_ordering() {
        let early = SimulationEvent::new(2, SimTime::from_secs(1), tick(0));
        let late = SimulationEvent::new(1, SimTime::from_secs(2), EventType::Connected { client: 0 });

        let mut heap = BinaryHeap::new();
        heap.push(late);
        heap.push(early);
        assert_eq!(heap.pop().map(|e| e.id), Some(2));
        assert_eq!(heap.pop().map(|e| e.id), Some(1));
    }

    #[test]
    fn test_insertion_order_breaks_ties() {
        let now = SimTime::ZERO;
        let mut heap = BinaryHeap::new();
        for id in [5, 3, 4] {
            heap.push(SimulationEvent::new(id, now, EventType::ClientStart { client: id as u32 }));
        }
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.id)).collect();
        assert_eq!(order, vec![3, 4, 5]);
    }

    #[test]
    fn test_event_type_string_conversion() {
        assert_eq!(tick(3).as_str(), "PlaybackFinished");
        assert_eq!(tick(3).client(), 3);
        assert_eq!(tick(3).priority(), EventPriority::Low);
    }
}
