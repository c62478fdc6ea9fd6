//! Streamsim Core - adaptive video streaming client
//!
//! This crate provides the client side of an adaptive streaming session:
//! video metadata, the playback buffer model, throughput history, the
//! bitrate adaptation algorithms, the download/playback controller and the
//! per-client record streams. It knows nothing about how time advances or how
//! bytes travel; the driver supplies both through [`SessionRuntime`].

pub mod abr;
pub mod buffer;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod runtime;
pub mod session;
pub mod session_log;
pub mod throughput;
pub mod time;
pub mod tracing_setup;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;

// Re-export main types for convenient access
pub use abr::{AdaptationAlgorithm, AlgorithmDecision, AlgorithmError, AlgorithmKind};
pub use catalog::{CatalogError, VideoCatalog};
pub use config::StreamsimConfig;
pub use controller::{ControllerEvent, ControllerState};
pub use runtime::SessionRuntime;
pub use session::{SessionError, SessionSnapshot, SessionSummary, StreamingSession};
pub use session_log::{LogKind, SessionLogger};
pub use time::SimTime;

/// Core errors that can bubble up from any streamsim subsystem.
#[derive(Debug, thiserror::Error)]
pub enum StreamsimError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Algorithm error: {0}")]
    Algorithm(#[from] AlgorithmError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl StreamsimError {
    /// Checks if this error aborts the run at setup because of bad inputs.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            StreamsimError::Catalog(_)
            | StreamsimError::Algorithm(_)
            | StreamsimError::Configuration { .. } => true,
            StreamsimError::Session(e) => e.is_configuration_error(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamsimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_classified() {
        let err: StreamsimError = CatalogError::Empty.into();
        assert!(err.is_configuration_error());

        let err: StreamsimError = "nope".parse::<AlgorithmKind>().unwrap_err().into();
        assert!(err.is_configuration_error());

        let err = StreamsimError::Configuration {
            reason: "bad override".to_string(),
        };
        assert!(err.is_configuration_error());

        let err: StreamsimError = SessionError::Log {
            client_id: 0,
            source: std::io::Error::other("disk full"),
        }
        .into();
        assert!(!err.is_configuration_error());
    }
}
