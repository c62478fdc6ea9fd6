//! Centralized configuration for streamsim.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the simulator.

use std::env::VarError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::abr::AlgorithmKind;
use crate::{Result, StreamsimError};

/// Central configuration for all streamsim components.
///
/// Groups related settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct StreamsimConfig {
    pub session: SessionConfig,
    pub network: NetworkConfig,
    pub simulation: SimulationConfig,
}

/// Per-client streaming session configuration.
///
/// Session-wide inputs shared by every simulated client.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Segment size file, one representation per line
    pub segment_size_file: PathBuf,
    /// Play time of one segment
    pub segment_duration: Duration,
    /// Adaptation algorithm every client runs
    pub algorithm: AlgorithmKind,
    /// Root directory of the per-client record streams
    pub log_directory: PathBuf,
    /// Number of simulated clients
    pub client_count: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            segment_size_file: PathBuf::from("segmentSizes.txt"),
            segment_duration: Duration::from_secs(2),
            algorithm: AlgorithmKind::Simple,
            log_directory: PathBuf::from("dash-log-files"),
            client_count: 1,
        }
    }
}

/// Simulated shared bottleneck link configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Link rate in bits per second (0 = unlimited)
    pub link_rate_bps: u64,
    /// One-way propagation latency
    pub latency: Duration,
    /// Maximum segment size of one delivered chunk
    pub max_segment_size: u32,
    /// Upper bound of random extra delay per chunk
    pub jitter: Duration,
    /// Probability that a client's connection attempt fails (0.0 to 1.0)
    pub connect_failure_probability: f64,
    /// Start offset between consecutive clients
    pub client_start_stagger: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            link_rate_bps: 100_000_000, // 100 Mbit/s
            latency: Duration::from_millis(10),
            max_segment_size: 1446,
            jitter: Duration::ZERO,
            connect_failure_probability: 0.0,
            client_start_stagger: Duration::ZERO,
        }
    }
}

impl NetworkConfig {
    /// Instantaneous transport with no loss, for scenario tests.
    pub fn instantaneous() -> Self {
        Self {
            link_rate_bps: 0,
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
            connect_failure_probability: 0.0,
            ..Default::default()
        }
    }
}

/// Simulation driver configuration.
///
/// Controls run identity, seeding and termination.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Run index, used for the log subdirectory
    pub simulation_id: u32,
    /// Deterministic seed for reproducible runs
    pub seed: u64,
    /// Simulated time at which the driver stops
    pub stop_time: Duration,
    /// Check session invariants after every event
    pub check_invariants: bool,
    /// Number of consecutive rounds, each with the next id and seed
    pub rounds: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation_id: 0,
            seed: 1,
            stop_time: Duration::from_secs(4000),
            check_invariants: true,
            rounds: 1,
        }
    }
}

impl SimulationConfig {
    /// Creates a configuration for deterministic testing.
    pub fn deterministic_testing() -> Self {
        Self {
            simulation_id: 0,
            seed: 42,                              // Fixed seed for reproducible tests
            stop_time: Duration::from_secs(600),   // Shorter horizon for fast tests
            check_invariants: true,
            rounds: 1,
        }
    }
}

impl StreamsimConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    ///
    /// # Errors
    /// - `StreamsimError::Algorithm` - `STREAMSIM_ALGORITHM` names no registered algorithm
    /// - `StreamsimError::Configuration` - Any other override is set but unparseable
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Applies `STREAMSIM_*` environment overrides on top of `self`.
    ///
    /// Unset variables keep the current setting. A set variable that does not
    /// parse is an error, leaving `self` partially updated.
    ///
    /// # Errors
    /// - `StreamsimError::Algorithm` - `STREAMSIM_ALGORITHM` names no registered algorithm
    /// - `StreamsimError::Configuration` - Any other override is set but unparseable
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_value::<PathBuf>("STREAMSIM_SEGMENT_SIZE_FILE")? {
            self.session.segment_size_file = path;
        }
        if let Some(micros) = env_value::<u64>("STREAMSIM_SEGMENT_DURATION_US")? {
            self.session.segment_duration = Duration::from_micros(micros);
        }
        if let Some(name) = env_raw("STREAMSIM_ALGORITHM")? {
            self.session.algorithm = name.trim().parse::<AlgorithmKind>()?;
        }
        if let Some(path) = env_value::<PathBuf>("STREAMSIM_LOG_DIR")? {
            self.session.log_directory = path;
        }
        if let Some(clients) = env_value::<u32>("STREAMSIM_CLIENTS")? {
            self.session.client_count = clients;
        }

        // Network overrides
        if let Some(rate) = env_value::<u64>("STREAMSIM_LINK_RATE_BPS")? {
            self.network.link_rate_bps = rate;
        }
        if let Some(millis) = env_value::<u64>("STREAMSIM_LATENCY_MS")? {
            self.network.latency = Duration::from_millis(millis);
        }
        if let Some(probability) = env_value::<f64>("STREAMSIM_CONNECT_FAILURE_PROBABILITY")? {
            if !(0.0..=1.0).contains(&probability) {
                return Err(StreamsimError::Configuration {
                    reason: format!(
                        "STREAMSIM_CONNECT_FAILURE_PROBABILITY={probability} outside 0..=1"
                    ),
                });
            }
            self.network.connect_failure_probability = probability;
        }

        // Simulation overrides
        if let Some(seed) = env_value::<u64>("STREAMSIM_SEED")? {
            self.simulation.seed = seed;
        }
        if let Some(id) = env_value::<u32>("STREAMSIM_SIMULATION_ID")? {
            self.simulation.simulation_id = id;
        }
        if let Some(secs) = env_value::<u64>("STREAMSIM_STOP_TIME_SECS")? {
            self.simulation.stop_time = Duration::from_secs(secs);
        }
        Ok(())
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        Self {
            network: NetworkConfig::instantaneous(),
            simulation: SimulationConfig::deterministic_testing(),
            ..Default::default()
        }
    }

    /// Configuration of round `round` (0-based): id and seed advance by the round number.
    pub fn for_round(&self, round: u32) -> Self {
        let mut config = self.clone();
        config.simulation.simulation_id = self.simulation.simulation_id + round;
        config.simulation.seed = self.simulation.seed.wrapping_add(u64::from(round));
        config.simulation.rounds = 1;
        config
    }
}

fn env_raw(key: &str) -> Result<Option<String>> {
    match std::env::var(key) {
        Ok(raw) => Ok(Some(raw)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(StreamsimError::Configuration {
            reason: format!("{key} is not valid unicode"),
        }),
    }
}

fn env_value<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(raw) = env_raw(key)? else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e| StreamsimError::Configuration {
            reason: format!("{key}={raw:?} is not a valid value: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = StreamsimConfig::default();

        assert_eq!(config.session.segment_duration, Duration::from_secs(2));
        assert_eq!(config.session.algorithm, AlgorithmKind::Simple);
        assert_eq!(config.session.client_count, 1);
        assert_eq!(config.network.max_segment_size, 1446);
        assert_eq!(config.network.connect_failure_probability, 0.0);
        assert_eq!(config.simulation.stop_time, Duration::from_secs(4000));
        assert!(config.simulation.check_invariants);
    }

    #[test]
    fn test_config_presets() {
        let testing = StreamsimConfig::for_testing();
        assert_eq!(testing.network.link_rate_bps, 0);
        assert_eq!(testing.network.latency, Duration::ZERO);
        assert_eq!(testing.simulation.seed, 42);
    }

    #[test]
    fn test_rounds_advance_id_and_seed() {
        let mut base = StreamsimConfig::default();
        base.simulation.simulation_id = 3;
        base.simulation.seed = 10;
        base.simulation.rounds = 4;

        let third = base.for_round(2);
        assert_eq!(third.simulation.simulation_id, 5);
        assert_eq!(third.simulation.seed, 12);
        assert_eq!(third.simulation.rounds, 1);
    }

    const ENV_KEYS: [&str; 5] = [
        "STREAMSIM_ALGORITHM",
        "STREAMSIM_CLIENTS",
        "STREAMSIM_SEED",
        "STREAMSIM_LATENCY_MS",
        "STREAMSIM_CONNECT_FAILURE_PROBABILITY",
    ];

    fn set_env(pairs: &[(&str, &str)]) {
        unsafe {
            for key in ENV_KEYS {
                std::env::remove_var(key);
            }
            for (key, value) in pairs {
                std::env::set_var(key, value);
            }
        }
    }

    // Process environment is shared between test threads, so every
    // environment case runs inside this one test.
    #[test]
    fn test_env_override() {
        set_env(&[
            ("STREAMSIM_ALGORITHM", "Festive"),
            ("STREAMSIM_CLIENTS", "8"),
            ("STREAMSIM_SEED", " 12345 "),
        ]);
        let config = StreamsimConfig::from_env().unwrap();
        assert_eq!(config.session.algorithm, AlgorithmKind::Festive);
        assert_eq!(config.session.client_count, 8);
        assert_eq!(config.simulation.seed, 12345);
        assert_eq!(config.network.latency, Duration::from_millis(10));

        set_env(&[("STREAMSIM_ALGORITHM", "dynamic")]);
        let err = StreamsimConfig::from_env().unwrap_err();
        assert!(matches!(err, StreamsimError::Algorithm(_)));
        assert!(err.is_configuration_error());

        set_env(&[("STREAMSIM_LATENCY_MS", "not-a-number")]);
        match StreamsimConfig::from_env() {
            Err(StreamsimError::Configuration { reason }) => {
                assert!(reason.contains("STREAMSIM_LATENCY_MS"));
            }
            other => panic!("expected configuration error, got {other:?}"),
        }

        set_env(&[("STREAMSIM_CONNECT_FAILURE_PROBABILITY", "1.5")]);
        assert!(matches!(
            StreamsimConfig::from_env(),
            Err(StreamsimError::Configuration { .. })
        ));

        set_env(&[]);
        assert!(StreamsimConfig::from_env().is_ok());
    }
}
