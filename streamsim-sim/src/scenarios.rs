//! Pre-built simulation scenarios for common streaming conditions.
//!
//! Each scenario pairs a configuration with a synthetic catalog so it runs
//! without any input files.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use streamsim_core::catalog::Representation;
use streamsim_core::config::{NetworkConfig, SimulationConfig};
use streamsim_core::{AlgorithmKind, CatalogError, StreamsimConfig, VideoCatalog};

use crate::deterministic::{LogTarget, SimulationError, StreamingSimulation};

const SEGMENT_DURATION: Duration = Duration::from_secs(2);

/// Bitrate ladder shared by the multi-representation scenarios.
const LADDER_BPS: [u64; 5] = [400_000, 1_000_000, 2_500_000, 5_000_000, 8_000_000];

/// Available canned scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioKind {
    /// Unlimited link, no latency: playback never stalls
    Ideal,
    /// One oversized segment forces a single underrun
    SlowSegment,
    /// Many clients contend for one bottleneck link with jitter
    Congested,
    /// Staggered clients, some of which fail to connect
    FlakyConnections,
}

impl ScenarioKind {
    /// All scenarios.
    pub const ALL: [ScenarioKind; 4] = [
        ScenarioKind::Ideal,
        ScenarioKind::SlowSegment,
        ScenarioKind::Congested,
        ScenarioKind::FlakyConnections,
    ];

    /// Scenario name.
    pub fn as_str(self) -> &'static str {
        match self {
            ScenarioKind::Ideal => "ideal",
            ScenarioKind::SlowSegment => "slow-segment",
            ScenarioKind::Congested => "congested",
            ScenarioKind::FlakyConnections => "flaky-connections",
        }
    }

    /// Builds the scenario for `seed` with every client running `algorithm`.
    ///
    /// # Errors
    ///
    /// - `CatalogError` - Synthetic catalog failed validation
    pub fn build(self, seed: u64, algorithm: AlgorithmKind) -> Result<Scenario, CatalogError> {
        let mut config = StreamsimConfig {
            simulation: SimulationConfig {
                seed,
                ..SimulationConfig::default()
            },
            ..StreamsimConfig::default()
        };
        config.session.algorithm = algorithm;
        config.session.segment_duration = SEGMENT_DURATION;

        let catalog = match self {
            ScenarioKind::Ideal => {
                config.network = NetworkConfig::instantaneous();
                VideoCatalog::uniform(SEGMENT_DURATION, &LADDER_BPS, 30)?
            }
            ScenarioKind::SlowSegment => {
                // 2 Mbit/s link: regular segments take 1 s, segment 1 takes 4 s
                config.network = NetworkConfig {
                    link_rate_bps: 2_000_000,
                    latency: Duration::ZERO,
                    ..NetworkConfig::default()
                };
                let mut sizes = vec![250_000; 6];
                sizes[1] = 1_000_000;
                VideoCatalog::new(
                    SEGMENT_DURATION,
                    vec![Representation {
                        average_bitrate: 1_000_000,
                        segment_sizes: sizes,
                    }],
                )?
            }
            ScenarioKind::Congested => {
                config.session.client_count = 8;
                config.network = NetworkConfig {
                    link_rate_bps: 20_000_000,
                    latency: Duration::from_millis(20),
                    jitter: Duration::from_millis(2),
                    ..NetworkConfig::default()
                };
                VideoCatalog::uniform(SEGMENT_DURATION, &LADDER_BPS, 60)?
            }
            ScenarioKind::FlakyConnections => {
                config.session.client_count = 6;
                config.network = NetworkConfig {
                    link_rate_bps: 50_000_000,
                    latency: Duration::from_millis(10),
                    connect_failure_probability: 0.3,
                    client_start_stagger: Duration::from_secs(1),
                    ..NetworkConfig::default()
                };
                VideoCatalog::uniform(SEGMENT_DURATION, &LADDER_BPS, 20)?
            }
        };

        Ok(Scenario {
            kind: self,
            config,
            catalog: Arc::new(catalog),
        })
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| SimulationError::UnknownScenario {
                name: s.to_string(),
                known: Self::ALL
                    .iter()
                    .map(|kind| kind.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Ready-to-run scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    /// Which scenario this is
    pub kind: ScenarioKind,
    /// Simulation configuration
    pub config: StreamsimConfig,
    /// Synthetic video catalog
    pub catalog: Arc<VideoCatalog>,
}

impl Scenario {
    /// Creates the simulation for this scenario.
    ///
    /// # Errors
    ///
    /// - `SimulationError::LogSetup` - Log files cannot be created
    pub fn simulation(&self, logs: LogTarget) -> Result<StreamingSimulation, SimulationError> {
        StreamingSimulation::new(self.config.clone(), Arc::clone(&self.catalog), logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_names_round_trip() {
        for kind in ScenarioKind::ALL {
            assert_eq!(kind.as_str().parse::<ScenarioKind>().unwrap(), kind);
        }
        let err = "lossy".parse::<ScenarioKind>().unwrap_err();
        assert!(err.to_string().contains("slow-segment"));
    }

    #[test]
    fn test_ideal_scenario_has_no_underruns() {
        let scenario = ScenarioKind::Ideal.build(1, AlgorithmKind::Simple).unwrap();
        let report = scenario.simulation(LogTarget::Memory).unwrap().run().unwrap();

        assert!(report.completed);
        assert_eq!(report.clients[0].segments_played, 30);
        assert_eq!(report.clients[0].underrun_count, 0);
    }

    #[test]
    fn test_slow_segment_scenario_stalls_once() {
        let scenario = ScenarioKind::SlowSegment
            .build(1, AlgorithmKind::Simple)
            .unwrap();
        let report = scenario.simulation(LogTarget::Memory).unwrap().run().unwrap();

        let client = &report.clients[0];
        assert!(report.completed);
        assert_eq!(client.underrun_count, 1);
        assert!((client.total_stall_secs - 3.0).abs() < 1e-9);
    }
}
