//! CLI command implementations

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Subcommand};
use streamsim_core::{AlgorithmKind, StreamsimConfig};
use streamsim_sim::{LogTarget, ScenarioKind, SimulationReport, StreamingSimulation};
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run clients against a segment size file
    Run(RunArgs),
    /// Run a built-in scenario that needs no input files
    Scenario {
        /// Scenario name
        name: String,
        /// Adaptation algorithm every client runs
        #[arg(short, long, default_value = "simple")]
        algorithm: String,
        /// Seed for jitter and connection failures
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Write record files here instead of keeping them in memory
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered adaptation algorithms and scenarios
    List,
}

/// Options of the `run` command. Unset options keep their environment or default value.
#[derive(Args)]
pub struct RunArgs {
    /// Segment size file, one representation per line
    #[arg(long)]
    segment_size_file: Option<PathBuf>,
    /// Segment duration in microseconds
    #[arg(long)]
    segment_duration: Option<u64>,
    /// Adaptation algorithm every client runs
    #[arg(short, long)]
    algorithm: Option<String>,
    /// Number of clients
    #[arg(short = 'n', long)]
    clients: Option<u32>,
    /// Root directory of the record files
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// Simulation id of the first round
    #[arg(long)]
    simulation_id: Option<u32>,
    /// Seed of the first round
    #[arg(long)]
    seed: Option<u64>,
    /// Number of rounds; id and seed advance by one per round
    #[arg(long, default_value_t = 1)]
    rounds: u32,
    /// Shared link rate in bits per second, 0 for unlimited
    #[arg(long)]
    link_rate: Option<u64>,
    /// One-way latency in milliseconds
    #[arg(long)]
    latency_ms: Option<u64>,
    /// Probability that a connection attempt fails
    #[arg(long)]
    connect_failure_probability: Option<f64>,
    /// Simulated time limit in seconds
    #[arg(long)]
    stop_time: Option<u64>,
    /// Print reports as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn into_config(self) -> anyhow::Result<(StreamsimConfig, bool)> {
        let mut config = StreamsimConfig::from_env()?;

        if let Some(path) = self.segment_size_file {
            config.session.segment_size_file = path;
        }
        if let Some(micros) = self.segment_duration {
            config.session.segment_duration = Duration::from_micros(micros);
        }
        if let Some(name) = self.algorithm {
            config.session.algorithm = name.parse::<AlgorithmKind>()?;
        }
        if let Some(clients) = self.clients {
            config.session.client_count = clients;
        }
        if let Some(dir) = self.log_dir {
            config.session.log_directory = dir;
        }
        if let Some(id) = self.simulation_id {
            config.simulation.simulation_id = id;
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if let Some(rate) = self.link_rate {
            config.network.link_rate_bps = rate;
        }
        if let Some(millis) = self.latency_ms {
            config.network.latency = Duration::from_millis(millis);
        }
        if let Some(probability) = self.connect_failure_probability {
            anyhow::ensure!(
                (0.0..=1.0).contains(&probability),
                "connect failure probability {probability} outside 0..=1"
            );
            config.network.connect_failure_probability = probability;
        }
        if let Some(secs) = self.stop_time {
            config.simulation.stop_time = Duration::from_secs(secs);
        }
        config.simulation.rounds = self.rounds.max(1);

        Ok((config, self.json))
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => run_simulation(args),
        Commands::Scenario {
            name,
            algorithm,
            seed,
            log_dir,
            json,
        } => run_scenario(&name, &algorithm, seed, log_dir, json),
        Commands::List => {
            list_registry();
            Ok(())
        }
    }
}

/// Run every configured round against the segment size file
///
/// # Errors
/// - `SimulationError::Catalog` - Segment size file unreadable or malformed
/// - `SimulationError::Session` - A client aborted
/// - `AlgorithmError::UnknownAlgorithm` - Algorithm name not registered
pub fn run_simulation(args: RunArgs) -> anyhow::Result<()> {
    let (config, json) = args.into_config()?;
    std::fs::create_dir_all(&config.session.log_directory).with_context(|| {
        format!(
            "cannot create log directory {}",
            config.session.log_directory.display()
        )
    })?;

    let rounds = config.simulation.rounds;
    let mut reports = Vec::with_capacity(rounds as usize);
    for round in 0..rounds {
        let round_config = config.for_round(round);
        info!(
            round,
            simulation_id = round_config.simulation.simulation_id,
            seed = round_config.simulation.seed,
            "Starting round"
        );
        let mut sim = StreamingSimulation::from_config(round_config)?;
        let report = sim.run()?;
        if !json {
            print!("{}", report.summary());
            println!(
                "Logs: {}",
                config
                    .session
                    .log_directory
                    .join(format!("SimID_{}", report.simulation_id))
                    .display()
            );
        }
        reports.push(report);
    }

    if json {
        print_json(&reports)?;
    }
    Ok(())
}

/// Run a built-in scenario
///
/// # Errors
/// - `SimulationError::UnknownScenario` - Scenario name not registered
/// - `AlgorithmError::UnknownAlgorithm` - Algorithm name not registered
/// - `SimulationError` - The run aborted
pub fn run_scenario(
    name: &str,
    algorithm: &str,
    seed: u64,
    log_dir: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let kind = name.parse::<ScenarioKind>()?;
    let algorithm = algorithm.parse::<AlgorithmKind>()?;
    let scenario = kind.build(seed, algorithm)?;

    let target = match log_dir {
        Some(dir) => LogTarget::Directory(dir),
        None => LogTarget::Memory,
    };
    let report = scenario.simulation(target)?.run()?;

    if json {
        print_json(std::slice::from_ref(&report))
    } else {
        println!("Scenario: {kind}");
        print!("{}", report.summary());
        Ok(())
    }
}

fn print_json(reports: &[SimulationReport]) -> anyhow::Result<()> {
    let text = match reports {
        [single] => single.to_json()?,
        _ => serde_json::to_string_pretty(reports)?,
    };
    println!("{text}");
    Ok(())
}

fn list_registry() {
    println!("Adaptation algorithms:");
    for kind in AlgorithmKind::ALL {
        println!("  {kind}");
    }
    println!("\nScenarios:");
    for kind in ScenarioKind::ALL {
        println!("  {kind}");
    }
}
