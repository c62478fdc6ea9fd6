//! Record files written to disk by a configured run.

use std::fs;
use std::time::Duration;

use streamsim_core::test_fixtures::{create_temp_run_dirs, uniform_catalog_text};
use streamsim_core::{LogKind, StreamsimConfig};
use streamsim_sim::StreamingSimulation;

#[test]
fn test_configured_run_writes_six_files_per_client() {
    let text = uniform_catalog_text(&[400_000, 1_200_000], 4, Duration::from_secs(2));
    let (_temp_dir, catalog_path, log_dir) = create_temp_run_dirs(&text);

    let mut config = StreamsimConfig::for_testing();
    config.session.segment_size_file = catalog_path;
    config.session.log_directory = log_dir.clone();
    config.session.client_count = 2;
    config.simulation.simulation_id = 7;

    let mut sim = StreamingSimulation::from_config(config).unwrap();
    let report = sim.run().unwrap();
    assert!(report.completed);

    for client in 0..2 {
        for kind in LogKind::ALL {
            let path = kind.path(&log_dir, 7, client);
            let contents = fs::read_to_string(&path).unwrap();
            let mut lines = contents.lines();
            assert_eq!(lines.next(), Some(kind.header()), "{}", path.display());

            let expected = match kind {
                LogKind::BufferUnderrun => 0,
                _ => 4,
            };
            assert_eq!(lines.count(), expected, "{}", path.display());
        }
    }
    assert!(log_dir.join("SimID_7").join("client1_playbackLog.txt").is_file());
}

#[test]
fn test_unreadable_catalog_is_configuration_error() {
    let (_temp_dir, _catalog_path, log_dir) = create_temp_run_dirs("");

    let mut config = StreamsimConfig::for_testing();
    config.session.segment_size_file = log_dir.join("missing.txt");
    config.session.log_directory = log_dir;

    let err = StreamingSimulation::from_config(config).unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
fn test_empty_catalog_is_rejected() {
    let (_temp_dir, catalog_path, log_dir) = create_temp_run_dirs("");

    let mut config = StreamsimConfig::for_testing();
    config.session.segment_size_file = catalog_path;
    config.session.log_directory = log_dir;

    let err = StreamingSimulation::from_config(config).unwrap_err();
    assert!(err.to_string().contains("Catalog error"));
}
