//! Test fixtures for catalog and log directory setup.
//!
//! Shared by unit tests and, through the `test-utils` feature, by the
//! simulation crate's integration tests.

use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::VideoCatalog;

/// Segment size file text for representations of uniform segment size.
///
/// Every segment of a representation at `bps` carries exactly
/// `bps × segment_duration / 8` bytes.
pub fn uniform_catalog_text(bitrates: &[u64], segments: usize, segment_duration: Duration) -> String {
    bitrates
        .iter()
        .map(|bps| {
            let size = (*bps as u128 * segment_duration.as_micros() / 8_000_000) as u64;
            let sizes: Vec<String> = (0..segments).map(|_| size.to_string()).collect();
            format!("{bps} {}\n", sizes.join(" "))
        })
        .collect()
}

/// In-memory catalog of uniform segment sizes.
///
/// # Panics
///
/// Panics if `bitrates` is empty, unordered or `segments` is zero.
/// This is acceptable in test fixtures where failures indicate a broken test.
pub fn uniform_catalog(bitrates: &[u64], segments: usize, segment_duration: Duration) -> VideoCatalog {
    VideoCatalog::uniform(segment_duration, bitrates, segments).unwrap()
}

// Temp dir guard plus the segment size file and log directory inside it
type TempRunDirs = (tempfile::TempDir, PathBuf, PathBuf);

/// Creates a temporary run directory holding a segment size file and an empty log directory.
///
/// # Panics
///
/// Panics if temporary directory creation or the file write fails.
pub fn create_temp_run_dirs(catalog_text: &str) -> TempRunDirs {
    let temp_dir = tempfile::tempdir().unwrap();
    let catalog_path = temp_dir.path().join("segmentSizes.txt");
    let log_dir = temp_dir.path().join("logs");

    std::fs::write(&catalog_path, catalog_text).unwrap();
    std::fs::create_dir_all(&log_dir).unwrap();

    (temp_dir, catalog_path, log_dir)
}
