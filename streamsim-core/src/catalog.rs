//! Video metadata: representations and per-segment byte sizes.

use std::path::Path;
use std::time::Duration;

use crate::time::{SimTime, duration_micros};

/// Errors raised while loading a video catalog. All are configuration fatals.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read segment size file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No segment sizes read from input")]
    Empty,

    #[error("Representation {representation} has no segments")]
    NoSegments { representation: usize },

    #[error(
        "Representation {representation} has {found} segments, expected {expected}"
    )]
    SegmentCountMismatch {
        representation: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid value {token:?} on line {line}")]
    InvalidToken { line: usize, token: String },

    #[error("Representation {representation} bitrate {bitrate} is lower than its predecessor")]
    UnorderedBitrates { representation: usize, bitrate: u64 },

    #[error("Segment duration must be positive")]
    ZeroSegmentDuration,
}

/// One encoded quality variant of the video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    /// Average bitrate in bits per second
    pub average_bitrate: u64,
    /// Byte size of every segment, in playback order
    pub segment_sizes: Vec<u64>,
}

/// Immutable per-session video metadata.
///
/// Representations are ordered by ascending bitrate and all carry the same
/// number of segments (at least one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCatalog {
    segment_duration: Duration,
    representations: Vec<Representation>,
}

impl VideoCatalog {
    /// Builds a catalog after validating its shape.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Empty` - No representations
    /// - `CatalogError::NoSegments` - A representation without segments
    /// - `CatalogError::SegmentCountMismatch` - Representations disagree on segment count
    /// - `CatalogError::UnorderedBitrates` - Bitrates are not ascending
    /// - `CatalogError::ZeroSegmentDuration` - Segment duration is zero
    pub fn new(
        segment_duration: Duration,
        representations: Vec<Representation>,
    ) -> Result<Self, CatalogError> {
        if segment_duration.is_zero() {
            return Err(CatalogError::ZeroSegmentDuration);
        }
        let first = representations.first().ok_or(CatalogError::Empty)?;
        let expected = first.segment_sizes.len();

        let mut previous_bitrate = 0;
        for (representation, rep) in representations.iter().enumerate() {
            if rep.segment_sizes.is_empty() {
                return Err(CatalogError::NoSegments { representation });
            }
            if rep.segment_sizes.len() != expected {
                return Err(CatalogError::SegmentCountMismatch {
                    representation,
                    expected,
                    found: rep.segment_sizes.len(),
                });
            }
            if rep.average_bitrate < previous_bitrate {
                return Err(CatalogError::UnorderedBitrates {
                    representation,
                    bitrate: rep.average_bitrate,
                });
            }
            previous_bitrate = rep.average_bitrate;
        }

        Ok(Self {
            segment_duration,
            representations,
        })
    }

    /// Parses the segment size text format.
    ///
    /// Each line holds the average bitrate followed by the segment byte sizes
    /// of one representation. Parsing stops at the first empty line.
    ///
    /// # Errors
    ///
    /// - `CatalogError::InvalidToken` - A token is not an unsigned integer
    /// - Any validation error from [`VideoCatalog::new`]
    pub fn parse(input: &str, segment_duration: Duration) -> Result<Self, CatalogError> {
        let mut representations = Vec::new();

        for (index, line) in input.lines().enumerate() {
            if line.trim().is_empty() {
                break;
            }
            let mut values = Vec::new();
            for token in line.split_whitespace() {
                let value = token.parse::<u64>().map_err(|_| CatalogError::InvalidToken {
                    line: index + 1,
                    token: token.to_string(),
                })?;
                values.push(value);
            }
            let average_bitrate = values.remove(0);
            representations.push(Representation {
                average_bitrate,
                segment_sizes: values,
            });
        }

        Self::new(segment_duration, representations)
    }

    /// Builds a catalog whose segments all carry exactly one segment duration
    /// of data at each representation's bitrate.
    ///
    /// # Errors
    ///
    /// - Any validation error from [`VideoCatalog::new`]
    pub fn uniform(
        segment_duration: Duration,
        bitrates: &[u64],
        segments: usize,
    ) -> Result<Self, CatalogError> {
        let micros = u128::from(duration_micros(segment_duration));
        let representations = bitrates
            .iter()
            .map(|&average_bitrate| {
                let size = u64::try_from(u128::from(average_bitrate) * micros / 8_000_000)
                    .unwrap_or(u64::MAX);
                Representation {
                    average_bitrate,
                    segment_sizes: vec![size; segments],
                }
            })
            .collect();
        Self::new(segment_duration, representations)
    }

    /// Loads and parses a segment size file.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Unreadable` - The file cannot be read
    /// - Any error from [`VideoCatalog::parse`]
    pub fn from_file(path: &Path, segment_duration: Duration) -> Result<Self, CatalogError> {
        let contents = std::fs::read_to_string(path).map_err(|source| CatalogError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::parse(&contents, segment_duration)?;
        tracing::debug!(
            "Loaded catalog from {}: {} representations, {} segments",
            path.display(),
            catalog.representation_count(),
            catalog.segment_count()
        );
        Ok(catalog)
    }

    /// Returns the fixed playback duration of one segment.
    pub fn segment_duration(&self) -> Duration {
        self.segment_duration
    }

    /// Returns number of representations.
    pub fn representation_count(&self) -> usize {
        self.representations.len()
    }

    /// Returns number of segments per representation.
    pub fn segment_count(&self) -> usize {
        self.representations[0].segment_sizes.len()
    }

    /// Returns all representations in ascending bitrate order.
    pub fn representations(&self) -> &[Representation] {
        &self.representations
    }

    /// Returns the average bitrate of a representation, if it exists.
    pub fn average_bitrate(&self, representation: usize) -> Option<u64> {
        self.representations
            .get(representation)
            .map(|rep| rep.average_bitrate)
    }

    /// Returns byte size of a segment in a representation, if both exist.
    pub fn segment_size(&self, representation: usize, segment: usize) -> Option<u64> {
        self.representations
            .get(representation)
            .and_then(|rep| rep.segment_sizes.get(segment))
            .copied()
    }

    /// Earliest instant at which `segment` may be requested.
    pub fn availability_time(&self, segment: usize) -> SimTime {
        SimTime::from_micros(duration_micros(self.segment_duration).saturating_mul(segment as u64))
    }
}
