//! Per-client record streams for offline analysis.
//!
//! Six newline-delimited streams per client, each starting with a header
//! line. Every record is flushed as soon as it is written so a run that is
//! stopped by the driver still leaves complete lines behind.

use std::fs::{File, create_dir_all};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::abr::AlgorithmDecision;
use crate::buffer::BufferSample;
use crate::throughput::SegmentTransfer;
use crate::time::SimTime;

/// Record stream kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    Download,
    Playback,
    Adaptation,
    Buffer,
    Throughput,
    BufferUnderrun,
}

impl LogKind {
    /// All kinds in file creation order.
    pub const ALL: [LogKind; 6] = [
        LogKind::Download,
        LogKind::Playback,
        LogKind::Adaptation,
        LogKind::Buffer,
        LogKind::Throughput,
        LogKind::BufferUnderrun,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// File name suffix.
    pub fn file_stem(self) -> &'static str {
        match self {
            LogKind::Download => "downloadLog",
            LogKind::Playback => "playbackLog",
            LogKind::Adaptation => "adaptationLog",
            LogKind::Buffer => "bufferLog",
            LogKind::Throughput => "throughputLog",
            LogKind::BufferUnderrun => "bufferUnderrunLog",
        }
    }

    /// Header line written when the stream opens.
    pub fn header(self) -> &'static str {
        match self {
            LogKind::Download => {
                "Segment_Index Download_Request_Sent Download_Start Download_End Segment_Size"
            }
            LogKind::Playback => {
                "Segment_Index Became_Available Playback_Start Live_Latency Quality_Level"
            }
            LogKind::Adaptation => {
                "Segment_Index Rep_Level Decision_Point_Of_Time Case Delay DelayCase BandwidthEstimate"
            }
            LogKind::Buffer => "     Time_Now  Buffer_Level",
            LogKind::Throughput => "     Time_Now Bits_Per_Second",
            LogKind::BufferUnderrun => "Buffer_Underrun_Started_At         Until",
        }
    }

    /// Path of this stream for a client under `directory`.
    pub fn path(self, directory: &Path, simulation_id: u32, client_id: u32) -> PathBuf {
        directory
            .join(format!("SimID_{simulation_id}"))
            .join(format!("client{client_id}_{}.txt", self.file_stem()))
    }
}

/// Shared in-memory byte buffer, readable while the logger writes to it.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog(Arc<Mutex<Vec<u8>>>);

impl MemoryLog {
    /// Creates empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Returns written lines without the header.
    pub fn records(&self) -> Vec<String> {
        self.contents()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }
}

impl Write for MemoryLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Readers for the six in-memory streams of one client.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogs {
    streams: [MemoryLog; 6],
}

impl MemoryLogs {
    /// Returns the stream of `kind`.
    pub fn get(&self, kind: LogKind) -> &MemoryLog {
        &self.streams[kind.index()]
    }
}

type Sink = Box<dyn Write + Send>;

/// Writer for the six record streams of one client.
pub struct SessionLogger {
    sinks: Option<[Sink; 6]>,
    segment_duration_secs: f64,
}

impl SessionLogger {
    /// Opens the six log files of a client, creating the simulation directory.
    ///
    /// # Errors
    ///
    /// - `io::Error` - Directory or file cannot be created
    pub fn create(
        directory: &Path,
        simulation_id: u32,
        client_id: u32,
        segment_duration: std::time::Duration,
    ) -> io::Result<Self> {
        create_dir_all(directory.join(format!("SimID_{simulation_id}")))?;

        let open = |kind: LogKind| -> io::Result<Sink> {
            let file = File::create(kind.path(directory, simulation_id, client_id))?;
            Ok(Box::new(BufWriter::new(file)))
        };
        let sinks = [
            open(LogKind::Download)?,
            open(LogKind::Playback)?,
            open(LogKind::Adaptation)?,
            open(LogKind::Buffer)?,
            open(LogKind::Throughput)?,
            open(LogKind::BufferUnderrun)?,
        ];
        Self::with_sinks(sinks, segment_duration)
    }

    /// Creates a logger writing into shared memory buffers.
    pub fn in_memory(segment_duration: std::time::Duration) -> (Self, MemoryLogs) {
        let logs = MemoryLogs::default();
        let sinks: [Sink; 6] = std::array::from_fn(|i| Box::new(logs.streams[i].clone()) as Sink);
        let logger = Self::with_sinks(sinks, segment_duration)
            .unwrap_or_else(|_| unreachable!("in-memory writes are infallible"));
        (logger, logs)
    }

    fn with_sinks(sinks: [Sink; 6], segment_duration: std::time::Duration) -> io::Result<Self> {
        let mut logger = Self {
            sinks: Some(sinks),
            segment_duration_secs: segment_duration.as_secs_f64(),
        };
        for kind in LogKind::ALL {
            logger.write_line(kind, format_args!("{}\n", kind.header()))?;
        }
        Ok(logger)
    }

    /// Returns true once [`SessionLogger::close`] ran.
    pub fn is_closed(&self) -> bool {
        self.sinks.is_none()
    }

    fn write_line(&mut self, kind: LogKind, line: std::fmt::Arguments<'_>) -> io::Result<()> {
        let sinks = self
            .sinks
            .as_mut()
            .ok_or_else(|| io::Error::other("session log already closed"))?;
        let sink = &mut sinks[kind.index()];
        sink.write_fmt(line)?;
        sink.flush()
    }

    /// Records a completed segment download.
    ///
    /// # Errors
    ///
    /// - `io::Error` - Write failed or logger closed
    pub fn download(&mut self, segment: usize, transfer: &SegmentTransfer) -> io::Result<()> {
        self.write_line(
            LogKind::Download,
            format_args!(
                "{} {:.6} {:.6} {:.6} {}\n",
                segment,
                transfer.request_sent_at.as_secs_f64(),
                transfer.transfer_start_at.as_secs_f64(),
                transfer.transfer_end_at.as_secs_f64(),
                transfer.bytes_received
            ),
        )
    }

    /// Records the start of a segment's playback.
    ///
    /// Live latency is measured from the moment the segment's content began
    /// to be produced, one segment duration before it became available.
    ///
    /// # Errors
    ///
    /// - `io::Error` - Write failed or logger closed
    pub fn playback(
        &mut self,
        segment: usize,
        available_at: SimTime,
        started_at: SimTime,
        representation: usize,
    ) -> io::Result<()> {
        let available = available_at.as_secs_f64();
        let live_latency = started_at.as_secs_f64() - (available - self.segment_duration_secs);
        self.write_line(
            LogKind::Playback,
            format_args!(
                "{} {:.6} {:.6} {:.6} {}\n",
                segment,
                available,
                started_at.as_secs_f64(),
                live_latency,
                representation
            ),
        )
    }

    /// Records an adaptation decision.
    ///
    /// # Errors
    ///
    /// - `io::Error` - Write failed or logger closed
    pub fn adaptation(&mut self, segment: usize, decision: &AlgorithmDecision) -> io::Result<()> {
        self.write_line(
            LogKind::Adaptation,
            format_args!(
                "{} {} {:.6} {} {:.6} {} {:.6}\n",
                segment,
                decision.representation,
                decision.decision_time.as_secs_f64(),
                decision.decision_case,
                decision.next_download_delay.as_secs_f64(),
                decision.delay_case,
                decision.bandwidth_estimate
            ),
        )
    }

    /// Records a buffer timeline sample.
    ///
    /// # Errors
    ///
    /// - `io::Error` - Write failed or logger closed
    pub fn buffer(&mut self, sample: &BufferSample) -> io::Result<()> {
        self.write_line(
            LogKind::Buffer,
            format_args!(
                "{:>13.6} {:>13.6}\n",
                sample.at.as_secs_f64(),
                sample.level.as_secs_f64()
            ),
        )
    }

    /// Records the throughput of a completed transfer.
    ///
    /// # Errors
    ///
    /// - `io::Error` - Write failed or logger closed
    pub fn throughput(&mut self, at: SimTime, bits_per_second: f64) -> io::Result<()> {
        self.write_line(
            LogKind::Throughput,
            format_args!("{:>13.6} {:.6}\n", at.as_secs_f64(), bits_per_second),
        )
    }

    /// Opens an underrun interval. The line is completed by [`SessionLogger::underrun_end`].
    ///
    /// # Errors
    ///
    /// - `io::Error` - Write failed or logger closed
    pub fn underrun_start(&mut self, at: SimTime) -> io::Result<()> {
        self.write_line(
            LogKind::BufferUnderrun,
            format_args!("{:>26.6} ", at.as_secs_f64()),
        )
    }

    /// Closes an underrun interval.
    ///
    /// # Errors
    ///
    /// - `io::Error` - Write failed or logger closed
    pub fn underrun_end(&mut self, at: SimTime) -> io::Result<()> {
        self.write_line(
            LogKind::BufferUnderrun,
            format_args!("{:>13.6}\n", at.as_secs_f64()),
        )
    }

    /// Flushes and releases all streams. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// - `io::Error` - Final flush failed
    pub fn close(&mut self) -> io::Result<()> {
        if let Some(mut sinks) = self.sinks.take() {
            for sink in sinks.iter_mut() {
                sink.flush()?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SessionLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLogger")
            .field("closed", &self.is_closed())
            .finish()
    }
}
