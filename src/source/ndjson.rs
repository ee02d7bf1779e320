//! Newline-delimited JSON reading source
//!
//! Reads headset packets forwarded by a bridge process, one JSON object per
//! line, in the shape the Muse web client produces:
//!
//! ```text
//! {"electrode": 1, "samples": [12.5, -40.1, ...], "timestamp": 1718000000000}
//! {"electrode": "TP10", "samples": [...], "timestamp": 1718000000047}
//! ```
//!
//! Lines that do not parse are logged and skipped. Missing samples may be
//! sent as `null` and are kept as NaN. End of input or a broken connection
//! reports the source as disconnected.
//!
//! Blocking inputs such as stdin are read on a dedicated thread so a read
//! that never returns cannot hold up runtime shutdown.

use std::io::{self, BufRead};
use std::thread;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::channels::{Channel, ChannelFilter, Reading};
use super::{SampleSource, SourceError, SourceStatus, READING_CHANNEL_CAPACITY};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedBlockingReader = Box<dyn io::Read + Send>;

/// Lines buffered between the reader thread and the source task
const LINE_CHANNEL_CAPACITY: usize = 64;

/// Where the lines come from
enum Input {
    Blocking(BoxedBlockingReader),
    Tcp(String),
    Reader(BoxedReader),
}

/// Line stream over either an async reader or a reader thread
enum LineStream {
    Async(Lines<BufReader<BoxedReader>>),
    Thread(mpsc::Receiver<io::Result<String>>),
}

impl LineStream {
    fn from_async(reader: BoxedReader) -> Self {
        LineStream::Async(BufReader::new(reader).lines())
    }

    async fn next_line(&mut self) -> io::Result<Option<String>> {
        match self {
            LineStream::Async(lines) => lines.next_line().await,
            LineStream::Thread(rx) => rx.recv().await.transpose(),
        }
    }
}

/// Read `reader` line by line on a dedicated thread
///
/// The thread ends at end of input, on a read error, or once the receiver
/// is gone and the next line arrives.
fn spawn_line_thread(reader: BoxedBlockingReader) -> Result<LineStream, SourceError> {
    let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);

    thread::Builder::new()
        .name("ndjson-reader".to_string())
        .spawn(move || {
            for line in io::BufReader::new(reader).lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
            debug!("ndjson reader thread stopped");
        })
        .map_err(|e| SourceError::ThreadSpawn(e.to_string()))?;

    Ok(LineStream::Thread(rx))
}

/// Electrode identifier as sent by bridges: index or label
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Electrode {
    Index(usize),
    Label(String),
}

/// One line of input before channel resolution
#[derive(Debug, Deserialize)]
struct WireReading {
    electrode: Electrode,
    #[serde(default)]
    samples: Vec<Option<f64>>,
    #[serde(default)]
    timestamp: f64,
}

impl WireReading {
    /// Resolve to a monitored reading, or `None` for unmonitored electrodes
    fn into_reading(self) -> Option<Reading> {
        let channel = match &self.electrode {
            Electrode::Index(index) => Channel::from_electrode(*index),
            Electrode::Label(label) => Channel::from_label(label),
        }?;
        let samples = self
            .samples
            .into_iter()
            .map(|sample| sample.unwrap_or(f64::NAN))
            .collect();
        Some(Reading::new(channel, samples, self.timestamp))
    }
}

/// Parse a single input line
///
/// Returns `Ok(None)` for well-formed readings on unmonitored electrodes.
fn parse_line(line: &str) -> Result<Option<Reading>, serde_json::Error> {
    let wire: WireReading = serde_json::from_str(line)?;
    Ok(wire.into_reading())
}

/// Source that reads NDJSON readings from stdin, TCP, or any async reader
pub struct NdjsonSource {
    input: Option<Input>,
    task: Option<JoinHandle<()>>,
    status_tx: Option<watch::Sender<SourceStatus>>,
    status_rx: watch::Receiver<SourceStatus>,
}

impl NdjsonSource {
    fn with_input(input: Input) -> Self {
        let (status_tx, status_rx) = watch::channel(SourceStatus::Disconnected);
        Self {
            input: Some(input),
            task: None,
            status_tx: Some(status_tx),
            status_rx,
        }
    }

    /// Read from the process's standard input
    pub fn stdin() -> Self {
        Self::with_input(Input::Blocking(Box::new(io::stdin())))
    }

    /// Connect to a bridge at `addr` (host:port) when subscribed
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::with_input(Input::Tcp(addr.into()))
    }

    /// Read from an arbitrary async reader
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::with_input(Input::Reader(Box::new(reader)))
    }
}

impl SampleSource for NdjsonSource {
    fn subscribe(&mut self, filter: ChannelFilter) -> Result<mpsc::Receiver<Reading>, SourceError> {
        let input = self.input.take().ok_or(SourceError::AlreadySubscribed)?;
        let status_tx = self.status_tx.take().ok_or(SourceError::AlreadySubscribed)?;
        let (reading_tx, reading_rx) = mpsc::channel(READING_CHANNEL_CAPACITY);

        // Reader threads start here so a spawn failure is returned to the caller
        let (lines, connect_to) = match input {
            Input::Blocking(reader) => (Some(spawn_line_thread(reader)?), None),
            Input::Reader(reader) => (Some(LineStream::from_async(reader)), None),
            Input::Tcp(addr) => (None, Some(addr)),
        };

        self.task = Some(tokio::spawn(async move {
            let lines = match (lines, connect_to) {
                (Some(lines), _) => lines,
                (None, Some(addr)) => match TcpStream::connect(&addr).await {
                    Ok(stream) => {
                        info!(%addr, "connected to reading bridge");
                        LineStream::from_async(Box::new(stream))
                    }
                    Err(e) => {
                        warn!(%addr, ?e, "failed to connect to reading bridge");
                        let _ = status_tx.send(SourceStatus::Disconnected);
                        return;
                    }
                },
                (None, None) => return,
            };

            let _ = status_tx.send(SourceStatus::Connected);
            read_lines(lines, filter, reading_tx).await;
            let _ = status_tx.send(SourceStatus::Disconnected);
        }));

        Ok(reading_rx)
    }

    fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn status(&self) -> watch::Receiver<SourceStatus> {
        self.status_rx.clone()
    }
}

impl Drop for NdjsonSource {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Forward parsed lines until end of input or the receiver goes away
async fn read_lines(mut lines: LineStream, filter: ChannelFilter, reading_tx: mpsc::Sender<Reading>) {
    let mut skipped: u64 = 0;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("reading input ended");
                break;
            }
            Err(e) => {
                warn!(?e, "reading input failed");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match parse_line(&line) {
            Ok(Some(reading)) if filter.accepts(reading.channel) => {
                if reading_tx.send(reading).await.is_err() {
                    debug!("reading receiver dropped");
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                skipped += 1;
                warn!(?e, skipped, "skipping malformed reading line");
            }
        }
    }
}
