//! Client side of the snapshot feed.
//!
//! Reads snapshots from an async byte stream (normally a TCP connection to
//! `signalwatch run`) and tracks sequence gaps so a consumer can tell when
//! it missed updates.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use signalwatch_core::{CodecError, Snapshot, WireFormat};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::duration::format_duration;

/// One snapshot as seen by a watcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    pub snapshot: Snapshot,
    /// Snapshots skipped since the previous one received.
    pub missed: u64,
}

/// A stream of snapshots decoded by a background task.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use signalwatch::SnapshotStream;
/// use signalwatch_core::WireFormat;
///
/// # tokio_test::block_on(async {
/// let data = b"{\"sequence_number\":1,\"vehicle_count\":2,\"average_vehicle_count\":2.0,\
/// \"congestion_level\":\"low\",\"signal_state\":\"green\",\"elapsed_in_state\":0,\
/// \"produced_at_ms\":0}\n";
/// let reader = Cursor::new(data.to_vec());
/// let mut stream = SnapshotStream::spawn(reader, WireFormat::Json, "example");
/// let received = stream.next().await.unwrap();
/// assert_eq!(received.snapshot.sequence_number, 1);
/// # });
/// ```
#[derive(Debug)]
pub struct SnapshotStream {
    receiver: mpsc::Receiver<Snapshot>,
    description: String,
    last_sequence: Option<u64>,
    missed_total: u64,
    counters: Arc<Counters>,
}

/// Largest CBOR frame accepted from the wire.
///
/// A snapshot encodes to well under a kilobyte; anything near this size
/// means the stream is corrupt or not a snapshot feed at all.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, Default)]
struct Counters {
    malformed: AtomicU64,
    incompatible: AtomicU64,
}

impl SnapshotStream {
    /// Spawn a background task that decodes snapshots from `reader`.
    pub fn spawn<R>(reader: R, format: WireFormat, description: &str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(16);
        let counters = Arc::new(Counters::default());
        let task_counters = counters.clone();
        let desc = description.to_string();

        tokio::spawn(async move {
            let result = match format {
                WireFormat::Json => read_json_lines(reader, tx, &task_counters).await,
                WireFormat::Cbor => read_cbor_frames(reader, tx, &task_counters).await,
            };
            match result {
                Ok(()) => debug!(source = %desc, "snapshot stream ended"),
                Err(e) => warn!(source = %desc, error = %e, "snapshot stream failed"),
            }
        });

        Self {
            receiver: rx,
            description: format!("stream: {}", description),
            last_sequence: None,
            missed_total: 0,
            counters,
        }
    }

    /// Connect to a `signalwatch run` feed.
    pub async fn connect(addr: &str, format: WireFormat) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::spawn(stream, format, addr))
    }

    /// Wait for the next snapshot. `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Received> {
        let snapshot = self.receiver.recv().await?;
        Some(self.track(snapshot))
    }

    /// Take a snapshot if one is ready, without waiting.
    pub fn poll(&mut self) -> Option<Received> {
        let snapshot = self.receiver.try_recv().ok()?;
        Some(self.track(snapshot))
    }

    fn track(&mut self, snapshot: Snapshot) -> Received {
        let missed = match self.last_sequence {
            Some(last) => snapshot.sequence_number.saturating_sub(last).saturating_sub(1),
            None => 0,
        };
        self.last_sequence = Some(snapshot.sequence_number);
        self.missed_total += missed;
        Received { snapshot, missed }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Total snapshots skipped over the life of the stream.
    pub fn missed_total(&self) -> u64 {
        self.missed_total
    }

    /// Frames that could not be decoded.
    pub fn malformed(&self) -> u64 {
        self.counters.malformed.load(Ordering::Relaxed)
    }

    /// Snapshots dropped because their schema major version differs.
    pub fn incompatible(&self) -> u64 {
        self.counters.incompatible.load(Ordering::Relaxed)
    }
}

/// What to do after handing one decoded frame on.
enum Delivery {
    Continue,
    Closed,
}

async fn deliver(
    decoded: Result<Snapshot, CodecError>,
    tx: &mpsc::Sender<Snapshot>,
    counters: &Counters,
) -> Delivery {
    match decoded {
        Ok(snapshot) if !snapshot.version.is_compatible() => {
            counters.incompatible.fetch_add(1, Ordering::Relaxed);
            warn!(
                major = snapshot.version.major,
                minor = snapshot.version.minor,
                sequence = snapshot.sequence_number,
                "skipping snapshot with incompatible schema"
            );
            Delivery::Continue
        }
        Ok(snapshot) => match tx.send(snapshot).await {
            Ok(()) => Delivery::Continue,
            Err(_) => Delivery::Closed,
        },
        Err(e) => {
            counters.malformed.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "skipping malformed snapshot");
            Delivery::Continue
        }
    }
}

async fn read_json_lines<R>(
    reader: R,
    tx: mpsc::Sender<Snapshot>,
    counters: &Counters,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        // Raw bytes, so a line that is not UTF-8 is just one bad frame.
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let decoded = WireFormat::Json.decode(&line);
        if let Delivery::Closed = deliver(decoded, &tx, counters).await {
            return Ok(());
        }
    }
}

async fn read_cbor_frames<R>(
    reader: R,
    tx: mpsc::Sender<Snapshot>,
    counters: &Counters,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut header = [0u8; 4];
    let mut payload = Vec::new();

    loop {
        match reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        }
        let len = u32::from_be_bytes(header) as usize;
        if len > MAX_FRAME_LEN {
            // Framing is lost; there is no way to find the next header.
            counters.malformed.fetch_add(1, Ordering::Relaxed);
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {} bytes exceeds limit of {}", len, MAX_FRAME_LEN),
            ));
        }
        payload.resize(len, 0);
        reader.read_exact(&mut payload).await?;

        let decoded = WireFormat::Cbor.decode(&payload);
        if let Delivery::Closed = deliver(decoded, &tx, counters).await {
            return Ok(());
        }
    }
}

/// One-line rendering used by `signalwatch watch`.
pub fn format_snapshot(snapshot: &Snapshot) -> String {
    let rate = snapshot
        .cycle_rate
        .map(|r| format!("{:.1}/s", r))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "#{:<6} frame {:<5} vehicles {:>3}  avg {:>6.2}  {:<6}  {:<6} {:>8}  {}",
        snapshot.sequence_number,
        snapshot.frame_number,
        snapshot.vehicle_count,
        snapshot.average_vehicle_count,
        snapshot.congestion_level.label(),
        snapshot.signal_state.label(),
        format_duration(snapshot.elapsed_in_state.to_duration()),
        rate,
    )
}
