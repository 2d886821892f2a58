//! Snapshot - the state of the pipeline after one cycle.

use crate::{CongestionLevel, Microseconds, SchemaVersion, SignalPhase};

/// The published state of one pipeline cycle.
///
/// A snapshot is built once per cycle and never mutated afterwards. It is
/// the only value that crosses from the pipeline to the broadcast hub and
/// on to subscribers. `sequence_number` increases by one per published
/// snapshot, so consumers can detect gaps when they fall behind.
///
/// # Example
///
/// ```rust
/// use signalwatch_types::{CongestionLevel, SignalPhase, Snapshot};
/// use std::time::Duration;
///
/// let snapshot = Snapshot::builder()
///     .sequence_number(1)
///     .vehicle_count(3)
///     .average_vehicle_count(3.0)
///     .congestion_level(CongestionLevel::Low)
///     .signal(SignalPhase::Green, Duration::from_millis(33))
///     .produced_at_ms(1703160000000)
///     .build();
///
/// // Serialize with serde (requires "serde" feature)
/// // let json = serde_json::to_string(&snapshot)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Snapshot {
    /// Schema version for forward compatibility.
    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(0))]
    pub version: SchemaVersion,

    /// Monotonic publish counter; the first published snapshot is 1.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub sequence_number: u64,

    /// Index of the frame within the current pass over the source.
    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(2))]
    pub frame_number: u64,

    /// Vehicles detected in this cycle's frame.
    #[cfg_attr(feature = "minicbor", n(3))]
    pub vehicle_count: u32,

    /// Mean vehicle count over the estimator's history window.
    #[cfg_attr(feature = "minicbor", n(4))]
    pub average_vehicle_count: f64,

    /// Congestion classification of `average_vehicle_count`.
    #[cfg_attr(feature = "minicbor", n(5))]
    pub congestion_level: CongestionLevel,

    /// Signal phase after this cycle's controller tick.
    #[cfg_attr(feature = "minicbor", n(6))]
    pub signal_state: SignalPhase,

    /// Time spent in `signal_state` so far.
    #[cfg_attr(feature = "minicbor", n(7))]
    pub elapsed_in_state: Microseconds,

    /// Pipeline cycles per second, measured over recent cycles.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "minicbor", n(8))]
    pub cycle_rate: Option<f64>,

    /// Unix timestamp in milliseconds when the frame was captured.
    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(9))]
    pub captured_at_ms: u64,

    /// Unix timestamp in milliseconds when this snapshot was assembled.
    #[cfg_attr(feature = "minicbor", n(10))]
    pub produced_at_ms: u64,
}

impl Snapshot {
    /// Create a builder for constructing snapshots.
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    /// True if `next` directly follows this snapshot with no missed sequence numbers.
    pub fn is_followed_by(&self, next: &Snapshot) -> bool {
        next.sequence_number == self.sequence_number + 1
    }

    /// Number of snapshots missed between this one and `next`.
    pub fn gap_before(&self, next: &Snapshot) -> u64 {
        next.sequence_number
            .saturating_sub(self.sequence_number)
            .saturating_sub(1)
    }
}

/// Builder for constructing `Snapshot` instances.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    sequence_number: u64,
    frame_number: u64,
    vehicle_count: u32,
    average_vehicle_count: f64,
    congestion_level: CongestionLevel,
    signal_state: SignalPhase,
    elapsed_in_state: Microseconds,
    cycle_rate: Option<f64>,
    captured_at_ms: Option<u64>,
    produced_at_ms: Option<u64>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = sequence_number;
        self
    }

    pub fn frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = frame_number;
        self
    }

    pub fn vehicle_count(mut self, count: u32) -> Self {
        self.vehicle_count = count;
        self
    }

    pub fn average_vehicle_count(mut self, average: f64) -> Self {
        self.average_vehicle_count = average;
        self
    }

    pub fn congestion_level(mut self, level: CongestionLevel) -> Self {
        self.congestion_level = level;
        self
    }

    /// Set the signal phase and the time spent in it.
    pub fn signal(mut self, phase: SignalPhase, elapsed: impl Into<Microseconds>) -> Self {
        self.signal_state = phase;
        self.elapsed_in_state = elapsed.into();
        self
    }

    /// Set the measured cycle rate (cycles per second).
    pub fn cycle_rate(mut self, rate: Option<f64>) -> Self {
        self.cycle_rate = rate;
        self
    }

    /// Set the capture timestamp (milliseconds since Unix epoch).
    pub fn captured_at_ms(mut self, ts: u64) -> Self {
        self.captured_at_ms = Some(ts);
        self
    }

    /// Set the production timestamp (milliseconds since Unix epoch).
    pub fn produced_at_ms(mut self, ts: u64) -> Self {
        self.produced_at_ms = Some(ts);
        self
    }

    /// Build the snapshot.
    ///
    /// A missing production timestamp defaults to now; a missing capture
    /// timestamp defaults to the production timestamp.
    #[cfg(feature = "std")]
    pub fn build(self) -> Snapshot {
        let produced_at_ms = self.produced_at_ms.unwrap_or_else(current_timestamp_ms);
        self.finish(produced_at_ms)
    }

    /// Build the snapshot (for no_std, missing timestamps are 0).
    #[cfg(not(feature = "std"))]
    pub fn build(self) -> Snapshot {
        let produced_at_ms = self.produced_at_ms.unwrap_or(0);
        self.finish(produced_at_ms)
    }

    fn finish(self, produced_at_ms: u64) -> Snapshot {
        Snapshot {
            version: SchemaVersion::current(),
            sequence_number: self.sequence_number,
            frame_number: self.frame_number,
            vehicle_count: self.vehicle_count,
            average_vehicle_count: self.average_vehicle_count,
            congestion_level: self.congestion_level,
            signal_state: self.signal_state,
            elapsed_in_state: self.elapsed_in_state,
            cycle_rate: self.cycle_rate,
            captured_at_ms: self.captured_at_ms.unwrap_or(produced_at_ms),
            produced_at_ms,
        }
    }
}

/// Get current timestamp in milliseconds since Unix epoch.
#[cfg(feature = "std")]
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
