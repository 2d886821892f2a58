//! Snapshot assembly from one cycle's results.

use signalwatch_types::{CongestionLevel, Snapshot};

use crate::controller::SignalState;

/// One frame's detection result, as seen by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub vehicle_count: u32,
    pub sequence_number: u64,
    /// Position of the frame within the current pass over the source.
    pub frame_number: u64,
    /// Unix timestamp in milliseconds.
    pub captured_at_ms: u64,
}

/// Estimator output for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub average: f64,
    pub level: CongestionLevel,
}

/// Combine one cycle's results into an immutable snapshot.
pub fn assemble(
    observation: &Observation,
    estimate: Estimate,
    signal: SignalState,
    cycle_rate: Option<f64>,
) -> Snapshot {
    Snapshot::builder()
        .sequence_number(observation.sequence_number)
        .frame_number(observation.frame_number)
        .vehicle_count(observation.vehicle_count)
        .average_vehicle_count(estimate.average)
        .congestion_level(estimate.level)
        .signal(signal.phase, signal.elapsed)
        .cycle_rate(cycle_rate)
        .captured_at_ms(observation.captured_at_ms)
        .build()
}
