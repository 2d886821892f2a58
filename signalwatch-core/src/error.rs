//! Error types for the pipeline and its collaborators.

use std::path::PathBuf;

use thiserror::Error;

use crate::orchestrator::Lifecycle;

/// Errors surfaced to the caller of [`Orchestrator::start`](crate::Orchestrator::start).
///
/// Faults inside a running cycle never reach the caller; they are logged
/// and the cycle is skipped.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// `start()` was called outside the `Idle` state.
    #[error("pipeline cannot start from the {0} state")]
    InvalidState(Lifecycle),

    /// The frame source could not be opened.
    #[error("frame source failed to initialize: {0}")]
    SourceInit(#[source] SourceError),

    /// The detector could not be initialized.
    #[error("vehicle detector failed to initialize: {0}")]
    DetectorInit(#[source] DetectorError),

    /// The worker thread could not be spawned.
    #[error("failed to spawn pipeline worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors raised by a [`FrameSource`](crate::FrameSource).
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading a recording from disk failed.
    #[error("failed to read recording {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A recording contained something other than a vehicle count.
    #[error("invalid vehicle count {token:?} on line {line}")]
    Parse { line: usize, token: String },

    /// The source has no frames at all, even right after a reset.
    #[error("frame source has no frames")]
    Empty,

    /// A single frame could not be fetched.
    #[error("frame fetch failed: {0}")]
    Fetch(String),
}

/// Errors raised by a [`VehicleDetector`](crate::VehicleDetector).
#[derive(Debug, Error)]
pub enum DetectorError {
    /// The detector (model, device, ...) is not available.
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    /// Detection failed for one frame.
    #[error("detection failed: {0}")]
    Failed(String),
}

/// Why a subscriber could not accept a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The subscriber's buffer is full; it is not keeping up.
    #[error("subscriber buffer is full")]
    Full,

    /// The subscriber went away.
    #[error("subscriber is closed")]
    Closed,
}

/// Encoding or decoding a snapshot failed.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR codec error: {0}")]
    Cbor(String),

    /// A length-prefixed frame was shorter than its header claims.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}
