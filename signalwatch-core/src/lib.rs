//! # signalwatch-core
//!
//! Turns a stream of per-frame vehicle counts into an adaptive traffic
//! signal and a live feed of state snapshots.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use signalwatch_core::{
//!     BroadcastHub, Orchestrator, PipelineConfig, RecordedCountDetector, ReplaySource,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let hub = Arc::new(BroadcastHub::default());
//! let (_id, mut feed) = hub.subscribe_channel(64);
//!
//! let config = PipelineConfig::builder()
//!     .frame_interval(Duration::from_millis(33))
//!     .build();
//!
//! let source = ReplaySource::new(vec![0, 3, 7, 12, 20]);
//! let mut orchestrator = Orchestrator::new(source, RecordedCountDetector, hub.clone(), config);
//! orchestrator.start().expect("pipeline failed to start");
//!
//! // ... subscribers drain `feed` ...
//!
//! orchestrator.stop();
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! FrameSource ─▶ VehicleDetector ─▶ CongestionEstimator ─▶ SignalController
//!                                                               │
//!                                           assemble() ◀────────┘
//!                                               │
//!                                               ▼
//!                                         BroadcastHub ─▶ SnapshotSink × N
//! ```
//!
//! - **Thread-owned state**: estimator and controller live on the pipeline
//!   worker thread and are never shared
//! - **Copy-on-read fan-out**: the hub snapshots its membership before
//!   sending, so subscribe/unsubscribe never race a publish
//! - **Backpressure isolation**: a subscriber whose buffer is full or whose
//!   connection closed is evicted instead of stalling the pipeline

mod assembler;
mod codec;
mod controller;
mod error;
mod estimator;
mod hub;
mod orchestrator;
mod replay;
mod sink;
mod source;

pub use assembler::{assemble, Estimate, Observation};
pub use codec::{Payload, WireFormat};
pub use controller::{DwellTimes, LevelDurations, SignalController, SignalState};
pub use error::{CodecError, DetectorError, PipelineError, SinkError, SourceError};
pub use estimator::{
    CongestionEstimator, CongestionThresholds, HistoryWindow, DEFAULT_HISTORY_CAPACITY,
};
pub use hub::{BroadcastHub, PublishReport, SubscriberId};
pub use orchestrator::{
    CycleFault, Lifecycle, Orchestrator, Pipeline, PipelineConfig, PipelineConfigBuilder,
    StopHandle,
};
pub use replay::{RecordedCountDetector, RecordedFrame, ReplaySource};
pub use sink::{ChannelSink, SnapshotSink};
pub use source::{FrameSource, NextFrame, VehicleDetector};

// Re-export types for convenience
pub use signalwatch_types::{CongestionLevel, Microseconds, SchemaVersion, SignalPhase, Snapshot};
