//! # signalwatch-types
//!
//! Wire types for the signalwatch pipeline. Every cycle of the pipeline
//! produces one [`Snapshot`] describing the latest vehicle count, the
//! averaged congestion level and the state of the adaptive traffic signal.
//! Subscribers of the live feed only ever see these types.
//!
//! ## Features
//!
//! - `std` (default): Standard library support (wall-clock timestamps)
//! - `serde`: JSON/etc. serialization via serde
//! - `minicbor`: Compact binary serialization via CBOR
//! - `all`: Enable all serialization formats
//!
//! ## Example
//!
//! ```rust
//! use signalwatch_types::{CongestionLevel, SignalPhase, Snapshot};
//! use std::time::Duration;
//!
//! let snapshot = Snapshot::builder()
//!     .sequence_number(42)
//!     .vehicle_count(12)
//!     .average_vehicle_count(9.5)
//!     .congestion_level(CongestionLevel::Medium)
//!     .signal(SignalPhase::Red, Duration::from_secs(4))
//!     .build();
//!
//! assert_eq!(snapshot.sequence_number, 42);
//! assert_eq!(snapshot.signal_state.label(), "red");
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**. Consumers use it together with the
//! sequence number to detect format changes and gaps in the feed.

#![cfg_attr(not(feature = "std"), no_std)]

mod duration;
mod signal;
mod snapshot;
mod version;

pub use duration::*;
pub use signal::*;
pub use snapshot::*;
pub use version::*;

/// Current schema version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const SCHEMA_VERSION: u32 = 1;
