//! # signalwatch
//!
//! Runs the adaptive traffic-signal pipeline from `signalwatch-core` as a
//! service and serves its snapshot feed over TCP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── signalwatch run ────────────────────────────┐
//! │                                                                         │
//! │  ReplaySource ─▶ Orchestrator (worker thread) ─▶ BroadcastHub          │
//! │                                                     │                   │
//! │                                       ┌─────────────┼─────────────┐     │
//! │                                       ▼             ▼             ▼     │
//! │                                  ChannelSink   ChannelSink   ChannelSink │
//! │                                       │             │             │     │
//! │                                   server::forward (one task per client) │
//! └───────────────────────────────────────┼─────────────┼─────────────┼─────┘
//!                                         ▼             ▼             ▼
//!                               signalwatch watch    dashboards    loggers
//! ```
//!
//! - **[`settings`]**: layered configuration (file, environment, CLI)
//! - **[`server`]**: TCP fan-out, one hub subscriber per connection
//! - **[`watch`]**: client that decodes the feed and reports sequence gaps
//! - **[`duration`]**: duration strings such as `"33ms"` or `"1.5s"`
//!
//! ## Usage
//!
//! ```bash
//! # Replay recorded counts and serve snapshots on the default address
//! signalwatch run --counts counts.txt
//!
//! # Follow the feed from another terminal
//! signalwatch watch --connect 127.0.0.1:8765
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use signalwatch::SnapshotStream;
//! use signalwatch_core::WireFormat;
//!
//! # tokio_test::block_on(async {
//! let mut stream = SnapshotStream::connect("127.0.0.1:8765", WireFormat::Json).await.unwrap();
//! while let Some(received) = stream.next().await {
//!     if received.missed > 0 {
//!         eprintln!("missed {} snapshots", received.missed);
//!     }
//!     println!("{}", signalwatch::watch::format_snapshot(&received.snapshot));
//! }
//! # });
//! ```

pub mod duration;
pub mod server;
pub mod settings;
pub mod watch;

pub use settings::Settings;
pub use watch::{Received, SnapshotStream};
