//! Pipeline cycle and its start/stop lifecycle.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use signalwatch_types::{current_timestamp_ms, Snapshot};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::assembler::{assemble, Observation};
use crate::controller::{DwellTimes, SignalController};
use crate::error::{DetectorError, PipelineError, SourceError};
use crate::estimator::{CongestionEstimator, CongestionThresholds, DEFAULT_HISTORY_CAPACITY};
use crate::hub::BroadcastHub;
use crate::source::{FrameSource, NextFrame, VehicleDetector};

/// Where an orchestrator is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Idle,
    Running,
    Stopped,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Running => "running",
            Lifecycle::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Tunables for one pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Nominal time between cycle starts.
    pub frame_interval: Duration,
    /// Number of recent counts the estimator averages.
    pub history_capacity: usize,
    pub thresholds: CongestionThresholds,
    pub dwell: DwellTimes,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_micros(33_333),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            thresholds: CongestionThresholds::default(),
            dwell: DwellTimes::default(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder for [`PipelineConfig`]. Unset fields keep their defaults.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    frame_interval: Option<Duration>,
    history_capacity: Option<usize>,
    thresholds: Option<CongestionThresholds>,
    dwell: Option<DwellTimes>,
}

impl PipelineConfigBuilder {
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = Some(capacity);
        self
    }

    pub fn thresholds(mut self, thresholds: CongestionThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn dwell(mut self, dwell: DwellTimes) -> Self {
        self.dwell = Some(dwell);
        self
    }

    pub fn build(self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        PipelineConfig {
            frame_interval: self.frame_interval.unwrap_or(defaults.frame_interval),
            history_capacity: self.history_capacity.unwrap_or(defaults.history_capacity),
            thresholds: self.thresholds.unwrap_or(defaults.thresholds),
            dwell: self.dwell.unwrap_or(defaults.dwell),
        }
    }
}

/// Why a cycle produced no snapshot.
#[derive(Debug, Error)]
pub enum CycleFault {
    #[error("frame fetch failed: {0}")]
    Source(#[from] SourceError),

    #[error("vehicle detection failed: {0}")]
    Detector(#[from] DetectorError),
}

/// The single-threaded part of the pipeline: one call to [`cycle`](Self::cycle)
/// fetches a frame, counts vehicles, updates congestion and the signal and
/// assembles a snapshot.
///
/// Driven by [`Orchestrator`] on its worker thread, or directly with
/// synthetic instants for deterministic simulation.
///
/// ```rust
/// use std::time::{Duration, Instant};
/// use signalwatch_core::{Pipeline, PipelineConfig, RecordedCountDetector, ReplaySource};
///
/// let source = ReplaySource::new(vec![2, 4]);
/// let mut pipeline = Pipeline::new(source, RecordedCountDetector, &PipelineConfig::default());
/// pipeline.open().unwrap();
///
/// let t0 = Instant::now();
/// let first = pipeline.cycle(t0).unwrap();
/// let second = pipeline.cycle(t0 + Duration::from_secs(1)).unwrap();
/// assert_eq!(first.sequence_number, 1);
/// assert_eq!(second.average_vehicle_count, 3.0);
/// ```
#[derive(Debug)]
pub struct Pipeline<S, D> {
    source: S,
    detector: D,
    estimator: CongestionEstimator,
    controller: SignalController,
    sequence: u64,
    frame_number: u64,
    last_cycle: Option<Instant>,
    recent_cycles: VecDeque<Instant>,
    rate_window: usize,
}

impl<S, D> Pipeline<S, D>
where
    S: FrameSource,
    D: VehicleDetector<S::Frame>,
{
    pub fn new(source: S, detector: D, config: &PipelineConfig) -> Self {
        let estimator = CongestionEstimator::new(config.history_capacity, config.thresholds);
        let rate_window = estimator.window().capacity().max(2);
        Self {
            source,
            detector,
            estimator,
            controller: SignalController::new(config.dwell),
            sequence: 0,
            frame_number: 0,
            last_cycle: None,
            recent_cycles: VecDeque::with_capacity(rate_window),
            rate_window,
        }
    }

    /// Initialize both collaborators.
    pub fn open(&mut self) -> Result<(), PipelineError> {
        self.source.open().map_err(PipelineError::SourceInit)?;
        self.detector
            .initialize()
            .map_err(PipelineError::DetectorInit)?;
        Ok(())
    }

    /// Run one cycle as of `now`.
    ///
    /// On a fault nothing is published and no sequence number is used, but
    /// the signal still advances by the elapsed time at the last known
    /// congestion level.
    pub fn cycle(&mut self, now: Instant) -> Result<Snapshot, CycleFault> {
        let delta = self
            .last_cycle
            .map(|previous| now.saturating_duration_since(previous))
            .unwrap_or_default();
        self.last_cycle = Some(now);
        self.record_cycle(now);

        let (vehicle_count, captured_at_ms) = match self.observe() {
            Ok(observed) => observed,
            Err(fault) => {
                self.controller.tick(delta, self.estimator.level());
                return Err(fault);
            }
        };

        let level = self.estimator.update(vehicle_count);
        let signal = self.controller.tick(delta, level);
        self.sequence += 1;

        let observation = Observation {
            vehicle_count,
            sequence_number: self.sequence,
            frame_number: self.frame_number,
            captured_at_ms,
        };
        Ok(assemble(
            &observation,
            self.estimator.estimate(),
            signal,
            self.cycle_rate(),
        ))
    }

    /// Fetch one frame, rewinding once at end of stream, and count it.
    fn observe(&mut self) -> Result<(u32, u64), CycleFault> {
        let frame = match self.source.next_frame()? {
            NextFrame::Frame(frame) => frame,
            NextFrame::EndOfStream => {
                debug!(frames = self.frame_number, "end of stream, rewinding source");
                self.source.reset()?;
                self.frame_number = 0;
                match self.source.next_frame()? {
                    NextFrame::Frame(frame) => frame,
                    NextFrame::EndOfStream => return Err(SourceError::Empty.into()),
                }
            }
        };
        self.frame_number += 1;
        let captured_at_ms = current_timestamp_ms();

        let count = self.detector.count_vehicles(&frame)?;
        Ok((count, captured_at_ms))
    }

    fn record_cycle(&mut self, now: Instant) {
        if self.recent_cycles.len() == self.rate_window {
            self.recent_cycles.pop_front();
        }
        self.recent_cycles.push_back(now);
    }

    /// Cycles per second over the recent cycle instants.
    pub fn cycle_rate(&self) -> Option<f64> {
        let first = self.recent_cycles.front()?;
        let last = self.recent_cycles.back()?;
        let span = last.saturating_duration_since(*first).as_secs_f64();
        if self.recent_cycles.len() < 2 || span <= 0.0 {
            return None;
        }
        Some((self.recent_cycles.len() - 1) as f64 / span)
    }

    /// Sequence number of the last published snapshot, 0 before the first.
    pub fn sequence_number(&self) -> u64 {
        self.sequence
    }

    pub fn estimator(&self) -> &CongestionEstimator {
        &self.estimator
    }

    pub fn controller(&self) -> &SignalController {
        &self.controller
    }
}

/// Set once, observed by the worker between cycles.
#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    fn set(&self) {
        *self.stopped.lock() = true;
        self.cond.notify_all();
    }

    fn is_set(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep until `deadline` or until stopped. Returns `true` if stopped.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

#[derive(Debug, Default)]
struct Shared {
    lifecycle: Mutex<Lifecycle>,
    stop: StopSignal,
}

/// Requests a stop from anywhere, e.g. a signal handler.
///
/// The worker finishes its in-flight cycle and exits; use
/// [`Orchestrator::stop`] to also wait for it.
#[derive(Debug, Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    pub fn stop(&self) {
        let mut lifecycle = self.shared.lifecycle.lock();
        let from = *lifecycle;
        if from != Lifecycle::Stopped {
            info!(from = %from, "pipeline stop requested");
            *lifecycle = Lifecycle::Stopped;
        }
        drop(lifecycle);
        self.shared.stop.set();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.is_set()
    }
}

/// Owns a pipeline and drives it on a dedicated thread.
///
/// `Idle -> Running -> Stopped`. `start` is only valid from `Idle` and
/// surfaces collaborator initialization failures; everything that goes
/// wrong afterwards is logged by the worker. `stop` is idempotent and waits
/// for the in-flight cycle to finish.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use signalwatch_core::*;
///
/// let hub = Arc::new(BroadcastHub::default());
/// let (_id, mut rx) = hub.subscribe_channel(64);
///
/// let config = PipelineConfig::builder()
///     .frame_interval(Duration::from_millis(1))
///     .build();
/// let source = ReplaySource::new(vec![1, 2, 3]);
/// let mut orchestrator = Orchestrator::new(source, RecordedCountDetector, hub, config);
///
/// orchestrator.start().unwrap();
/// let payload = rx.blocking_recv().unwrap();
/// orchestrator.stop();
///
/// let first = WireFormat::Json.decode(&payload).unwrap();
/// assert_eq!(first.sequence_number, 1);
/// assert_eq!(orchestrator.lifecycle(), Lifecycle::Stopped);
/// ```
pub struct Orchestrator<S, D> {
    pipeline: Option<Pipeline<S, D>>,
    hub: Arc<BroadcastHub>,
    frame_interval: Duration,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl<S, D> Orchestrator<S, D>
where
    S: FrameSource + 'static,
    D: VehicleDetector<S::Frame> + 'static,
{
    pub fn new(source: S, detector: D, hub: Arc<BroadcastHub>, config: PipelineConfig) -> Self {
        Self {
            pipeline: Some(Pipeline::new(source, detector, &config)),
            hub,
            frame_interval: config.frame_interval,
            shared: Arc::new(Shared::default()),
            worker: None,
        }
    }

    /// Initialize the collaborators and begin cycling on a worker thread.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        let state = self.lifecycle();
        if state != Lifecycle::Idle {
            return Err(PipelineError::InvalidState(state));
        }
        let mut pipeline = self
            .pipeline
            .take()
            .ok_or(PipelineError::InvalidState(state))?;

        if let Err(e) = pipeline.open() {
            error!(error = %e, "pipeline failed to start");
            self.pipeline = Some(pipeline);
            return Err(e);
        }

        // A stop may have landed while the collaborators were initializing.
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            if *lifecycle != Lifecycle::Idle || self.shared.stop.is_set() {
                let current = *lifecycle;
                info!(lifecycle = %current, "stop requested during start; not running");
                return Err(PipelineError::InvalidState(current));
            }
            *lifecycle = Lifecycle::Running;
        }

        let hub = self.hub.clone();
        let shared = self.shared.clone();
        let interval = self.frame_interval;

        let spawned = thread::Builder::new()
            .name("signalwatch-pipeline".into())
            .spawn(move || run(pipeline, hub, shared, interval));
        match spawned {
            Ok(worker) => {
                self.worker = Some(worker);
                info!(
                    frame_interval_us = interval.as_micros() as u64,
                    format = %self.hub.format(),
                    "pipeline started"
                );
                Ok(())
            }
            Err(e) => {
                *self.shared.lifecycle.lock() = Lifecycle::Stopped;
                Err(PipelineError::Spawn(e))
            }
        }
    }

    /// Stop cycling and wait for the worker. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.stop_handle().stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("pipeline worker panicked");
            }
        }
    }
}

impl<S, D> Orchestrator<S, D> {
    pub fn lifecycle(&self) -> Lifecycle {
        *self.shared.lifecycle.lock()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }
}

impl<S, D> fmt::Debug for Orchestrator<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("lifecycle", &self.lifecycle())
            .field("frame_interval", &self.frame_interval)
            .field("hub", &self.hub)
            .finish()
    }
}

impl<S, D> Drop for Orchestrator<S, D> {
    fn drop(&mut self) {
        self.stop_handle().stop();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run<S, D>(
    mut pipeline: Pipeline<S, D>,
    hub: Arc<BroadcastHub>,
    shared: Arc<Shared>,
    interval: Duration,
) where
    S: FrameSource,
    D: VehicleDetector<S::Frame>,
{
    let mut skipped: u64 = 0;

    while !shared.stop.is_set() {
        let started = Instant::now();
        match pipeline.cycle(started) {
            Ok(snapshot) => {
                let report = hub.publish(&snapshot);
                debug!(
                    sequence = snapshot.sequence_number,
                    vehicles = snapshot.vehicle_count,
                    average = snapshot.average_vehicle_count,
                    congestion = %snapshot.congestion_level,
                    signal = %snapshot.signal_state,
                    delivered = report.delivered,
                    "cycle complete"
                );
            }
            Err(fault) => {
                skipped += 1;
                warn!(error = %fault, skipped, "skipping cycle");
            }
        }

        // Overruns start the next cycle immediately; no catch-up.
        if shared.stop.wait_until(started + interval) {
            break;
        }
    }

    info!(
        published = pipeline.sequence_number(),
        skipped,
        transitions = pipeline.controller().transitions(),
        "pipeline stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireFormat;
    use crate::replay::{RecordedCountDetector, RecordedFrame, ReplaySource};
    use signalwatch_types::{CongestionLevel, SignalPhase};

    const SECOND: Duration = Duration::from_secs(1);

    fn pipeline(counts: Vec<u32>) -> Pipeline<ReplaySource, RecordedCountDetector> {
        let mut pipeline = Pipeline::new(
            ReplaySource::new(counts),
            RecordedCountDetector,
            &PipelineConfig::default(),
        );
        pipeline.open().unwrap();
        pipeline
    }

    /// Fails on the listed (1-based) calls.
    #[derive(Debug, Default)]
    struct FlakyDetector {
        calls: usize,
        fail_on: Vec<usize>,
        unavailable: bool,
    }

    impl VehicleDetector<RecordedFrame> for FlakyDetector {
        fn initialize(&mut self) -> Result<(), DetectorError> {
            if self.unavailable {
                return Err(DetectorError::Unavailable("no model".into()));
            }
            Ok(())
        }

        fn count_vehicles(&mut self, frame: &RecordedFrame) -> Result<u32, DetectorError> {
            self.calls += 1;
            if self.fail_on.contains(&self.calls) {
                return Err(DetectorError::Failed("lens glare".into()));
            }
            Ok(frame.vehicle_count)
        }
    }

    #[test]
    fn config_builder_overrides_defaults() {
        let config = PipelineConfig::builder()
            .frame_interval(Duration::from_millis(100))
            .history_capacity(10)
            .build();
        assert_eq!(config.frame_interval, Duration::from_millis(100));
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.thresholds, CongestionThresholds::default());
        assert_eq!(config.dwell, DwellTimes::default());
    }

    #[test]
    fn cycles_number_snapshots_from_one() {
        let mut pipeline = pipeline(vec![4, 8, 6]);
        let t0 = Instant::now();

        let snapshots: Vec<Snapshot> = (0..3u32)
            .map(|i| pipeline.cycle(t0 + i * SECOND).unwrap())
            .collect();

        let sequences: Vec<u64> = snapshots.iter().map(|s| s.sequence_number).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(snapshots[2].vehicle_count, 6);
        assert_eq!(snapshots[2].average_vehicle_count, 6.0);
        assert_eq!(snapshots[2].congestion_level, CongestionLevel::Medium);
        assert!(snapshots[0].is_followed_by(&snapshots[1]));
        assert_eq!(pipeline.sequence_number(), 3);
    }

    #[test]
    fn first_cycle_has_zero_delta() {
        let mut pipeline = pipeline(vec![1]);
        let snapshot = pipeline.cycle(Instant::now()).unwrap();
        assert_eq!(snapshot.signal_state, SignalPhase::Green);
        assert_eq!(snapshot.elapsed_in_state.as_micros(), 0);
        assert_eq!(snapshot.cycle_rate, None);
    }

    #[test]
    fn signal_time_follows_instants_between_cycles() {
        let mut pipeline = pipeline(vec![0]);
        let t0 = Instant::now();
        pipeline.cycle(t0).unwrap();
        let s = pipeline.cycle(t0 + Duration::from_millis(1500)).unwrap();
        assert_eq!(s.elapsed_in_state.as_millis(), 1500);

        let s = pipeline.cycle(t0 + Duration::from_secs(31)).unwrap();
        assert_eq!(s.signal_state, SignalPhase::Yellow);
        assert_eq!(s.elapsed_in_state.as_micros(), 0);
    }

    #[test]
    fn source_loops_and_frame_numbers_restart() {
        let mut pipeline = pipeline(vec![5, 7]);
        let t0 = Instant::now();

        let seen: Vec<(u64, u64, u32)> = (0..5u32)
            .map(|i| {
                let s = pipeline.cycle(t0 + i * SECOND).unwrap();
                (s.sequence_number, s.frame_number, s.vehicle_count)
            })
            .collect();

        assert_eq!(
            seen,
            vec![(1, 1, 5), (2, 2, 7), (3, 1, 5), (4, 2, 7), (5, 1, 5)]
        );
    }

    #[test]
    fn crosses_high_on_twelfth_busy_frame_after_four_idle_ones() {
        let mut counts = vec![0; 4];
        counts.extend(std::iter::repeat(20).take(26));
        let mut pipeline = pipeline(counts);
        let t0 = Instant::now();

        let levels: Vec<CongestionLevel> = (0..30u32)
            .map(|i| pipeline.cycle(t0 + i * Duration::from_millis(33)).unwrap().congestion_level)
            .collect();

        // 12 * 20 / 16 = 15.0; 11 * 20 / 15 = 14.67.
        let first_high = levels.iter().position(|&l| l == CongestionLevel::High);
        assert_eq!(first_high, Some(4 + 11));
        assert!(levels[15..].iter().all(|&l| l == CongestionLevel::High));
    }

    #[test]
    fn crosses_high_on_twenty_third_busy_frame_after_full_idle_window() {
        let mut counts = vec![0; 30];
        counts.extend(std::iter::repeat(20).take(26));
        let mut pipeline = pipeline(counts);
        let t0 = Instant::now();

        let mut first_high = None;
        for i in 0..56u32 {
            let snapshot = pipeline.cycle(t0 + i * Duration::from_millis(33)).unwrap();
            if first_high.is_none() && snapshot.congestion_level == CongestionLevel::High {
                first_high = Some(i);
                // 7 zeros + 23 twenties in the window.
                assert!((snapshot.average_vehicle_count - 460.0 / 30.0).abs() < 1e-9);
            }
        }
        assert_eq!(first_high, Some(30 + 22));
    }

    #[test]
    fn detector_fault_skips_cycle_but_signal_keeps_time() {
        let source = ReplaySource::new(vec![3, 3, 3, 3]);
        let detector = FlakyDetector {
            fail_on: vec![2],
            ..Default::default()
        };
        let mut pipeline = Pipeline::new(source, detector, &PipelineConfig::default());
        pipeline.open().unwrap();
        let t0 = Instant::now();

        assert_eq!(pipeline.cycle(t0).unwrap().sequence_number, 1);

        let fault = pipeline.cycle(t0 + 10 * SECOND).unwrap_err();
        assert!(matches!(fault, CycleFault::Detector(_)));
        assert_eq!(pipeline.sequence_number(), 1);
        assert_eq!(pipeline.controller().state().elapsed, 10 * SECOND);
        assert_eq!(pipeline.estimator().window().len(), 1);

        let next = pipeline.cycle(t0 + 25 * SECOND).unwrap();
        assert_eq!(next.sequence_number, 2);
        assert_eq!(next.elapsed_in_state.as_secs_f64(), 25.0);
        // The failed cycle still consumed frame 2.
        assert_eq!(next.frame_number, 3);
    }

    #[test]
    fn source_with_no_frames_faults_every_cycle() {
        let mut pipeline = Pipeline::new(
            ReplaySource::default(),
            RecordedCountDetector,
            &PipelineConfig::default(),
        );
        let fault = pipeline.cycle(Instant::now()).unwrap_err();
        assert!(matches!(fault, CycleFault::Source(SourceError::Empty)));
    }

    #[test]
    fn cycle_rate_measures_recent_cycles() {
        let mut pipeline = pipeline(vec![1]);
        let t0 = Instant::now();
        for i in 0..10u32 {
            pipeline.cycle(t0 + i * Duration::from_millis(100)).unwrap();
        }
        let rate = pipeline.cycle_rate().unwrap();
        assert!((rate - 10.0).abs() < 1e-6, "rate was {rate}");
    }

    fn orchestrator(
        counts: Vec<u32>,
        interval: Duration,
    ) -> (
        Orchestrator<ReplaySource, RecordedCountDetector>,
        tokio::sync::mpsc::Receiver<crate::codec::Payload>,
    ) {
        let hub = Arc::new(BroadcastHub::default());
        let (_id, rx) = hub.subscribe_channel(4096);
        let config = PipelineConfig::builder().frame_interval(interval).build();
        let orchestrator =
            Orchestrator::new(ReplaySource::new(counts), RecordedCountDetector, hub, config);
        (orchestrator, rx)
    }

    #[test]
    fn runs_on_worker_until_stopped() {
        let (mut orchestrator, mut rx) = orchestrator(vec![2, 9, 4], Duration::from_millis(1));
        assert_eq!(orchestrator.lifecycle(), Lifecycle::Idle);

        orchestrator.start().unwrap();
        assert_eq!(orchestrator.lifecycle(), Lifecycle::Running);

        let mut sequences = vec![];
        while sequences.len() < 5 {
            let payload = rx.blocking_recv().unwrap();
            sequences.push(WireFormat::Json.decode(&payload).unwrap().sequence_number);
        }
        orchestrator.stop();
        assert_eq!(orchestrator.lifecycle(), Lifecycle::Stopped);

        // Drain whatever was published before the worker exited.
        while let Ok(payload) = rx.try_recv() {
            sequences.push(WireFormat::Json.decode(&payload).unwrap().sequence_number);
        }
        let expected: Vec<u64> = (1..=sequences.len() as u64).collect();
        assert_eq!(sequences, expected);

        let published = orchestrator.hub().published();
        orchestrator.stop();
        orchestrator.stop();
        assert_eq!(orchestrator.hub().published(), published);
    }

    #[test]
    fn stop_interrupts_pacing_sleep() {
        let (mut orchestrator, mut rx) = orchestrator(vec![1], Duration::from_secs(30));
        orchestrator.start().unwrap();
        rx.blocking_recv().unwrap();

        let requested = Instant::now();
        orchestrator.stop();
        assert!(requested.elapsed() < Duration::from_secs(5));
        assert_eq!(orchestrator.hub().published(), 1);
    }

    #[test]
    fn stop_handle_works_from_another_thread() {
        let (mut orchestrator, mut rx) = orchestrator(vec![1], Duration::from_millis(5));
        orchestrator.start().unwrap();
        rx.blocking_recv().unwrap();

        let handle = orchestrator.stop_handle();
        thread::spawn(move || handle.stop()).join().unwrap();
        assert_eq!(orchestrator.lifecycle(), Lifecycle::Stopped);
        assert!(orchestrator.stop_handle().is_stopped());
        orchestrator.stop();
    }

    #[test]
    fn start_is_only_valid_from_idle() {
        let (mut orchestrator, _rx) = orchestrator(vec![1], Duration::from_millis(5));
        orchestrator.start().unwrap();
        assert!(matches!(
            orchestrator.start(),
            Err(PipelineError::InvalidState(Lifecycle::Running))
        ));

        orchestrator.stop();
        assert!(matches!(
            orchestrator.start(),
            Err(PipelineError::InvalidState(Lifecycle::Stopped))
        ));
    }

    #[test]
    fn stop_before_start_prevents_running() {
        let (mut orchestrator, _rx) = orchestrator(vec![1], Duration::from_millis(5));
        orchestrator.stop();
        assert_eq!(orchestrator.lifecycle(), Lifecycle::Stopped);
        assert!(orchestrator.start().is_err());
        assert_eq!(orchestrator.hub().published(), 0);
    }

    #[test]
    fn empty_source_aborts_start() {
        let (mut orchestrator, _rx) = orchestrator(vec![], Duration::from_millis(5));
        let err = orchestrator.start().unwrap_err();
        assert!(matches!(err, PipelineError::SourceInit(SourceError::Empty)));
        assert_eq!(orchestrator.lifecycle(), Lifecycle::Idle);
        assert_eq!(orchestrator.hub().published(), 0);
    }

    #[test]
    fn detector_init_failure_aborts_start() {
        let hub = Arc::new(BroadcastHub::default());
        let detector = FlakyDetector {
            unavailable: true,
            ..Default::default()
        };
        let mut orchestrator = Orchestrator::new(
            ReplaySource::new(vec![1]),
            detector,
            hub,
            PipelineConfig::default(),
        );

        let err = orchestrator.start().unwrap_err();
        assert!(matches!(err, PipelineError::DetectorInit(_)));
        assert!(err.to_string().contains("no model"));
        assert_eq!(orchestrator.lifecycle(), Lifecycle::Idle);
    }

    /// Takes a while to load, like a real detection model.
    struct SlowInitDetector {
        delay: Duration,
    }

    impl VehicleDetector<RecordedFrame> for SlowInitDetector {
        fn initialize(&mut self) -> Result<(), DetectorError> {
            thread::sleep(self.delay);
            Ok(())
        }

        fn count_vehicles(&mut self, frame: &RecordedFrame) -> Result<u32, DetectorError> {
            Ok(frame.vehicle_count)
        }
    }

    #[test]
    fn stop_during_initialization_wins() {
        let hub = Arc::new(BroadcastHub::default());
        let detector = SlowInitDetector {
            delay: Duration::from_millis(300),
        };
        let mut orchestrator = Orchestrator::new(
            ReplaySource::new(vec![1]),
            detector,
            hub,
            PipelineConfig::builder()
                .frame_interval(Duration::from_millis(1))
                .build(),
        );

        let handle = orchestrator.stop_handle();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            handle.stop();
        });

        let result = orchestrator.start();
        stopper.join().unwrap();

        assert!(matches!(
            result,
            Err(PipelineError::InvalidState(Lifecycle::Stopped))
        ));
        assert_eq!(orchestrator.lifecycle(), Lifecycle::Stopped);
        assert!(orchestrator.worker.is_none());
        assert_eq!(orchestrator.hub().published(), 0);
    }

    #[test]
    fn lifecycle_display() {
        assert_eq!(Lifecycle::Idle.to_string(), "idle");
        assert_eq!(Lifecycle::Running.to_string(), "running");
        assert_eq!(Lifecycle::Stopped.to_string(), "stopped");
    }
}
