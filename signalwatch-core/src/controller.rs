//! Adaptive signal state machine.

use std::time::Duration;

use signalwatch_types::{CongestionLevel, SignalPhase};
use tracing::info;

/// One duration per congestion level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelDurations {
    pub low: Duration,
    pub medium: Duration,
    pub high: Duration,
}

impl LevelDurations {
    pub const fn from_secs(low: u64, medium: u64, high: u64) -> Self {
        Self {
            low: Duration::from_secs(low),
            medium: Duration::from_secs(medium),
            high: Duration::from_secs(high),
        }
    }

    pub fn get(&self, level: CongestionLevel) -> Duration {
        match level {
            CongestionLevel::Low => self.low,
            CongestionLevel::Medium => self.medium,
            CongestionLevel::High => self.high,
        }
    }
}

/// How long each phase holds before it may change.
///
/// Heavy traffic shortens green and lengthens red; yellow is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DwellTimes {
    pub green: LevelDurations,
    pub yellow: Duration,
    pub red: LevelDurations,
}

impl Default for DwellTimes {
    fn default() -> Self {
        Self {
            green: LevelDurations::from_secs(30, 20, 15),
            yellow: Duration::from_secs(3),
            red: LevelDurations::from_secs(15, 25, 35),
        }
    }
}

impl DwellTimes {
    /// Dwell time of `phase` under `congestion`.
    pub fn dwell(&self, phase: SignalPhase, congestion: CongestionLevel) -> Duration {
        match phase {
            SignalPhase::Green => self.green.get(congestion),
            SignalPhase::Yellow => self.yellow,
            SignalPhase::Red => self.red.get(congestion),
        }
    }
}

/// The phase currently shown and how long it has been shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalState {
    pub phase: SignalPhase,
    pub elapsed: Duration,
}

/// Green -> Yellow -> Red -> Green, with congestion-dependent dwell times.
///
/// A phase ends on the first tick where its accumulated time is strictly
/// greater than its dwell time. Elapsed time restarts at zero on every
/// transition and at most one transition happens per tick.
#[derive(Debug, Clone, Default)]
pub struct SignalController {
    state: SignalState,
    dwell: DwellTimes,
    transitions: u64,
}

impl SignalController {
    pub fn new(dwell: DwellTimes) -> Self {
        Self {
            state: SignalState::default(),
            dwell,
            transitions: 0,
        }
    }

    /// Advance the clock by `delta` and return the resulting state.
    pub fn tick(&mut self, delta: Duration, congestion: CongestionLevel) -> SignalState {
        self.state.elapsed = self.state.elapsed.saturating_add(delta);

        let dwell = self.dwell.dwell(self.state.phase, congestion);
        if self.state.elapsed > dwell {
            let from = self.state.phase;
            let held = self.state.elapsed;
            self.state = SignalState {
                phase: from.next(),
                elapsed: Duration::ZERO,
            };
            self.transitions += 1;
            info!(
                from = %from,
                to = %self.state.phase,
                congestion = %congestion,
                held_ms = held.as_millis() as u64,
                "signal transition"
            );
        }

        self.state
    }

    pub fn state(&self) -> SignalState {
        self.state
    }

    pub fn dwell_times(&self) -> &DwellTimes {
        &self.dwell
    }

    /// Number of phase changes since creation.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }
}
