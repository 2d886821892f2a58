//! Drive the pipeline in-process with a synthetic camera and watch the
//! signal adapt as traffic builds up.
//!
//! ```bash
//! cargo run --example in_process
//! ```

use std::sync::Arc;
use std::time::Duration;

use signalwatch_core::{
    BroadcastHub, DetectorError, DwellTimes, FrameSource, LevelDurations, NextFrame, Orchestrator,
    PipelineConfig, SourceError, VehicleDetector, WireFormat,
};

/// A frame is just the moment it was taken, in ticks since the start.
struct SyntheticCamera {
    tick: u64,
    length: u64,
}

impl FrameSource for SyntheticCamera {
    type Frame = u64;

    fn next_frame(&mut self) -> Result<NextFrame<u64>, SourceError> {
        if self.tick == self.length {
            return Ok(NextFrame::EndOfStream);
        }
        self.tick += 1;
        Ok(NextFrame::Frame(self.tick))
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        self.tick = 0;
        Ok(())
    }
}

/// Traffic ramps from empty to a jam and back over one pass.
struct RushHour {
    length: u64,
}

impl VehicleDetector<u64> for RushHour {
    fn count_vehicles(&mut self, tick: &u64) -> Result<u32, DetectorError> {
        let half = self.length / 2;
        let distance = half.abs_diff(*tick);
        Ok((25 * (half - distance.min(half)) / half.max(1)) as u32)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let hub = Arc::new(BroadcastHub::new(WireFormat::Json));
    let (_id, mut feed) = hub.subscribe_channel(256);

    // Compress the dwell table a hundredfold so a full cycle fits in a demo.
    let dwell = DwellTimes {
        green: LevelDurations {
            low: Duration::from_millis(300),
            medium: Duration::from_millis(200),
            high: Duration::from_millis(150),
        },
        yellow: Duration::from_millis(30),
        red: LevelDurations {
            low: Duration::from_millis(150),
            medium: Duration::from_millis(250),
            high: Duration::from_millis(350),
        },
    };
    let config = PipelineConfig::builder()
        .frame_interval(Duration::from_millis(10))
        .history_capacity(10)
        .dwell(dwell)
        .build();

    let length = 200;
    let camera = SyntheticCamera { tick: 0, length };
    let mut orchestrator = Orchestrator::new(camera, RushHour { length }, hub.clone(), config);
    orchestrator.start()?;

    let mut last_signal = None;
    while let Some(payload) = feed.blocking_recv() {
        let snapshot = WireFormat::Json.decode(&payload)?;
        if last_signal != Some(snapshot.signal_state) {
            println!(
                "#{:<4} {:>2} vehicles (avg {:>5.2}, {:<6}) -> {}",
                snapshot.sequence_number,
                snapshot.vehicle_count,
                snapshot.average_vehicle_count,
                snapshot.congestion_level,
                snapshot.signal_state,
            );
            last_signal = Some(snapshot.signal_state);
        }
        if snapshot.sequence_number >= 2 * length {
            break;
        }
    }

    orchestrator.stop();
    println!("published {} snapshots", hub.published());
    Ok(())
}
