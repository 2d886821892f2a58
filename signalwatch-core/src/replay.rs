//! Replay of recorded per-frame vehicle counts.
//!
//! A recording is plain text: integers separated by whitespace or commas,
//! with `#` starting a comment that runs to the end of the line.
//!
//! ```text
//! # morning rush, camera 3
//! 0 0 1 2, 4, 7
//! 12 18 21   # queue reaches the junction
//! ```

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{DetectorError, SourceError};
use crate::source::{FrameSource, NextFrame, VehicleDetector};

/// One replayed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedFrame {
    /// Zero-based position in the recording.
    pub index: usize,
    pub vehicle_count: u32,
}

/// A [`FrameSource`] that plays back a list of counts and loops on reset.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    counts: Vec<u32>,
    position: usize,
}

impl ReplaySource {
    pub fn new(counts: Vec<u32>) -> Self {
        Self {
            counts,
            position: 0,
        }
    }

    /// Parse a recording from text.
    pub fn parse(text: &str) -> Result<Self, SourceError> {
        let mut counts = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let data = line.split('#').next().unwrap_or_default();
            for token in data
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|t| !t.is_empty())
            {
                let count = token.parse::<u32>().map_err(|_| SourceError::Parse {
                    line: idx + 1,
                    token: token.to_string(),
                })?;
                counts.push(count);
            }
        }
        Ok(Self::new(counts))
    }

    /// Load a recording from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let source = Self::parse(&text)?;
        debug!(path = %path.display(), frames = source.len(), "loaded recording");
        Ok(source)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }
}

impl FrameSource for ReplaySource {
    type Frame = RecordedFrame;

    fn open(&mut self) -> Result<(), SourceError> {
        if self.counts.is_empty() {
            return Err(SourceError::Empty);
        }
        self.position = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<NextFrame<RecordedFrame>, SourceError> {
        match self.counts.get(self.position) {
            Some(&vehicle_count) => {
                let frame = RecordedFrame {
                    index: self.position,
                    vehicle_count,
                };
                self.position += 1;
                Ok(NextFrame::Frame(frame))
            }
            None => Ok(NextFrame::EndOfStream),
        }
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        self.position = 0;
        Ok(())
    }
}

/// Reports the count stored in a [`RecordedFrame`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordedCountDetector;

impl VehicleDetector<RecordedFrame> for RecordedCountDetector {
    fn count_vehicles(&mut self, frame: &RecordedFrame) -> Result<u32, DetectorError> {
        Ok(frame.vehicle_count)
    }
}
