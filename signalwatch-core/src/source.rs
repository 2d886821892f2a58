//! Collaborator traits: where frames come from and how vehicles are counted.

use crate::error::{DetectorError, SourceError};

/// Result of asking a source for its next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextFrame<F> {
    Frame(F),
    /// The source is exhausted; [`FrameSource::reset`] rewinds it.
    EndOfStream,
}

/// A pull-based stream of frames.
///
/// The pipeline owns its source exclusively and calls it from a single
/// worker thread, so implementations need `Send` but not `Sync`.
pub trait FrameSource: Send {
    type Frame;

    /// Prepare the source. Called once by `Orchestrator::start`.
    fn open(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Fetch the next frame.
    fn next_frame(&mut self) -> Result<NextFrame<Self::Frame>, SourceError>;

    /// Rewind to the first frame after reaching end of stream.
    fn reset(&mut self) -> Result<(), SourceError>;
}

/// Counts vehicles in a frame.
pub trait VehicleDetector<F>: Send {
    /// Load models or acquire devices. Called once by `Orchestrator::start`.
    fn initialize(&mut self) -> Result<(), DetectorError> {
        Ok(())
    }

    fn count_vehicles(&mut self, frame: &F) -> Result<u32, DetectorError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    type Frame = S::Frame;

    fn open(&mut self) -> Result<(), SourceError> {
        (**self).open()
    }

    fn next_frame(&mut self) -> Result<NextFrame<Self::Frame>, SourceError> {
        (**self).next_frame()
    }

    fn reset(&mut self) -> Result<(), SourceError> {
        (**self).reset()
    }
}

impl<F, D: VehicleDetector<F> + ?Sized> VehicleDetector<F> for Box<D> {
    fn initialize(&mut self) -> Result<(), DetectorError> {
        (**self).initialize()
    }

    fn count_vehicles(&mut self, frame: &F) -> Result<u32, DetectorError> {
        (**self).count_vehicles(frame)
    }
}
