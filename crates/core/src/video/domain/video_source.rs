use std::time::Duration;

use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::source_descriptor::SourceDescriptor;

/// Failures raised by a [`VideoSource`].
///
/// Messages are kept as strings so the error can travel inside pipeline
/// events and be cloned to every observer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("cannot open video source {source_name}: {reason}")]
    OpenFailed { source_name: String, reason: String },
    #[error("failed to read from video source: {0}")]
    ReadFailed(String),
    #[error("capture device {0} disconnected")]
    Disconnected(u32),
    #[error("video source {0} produced no frames")]
    EmptySource(String),
    #[error("video source is not open")]
    NotOpen,
}

impl SourceError {
    /// Stable short identifier, suitable for exit reasons and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            SourceError::OpenFailed { .. } => "source_open_failed",
            SourceError::ReadFailed(_) => "source_read_failed",
            SourceError::Disconnected(_) => "source_disconnected",
            SourceError::EmptySource(_) => "source_empty",
            SourceError::NotOpen => "source_not_open",
        }
    }
}

/// Properties of an opened source.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// Native frame rate; 0.0 when the container does not declare one.
    pub fps: f64,
}

impl SourceInfo {
    /// Delay between reads implied by the native rate, if it has one.
    pub fn frame_interval(&self) -> Option<Duration> {
        (self.fps.is_finite() && self.fps > 0.0).then(|| Duration::from_secs_f64(1.0 / self.fps))
    }
}

/// Pulls decoded frames from a camera or a video file.
///
/// Implementations own the underlying device/file handle, which must be
/// released by [`close`](VideoSource::close).
pub trait VideoSource: Send {
    /// Opens the source. Device sources apply the requested capture
    /// resolution and rate here.
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<SourceInfo, SourceError>;

    /// Reads the next frame. `Ok(None)` signals end of stream.
    fn read(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Seeks back to the first frame.
    fn rewind(&mut self) -> Result<(), SourceError>;

    /// Releases the handle. Safe to call more than once.
    fn close(&mut self);
}

/// Builds a fresh, unopened source for each pipeline run.
pub type SourceFactory = Box<dyn Fn(&SourceDescriptor) -> Box<dyn VideoSource> + Send>;
