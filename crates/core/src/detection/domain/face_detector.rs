use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

/// Domain interface for face detection.
///
/// Called once per consumed frame. Implementations may keep state between
/// calls (hence `&mut self`) but must not hold on to previous frames.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}
