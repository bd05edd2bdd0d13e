use crate::shared::detection::{Detection, PixelBox};
use crate::shared::frame::Frame;

/// A fixed-size face image cut from one detection.
#[derive(Clone, Debug)]
pub struct FaceCrop {
    pub image: Frame,
    pub confidence: f64,
    /// Where the crop was taken from, in source frame pixels.
    pub bounds: PixelBox,
}

/// A frame with its detections drawn in, plus the face crops cut from it.
///
/// Both halves always come from the same source frame; stages hand the
/// pair around as one value.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    /// At most `MAX_FACES`, highest confidence first.
    pub faces: Vec<FaceCrop>,
    /// The retained detections, highest confidence first.
    pub detections: Vec<Detection>,
}

impl AnnotatedFrame {
    /// Wraps a frame that carries no annotations.
    pub fn unannotated(frame: Frame) -> Self {
        Self {
            frame,
            faces: Vec::new(),
            detections: Vec::new(),
        }
    }
}
