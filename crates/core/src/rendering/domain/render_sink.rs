use crate::detection::domain::annotated_frame::FaceCrop;
use crate::shared::frame::{ColorOrder, Frame};

/// Presentation surface fed by the display stage.
///
/// Frames and crops arrive already converted to [`RenderSink::color_order`].
/// Within one delivery, `present` is called first and `present_faces` second,
/// both with data from the same source frame. Frame resolution stays fixed
/// for the duration of a run.
pub trait RenderSink: Send {
    /// Channel order the sink expects.
    fn color_order(&self) -> ColorOrder {
        ColorOrder::Rgb
    }

    fn present(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Receives up to `MAX_FACES` crops, highest confidence first. Slots past
    /// `faces.len()` should be cleared.
    fn present_faces(&mut self, faces: &[FaceCrop]) -> Result<(), Box<dyn std::error::Error>>;
}
