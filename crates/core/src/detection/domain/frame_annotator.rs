use image::imageops::FilterType;
use ndarray::{s, Axis};

use crate::detection::domain::annotated_frame::{AnnotatedFrame, FaceCrop};
use crate::detection::domain::label_glyphs::{lit_pixels, GLYPH_ADVANCE, GLYPH_HEIGHT};
use crate::shared::constants::{ANNOTATION_COLOR, BOX_THICKNESS, FACE_CROP_SIZE, MAX_FACES};
use crate::shared::detection::{Detection, PixelBox};
use crate::shared::frame::Frame;

/// Gap between a box's top edge and the label drawn above it.
const LABEL_MARGIN: u32 = 3;

/// Draws detections onto frames and cuts out face crops.
///
/// Keeps the `MAX_FACES` most confident detections. Each one whose clipped
/// box has area gets an outline, a two-decimal confidence label and a
/// `FACE_CROP_SIZE` square crop. Crops are cut before anything is drawn, so
/// they never contain annotation strokes.
#[derive(Clone, Debug)]
pub struct FrameAnnotator {
    color: [u8; 3],
    thickness: u32,
    label_scale: u32,
}

impl FrameAnnotator {
    pub fn new() -> Self {
        Self {
            color: ANNOTATION_COLOR,
            thickness: BOX_THICKNESS,
            label_scale: 1,
        }
    }

    /// Sets the pixel size of one glyph dot (minimum 1).
    pub fn with_label_scale(mut self, scale: u32) -> Self {
        self.label_scale = scale.max(1);
        self
    }

    pub fn annotate(&self, mut frame: Frame, detections: Vec<Detection>) -> AnnotatedFrame {
        let retained = Detection::top_by_confidence(detections, MAX_FACES);
        let visible: Vec<(Detection, PixelBox)> = retained
            .iter()
            .filter_map(|d| d.clip(frame.width(), frame.height()).map(|b| (*d, b)))
            .collect();

        let faces = visible
            .iter()
            .filter_map(|(det, bounds)| {
                crop_face(&frame, bounds, FACE_CROP_SIZE).map(|image| FaceCrop {
                    image,
                    confidence: det.confidence,
                    bounds: *bounds,
                })
            })
            .collect();

        for (det, bounds) in &visible {
            self.draw_box(&mut frame, bounds);
            self.draw_label(&mut frame, bounds, &format!("{:.2}", det.confidence));
        }

        AnnotatedFrame {
            frame,
            faces,
            detections: retained,
        }
    }

    fn draw_box(&self, frame: &mut Frame, b: &PixelBox) {
        let t = self.thickness.min(b.width).min(b.height) as i64;
        let (x0, y0) = (b.x as i64, b.y as i64);
        let (x1, y1) = (b.right() as i64, b.bottom() as i64);

        fill_rect(frame, x0, y0, x1, y0 + t, self.color);
        fill_rect(frame, x0, y1 - t, x1, y1, self.color);
        fill_rect(frame, x0, y0, x0 + t, y1, self.color);
        fill_rect(frame, x1 - t, y0, x1, y1, self.color);
    }

    /// Draws `text` above the box, or just inside its top edge when there
    /// is no room above.
    fn draw_label(&self, frame: &mut Frame, b: &PixelBox, text: &str) {
        let scale = self.label_scale as i64;
        let text_h = (GLYPH_HEIGHT * self.label_scale) as i64;
        let above = b.y as i64 - LABEL_MARGIN as i64 - text_h;
        let top = if above >= 0 {
            above
        } else {
            b.y as i64 + self.thickness as i64 + 1
        };

        let mut left = b.x as i64;
        for ch in text.chars() {
            for (col, row) in lit_pixels(ch) {
                let px = left + col as i64 * scale;
                let py = top + row as i64 * scale;
                fill_rect(frame, px, py, px + scale, py + scale, self.color);
            }
            left += (GLYPH_ADVANCE * self.label_scale) as i64;
        }
    }
}

impl Default for FrameAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

/// Fills the half-open rectangle `[x0, x1) × [y0, y1)`, clipped to the
/// frame. Channels past the third (alpha) are left untouched.
fn fill_rect(frame: &mut Frame, x0: i64, y0: i64, x1: i64, y1: i64, color: [u8; 3]) {
    let w = frame.width() as i64;
    let h = frame.height() as i64;
    let (x0, x1) = (x0.clamp(0, w) as usize, x1.clamp(0, w) as usize);
    let (y0, y1) = (y0.clamp(0, h) as usize, y1.clamp(0, h) as usize);
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    let mut view = frame.as_ndarray_mut();
    let mut region = view.slice_mut(s![y0..y1, x0..x1, ..]);
    for mut pixel in region.lanes_mut(Axis(2)) {
        for (dst, &src) in pixel.iter_mut().zip(color.iter()) {
            *dst = src;
        }
    }
}

/// Cuts `bounds` out of `frame` and resamples it to `size` × `size`.
///
/// Returns `None` for pixel layouts the resampler does not handle.
fn crop_face(frame: &Frame, bounds: &PixelBox, size: u32) -> Option<Frame> {
    let (x0, y0) = (bounds.x as usize, bounds.y as usize);
    let (x1, y1) = (bounds.right() as usize, bounds.bottom() as usize);
    let pixels: Vec<u8> = frame
        .as_ndarray()
        .slice(s![y0..y1, x0..x1, ..])
        .iter()
        .copied()
        .collect();

    let (w, h) = (bounds.width, bounds.height);
    let resized = match frame.channels() {
        1 => resize_raw::<image::Luma<u8>>(pixels, w, h, size),
        3 => resize_raw::<image::Rgb<u8>>(pixels, w, h, size),
        4 => resize_raw::<image::Rgba<u8>>(pixels, w, h, size),
        _ => None,
    }?;

    Some(
        Frame::new(resized, size, size, frame.channels(), frame.index())
            .with_color_order(frame.color_order()),
    )
}

/// Resamples a packed pixel buffer. The pixel type only fixes the channel
/// count, so BGR data passes through as "RGB" unchanged.
fn resize_raw<P>(pixels: Vec<u8>, w: u32, h: u32, size: u32) -> Option<Vec<u8>>
where
    P: image::Pixel<Subpixel = u8> + 'static,
{
    let img = image::ImageBuffer::<P, Vec<u8>>::from_raw(w, h, pixels)?;
    Some(image::imageops::resize(&img, size, size, FilterType::Triangle).into_raw())
}
