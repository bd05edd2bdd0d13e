use std::cmp::Ordering;

/// A detector hit in pixel coordinates of the frame it was computed on.
///
/// Coordinates are unclipped: a box may extend past the frame edges, or lie
/// entirely outside it. [`Detection::clip`] produces the visible part.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub confidence: f64,
}

/// Integer box clipped to frame bounds. Always has non-zero area.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelBox {
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

impl Detection {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    /// Clips the box to a `frame_w` × `frame_h` frame.
    ///
    /// Coordinates are truncated to whole pixels. Returns `None` when the
    /// clipped box has zero width or height.
    pub fn clip(&self, frame_w: u32, frame_h: u32) -> Option<PixelBox> {
        let clamp_x = |v: f64| v.clamp(0.0, frame_w as f64) as u32;
        let clamp_y = |v: f64| v.clamp(0.0, frame_h as f64) as u32;

        if !(self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite())
        {
            return None;
        }

        let x1 = clamp_x(self.x1);
        let y1 = clamp_y(self.y1);
        let x2 = clamp_x(self.x2);
        let y2 = clamp_y(self.y2);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(PixelBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }

    /// Sorts by confidence (highest first) and keeps at most `limit`.
    ///
    /// The sort is stable, so equal scores keep detector order.
    pub fn top_by_confidence(mut detections: Vec<Detection>, limit: usize) -> Vec<Detection> {
        detections.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        detections.truncate(limit);
        detections
    }
}
