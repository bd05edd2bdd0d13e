use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::detection::domain::annotated_frame::FaceCrop;
use crate::rendering::domain::render_sink::RenderSink;
use crate::shared::constants::MAX_FACES;
use crate::shared::frame::{ColorOrder, Frame};

/// File name of the most recent annotated frame.
pub const LATEST_FRAME_FILE: &str = "latest.png";

/// Writes the most recent annotated frame and its face crops as PNG files.
///
/// Output is throttled to one write per `min_interval`; deliveries inside the
/// interval are dropped. A delivery is written whole or not at all, so the
/// face files on disk always belong to `latest.png`.
pub struct ImageFileSink {
    dir: PathBuf,
    min_interval: Duration,
    last_write: Option<Instant>,
    writing: bool,
    frames_written: u64,
}

impl ImageFileSink {
    pub fn new(dir: &Path, min_interval: Duration) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            min_interval,
            last_write: None,
            writing: false,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn face_path(&self, slot: usize) -> PathBuf {
        self.dir.join(format!("face_{slot}.png"))
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FRAME_FILE)
    }

    fn due(&self, now: Instant) -> bool {
        self.last_write
            .map_or(true, |last| now.duration_since(last) >= self.min_interval)
    }
}

impl RenderSink for ImageFileSink {
    fn present(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let now = Instant::now();
        self.writing = self.due(now);
        if !self.writing {
            return Ok(());
        }
        self.last_write = Some(now);
        save_rgb(&self.latest_path(), frame)?;
        self.frames_written += 1;
        Ok(())
    }

    fn present_faces(&mut self, faces: &[FaceCrop]) -> Result<(), Box<dyn std::error::Error>> {
        if !self.writing {
            return Ok(());
        }
        self.writing = false;

        for (slot, face) in faces.iter().take(MAX_FACES).enumerate() {
            save_rgb(&self.face_path(slot), &face.image)?;
        }
        for slot in faces.len().min(MAX_FACES)..MAX_FACES {
            let path = self.face_path(slot);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn save_rgb(path: &Path, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
    if frame.color_order() != ColorOrder::Rgb {
        return Err(format!("expected an RGB frame, got {:?}", frame.color_order()).into());
    }
    let img = match frame.channels() {
        3 => image::DynamicImage::ImageRgb8(
            image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
                .ok_or("Failed to create image from frame data")?,
        ),
        4 => image::DynamicImage::ImageRgba8(
            image::RgbaImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
                .ok_or("Failed to create image from frame data")?,
        ),
        1 => image::DynamicImage::ImageLuma8(
            image::GrayImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
                .ok_or("Failed to create image from frame data")?,
        ),
        n => return Err(format!("unsupported channel count {n}").into()),
    };
    img.save(path)?;
    Ok(())
}
