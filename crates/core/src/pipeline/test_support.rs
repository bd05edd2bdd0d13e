//! In-memory collaborators for exercising stages and the orchestrator.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::detection::domain::annotated_frame::FaceCrop;
use crate::detection::domain::face_detector::FaceDetector;
use crate::rendering::domain::render_sink::RenderSink;
use crate::shared::detection::Detection;
use crate::shared::frame::{ColorOrder, Frame};
use crate::shared::source_descriptor::SourceDescriptor;
use crate::video::domain::video_source::{SourceError, SourceInfo, VideoSource};

pub const FAKE_WIDTH: u32 = 32;
pub const FAKE_HEIGHT: u32 = 24;

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Observable side of a [`FakeSource`], shared with the test.
#[derive(Default, Debug)]
pub struct SourceProbe {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub reads: AtomicUsize,
    /// Exclusive handle, like a camera: a second open fails until closed.
    pub held: AtomicBool,
}

impl SourceProbe {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

/// Scripted source producing `frame_count` frames whose pixels all equal
/// their index.
pub struct FakeSource {
    probe: Arc<SourceProbe>,
    frame_count: usize,
    fps: f64,
    fail_open: bool,
    /// 1-based read number that fails, and every read after it.
    fail_from_read: Option<usize>,
    open: bool,
    position: usize,
}

impl FakeSource {
    pub fn new(frame_count: usize, probe: Arc<SourceProbe>) -> Self {
        Self {
            probe,
            frame_count,
            fps: 1000.0,
            fail_open: false,
            fail_from_read: None,
            open: false,
            position: 0,
        }
    }

    pub fn failing_open(probe: Arc<SourceProbe>) -> Self {
        Self {
            fail_open: true,
            ..Self::new(0, probe)
        }
    }

    pub fn failing_from_read(mut self, read: usize) -> Self {
        self.fail_from_read = Some(read);
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }
}

impl VideoSource for FakeSource {
    fn open(&mut self, descriptor: &SourceDescriptor) -> Result<SourceInfo, SourceError> {
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open || self.probe.held.swap(true, Ordering::SeqCst) {
            return Err(SourceError::OpenFailed {
                source_name: descriptor.to_string(),
                reason: "unavailable".into(),
            });
        }
        self.open = true;
        self.position = 0;
        Ok(SourceInfo {
            width: FAKE_WIDTH,
            height: FAKE_HEIGHT,
            fps: self.fps,
        })
    }

    fn read(&mut self) -> Result<Option<Frame>, SourceError> {
        if !self.open {
            return Err(SourceError::NotOpen);
        }
        let read = self.probe.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_from_read.is_some_and(|n| read >= n) {
            return Err(SourceError::ReadFailed("unplugged".into()));
        }
        if self.position >= self.frame_count {
            return Ok(None);
        }
        let index = self.position;
        self.position += 1;
        let data = vec![index as u8; (FAKE_WIDTH * FAKE_HEIGHT * 3) as usize];
        Ok(Some(Frame::new(data, FAKE_WIDTH, FAKE_HEIGHT, 3, index)))
    }

    fn rewind(&mut self) -> Result<(), SourceError> {
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) {
        if std::mem::take(&mut self.open) {
            self.probe.held.store(false, Ordering::SeqCst);
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Reports one face per frame whose confidence encodes the frame index
/// (`index / 1000`), so deliveries can be matched to their source frame.
pub struct IndexEchoDetector {
    pub calls: Arc<AtomicUsize>,
    delay: Duration,
    fail: bool,
}

impl IndexEchoDetector {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

pub fn encoded_index(confidence: f64) -> usize {
    (confidence * 1000.0).round() as usize
}

impl FaceDetector for IndexEchoDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err("model exploded".into());
        }
        Ok(vec![Detection::new(
            2.0,
            2.0,
            12.0,
            12.0,
            frame.index() as f64 / 1000.0,
        )])
    }
}

/// What a [`RecordingSink`] saw for one delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub frame_index: usize,
    pub color_order: ColorOrder,
    pub first_pixel: Vec<u8>,
    pub face_indices: Vec<usize>,
    pub face_orders: Vec<ColorOrder>,
}

#[derive(Default)]
pub struct RecordingSink {
    pub deliveries: Arc<Mutex<Vec<Delivery>>>,
    pending: Option<Delivery>,
    order: ColorOrder,
    panic_on_present: bool,
}

impl RecordingSink {
    pub fn new(order: ColorOrder) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_present: true,
            ..Self::default()
        }
    }

    pub fn count(deliveries: &Arc<Mutex<Vec<Delivery>>>) -> usize {
        deliveries.lock().unwrap().len()
    }
}

impl RenderSink for RecordingSink {
    fn color_order(&self) -> ColorOrder {
        self.order
    }

    fn present(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        if self.panic_on_present {
            panic!("sink exploded");
        }
        self.pending = Some(Delivery {
            frame_index: frame.index(),
            color_order: frame.color_order(),
            first_pixel: frame.data()[..frame.channels() as usize].to_vec(),
            face_indices: Vec::new(),
            face_orders: Vec::new(),
        });
        Ok(())
    }

    fn present_faces(&mut self, faces: &[FaceCrop]) -> Result<(), Box<dyn std::error::Error>> {
        let mut delivery = self.pending.take().ok_or("faces without a frame")?;
        delivery.face_indices = faces.iter().map(|f| encoded_index(f.confidence)).collect();
        delivery.face_orders = faces.iter().map(|f| f.image.color_order()).collect();
        self.deliveries.lock().unwrap().push(delivery);
        Ok(())
    }
}
