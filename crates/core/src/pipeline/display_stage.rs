use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detection::domain::annotated_frame::{AnnotatedFrame, FaceCrop};
use crate::pipeline::fps_counter::FpsCounter;
use crate::pipeline::pipeline_logger::{with_logger, SharedPipelineLogger};
use crate::pipeline::stage::StageControl;
use crate::rendering::domain::render_sink::RenderSink;
use crate::shared::frame_slot::FrameSlot;

/// Drains the newest annotated frame on a fixed tick and hands it to the
/// render sink, converted to the sink's channel order.
///
/// An empty tick delivers nothing; the sink keeps showing its last frame.
pub struct DisplayStage {
    sink: Box<dyn RenderSink>,
    input: Arc<FrameSlot<AnnotatedFrame>>,
    control: Arc<StageControl>,
    tick: Duration,
    fps: FpsCounter,
    logger: SharedPipelineLogger,
}

impl DisplayStage {
    pub fn new(
        sink: Box<dyn RenderSink>,
        input: Arc<FrameSlot<AnnotatedFrame>>,
        control: Arc<StageControl>,
        tick: Duration,
        logger: SharedPipelineLogger,
    ) -> Self {
        Self {
            sink,
            input,
            control,
            tick,
            fps: FpsCounter::default(),
            logger,
        }
    }

    pub fn deliver(&mut self, annotated: AnnotatedFrame) {
        let started = Instant::now();
        let order = self.sink.color_order();
        let AnnotatedFrame { frame, faces, .. } = annotated;
        let frame = frame.into_color_order(order);
        let faces: Vec<FaceCrop> = faces
            .into_iter()
            .map(|face| FaceCrop {
                image: face.image.into_color_order(order),
                ..face
            })
            .collect();

        if let Err(e) = self.sink.present(&frame) {
            log::warn!("Render sink rejected frame {}: {e}", frame.index());
        }
        if let Err(e) = self.sink.present_faces(&faces) {
            log::warn!("Render sink rejected faces of frame {}: {e}", frame.index());
        }

        let rate = self.fps.tick();
        with_logger(&self.logger, |l| {
            l.timing("display", started.elapsed().as_secs_f64() * 1000.0);
            if let Some(rate) = rate {
                l.metric("display_fps", rate);
            }
        });
    }

    /// Loops until stopped, then hands the sink back for the next run.
    ///
    /// The slot is drained once per tick no matter how fast frames arrive,
    /// so the sink sees at most one delivery per tick.
    pub fn run(mut self) -> Box<dyn RenderSink> {
        let mut next_tick = Instant::now();
        while !self.control.should_stop() {
            if let Some(annotated) = self.input.take() {
                self.deliver(annotated);
            }
            next_tick += self.tick;
            let now = Instant::now();
            if next_tick > now {
                std::thread::sleep(next_tick - now);
            } else {
                // Fell behind; skip the missed ticks instead of bursting.
                next_tick = now;
            }
        }
        with_logger(&self.logger, |l| l.info("Display stage stopped"));
        self.sink
    }
}
