use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detection::domain::annotated_frame::AnnotatedFrame;
use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::frame_annotator::FrameAnnotator;
use crate::pipeline::pipeline_logger::{with_logger, SharedPipelineLogger};
use crate::pipeline::stage::StageControl;
use crate::shared::frame::Frame;
use crate::shared::frame_slot::FrameSlot;

/// Runs detection on the newest captured frame and publishes the annotated
/// result together with its face crops.
pub struct DetectStage {
    detector: Box<dyn FaceDetector>,
    annotator: FrameAnnotator,
    input: Arc<FrameSlot<Frame>>,
    output: Arc<FrameSlot<AnnotatedFrame>>,
    control: Arc<StageControl>,
    idle: Duration,
    logger: SharedPipelineLogger,
}

impl DetectStage {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        annotator: FrameAnnotator,
        input: Arc<FrameSlot<Frame>>,
        output: Arc<FrameSlot<AnnotatedFrame>>,
        control: Arc<StageControl>,
        idle: Duration,
        logger: SharedPipelineLogger,
    ) -> Self {
        Self {
            detector,
            annotator,
            input,
            output,
            control,
            idle,
            logger,
        }
    }

    /// Detects and annotates one frame. A detector error counts as no
    /// detections; the frame still comes out, unannotated.
    pub fn process(&mut self, frame: Frame) -> AnnotatedFrame {
        let started = Instant::now();
        let detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("Detection failed on frame {}: {e}", frame.index());
                Vec::new()
            }
        };
        let detect_ms = started.elapsed().as_secs_f64() * 1000.0;

        let annotated = self.annotator.annotate(frame, detections);
        with_logger(&self.logger, |l| {
            l.timing("detect", detect_ms);
            l.timing("annotate", started.elapsed().as_secs_f64() * 1000.0 - detect_ms);
        });
        annotated
    }

    /// Loops until stopped, then hands the detector back for the next run.
    pub fn run(mut self) -> Box<dyn FaceDetector> {
        let mut dropped: u64 = 0;
        while !self.control.should_stop() {
            let Some(frame) = self.input.take_timeout(self.idle) else {
                continue;
            };
            let annotated = self.process(frame);
            if self.output.publish(annotated) {
                dropped += 1;
            }
        }
        with_logger(&self.logger, |l| l.metric("detect_dropped", dropped as f64));
        with_logger(&self.logger, |l| l.info("Detect stage stopped"));
        self.detector
    }
}
