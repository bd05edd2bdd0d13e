use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::pipeline::fps_counter::FpsCounter;
use crate::pipeline::pipeline_logger::{with_logger, SharedPipelineLogger};
use crate::pipeline::pipeline_settings::PipelineSettings;
use crate::pipeline::stage::StageControl;
use crate::shared::frame::Frame;
use crate::shared::frame_slot::FrameSlot;
use crate::shared::source_descriptor::SourceDescriptor;
use crate::video::domain::video_source::{SourceError, SourceInfo, VideoSource};

/// Delay between capture reads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CapturePacing {
    /// Used when the source declares no native rate.
    pub fallback_interval: Duration,
    pub max_interval: Duration,
}

impl CapturePacing {
    pub fn from_settings(settings: &PipelineSettings, descriptor: &SourceDescriptor) -> Self {
        let fallback_interval = match descriptor {
            SourceDescriptor::Device(_) => settings.device_frame_interval(),
            SourceDescriptor::File(_) => settings.file_frame_interval(),
        };
        Self {
            fallback_interval,
            max_interval: settings.max_pacing(),
        }
    }

    pub fn interval_for(&self, info: &SourceInfo) -> Duration {
        info.frame_interval()
            .unwrap_or(self.fallback_interval)
            .min(self.max_interval)
    }
}

/// Pulls frames from a source into the first slot of the pipeline.
///
/// End of stream rewinds file sources and ends device sources with
/// [`SourceError::Disconnected`]. The source is closed on every exit path.
pub struct CaptureStage {
    source: Box<dyn VideoSource>,
    descriptor: SourceDescriptor,
    output: Arc<FrameSlot<Frame>>,
    control: Arc<StageControl>,
    pacing: CapturePacing,
    logger: SharedPipelineLogger,
}

impl CaptureStage {
    pub fn new(
        source: Box<dyn VideoSource>,
        descriptor: SourceDescriptor,
        output: Arc<FrameSlot<Frame>>,
        control: Arc<StageControl>,
        pacing: CapturePacing,
        logger: SharedPipelineLogger,
    ) -> Self {
        Self {
            source,
            descriptor,
            output,
            control,
            pacing,
            logger,
        }
    }

    /// Opens the source, captures until stopped or failed, then closes it.
    pub fn run(mut self) -> Result<(), SourceError> {
        let result = self
            .source
            .open(&self.descriptor)
            .and_then(|info| self.capture_loop(info));
        self.source.close();
        match &result {
            Ok(()) => {
                let message = format!("Capture from {} stopped", self.descriptor);
                with_logger(&self.logger, |l| l.info(&message));
            }
            Err(e) => log::warn!("Capture from {} ended: {e}", self.descriptor),
        }
        result
    }

    fn capture_loop(&mut self, info: SourceInfo) -> Result<(), SourceError> {
        let interval = self.pacing.interval_for(&info);
        log::info!(
            "Capturing {} at {}x{}, {:.1}ms per frame",
            self.descriptor,
            info.width,
            info.height,
            interval.as_secs_f64() * 1000.0
        );

        let mut fps = FpsCounter::default();
        let mut dropped: u64 = 0;
        let outcome = loop {
            if self.control.should_stop() {
                break Ok(());
            }
            let started = Instant::now();
            let frame = match self.next_frame() {
                Ok(frame) => frame,
                Err(e) => break Err(e),
            };
            if self.output.publish(frame) {
                dropped += 1;
            }
            if let Some(rate) = fps.tick() {
                with_logger(&self.logger, |l| l.metric("capture_fps", rate));
            }
            with_logger(&self.logger, |l| {
                l.timing("capture", started.elapsed().as_secs_f64() * 1000.0)
            });

            let remaining = interval.saturating_sub(started.elapsed());
            if !remaining.is_zero() {
                std::thread::sleep(remaining);
            }
        };

        with_logger(&self.logger, |l| l.metric("capture_dropped", dropped as f64));
        outcome
    }

    /// Reads the next frame, looping file sources at end of stream.
    ///
    /// A file that yields nothing straight after a rewind is reported as
    /// [`SourceError::EmptySource`] instead of being retried forever.
    pub fn next_frame(&mut self) -> Result<Frame, SourceError> {
        if let Some(frame) = self.read_once() {
            return Ok(frame);
        }
        match &self.descriptor {
            SourceDescriptor::Device(index) => Err(SourceError::Disconnected(*index)),
            SourceDescriptor::File(path) => {
                let name = path.display().to_string();
                log::debug!("Rewinding {name}");
                self.source.rewind()?;
                self.read_once().ok_or(SourceError::EmptySource(name))
            }
        }
    }

    fn read_once(&mut self) -> Option<Frame> {
        match self.source.read() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Read from {} failed: {e}", self.descriptor);
                None
            }
        }
    }
}
