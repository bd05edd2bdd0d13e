use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::frame_annotator::FrameAnnotator;
use crate::pipeline::capture_stage::{CapturePacing, CaptureStage};
use crate::pipeline::detect_stage::DetectStage;
use crate::pipeline::display_stage::DisplayStage;
use crate::pipeline::pipeline_error::{PipelineError, TerminationReason};
use crate::pipeline::pipeline_logger::{with_logger, NullPipelineLogger, SharedPipelineLogger};
use crate::pipeline::pipeline_settings::PipelineSettings;
use crate::pipeline::stage::{
    ExitGuard, StageControl, StageExit, StageKind, StageOutcome, StageState,
};
use crate::rendering::domain::render_sink::RenderSink;
use crate::shared::frame_slot::FrameSlot;
use crate::shared::source_descriptor::SourceDescriptor;
use crate::video::domain::video_source::SourceFactory;

/// Unread events kept for listeners; older ones are discarded first.
pub const EVENT_BACKLOG: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
}

/// Notifications for whoever drives the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineEvent {
    Started(SourceDescriptor),
    /// Sent after the run's threads have all been joined.
    Terminated(TerminationReason),
}

/// Owns the capture → detect → display pipeline and its lifecycle.
///
/// Each `start` spawns three stage threads wired by two [`FrameSlot`]s plus a
/// supervisor thread. The first stage to exit, for whatever reason, makes the
/// supervisor stop and join the other two, hand back the detector and sink,
/// and emit [`PipelineEvent::Terminated`]. The pipeline is then `Idle` and can
/// be reconfigured and started again.
pub struct PipelineOrchestrator {
    descriptor: SourceDescriptor,
    settings: PipelineSettings,
    source_factory: SourceFactory,
    annotator: FrameAnnotator,
    detector: Option<Box<dyn FaceDetector>>,
    sink: Option<Box<dyn RenderSink>>,
    /// Stage whose panic took its component with it.
    lost_in: Option<StageKind>,
    logger: SharedPipelineLogger,
    controls: Vec<Arc<StageControl>>,
    run: Option<ActiveRun>,
    last_termination: Option<TerminationReason>,
    events_tx: Sender<PipelineEvent>,
    events_rx: Receiver<PipelineEvent>,
}

struct ActiveRun {
    controls: Vec<Arc<StageControl>>,
    running: Arc<AtomicBool>,
    supervisor: JoinHandle<Reclaimed>,
}

/// Components handed back by the stages of a finished run.
struct Reclaimed {
    detector: Option<Box<dyn FaceDetector>>,
    sink: Option<Box<dyn RenderSink>>,
    reason: TerminationReason,
}

struct StageHandles {
    capture: JoinHandle<()>,
    detect: JoinHandle<Box<dyn FaceDetector>>,
    display: JoinHandle<Box<dyn RenderSink>>,
}

impl PipelineOrchestrator {
    pub fn new(
        source_factory: SourceFactory,
        detector: Box<dyn FaceDetector>,
        sink: Box<dyn RenderSink>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_BACKLOG);
        Self {
            descriptor: SourceDescriptor::default(),
            settings: PipelineSettings::default(),
            source_factory,
            annotator: FrameAnnotator::new(),
            detector: Some(detector),
            sink: Some(sink),
            lost_in: None,
            logger: NullPipelineLogger::shared(),
            controls: fresh_controls(),
            run: None,
            last_termination: None,
            events_tx,
            events_rx,
        }
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_logger(mut self, logger: SharedPipelineLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_annotator(mut self, annotator: FrameAnnotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Receiver for pipeline events. Every clone sees each event once
    /// between them.
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.events_rx.clone()
    }

    /// Selects the capture source for the next `start`.
    pub fn configure(&mut self, descriptor: SourceDescriptor) -> Result<(), PipelineError> {
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }
        log::info!("Configured source: {descriptor}");
        self.descriptor = descriptor;
        Ok(())
    }

    pub fn set_settings(&mut self, settings: PipelineSettings) -> Result<(), PipelineError> {
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }
        self.settings = settings;
        Ok(())
    }

    /// Installs a detector, e.g. after the previous one was lost to a panic.
    pub fn replace_detector(
        &mut self,
        detector: Box<dyn FaceDetector>,
    ) -> Result<(), PipelineError> {
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }
        self.reclaim_finished();
        self.detector = Some(detector);
        self.clear_lost(StageKind::Detect);
        Ok(())
    }

    pub fn replace_sink(&mut self, sink: Box<dyn RenderSink>) -> Result<(), PipelineError> {
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }
        self.reclaim_finished();
        self.sink = Some(sink);
        self.clear_lost(StageKind::Display);
        Ok(())
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn state(&self) -> PipelineState {
        if self.is_running() {
            PipelineState::Running
        } else {
            PipelineState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| run.running.load(Ordering::Acquire))
    }

    /// Per-stage state of the current or most recent run.
    pub fn stage_states(&self) -> Vec<(StageKind, StageState)> {
        self.controls.iter().map(|c| (c.kind(), c.state())).collect()
    }

    /// Why the most recent finished run ended, once it has been reclaimed by
    /// `stop` or `start`.
    pub fn last_termination(&self) -> Option<&TerminationReason> {
        self.last_termination.as_ref()
    }

    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }
        self.reclaim_finished();

        let (detector, sink) = match (self.detector.take(), self.sink.take()) {
            (Some(detector), Some(sink)) => (detector, sink),
            (detector, sink) => {
                self.detector = detector;
                self.sink = sink;
                return Err(self
                    .lost_in
                    .map_or(PipelineError::ComponentsUnavailable, PipelineError::StagePanicked));
            }
        };

        let controls = fresh_controls();
        self.controls = controls.clone();
        let frames = Arc::new(FrameSlot::new());
        let annotated = Arc::new(FrameSlot::new());
        let (exit_tx, exit_rx) = crossbeam_channel::unbounded();

        let capture = CaptureStage::new(
            (self.source_factory)(&self.descriptor),
            self.descriptor.clone(),
            frames.clone(),
            controls[0].clone(),
            CapturePacing::from_settings(&self.settings, &self.descriptor),
            self.logger.clone(),
        );
        let detect = DetectStage::new(
            detector,
            self.annotator.clone(),
            frames,
            annotated.clone(),
            controls[1].clone(),
            self.settings.detect_idle(),
            self.logger.clone(),
        );
        let display = DisplayStage::new(
            sink,
            annotated,
            controls[2].clone(),
            self.settings.display_tick(),
            self.logger.clone(),
        );

        let descriptor = self.descriptor.clone();
        with_logger(&self.logger, |l| {
            l.begin_run();
            l.info(&format!("Starting pipeline on {descriptor}"));
        });
        emit(
            &self.events_tx,
            &self.events_rx,
            PipelineEvent::Started(descriptor),
        );

        let stages = StageHandles {
            capture: spawn_stage(controls[0].clone(), exit_tx.clone(), move |guard| {
                if let Err(e) = capture.run() {
                    guard.fail(e);
                }
            }),
            detect: spawn_stage(controls[1].clone(), exit_tx.clone(), move |_| detect.run()),
            display: spawn_stage(controls[2].clone(), exit_tx, move |_| display.run()),
        };

        let running = Arc::new(AtomicBool::new(true));
        let supervisor = {
            let controls = controls.clone();
            let running = running.clone();
            let events = (self.events_tx.clone(), self.events_rx.clone());
            let logger = self.logger.clone();
            std::thread::spawn(move || {
                supervise(stages, &controls, exit_rx, &running, &events, &logger)
            })
        };

        self.run = Some(ActiveRun {
            controls,
            running,
            supervisor,
        });
        Ok(())
    }

    /// Stops all stages and waits until every thread has exited and released
    /// its resources. Does nothing when idle.
    pub fn stop(&mut self) {
        let Some(run) = self.run.take() else {
            return;
        };
        if run.running.load(Ordering::Acquire) {
            log::info!("Stopping pipeline");
        }
        for control in &run.controls {
            control.request_stop();
        }
        self.reclaim(run);
    }

    fn reclaim_finished(&mut self) {
        if let Some(run) = self.run.take() {
            self.reclaim(run);
        }
    }

    fn reclaim(&mut self, run: ActiveRun) {
        match run.supervisor.join() {
            Ok(reclaimed) => {
                if reclaimed.detector.is_none() {
                    self.lost_in = Some(StageKind::Detect);
                }
                if reclaimed.sink.is_none() {
                    self.lost_in = Some(StageKind::Display);
                }
                self.detector = reclaimed.detector;
                self.sink = reclaimed.sink;
                self.last_termination = Some(reclaimed.reason);
            }
            Err(_) => log::error!("Pipeline supervisor panicked"),
        }
    }

    fn clear_lost(&mut self, kind: StageKind) {
        if self.lost_in == Some(kind) {
            self.lost_in = None;
        }
    }
}

impl Drop for PipelineOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn fresh_controls() -> Vec<Arc<StageControl>> {
    StageKind::ALL
        .iter()
        .map(|&kind| Arc::new(StageControl::new(kind)))
        .collect()
}

fn spawn_stage<T, F>(
    control: Arc<StageControl>,
    exit_tx: Sender<StageExit>,
    body: F,
) -> JoinHandle<T>
where
    T: Send + 'static,
    F: FnOnce(&mut ExitGuard) -> T + Send + 'static,
{
    std::thread::spawn(move || {
        let mut guard = ExitGuard::new(control, exit_tx);
        body(&mut guard)
    })
}

/// Queues `event`, discarding the oldest unread event when the backlog is full.
fn emit(tx: &Sender<PipelineEvent>, rx: &Receiver<PipelineEvent>, event: PipelineEvent) {
    let mut event = event;
    loop {
        match tx.try_send(event) {
            Ok(()) => return,
            Err(TrySendError::Full(rejected)) => {
                if let Ok(stale) = rx.try_recv() {
                    log::debug!("Dropping unread pipeline event {stale:?}");
                }
                event = rejected;
            }
            Err(TrySendError::Disconnected(_)) => return,
        }
    }
}

fn reason_for(exit: StageExit) -> TerminationReason {
    match exit.outcome {
        StageOutcome::Finished => TerminationReason::Stopped,
        StageOutcome::SourceFailed(e) => TerminationReason::SourceFailed(e),
        StageOutcome::Panicked => TerminationReason::StagePanicked(exit.kind),
    }
}

/// Waits for the first stage exit, then tears the whole run down.
fn supervise(
    stages: StageHandles,
    controls: &[Arc<StageControl>],
    exit_rx: Receiver<StageExit>,
    running: &AtomicBool,
    events: &(Sender<PipelineEvent>, Receiver<PipelineEvent>),
    logger: &SharedPipelineLogger,
) -> Reclaimed {
    let first = exit_rx.recv().ok();
    if let Some(exit) = &first {
        log::debug!("{} stage exited first", exit.kind);
    }
    for control in controls {
        control.request_stop();
    }
    let (detector, sink) = stages.join();

    // A stop request can race a failure in another stage; the failure wins.
    let mut reason = first.map_or(TerminationReason::Stopped, reason_for);
    for exit in exit_rx.try_iter() {
        if !reason.is_failure() {
            reason = reason_for(exit);
        }
    }

    running.store(false, Ordering::Release);
    with_logger(logger, |l| l.summary());
    if reason.is_failure() {
        log::warn!("Pipeline terminated: {reason}");
    } else {
        with_logger(logger, |l| l.info("Pipeline stopped"));
    }
    emit(&events.0, &events.1, PipelineEvent::Terminated(reason.clone()));

    Reclaimed {
        detector,
        sink,
        reason,
    }
}

impl StageHandles {
    fn join(self) -> (Option<Box<dyn FaceDetector>>, Option<Box<dyn RenderSink>>) {
        if self.capture.join().is_err() {
            log::error!("Capture stage panicked");
        }
        let detector = self.detect.join().ok();
        if detector.is_none() {
            log::error!("Detect stage panicked");
        }
        let sink = self.display.join().ok();
        if sink.is_none() {
            log::error!("Display stage panicked");
        }
        (detector, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{
        wait_until, Delivery, FakeSource, IndexEchoDetector, RecordingSink, SourceProbe,
    };
    use crate::shared::frame::ColorOrder;
    use crate::video::domain::video_source::{SourceError, VideoSource};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn factory(
        probe: &Arc<SourceProbe>,
        make: impl Fn(Arc<SourceProbe>) -> FakeSource + Send + 'static,
    ) -> SourceFactory {
        let probe = probe.clone();
        Box::new(move |_: &SourceDescriptor| -> Box<dyn VideoSource> {
            Box::new(make(probe.clone()))
        })
    }

    fn orchestrator(
        source_factory: SourceFactory,
        sink: RecordingSink,
    ) -> (PipelineOrchestrator, Arc<Mutex<Vec<Delivery>>>) {
        let deliveries = sink.deliveries.clone();
        let mut orch = PipelineOrchestrator::new(
            source_factory,
            Box::new(IndexEchoDetector::new()),
            Box::new(sink),
        );
        orch.configure(SourceDescriptor::File(PathBuf::from("clip.mp4")))
            .unwrap();
        (orch, deliveries)
    }

    fn looping_file(
        frames: usize,
    ) -> (PipelineOrchestrator, Arc<SourceProbe>, Arc<Mutex<Vec<Delivery>>>) {
        let probe = Arc::new(SourceProbe::default());
        let (orch, deliveries) = orchestrator(
            factory(&probe, move |p| FakeSource::new(frames, p)),
            RecordingSink::new(ColorOrder::Rgb),
        );
        (orch, probe, deliveries)
    }

    fn next_termination(events: &Receiver<PipelineEvent>) -> TerminationReason {
        loop {
            match events.recv_timeout(WAIT) {
                Ok(PipelineEvent::Terminated(reason)) => return reason,
                Ok(PipelineEvent::Started(_)) => continue,
                Err(e) => panic!("no termination event: {e}"),
            }
        }
    }

    #[test]
    fn test_start_delivers_frames_and_stop_joins_everything() {
        let (mut orch, probe, deliveries) = looping_file(3);
        let events = orch.events();

        orch.start().unwrap();
        assert_eq!(orch.state(), PipelineState::Running);
        assert!(wait_until(WAIT, || RecordingSink::count(&deliveries) >= 3));

        orch.stop();
        assert_eq!(orch.state(), PipelineState::Idle);
        for (kind, state) in orch.stage_states() {
            assert_eq!(state, StageState::Stopped, "{kind} not stopped");
        }
        assert!(!probe.is_held());
        assert_eq!(probe.closes(), 1);

        // Nothing runs after stop returns.
        let reads = probe.reads();
        let delivered = RecordingSink::count(&deliveries);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(probe.reads(), reads);
        assert_eq!(RecordingSink::count(&deliveries), delivered);

        assert_eq!(
            events.try_recv().unwrap(),
            PipelineEvent::Started(SourceDescriptor::File(PathBuf::from("clip.mp4")))
        );
        assert_eq!(
            events.try_recv().unwrap(),
            PipelineEvent::Terminated(TerminationReason::Stopped)
        );
        assert_eq!(orch.last_termination(), Some(&TerminationReason::Stopped));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut orch, _, _) = looping_file(3);
        orch.stop();
        orch.start().unwrap();
        orch.stop();
        orch.stop();
        assert_eq!(orch.state(), PipelineState::Idle);
    }

    #[test]
    fn test_restart_reopens_exclusive_source() {
        let (mut orch, probe, deliveries) = looping_file(3);

        orch.start().unwrap();
        assert!(wait_until(WAIT, || RecordingSink::count(&deliveries) >= 1));
        orch.stop();

        orch.start().unwrap();
        let before = RecordingSink::count(&deliveries);
        assert!(wait_until(WAIT, || RecordingSink::count(&deliveries) > before));
        assert_eq!(orch.state(), PipelineState::Running);
        orch.stop();

        assert_eq!(probe.opens.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(probe.closes(), 2);
    }

    #[test]
    fn test_start_while_running_fails() {
        let (mut orch, _, _) = looping_file(3);
        orch.start().unwrap();
        assert_eq!(orch.start(), Err(PipelineError::AlreadyRunning));
        orch.stop();
    }

    #[test]
    fn test_configure_rejected_while_running() {
        let (mut orch, _, _) = looping_file(3);
        orch.start().unwrap();

        assert_eq!(
            orch.configure(SourceDescriptor::Device(1)),
            Err(PipelineError::AlreadyRunning)
        );
        assert_eq!(
            orch.set_settings(PipelineSettings::default()),
            Err(PipelineError::AlreadyRunning)
        );
        assert_eq!(orch.descriptor(), &SourceDescriptor::File(PathBuf::from("clip.mp4")));

        orch.stop();
        orch.configure(SourceDescriptor::Device(1)).unwrap();
        assert_eq!(orch.descriptor(), &SourceDescriptor::Device(1));
    }

    #[test]
    fn test_device_disconnect_terminates_pipeline() {
        let probe = Arc::new(SourceProbe::default());
        let (mut orch, _) = orchestrator(
            factory(&probe, |p| FakeSource::new(100, p).failing_from_read(2)),
            RecordingSink::new(ColorOrder::Rgb),
        );
        orch.configure(SourceDescriptor::Device(0)).unwrap();
        let events = orch.events();

        orch.start().unwrap();
        assert_eq!(
            next_termination(&events),
            TerminationReason::SourceFailed(SourceError::Disconnected(0))
        );
        assert_eq!(orch.state(), PipelineState::Idle);
        assert_eq!(probe.reads(), 2);
        assert!(!probe.is_held());
        for (_, state) in orch.stage_states() {
            assert_eq!(state, StageState::Stopped);
        }

        // Components come back, so the pipeline can run again.
        orch.start().unwrap();
        assert!(next_termination(&events).is_failure());
        orch.stop();
        assert_eq!(
            orch.last_termination().map(TerminationReason::code),
            Some("source_disconnected")
        );
    }

    #[test]
    fn test_open_failure_terminates_without_frames() {
        let probe = Arc::new(SourceProbe::default());
        let (mut orch, deliveries) = orchestrator(
            factory(&probe, FakeSource::failing_open),
            RecordingSink::new(ColorOrder::Rgb),
        );
        let events = orch.events();

        orch.start().unwrap();
        let reason = next_termination(&events);
        assert_eq!(reason.code(), "source_open_failed");
        assert_eq!(orch.state(), PipelineState::Idle);
        assert_eq!(RecordingSink::count(&deliveries), 0);
        assert_eq!(probe.reads(), 0);
    }

    #[test]
    fn test_crops_always_belong_to_delivered_frame() {
        let (mut orch, _, deliveries) = looping_file(50);
        orch.start().unwrap();
        assert!(wait_until(WAIT, || RecordingSink::count(&deliveries) >= 20));
        orch.stop();

        for delivery in deliveries.lock().unwrap().iter() {
            assert_eq!(delivery.face_indices, vec![delivery.frame_index]);
            assert_eq!(delivery.color_order, ColorOrder::Rgb);
        }
    }

    #[test]
    fn test_sink_panic_terminates_and_loses_sink() {
        let probe = Arc::new(SourceProbe::default());
        let (mut orch, _) = orchestrator(
            factory(&probe, |p| FakeSource::new(3, p)),
            RecordingSink::panicking(),
        );
        let events = orch.events();

        orch.start().unwrap();
        assert_eq!(
            next_termination(&events),
            TerminationReason::StagePanicked(StageKind::Display)
        );
        assert!(!probe.is_held());
        assert_eq!(
            orch.start(),
            Err(PipelineError::StagePanicked(StageKind::Display))
        );

        let replacement = RecordingSink::new(ColorOrder::Rgb);
        let deliveries = replacement.deliveries.clone();
        orch.replace_sink(Box::new(replacement)).unwrap();
        orch.start().unwrap();
        assert!(wait_until(WAIT, || RecordingSink::count(&deliveries) >= 1));
        orch.stop();
    }

    #[test]
    fn test_drop_stops_running_pipeline() {
        let (mut orch, probe, _) = looping_file(3);
        orch.start().unwrap();
        assert!(wait_until(WAIT, || probe.reads() > 0));
        drop(orch);
        assert!(!probe.is_held());
    }

    #[test]
    fn test_stage_states_idle_before_first_start() {
        let (orch, _, _) = looping_file(3);
        let states = orch.stage_states();
        assert_eq!(states.len(), 3);
        assert!(states.iter().all(|(_, s)| *s == StageState::Idle));
        assert_eq!(orch.state(), PipelineState::Idle);
    }

    #[test]
    fn test_unread_events_are_bounded_and_keep_the_latest() {
        let (mut orch, _, _) = looping_file(3);
        let events = orch.events();
        for _ in 0..EVENT_BACKLOG {
            orch.start().unwrap();
            orch.stop();
        }

        let backlog: Vec<_> = events.try_iter().collect();
        assert_eq!(backlog.len(), EVENT_BACKLOG);
        assert_eq!(
            backlog.last(),
            Some(&PipelineEvent::Terminated(TerminationReason::Stopped))
        );
    }

    #[test]
    fn test_each_run_starts_with_fresh_stats() {
        use crate::pipeline::pipeline_logger::{PipelineLogger, StatsPipelineLogger};

        let stats = Arc::new(Mutex::new(StatsPipelineLogger::new()));
        let (orch, _, deliveries) = looping_file(3);
        let mut orch = orch.with_logger(stats.clone());

        orch.start().unwrap();
        assert!(wait_until(WAIT, || RecordingSink::count(&deliveries) >= 3));
        orch.stop();
        assert!(stats.lock().unwrap().timings_for("detect").is_some());

        // A restart clears the first run's figures before new frames arrive.
        stats.lock().unwrap().metric("marker", 1.0);
        orch.start().unwrap();
        assert!(stats.lock().unwrap().metrics_for("marker").is_none());
        orch.stop();
    }

    #[derive(Default)]
    struct MessageLog(Vec<String>);

    impl crate::pipeline::pipeline_logger::PipelineLogger for MessageLog {
        fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
        fn metric(&mut self, _name: &str, _value: f64) {}
        fn info(&mut self, message: &str) {
            self.0.push(message.to_string());
        }
    }

    #[test]
    fn test_lifecycle_messages_reach_logger() {
        let log = Arc::new(Mutex::new(MessageLog::default()));
        let (orch, _, deliveries) = looping_file(3);
        let mut orch = orch.with_logger(log.clone());

        orch.start().unwrap();
        assert!(wait_until(WAIT, || RecordingSink::count(&deliveries) >= 1));
        orch.stop();

        let messages = log.lock().unwrap().0.clone();
        assert_eq!(
            messages.first().map(String::as_str),
            Some("Starting pipeline on file clip.mp4")
        );
        for expected in ["Detect stage stopped", "Display stage stopped", "Pipeline stopped"] {
            assert!(
                messages.iter().any(|m| m == expected),
                "missing {expected:?} in {messages:?}"
            );
        }
        assert!(messages.iter().any(|m| m.starts_with("Capture from")));
    }
}
