use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use crate::video::domain::video_source::SourceError;

/// The three stages of a run, in data-flow order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Capture,
    Detect,
    Display,
}

impl StageKind {
    /// Data-flow order, which is also the order stops are requested in.
    pub const ALL: [StageKind; 3] = [StageKind::Capture, StageKind::Detect, StageKind::Display];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Capture => "capture",
            StageKind::Detect => "detect",
            StageKind::Display => "display",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum StageState {
    Idle = 0,
    Running = 1,
    StopRequested = 2,
    Stopped = 3,
}

impl StageState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => StageState::Running,
            2 => StageState::StopRequested,
            3 => StageState::Stopped,
            _ => StageState::Idle,
        }
    }
}

/// Stop flag and lifecycle state shared between a stage thread and the
/// orchestrator.
///
/// The stage polls [`should_stop`](Self::should_stop) once per loop
/// iteration. `Stopped` is terminal: a late stop request does not move it
/// back to `StopRequested`.
#[derive(Debug)]
pub struct StageControl {
    kind: StageKind,
    state: AtomicU8,
    stop: AtomicBool,
}

impl StageControl {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            state: AtomicU8::new(StageState::Idle as u8),
            stop: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn state(&self) -> StageState {
        StageState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        for from in [StageState::Idle, StageState::Running] {
            if self
                .state
                .compare_exchange(
                    from as u8,
                    StageState::StopRequested as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                break;
            }
        }
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub(crate) fn mark_running(&self) {
        let _ = self.state.compare_exchange(
            StageState::Idle as u8,
            StageState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn mark_stopped(&self) {
        self.state.store(StageState::Stopped as u8, Ordering::Release);
    }
}

/// How a stage thread ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum StageOutcome {
    Finished,
    SourceFailed(SourceError),
    Panicked,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct StageExit {
    pub kind: StageKind,
    pub outcome: StageOutcome,
}

/// Lives on a stage thread's stack for the duration of its loop.
///
/// On drop, including unwinding from a panic, marks the stage `Stopped` and
/// notifies the supervisor, so a dead stage can never leave the pipeline
/// waiting.
pub(crate) struct ExitGuard {
    control: Arc<StageControl>,
    exit_tx: crossbeam_channel::Sender<StageExit>,
    failure: Option<SourceError>,
}

impl ExitGuard {
    pub fn new(control: Arc<StageControl>, exit_tx: crossbeam_channel::Sender<StageExit>) -> Self {
        control.mark_running();
        Self {
            control,
            exit_tx,
            failure: None,
        }
    }

    pub fn fail(&mut self, error: SourceError) {
        self.failure = Some(error);
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.control.mark_stopped();
        let outcome = if std::thread::panicking() {
            StageOutcome::Panicked
        } else {
            match self.failure.take() {
                Some(error) => StageOutcome::SourceFailed(error),
                None => StageOutcome::Finished,
            }
        };
        // The supervisor may already be gone during orchestrator teardown.
        let _ = self.exit_tx.send(StageExit {
            kind: self.control.kind(),
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_control_is_idle_and_not_stopping() {
        let control = StageControl::new(StageKind::Detect);
        assert_eq!(control.state(), StageState::Idle);
        assert!(!control.should_stop());
        assert_eq!(control.kind(), StageKind::Detect);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let control = StageControl::new(StageKind::Capture);
        control.mark_running();
        assert_eq!(control.state(), StageState::Running);
        control.request_stop();
        assert!(control.should_stop());
        assert_eq!(control.state(), StageState::StopRequested);
        control.mark_stopped();
        assert_eq!(control.state(), StageState::Stopped);
    }

    #[test]
    fn test_stop_request_after_stopped_keeps_stopped() {
        let control = StageControl::new(StageKind::Display);
        control.mark_running();
        control.mark_stopped();
        control.request_stop();
        assert_eq!(control.state(), StageState::Stopped);
    }

    #[test]
    fn test_guard_reports_finished() {
        let control = Arc::new(StageControl::new(StageKind::Detect));
        let (tx, rx) = crossbeam_channel::unbounded();
        {
            let _guard = ExitGuard::new(control.clone(), tx);
            assert_eq!(control.state(), StageState::Running);
        }
        assert_eq!(control.state(), StageState::Stopped);
        assert_eq!(
            rx.try_recv().unwrap(),
            StageExit {
                kind: StageKind::Detect,
                outcome: StageOutcome::Finished
            }
        );
    }

    #[test]
    fn test_guard_reports_source_failure() {
        let control = Arc::new(StageControl::new(StageKind::Capture));
        let (tx, rx) = crossbeam_channel::unbounded();
        {
            let mut guard = ExitGuard::new(control, tx);
            guard.fail(SourceError::Disconnected(0));
        }
        assert_eq!(
            rx.try_recv().unwrap().outcome,
            StageOutcome::SourceFailed(SourceError::Disconnected(0))
        );
    }

    #[test]
    fn test_guard_reports_panic() {
        let control = Arc::new(StageControl::new(StageKind::Display));
        let (tx, rx) = crossbeam_channel::unbounded();
        let thread_control = control.clone();
        let handle = std::thread::spawn(move || {
            let _guard = ExitGuard::new(thread_control, tx);
            panic!("sink exploded");
        });
        assert!(handle.join().is_err());
        assert_eq!(control.state(), StageState::Stopped);
        assert_eq!(rx.try_recv().unwrap().outcome, StageOutcome::Panicked);
    }

    #[test]
    fn test_stage_order_is_data_flow_order() {
        let names: Vec<_> = StageKind::ALL.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, ["capture", "detect", "display"]);
    }
}
