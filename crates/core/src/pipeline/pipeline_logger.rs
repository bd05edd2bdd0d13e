use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Cross-cutting sink for stage timings and metrics.
///
/// Stages report through this instead of a concrete output so the CLI can
/// aggregate and summarise while tests and embedders discard everything.
pub trait PipelineLogger: Send {
    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. fps, dropped frames).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Called when a run starts; per-run state is cleared here. Default: no-op.
    fn begin_run(&mut self) {}

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Logger shared by the three stage threads of a run.
pub type SharedPipelineLogger = Arc<Mutex<dyn PipelineLogger>>;

/// Runs `f` against the shared logger, recovering from a poisoned lock.
pub(crate) fn with_logger(logger: &SharedPipelineLogger, f: impl FnOnce(&mut dyn PipelineLogger)) {
    let mut guard = logger.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut *guard);
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl NullPipelineLogger {
    pub fn shared() -> SharedPipelineLogger {
        Arc::new(Mutex::new(NullPipelineLogger))
    }
}

impl PipelineLogger for NullPipelineLogger {
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running aggregate of one timing or metric series.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aggregate {
    pub count: usize,
    pub sum: f64,
    pub max: f64,
    pub last: f64,
}

impl Aggregate {
    fn record(&mut self, value: f64) {
        self.max = if self.count == 0 { value } else { self.max.max(value) };
        self.count += 1;
        self.sum += value;
        self.last = value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Aggregates per-stage timings and metrics and logs a summary at the end
/// of each run. Memory stays constant per key however long the run lasts.
pub struct StatsPipelineLogger {
    timings: HashMap<String, Aggregate>,
    metrics: HashMap<String, Aggregate>,
    start_time: Instant,
}

impl StatsPipelineLogger {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
        }
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!("Pipeline summary ({elapsed_s:.1}s):")];

        let mut stages: Vec<_> = self.timings.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, agg) in stages {
            lines.push(format!(
                "  {stage:12}: avg {:6.1}ms  max {:6.1}ms  ({} frames)",
                agg.mean(),
                agg.max,
                agg.count
            ));
        }

        let mut metrics: Vec<_> = self.metrics.iter().collect();
        metrics.sort_by(|a, b| a.0.cmp(b.0));
        for (name, agg) in metrics {
            lines.push(format!(
                "  {name}: avg {:.1}  last {:.1}",
                agg.mean(),
                agg.last
            ));
        }

        Some(lines.join("\n"))
    }

    /// Returns the timing aggregate for a given stage.
    pub fn timings_for(&self, stage: &str) -> Option<Aggregate> {
        self.timings.get(stage).copied()
    }

    /// Returns the aggregate for a given metric.
    pub fn metrics_for(&self, name: &str) -> Option<Aggregate> {
        self.metrics.get(name).copied()
    }
}

impl Default for StatsPipelineLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineLogger for StatsPipelineLogger {
    fn timing(&mut self, stage: &str, duration_ms: f64) {
        if let Some(agg) = self.timings.get_mut(stage) {
            agg.record(duration_ms);
        } else {
            let mut agg = Aggregate::default();
            agg.record(duration_ms);
            self.timings.insert(stage.to_string(), agg);
        }
    }

    fn metric(&mut self, name: &str, value: f64) {
        log::debug!("{name} = {value:.1}");
        if let Some(agg) = self.metrics.get_mut(name) {
            agg.record(value);
        } else {
            let mut agg = Aggregate::default();
            agg.record(value);
            self.metrics.insert(name.to_string(), agg);
        }
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn begin_run(&mut self) {
        self.timings.clear();
        self.metrics.clear();
        self.start_time = Instant::now();
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
