use std::time::{Duration, Instant};

/// Counts events and reports their rate once per window.
#[derive(Debug)]
pub struct FpsCounter {
    window: Duration,
    window_start: Instant,
    count: u32,
}

impl FpsCounter {
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    pub fn starting_at(window: Duration, start: Instant) -> Self {
        Self {
            window,
            window_start: start,
            count: 0,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    /// Records one event. Returns the rate over the window once it has
    /// elapsed, then starts a new window.
    pub fn tick_at(&mut self, now: Instant) -> Option<f64> {
        self.count += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }
        let fps = self.count as f64 / elapsed.as_secs_f64();
        self.window_start = now;
        self.count = 0;
        Some(fps)
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
