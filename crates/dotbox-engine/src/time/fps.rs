use std::collections::VecDeque;
use std::fmt;

/// Frame-rate statistics over a sliding window of recent frames.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    samples: VecDeque<f64>,
    window: usize,
}

/// Snapshot of [`FpsCounter`] statistics.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FpsStats {
    pub latest: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    /// Samples the statistics cover.
    pub window: usize,
}

impl FpsCounter {
    pub const DEFAULT_WINDOW: usize = 100;

    pub fn new() -> Self {
        Self::with_window(Self::DEFAULT_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            samples: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Records one frame that took `dt` seconds. Non-positive or non-finite
    /// deltas are ignored.
    pub fn record(&mut self, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(1.0 / f64::from(dt));
    }

    /// `None` until the first frame is recorded.
    pub fn stats(&self) -> Option<FpsStats> {
        let latest = *self.samples.back()?;
        let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
        for &fps in &self.samples {
            min = min.min(fps);
            max = max.max(fps);
            sum += fps;
        }
        Some(FpsStats {
            latest,
            avg: sum / self.samples.len() as f64,
            min,
            max,
            window: self.window,
        })
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FpsStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.window;
        writeln!(f, "Frames per Second:")?;
        writeln!(f, "         latest = {}", self.latest.round())?;
        writeln!(f, "avg of last {n} = {}", self.avg.round())?;
        writeln!(f, "min of last {n} = {}", self.min.round())?;
        write!(f, "max of last {n} = {}", self.max.round())
    }
}
