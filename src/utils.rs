use std::time::{Duration, Instant};

/// Tracks rendered frames per second over fixed reporting windows.
pub struct ThroughputCounter {
    window_frames: u32,
    total_frames: u64,
    window_start: Instant,
    started: Instant,
    interval: Duration,
}

impl ThroughputCounter {
    /// Create a counter that reports once per `interval`.
    pub fn new(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            window_frames: 0,
            total_frames: 0,
            window_start: now,
            started: now,
            interval,
        }
    }

    /// Count one frame. Returns Some(fps) when a reporting window has closed.
    pub fn record(&mut self) -> Option<f32> {
        self.window_frames += 1;
        self.total_frames += 1;
        let elapsed = self.window_start.elapsed();

        if elapsed >= self.interval {
            let fps = self.window_frames as f32 / elapsed.as_secs_f32();
            self.window_frames = 0;
            self.window_start = Instant::now();
            Some(fps)
        } else {
            None
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Average frames per second since creation.
    pub fn average_fps(&self) -> f32 {
        let secs = self.started.elapsed().as_secs_f32();
        if secs > 0.0 {
            self.total_frames as f32 / secs
        } else {
            0.0
        }
    }
}

impl Default for ThroughputCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_only_after_the_interval() {
        let mut counter = ThroughputCounter::new(Duration::from_secs(3600));
        assert_eq!(counter.record(), None);
        assert_eq!(counter.record(), None);
        assert_eq!(counter.total_frames(), 2);
    }

    #[test]
    fn zero_interval_reports_every_frame() {
        let mut counter = ThroughputCounter::new(Duration::ZERO);
        assert!(counter.record().is_some());
        assert!(counter.record().is_some());
        assert_eq!(counter.total_frames(), 2);
    }
}
