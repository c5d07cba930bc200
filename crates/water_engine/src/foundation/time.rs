//! Frame timing

use std::time::{Duration, Instant};

/// Frame timer: delta time for movement, FPS for the title bar
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    frame_count: u64,
    window_start: Instant,
    window_frames: u32,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            delta_time: 0.0,
            frame_count: 0,
            window_start: now,
            window_frames: 0,
        }
    }

    /// Advance one frame
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.frame_count += 1;
        self.window_frames += 1;
    }

    /// Seconds since the previous frame
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Frames counted since creation
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Returns the average FPS over the last `interval` once it has elapsed,
    /// then starts a new measuring window.
    pub fn sample_fps(&mut self, interval: Duration) -> Option<f32> {
        let elapsed = self.last_frame.duration_since(self.window_start);
        if elapsed < interval || elapsed.is_zero() {
            return None;
        }
        let fps = self.window_frames as f32 / elapsed.as_secs_f32();
        self.window_start = self.last_frame;
        self.window_frames = 0;
        Some(fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_sample_waits_for_interval() {
        let mut timer = Timer::new();
        timer.update();
        assert!(timer.sample_fps(Duration::from_secs(3600)).is_none());
        assert_eq!(timer.frame_count(), 1);
    }

    #[test]
    fn test_fps_sample_resets_window() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(5));
        timer.update();
        timer.update();

        let fps = timer.sample_fps(Duration::ZERO);
        assert!(fps.is_some_and(|f| f > 0.0));
        // Window restarted at the last frame, nothing elapsed since
        assert!(timer.sample_fps(Duration::ZERO).is_none());
    }
}
