//! Frame timer feeding the per-frame delta to the scene and renderer.

use std::time::{Duration, Instant};

/// High-resolution timer for measuring elapsed time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    frames: u64,
    fps_window_start: Instant,
    fps_window_frames: u32,
    fps: f32,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frames: 0,
            fps_window_start: now,
            fps_window_frames: 0,
            fps: 0.0,
        }
    }

    /// Get the total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Advance one frame and return the time since the previous tick.
    ///
    /// The frames-per-second estimate is refreshed once per second.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.frames += 1;
        self.fps_window_frames += 1;

        let window = now - self.fps_window_start;
        if window >= Duration::from_secs(1) {
            self.fps = self.fps_window_frames as f32 / window.as_secs_f32();
            self.fps_window_frames = 0;
            self.fps_window_start = now;
        }

        delta
    }

    /// Delta time in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Number of ticks since creation.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Frames per second measured over the last full second.
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_counts_frames() {
        let mut timer = Timer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count(), 2);
    }

    #[test]
    fn delta_is_non_negative() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(2));
        assert!(timer.delta_secs() > 0.0);
    }
}
