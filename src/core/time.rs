//! Frame timing utilities

use std::time::{Duration, Instant};

/// Tracks wall-clock frame timing and a once-per-second FPS estimate
pub struct FrameTimer {
    last_frame: Instant,
    delta: Duration,
    elapsed: Duration,
    frame_count: u64,
    fps_timer: Instant,
    fps: f32,
    fps_frame_count: u32,
}

impl FrameTimer {
    /// Create a new frame timer
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
            fps_timer: now,
            fps: 0.0,
            fps_frame_count: 0,
        }
    }

    /// Call once per frame to update timing
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_frame;
        self.last_frame = now;
        self.elapsed += self.delta;
        self.frame_count += 1;
        self.fps_frame_count += 1;

        let fps_elapsed = now - self.fps_timer;
        if fps_elapsed >= Duration::from_secs(1) {
            self.fps = self.fps_frame_count as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = 0;
            self.fps_timer = now;
        }
    }

    /// Get delta time in seconds
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Total time accumulated through `tick`, in seconds
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    /// Get current FPS (updated every second)
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Get total frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-timestep accumulator.
///
/// Variable frame deltas are banked and released as whole steps of `step`
/// seconds, so the simulation sees the same delta-time every time it runs.
/// At most `max_steps` are released per call; surplus time is dropped.
#[derive(Clone, Debug)]
pub struct FixedStep {
    step: f32,
    max_steps: u32,
    accumulator: f32,
}

impl FixedStep {
    pub fn new(step: f32, max_steps: u32) -> Self {
        Self {
            step: step.max(f32::EPSILON),
            max_steps: max_steps.max(1),
            accumulator: 0.0,
        }
    }

    /// Fixed delta-time of every released step
    pub fn step(&self) -> f32 {
        self.step
    }

    /// Bank `delta` seconds and return how many whole steps are due.
    pub fn advance(&mut self, delta: f32) -> u32 {
        if delta.is_finite() && delta > 0.0 {
            self.accumulator += delta;
        }

        let due = (self.accumulator / self.step).floor();
        let steps = (due as u32).min(self.max_steps);
        self.accumulator -= steps as f32 * self.step;

        if steps == self.max_steps && self.accumulator >= self.step {
            // Spiral-of-death guard
            self.accumulator %= self.step;
        }
        steps
    }

    /// Fraction of a step currently banked (0.0..1.0)
    pub fn alpha(&self) -> f32 {
        (self.accumulator / self.step).clamp(0.0, 1.0)
    }
}

impl Default for FixedStep {
    fn default() -> Self {
        Self::new(1.0 / 60.0, 4)
    }
}
