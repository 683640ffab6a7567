//! Fixed-rate frame accounting
//!
//! Converts wall-clock tick instants into the frame information every tick
//! receives: frame index, frame factor, time since the previous processed tick
//! and how many frames were skipped in between.

use std::time::{Duration, Instant};

/// Information passed to each processed tick
#[derive(Debug, Clone, Copy)]
pub struct TickInfo {
    /// Frame index since the ticker started
    pub frame: u64,
    /// Elapsed time relative to one nominal frame (1.0 = on schedule)
    pub frame_factor: f32,
    /// Time since the previous processed tick
    pub elapsed: Duration,
    /// Frames skipped since the previous processed tick
    pub skipped_frames: u64,
    /// Monotonic instant of this tick
    pub now: Instant,
}

pub struct Ticker {
    frame_duration: Duration,
    started_at: Instant,
    last_tick_at: Instant,
    last_frame: u64,
}

impl Ticker {
    pub fn new(tick_rate: u32, started_at: Instant) -> Self {
        Self {
            frame_duration: Duration::from_secs(1) / tick_rate.max(1),
            started_at,
            last_tick_at: started_at,
            last_frame: 0,
        }
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Account for a tick processed at `now`
    pub fn advance(&mut self, now: Instant) -> TickInfo {
        let since_start = now.saturating_duration_since(self.started_at);
        let nominal = (since_start.as_nanos() / self.frame_duration.as_nanos().max(1)) as u64;
        // Frames never go backwards even if two ticks land in the same slot
        let frame = nominal.max(self.last_frame + 1);
        let skipped_frames = frame - self.last_frame - 1;

        let elapsed = now.saturating_duration_since(self.last_tick_at);
        let frame_factor = elapsed.as_secs_f32() / self.frame_duration.as_secs_f32();

        self.last_frame = frame;
        self.last_tick_at = now;

        TickInfo {
            frame,
            frame_factor,
            elapsed,
            skipped_frames,
            now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_schedule() {
        let start = Instant::now();
        let mut ticker = Ticker::new(50, start);
        let frame = ticker.frame_duration();

        let info = ticker.advance(start + frame);
        assert_eq!(info.frame, 1);
        assert_eq!(info.skipped_frames, 0);
        assert!((info.frame_factor - 1.0).abs() < 0.01);

        let info = ticker.advance(start + frame * 2);
        assert_eq!(info.frame, 2);
        assert_eq!(info.skipped_frames, 0);
    }

    #[test]
    fn test_skipped_frames() {
        let start = Instant::now();
        let mut ticker = Ticker::new(50, start);
        let frame = ticker.frame_duration();

        ticker.advance(start + frame);
        let info = ticker.advance(start + frame * 5);
        assert_eq!(info.frame, 5);
        assert_eq!(info.skipped_frames, 3);
        assert_eq!(info.elapsed, frame * 4);
        assert!((info.frame_factor - 4.0).abs() < 0.01);
    }

    #[test]
    fn test_early_tick_still_advances() {
        let start = Instant::now();
        let mut ticker = Ticker::new(50, start);

        let first = ticker.advance(start);
        let second = ticker.advance(start);
        assert_eq!(first.frame, 1);
        assert_eq!(second.frame, 2);
        assert_eq!(second.skipped_frames, 0);
    }
}
