//! Frame rate limiting for the polling loop

use std::time::{Duration, Instant};

/// Sleeps away whatever is left of each frame period
///
/// Only the time since the previous call is considered, so an iteration that
/// overruns its period is not paid back by shortening later ones. Over a long
/// recording with occasional slow iterations the effective rate drifts below
/// the target.
#[derive(Debug, Default)]
pub struct FramePacer {
    last: Option<Instant>,
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until at least `1 / target_fps` has passed since the last return
    pub fn hold_fps(&mut self, target_fps: u32) {
        let wait = self.remaining(target_fps, Instant::now());
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        self.last = Some(Instant::now());
    }

    /// Time left in the current period as of `now`, clamped at zero
    pub fn remaining(&self, target_fps: u32, now: Instant) -> Duration {
        let Some(last) = self.last else {
            return Duration::ZERO;
        };
        if target_fps == 0 {
            return Duration::ZERO;
        }
        let period = Duration::from_secs_f64(1.0 / target_fps as f64);
        period.saturating_sub(now.saturating_duration_since(last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_does_not_sleep() {
        let pacer = FramePacer::new();
        assert_eq!(pacer.remaining(30, Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_remaining_is_period_minus_elapsed() {
        let start = Instant::now();
        let pacer = FramePacer { last: Some(start) };
        let remaining = pacer.remaining(10, start + Duration::from_millis(30));
        assert_eq!(remaining, Duration::from_millis(70));
    }

    #[test]
    fn test_late_iteration_clamps_to_zero() {
        let start = Instant::now();
        let pacer = FramePacer { last: Some(start) };
        assert_eq!(pacer.remaining(10, start + Duration::from_millis(250)), Duration::ZERO);
    }

    #[test]
    fn test_zero_fps_never_sleeps() {
        let start = Instant::now();
        let pacer = FramePacer { last: Some(start) };
        assert_eq!(pacer.remaining(0, start), Duration::ZERO);
    }

    #[test]
    fn test_consecutive_returns_are_spaced() {
        let mut pacer = FramePacer::new();
        pacer.hold_fps(50);
        let first = Instant::now();
        pacer.hold_fps(50);
        assert!(first.elapsed() >= Duration::from_millis(19));
    }

    #[test]
    fn test_late_frame_is_not_compensated() {
        // A 250ms stall at 10 fps leaves the next period at its full length
        // rather than shortening it to catch up.
        let start = Instant::now();
        let mut pacer = FramePacer { last: Some(start) };
        let stalled = start + Duration::from_millis(250);
        assert_eq!(pacer.remaining(10, stalled), Duration::ZERO);

        pacer.last = Some(stalled);
        assert_eq!(pacer.remaining(10, stalled), Duration::from_millis(100));
    }
}
