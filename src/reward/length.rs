//! Length shaping: reward closeness to a target response length.
//!
//! When enabled, the scorer adds a term in [0, 1] that peaks when the
//! response body hits the target character count and falls off linearly with
//! relative deviation. The scheduled variant grows the target over the
//! course of training, easing the policy from terse early outputs toward
//! fuller reasoning traces.

use crate::config::LengthMode;

/// Target length for [`LengthMode::Fixed`], in characters.
pub const FIXED_TARGET: f64 = 1024.0;

/// Scheduled target at step 0.
pub const SCHEDULE_START: f64 = 256.0;
/// Scheduled target once the ramp completes.
pub const SCHEDULE_END: f64 = 1024.0;
/// Number of training steps over which the scheduled target ramps.
pub const SCHEDULE_RAMP_STEPS: f64 = 150.0;

/// Deviation-based length reward in [0, 1].
///
/// `1 - min(|len - target| / target, 1)`: exact hits score 1.0, and the
/// reward reaches 0 once the deviation equals the target itself.
pub fn length_reward(len: usize, target: f64) -> f64 {
    if target <= 0.0 {
        return 0.0;
    }
    let deviation = (len as f64 - target).abs() / target;
    1.0 - deviation.min(1.0)
}

/// The target length for a given training step under the schedule.
///
/// Linear interpolation from [`SCHEDULE_START`] to [`SCHEDULE_END`] over
/// [`SCHEDULE_RAMP_STEPS`], constant afterwards.
pub fn scheduled_target(step: usize) -> f64 {
    let progress = (step as f64 / SCHEDULE_RAMP_STEPS).min(1.0);
    SCHEDULE_START + (SCHEDULE_END - SCHEDULE_START) * progress
}

/// The length term for a solution body under the configured mode.
pub fn score_length(mode: LengthMode, body_len: usize, step: usize) -> f64 {
    match mode {
        LengthMode::Off => 0.0,
        LengthMode::Fixed => length_reward(body_len, FIXED_TARGET),
        LengthMode::Scheduled => length_reward(body_len, scheduled_target(step)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------
    // length_reward
    // ------------------------------------------------------------------

    #[test]
    fn test_exact_target_scores_one() {
        assert!((length_reward(1024, 1024.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_reward_falls_off_linearly() {
        // Half the target away -> 0.5.
        assert!((length_reward(512, 1024.0) - 0.5).abs() < 1e-9);
        assert!((length_reward(1536, 1024.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_reward_floors_at_zero() {
        assert_eq!(length_reward(0, 1024.0), 0.0);
        // Deviation beyond one full target stays floored.
        assert_eq!(length_reward(4096, 1024.0), 0.0);
    }

    // ------------------------------------------------------------------
    // scheduled_target
    // ------------------------------------------------------------------

    #[test]
    fn test_schedule_endpoints() {
        assert!((scheduled_target(0) - SCHEDULE_START).abs() < 1e-9);
        assert!((scheduled_target(150) - SCHEDULE_END).abs() < 1e-9);
        // Constant after the ramp completes.
        assert!((scheduled_target(1000) - SCHEDULE_END).abs() < 1e-9);
    }

    #[test]
    fn test_schedule_midpoint() {
        let mid = scheduled_target(75);
        assert!((mid - (SCHEDULE_START + SCHEDULE_END) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_schedule_monotone() {
        let mut prev = scheduled_target(0);
        for step in (10..=150).step_by(10) {
            let cur = scheduled_target(step);
            assert!(cur >= prev);
            prev = cur;
        }
    }

    // ------------------------------------------------------------------
    // score_length
    // ------------------------------------------------------------------

    #[test]
    fn test_off_mode_is_zero() {
        assert_eq!(score_length(LengthMode::Off, 1024, 0), 0.0);
    }

    #[test]
    fn test_scheduled_mode_tracks_step() {
        // A short body matches the early target better than the late one.
        let early = score_length(LengthMode::Scheduled, 256, 0);
        let late = score_length(LengthMode::Scheduled, 256, 150);
        assert!((early - 1.0).abs() < 1e-9);
        assert!(late < early);
    }
}
