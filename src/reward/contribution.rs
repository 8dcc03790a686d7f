//! Contribution signals: auxiliary rewards for productive steps.
//!
//! Two mutually exclusive definitions, selected by
//! [`ContributionKind`](crate::config::ContributionKind):
//!
//! - **C-0** ([`contrib_binary`]) -- 1 if the shared blackboard changed
//!   between steps, else 0. Captures "did this action change shared state at
//!   all", independent of magnitude.
//! - **C-1** ([`contrib_value_delta`]) -- the critic's value improvement,
//!   clamped to non-negative. Captures "did this action improve the critic's
//!   assessment"; regressions are not penalized.
//!
//! Missing step-context fields degrade to neutral values (empty hash, zero
//! value) so that absent context never fails a training step -- the
//! contribution silently becomes 0.

use serde::Serialize;
use serde_json::Value;

// ---------------------------------------------------------------------------
// Step context
// ---------------------------------------------------------------------------

/// Per-step context forwarded by the external rollout pipeline.
///
/// Parsed leniently: a field that is missing or has the wrong JSON type
/// becomes `None` rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepContext {
    /// Opaque hash string identifying the shared blackboard state. Compared
    /// by string equality only; this module never re-hashes.
    pub bb_hash: Option<String>,
    /// Critic value estimate for the state after this step.
    pub value_est: Option<f64>,
    /// Difficulty factor for the task, used by the progress-scaled
    /// value-delta diagnostic (default 1.0).
    pub task_complexity: Option<f64>,
}

/// Accept a JSON number directly or a string that parses as one.
fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

impl StepContext {
    /// Parse a context from an arbitrary JSON value.
    ///
    /// Anything that is not an object yields the default (empty) context.
    pub fn from_value(value: &Value) -> Self {
        let bb_hash = match value.get("bb_hash") {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        Self {
            bb_hash,
            value_est: lenient_f64(value.get("value_est")),
            task_complexity: lenient_f64(value.get("task_complexity")),
        }
    }

    /// The blackboard hash, defaulting to the empty-state hash.
    pub fn bb_hash_or_default(&self) -> &str {
        self.bb_hash.as_deref().unwrap_or("")
    }

    /// The critic value estimate, defaulting to zero.
    pub fn value_or_default(&self) -> f64 {
        self.value_est.unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// C-0: binary blackboard change
// ---------------------------------------------------------------------------

/// C-0: 1.0 iff the blackboard hash changed between steps, else 0.0.
///
/// The inputs are opaque precomputed hash strings; equality is string
/// equality.
pub fn contrib_binary(prev_hash: &str, cur_hash: &str) -> f64 {
    if prev_hash != cur_hash {
        1.0
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------------
// C-1: value delta
// ---------------------------------------------------------------------------

/// C-1: the critic's value improvement, clamped to non-negative.
///
/// `max(cur_v - prev_v, 0.0)` -- a value decrease earns 0, never a penalty.
pub fn contrib_value_delta(prev_v: f64, cur_v: f64) -> f64 {
    (cur_v - prev_v).max(0.0)
}

/// Horizon over which early-step progress decays to its floor.
const STEP_DECAY_HORIZON: f64 = 100.0;

/// Progress-scaled variant of C-1.
///
/// The positive value delta is normalized by the task complexity (floored at
/// 0.1), scaled by a step-decay factor `max(0.1, 1 - step/100)` so that early
/// progress is worth more, and clamped to [0, 1]. At step 0 with complexity
/// 1.0 this equals the plain delta for deltas within [0, 1].
pub fn contrib_value_delta_scaled(
    prev_v: f64,
    cur_v: f64,
    step: usize,
    task_complexity: f64,
) -> f64 {
    let improvement = cur_v - prev_v;
    if improvement <= 0.0 {
        return 0.0;
    }

    let normalized = improvement / task_complexity.max(0.1);
    let step_factor = (1.0 - step as f64 / STEP_DECAY_HORIZON).max(0.1);

    (normalized * step_factor).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ------------------------------------------------------------------
    // contrib_binary
    // ------------------------------------------------------------------

    #[test]
    fn test_binary_no_change() {
        assert_eq!(contrib_binary("{}", "{}"), 0.0);
        assert_eq!(contrib_binary(r#"{"x": 1}"#, r#"{"x": 1}"#), 0.0);
        assert_eq!(contrib_binary("", ""), 0.0);
    }

    #[test]
    fn test_binary_change_detected() {
        assert_eq!(contrib_binary(r#"{"a":1}"#, "{}"), 1.0);
        assert_eq!(contrib_binary("{}", r#"{"LAX": 1}"#), 1.0);
        assert_eq!(contrib_binary(r#"{"x": 1}"#, r#"{"x": 2}"#), 1.0);
    }

    // ------------------------------------------------------------------
    // contrib_value_delta
    // ------------------------------------------------------------------

    #[test]
    fn test_value_delta_improvement() {
        assert!((contrib_value_delta(0.2, 0.5) - 0.3).abs() < 1e-9);
        assert!((contrib_value_delta(0.0, 1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_value_delta_never_negative() {
        assert_eq!(contrib_value_delta(0.5, 0.2), 0.0);
        assert_eq!(contrib_value_delta(0.5, 0.5), 0.0);
        assert_eq!(contrib_value_delta(0.8, 0.7), 0.0);
    }

    // ------------------------------------------------------------------
    // contrib_value_delta_scaled
    // ------------------------------------------------------------------

    #[test]
    fn test_scaled_matches_plain_at_step_zero() {
        let plain = contrib_value_delta(0.2, 0.5);
        let scaled = contrib_value_delta_scaled(0.2, 0.5, 0, 1.0);
        assert!((plain - scaled).abs() < 1e-9);
    }

    #[test]
    fn test_scaled_decays_with_step() {
        let early = contrib_value_delta_scaled(0.4, 0.6, 0, 1.0);
        let mid = contrib_value_delta_scaled(0.4, 0.6, 50, 1.0);
        let late = contrib_value_delta_scaled(0.4, 0.6, 200, 1.0);
        assert!(early > mid);
        assert!(mid > late);
        // Decay floors at 0.1, never reaching zero.
        assert!(late > 0.0);
    }

    #[test]
    fn test_scaled_complexity_normalization() {
        let easy = contrib_value_delta_scaled(0.3, 0.5, 0, 0.5);
        let hard = contrib_value_delta_scaled(0.3, 0.5, 0, 5.0);
        assert!(easy > hard);
    }

    #[test]
    fn test_scaled_clamped_to_unit_interval() {
        // Tiny complexity inflates the normalized delta; the clamp holds.
        let v = contrib_value_delta_scaled(0.0, 1.0, 0, 0.01);
        assert!((v - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_scaled_no_progress() {
        assert_eq!(contrib_value_delta_scaled(0.5, 0.3, 0, 1.0), 0.0);
        assert_eq!(contrib_value_delta_scaled(0.5, 0.5, 0, 1.0), 0.0);
    }

    // ------------------------------------------------------------------
    // StepContext
    // ------------------------------------------------------------------

    #[test]
    fn test_context_from_full_object() {
        let ctx = StepContext::from_value(&json!({
            "bb_hash": "abc123",
            "value_est": 0.7,
            "task_complexity": 2.0,
        }));
        assert_eq!(ctx.bb_hash.as_deref(), Some("abc123"));
        assert!((ctx.value_or_default() - 0.7).abs() < 1e-9);
        assert_eq!(ctx.task_complexity, Some(2.0));
    }

    #[test]
    fn test_context_missing_fields_degrade() {
        let ctx = StepContext::from_value(&json!({}));
        assert_eq!(ctx.bb_hash_or_default(), "");
        assert_eq!(ctx.value_or_default(), 0.0);
    }

    #[test]
    fn test_context_malformed_fields_degrade() {
        let ctx = StepContext::from_value(&json!({
            "bb_hash": 42,
            "value_est": {"nested": true},
        }));
        assert!(ctx.bb_hash.is_none());
        assert!(ctx.value_est.is_none());
    }

    #[test]
    fn test_context_numeric_string_value() {
        let ctx = StepContext::from_value(&json!({"value_est": "0.6"}));
        assert!((ctx.value_or_default() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_context_non_object_is_empty() {
        let ctx = StepContext::from_value(&json!("just a string"));
        assert_eq!(ctx, StepContext::default());
    }
}
