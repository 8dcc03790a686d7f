//! The reward scorer: format + correctness + length + weighted contribution.
//!
//! Implements the shaped reward for tool-use rollouts:
//!
//!   `R = R_format + R_correct + R_length + beta * R_contrib`
//!
//! - `R_format` in {0, 0.5, 1} checks the tag grammar.
//! - `R_correct` in [-max, max] compares predicted tool calls against the
//!   ground truth; `max` depends on the scaling mode and training step, the
//!   comparison rule on the configured granularity.
//! - `R_length` in [0, 1] shapes toward a (possibly scheduled) target
//!   response length.
//! - `R_contrib` is the C-0 / C-1 auxiliary signal from the step contexts.
//!
//! The scorer is stateless beyond its configuration: identical inputs under
//! an identical configuration always produce identical output, and a shared
//! scorer may be used concurrently from parallel rollout-scoring workers.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::{ContributionKind, CorrectnessGranularity, CorrectnessScaling, RewardConfig};

use super::contribution::{contrib_binary, contrib_value_delta, StepContext};
use super::length::score_length;
use super::parse::{extract_block, parse_tool_calls, strip_sentinels, ToolCall};

// ---------------------------------------------------------------------------
// Score result
// ---------------------------------------------------------------------------

/// The total reward and its additive components, returned for logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    /// `format + correctness + length + beta * contribution`.
    pub total: f64,
    /// Structural compliance with the tag grammar.
    pub format: f64,
    /// Tool-call agreement with the ground truth.
    pub correctness: f64,
    /// Length-shaping term (0 when length reward is off).
    pub length: f64,
    /// The contribution term as folded into the total (already weighted by
    /// beta; 0 when contribution is disabled).
    pub contribution: f64,
}

impl ScoreResult {
    /// The 4-tuple shape consumed by the external Reward Manager. The
    /// contribution stays folded into `total`.
    pub fn into_tuple(self) -> (f64, f64, f64, f64) {
        (self.total, self.format, self.correctness, self.length)
    }
}

/// Additive reward composition.
///
///   `total = format + correctness + length + beta * contribution`
pub fn compose_total(
    format: f64,
    correctness: f64,
    length: f64,
    contribution: f64,
    beta: f64,
) -> f64 {
    format + correctness + length + beta * contribution
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

/// Per-step reward scorer for tool-use rollouts.
#[derive(Debug, Clone)]
pub struct RewardScorer {
    config: RewardConfig,
}

/// Step at which the two-stage correctness range widens from 1 to 3.
const TWO_STAGE_SWITCH_STEP: usize = 30;
/// Steps over which the scheduled correctness range ramps from 1 to 3.
const SCALE_RAMP_STEPS: f64 = 100.0;

impl RewardScorer {
    /// Create a scorer with an explicit configuration.
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    /// Create a scorer from the process environment (see
    /// [`RewardConfig::from_env`]).
    pub fn from_env() -> Self {
        Self::new(RewardConfig::from_env())
    }

    /// The active configuration.
    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Score one generated step against its ground truth.
    ///
    /// `step` is the global training step (drives the scheduled scaling and
    /// length modes). The step contexts feed the contribution signal and are
    /// ignored when contribution is disabled.
    pub fn score(
        &self,
        solution: &str,
        ground_truth: &str,
        step: usize,
        prev: &StepContext,
        cur: &StepContext,
    ) -> ScoreResult {
        let body = strip_sentinels(solution);
        let truth = strip_sentinels(ground_truth);

        let format = format_score(body);

        let predicted = parse_tool_calls(body);
        let expected = parse_tool_calls(truth);
        let max = self.correctness_max(step);
        let correctness = score_correctness(self.config.granularity, &predicted, &expected, max);

        let length = score_length(self.config.length, body.len(), step);

        let contribution_raw = match self.config.contribution {
            None => 0.0,
            Some(ContributionKind::C0) => {
                contrib_binary(prev.bb_hash_or_default(), cur.bb_hash_or_default())
            }
            Some(ContributionKind::C1) => {
                contrib_value_delta(prev.value_or_default(), cur.value_or_default())
            }
        };

        let total = compose_total(format, correctness, length, contribution_raw, self.config.beta);

        debug!(
            total,
            format,
            correctness,
            length,
            contribution = contribution_raw,
            step,
            experiment = self.config.experiment_name.as_deref().unwrap_or("-"),
            "scored rollout step"
        );

        ScoreResult {
            total,
            format,
            correctness,
            length,
            contribution: self.config.beta * contribution_raw,
        }
    }

    /// The correctness range bound for the given training step.
    fn correctness_max(&self, step: usize) -> f64 {
        match self.config.scaling {
            CorrectnessScaling::Full => 3.0,
            CorrectnessScaling::Unit => 1.0,
            CorrectnessScaling::TwoStage => {
                if step < TWO_STAGE_SWITCH_STEP {
                    1.0
                } else {
                    3.0
                }
            }
            CorrectnessScaling::Scheduled => {
                1.0 + 2.0 * (step as f64 / SCALE_RAMP_STEPS).min(1.0)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// External boundary
// ---------------------------------------------------------------------------

/// Score a step with the configuration resolved from the process
/// environment. This is the boundary the external Reward Manager calls once
/// per generated trajectory step.
///
/// Returns `(total, format, correctness, length)`; when contribution is
/// enabled its weighted term is folded into `total`. Absent step contexts
/// degrade to neutral values, so the contribution silently becomes 0.
pub fn compute_score(
    solution: &str,
    ground_truth: &str,
    step: usize,
    prev_step: Option<&Value>,
    cur_step: Option<&Value>,
) -> (f64, f64, f64, f64) {
    let scorer = RewardScorer::from_env();
    let prev = prev_step.map(StepContext::from_value).unwrap_or_default();
    let cur = cur_step.map(StepContext::from_value).unwrap_or_default();
    scorer.score(solution, ground_truth, step, &prev, &cur).into_tuple()
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

/// Structural compliance in {0, 0.5, 1}: half for a non-empty think block,
/// half for a parseable tool call or a non-empty response block.
fn format_score(body: &str) -> f64 {
    let mut score = 0.0;

    if extract_block(body, "think").is_some_and(|t| !t.is_empty()) {
        score += 0.5;
    }

    let has_call = !parse_tool_calls(body).is_empty();
    let has_response = extract_block(body, "response").is_some_and(|r| !r.is_empty());
    if has_call || has_response {
        score += 0.5;
    }

    score
}

// ---------------------------------------------------------------------------
// Correctness
// ---------------------------------------------------------------------------

/// Dice coefficient over set sizes; both-empty counts as perfect agreement.
fn dice(overlap: usize, a: usize, b: usize) -> f64 {
    if a + b == 0 {
        1.0
    } else {
        2.0 * overlap as f64 / (a + b) as f64
    }
}

/// Map a fraction in [0, 1] to [-1, 1].
fn signed(frac: f64) -> f64 {
    2.0 * frac - 1.0
}

/// Multiset overlap of tool names between the two call lists.
fn name_overlap(predicted: &[ToolCall], expected: &[ToolCall]) -> usize {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for call in predicted {
        *counts.entry(call.name.as_str()).or_insert(0) += 1;
    }
    expected
        .iter()
        .filter(|call| {
            counts
                .get_mut(call.name.as_str())
                .filter(|n| **n > 0)
                .map(|n| *n -= 1)
                .is_some()
        })
        .count()
}

/// Greedily pair each expected call with an unused predicted call of the
/// same name. Returns one entry per expected call.
fn pair_by_name<'a>(
    predicted: &'a [ToolCall],
    expected: &'a [ToolCall],
) -> Vec<(Option<&'a ToolCall>, &'a ToolCall)> {
    let mut used = vec![false; predicted.len()];
    expected
        .iter()
        .map(|truth| {
            let matched = predicted
                .iter()
                .enumerate()
                .find(|(i, call)| !used[*i] && call.name == truth.name)
                .map(|(i, call)| {
                    used[i] = true;
                    call
                });
            (matched, truth)
        })
        .collect()
}

/// Parameter-key agreement for one paired call, as a fraction.
fn keys_fraction(predicted: &ToolCall, expected: &ToolCall) -> f64 {
    let pred_keys = predicted.parameter_keys();
    let truth_keys = expected.parameter_keys();
    let overlap = truth_keys.iter().filter(|k| pred_keys.contains(k)).count();
    dice(overlap, pred_keys.len(), truth_keys.len())
}

/// Parameter-value agreement for one paired call: over the keys present on
/// both sides, the fraction whose values are equal. No shared keys counts as
/// perfect only when both calls take no parameters.
fn values_fraction(predicted: &ToolCall, expected: &ToolCall) -> f64 {
    let pred_keys = predicted.parameter_keys();
    let truth_keys = expected.parameter_keys();
    let common: Vec<&str> = truth_keys
        .iter()
        .filter(|k| pred_keys.contains(k))
        .copied()
        .collect();

    if common.is_empty() {
        return if pred_keys.is_empty() && truth_keys.is_empty() {
            1.0
        } else {
            0.0
        };
    }

    let equal = common
        .iter()
        .filter(|k| predicted.parameter(k) == expected.parameter(k))
        .count();
    equal as f64 / common.len() as f64
}

/// Correctness score in [-max, max] at the configured granularity.
fn score_correctness(
    granularity: CorrectnessGranularity,
    predicted: &[ToolCall],
    expected: &[ToolCall],
    max: f64,
) -> f64 {
    match granularity {
        CorrectnessGranularity::Decomposed => {
            score_decomposed(predicted, expected) / 3.0 * max
        }
        CorrectnessGranularity::Refined => {
            signed(refined_fraction(predicted, expected)) * max
        }
        CorrectnessGranularity::Intermediate => {
            let exact = exact_overlap(predicted, expected);
            signed(dice(exact, predicted.len(), expected.len())) * max
        }
        CorrectnessGranularity::Coarse => {
            if predicted == expected {
                max
            } else {
                -max
            }
        }
    }
}

/// Paper-default decomposition in [-3, 3]: tool names, parameter keys, and
/// parameter values each contribute a signed fraction in [-1, 1].
fn score_decomposed(predicted: &[ToolCall], expected: &[ToolCall]) -> f64 {
    let name_frac = dice(name_overlap(predicted, expected), predicted.len(), expected.len());

    let (keys_frac, vals_frac) = if expected.is_empty() {
        if predicted.is_empty() {
            (1.0, 1.0)
        } else {
            // Spurious calls against an empty ground truth.
            (0.0, 0.0)
        }
    } else {
        let pairs = pair_by_name(predicted, expected);
        let mut keys_sum = 0.0;
        let mut vals_sum = 0.0;
        for (matched, truth) in &pairs {
            if let Some(pred) = matched {
                keys_sum += keys_fraction(pred, truth);
                vals_sum += values_fraction(pred, truth);
            }
        }
        let n = expected.len() as f64;
        (keys_sum / n, vals_sum / n)
    };

    signed(name_frac) + signed(keys_frac) + signed(vals_frac)
}

/// Per-call partial credit in [0, 1]: each expected call scores the mean of
/// its name/keys/values agreement; spurious predicted calls dilute.
fn refined_fraction(predicted: &[ToolCall], expected: &[ToolCall]) -> f64 {
    if predicted.is_empty() && expected.is_empty() {
        return 1.0;
    }

    let pairs = pair_by_name(predicted, expected);
    let sum: f64 = pairs
        .iter()
        .filter_map(|(matched, truth)| {
            matched.map(|pred| {
                (1.0 + keys_fraction(pred, truth) + values_fraction(pred, truth)) / 3.0
            })
        })
        .sum();

    sum / predicted.len().max(expected.len()) as f64
}

/// Multiset count of predicted calls exactly equal to an expected call.
fn exact_overlap(predicted: &[ToolCall], expected: &[ToolCall]) -> usize {
    let mut used = vec![false; predicted.len()];
    expected
        .iter()
        .filter(|truth| {
            predicted
                .iter()
                .enumerate()
                .find(|(i, call)| !used[*i] && call == truth)
                .map(|(i, _)| used[i] = true)
                .is_some()
        })
        .count()
}
