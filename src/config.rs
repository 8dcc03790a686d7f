//! Configuration for reward-variant selection and trainer launches.
//!
//! Two layers live here:
//!
//! - [`RewardConfig`] -- which reward variant the scorer applies. The enum
//!   representation guarantees that exactly one correctness-scaling mode and
//!   at most one contribution type are active at a time. The external reward
//!   hook resolves the same structure from process environment variables via
//!   [`RewardConfig::from_env`].
//! - [`LaunchConfig`] -- everything a trainer launch needs: experiment name,
//!   trainer invocation, data/checkpoint paths, cluster resources, and the
//!   SFT / GRPO hyperparameters forwarded to the external framework's CLI.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// Reward variant selection
// ---------------------------------------------------------------------------

/// Length-reward mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LengthMode {
    /// No length shaping (paper default).
    #[default]
    Off,
    /// Reward closeness to a fixed target response length (`WITHLENGTH`).
    Fixed,
    /// Target length grows with the training step (`SCHEDULELENGTH`).
    Scheduled,
}

/// How the correctness range scales with the training step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CorrectnessScaling {
    /// Fixed range [-3, 3] (paper default).
    #[default]
    Full,
    /// Fixed range [-1, 1] (`CORRECTMAX1`).
    Unit,
    /// [-1, 1] before the switch step, [-3, 3] after (`MAX1STEP30MAX3`).
    TwoStage,
    /// Range ramps smoothly from [-1, 1] to [-3, 3] (`SCHEDULEREWARD`).
    Scheduled,
}

/// Granularity of the correctness comparison against the ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CorrectnessGranularity {
    /// Three-component decomposition over tool names, parameter keys, and
    /// parameter values (paper default).
    #[default]
    Decomposed,
    /// Per-call partial credit: each ground-truth call is scored on its own
    /// name/keys/values triple (`REFINEDREWARD`).
    Refined,
    /// Fraction of calls matched exactly (`INTERMEDIATEREWARD`).
    Intermediate,
    /// All-or-nothing on the whole call sequence (`COARSEREWARD`).
    Coarse,
}

/// Which auxiliary contribution signal is folded into the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContributionKind {
    /// C-0: binary blackboard-change detection.
    C0,
    /// C-1: critic value delta, clamped to non-negative.
    C1,
}

/// Complete reward-variant selection.
///
/// Constructed explicitly (the primary API, which keeps variant selection
/// testable in isolation) or resolved from the process environment via
/// [`RewardConfig::from_env`]. Absence of every flag yields the paper's
/// default reward: no length shaping, full-range single-stage correctness,
/// no contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardConfig {
    /// Length-reward mode.
    pub length: LengthMode,
    /// Correctness range scaling.
    pub scaling: CorrectnessScaling,
    /// Correctness comparison granularity.
    pub granularity: CorrectnessGranularity,
    /// Contribution signal, if enabled.
    pub contribution: Option<ContributionKind>,
    /// Non-negative weight applied to the contribution term.
    pub beta: f64,
    /// Experiment label attached to log lines and the run manifest.
    pub experiment_name: Option<String>,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            length: LengthMode::Off,
            scaling: CorrectnessScaling::Full,
            granularity: CorrectnessGranularity::Decomposed,
            contribution: None,
            beta: 0.0,
            experiment_name: None,
        }
    }
}

/// Returns true when the variable holds a truthy flag value.
fn flag_on(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::trim),
        Some("1") | Some("true") | Some("TRUE") | Some("True")
    )
}

impl RewardConfig {
    /// Resolve the configuration from the process environment.
    ///
    /// Recognized variables: `CONTRIBUTION`, `CONTRIB_TYPE`, `BETA`,
    /// `WITHLENGTH`, `SCHEDULELENGTH`, `CORRECTMAX1`, `MAX1STEP30MAX3`,
    /// `SCHEDULEREWARD`, `REFINEDREWARD`, `INTERMEDIATEREWARD`,
    /// `COARSEREWARD`, `EXPERIMENT_NAME`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration from an arbitrary variable lookup.
    ///
    /// `from_env` delegates here; tests supply a closure over a map so that
    /// variant selection can be exercised without touching process state.
    ///
    /// When conflicting flags are set, resolution follows a fixed precedence
    /// (`CORRECTMAX1` > `MAX1STEP30MAX3` > `SCHEDULEREWARD`, and
    /// `REFINEDREWARD` > `INTERMEDIATEREWARD` > `COARSEREWARD`) and a
    /// warning is logged.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let length = if flag_on(lookup("SCHEDULELENGTH")) {
            LengthMode::Scheduled
        } else if flag_on(lookup("WITHLENGTH")) {
            LengthMode::Fixed
        } else {
            LengthMode::Off
        };

        let unit = flag_on(lookup("CORRECTMAX1"));
        let two_stage = flag_on(lookup("MAX1STEP30MAX3"));
        let scheduled = flag_on(lookup("SCHEDULEREWARD"));
        if (unit as u8) + (two_stage as u8) + (scheduled as u8) > 1 {
            warn!("multiple correctness-scaling flags set; using the highest-precedence one");
        }
        let scaling = if unit {
            CorrectnessScaling::Unit
        } else if two_stage {
            CorrectnessScaling::TwoStage
        } else if scheduled {
            CorrectnessScaling::Scheduled
        } else {
            CorrectnessScaling::Full
        };

        let refined = flag_on(lookup("REFINEDREWARD"));
        let intermediate = flag_on(lookup("INTERMEDIATEREWARD"));
        let coarse = flag_on(lookup("COARSEREWARD"));
        if (refined as u8) + (intermediate as u8) + (coarse as u8) > 1 {
            warn!("multiple correctness-granularity flags set; using the highest-precedence one");
        }
        let granularity = if refined {
            CorrectnessGranularity::Refined
        } else if intermediate {
            CorrectnessGranularity::Intermediate
        } else if coarse {
            CorrectnessGranularity::Coarse
        } else {
            CorrectnessGranularity::Decomposed
        };

        let contribution = if flag_on(lookup("CONTRIBUTION")) {
            match lookup("CONTRIB_TYPE").as_deref().map(str::trim) {
                Some("C1") | Some("c1") => Some(ContributionKind::C1),
                Some("C0") | Some("c0") | None => Some(ContributionKind::C0),
                Some(other) => {
                    warn!(contrib_type = other, "unrecognized CONTRIB_TYPE; using C0");
                    Some(ContributionKind::C0)
                }
            }
        } else {
            None
        };

        let beta = match lookup("BETA") {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(b) if b >= 0.0 => b,
                Ok(b) => {
                    warn!(beta = b, "negative BETA clamped to 0");
                    0.0
                }
                Err(_) => {
                    warn!(raw = %raw, "unparseable BETA; using 0");
                    0.0
                }
            },
            None => 0.0,
        };
        if contribution.is_some() && beta == 0.0 {
            warn!("CONTRIBUTION enabled with BETA=0; contribution term has no effect");
        }

        let experiment_name = lookup("EXPERIMENT_NAME").filter(|name| !name.is_empty());

        Self {
            length,
            scaling,
            granularity,
            contribution,
            beta,
            experiment_name,
        }
    }

    /// Emit the environment-variable assignments that reproduce this
    /// configuration in a child process (the trainer's reward hook reads the
    /// same variable set).
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        let mut vars: Vec<(String, String)> = Vec::new();
        let mut set = |key: &str, value: String| vars.push((key.to_string(), value));

        match self.length {
            LengthMode::Off => {}
            LengthMode::Fixed => set("WITHLENGTH", "1".into()),
            LengthMode::Scheduled => set("SCHEDULELENGTH", "1".into()),
        }
        match self.scaling {
            CorrectnessScaling::Full => {}
            CorrectnessScaling::Unit => set("CORRECTMAX1", "1".into()),
            CorrectnessScaling::TwoStage => set("MAX1STEP30MAX3", "1".into()),
            CorrectnessScaling::Scheduled => set("SCHEDULEREWARD", "1".into()),
        }
        match self.granularity {
            CorrectnessGranularity::Decomposed => {}
            CorrectnessGranularity::Refined => set("REFINEDREWARD", "1".into()),
            CorrectnessGranularity::Intermediate => set("INTERMEDIATEREWARD", "1".into()),
            CorrectnessGranularity::Coarse => set("COARSEREWARD", "1".into()),
        }
        match self.contribution {
            Some(kind) => {
                set("CONTRIBUTION", "1".into());
                set(
                    "CONTRIB_TYPE",
                    match kind {
                        ContributionKind::C0 => "C0".into(),
                        ContributionKind::C1 => "C1".into(),
                    },
                );
                set("BETA", self.beta.to_string());
            }
            None => set("CONTRIBUTION", "0".into()),
        }
        if let Some(name) = &self.experiment_name {
            set("EXPERIMENT_NAME", name.clone());
        }

        vars
    }
}

// ---------------------------------------------------------------------------
// Launch configuration
// ---------------------------------------------------------------------------

/// Complete configuration for launching a trainer run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Experiment name used for the run manifest, log lines, and the
    /// `EXPERIMENT_NAME` variable forwarded to the trainer.
    pub experiment_name: String,
    pub trainer: TrainerConfig,
    pub paths: PathsConfig,
    pub cluster: ClusterConfig,
    pub sft: SftConfig,
    pub grpo: GrpoConfig,
    pub reward: RewardConfig,
}

/// How to invoke the external training framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Interpreter or binary that hosts the trainer (default: "python3").
    pub program: String,
    /// Module run for the SFT phase.
    pub sft_module: String,
    /// Module run for the GRPO phase.
    pub grpo_module: String,
    /// Extra `key=value` overrides appended verbatim to every invocation.
    #[serde(default)]
    pub extra_overrides: Vec<String>,
}

/// Dataset and checkpoint locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Training split (parquet).
    pub train_file: PathBuf,
    /// Validation split (parquet).
    pub val_file: PathBuf,
    /// Directory checkpoints are written into; must exist before launch.
    pub checkpoint_dir: PathBuf,
}

/// Cluster resource requests forwarded to the trainer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Number of nodes (default: 1).
    pub nodes: usize,
    /// GPUs per node (default: 8).
    pub gpus_per_node: usize,
    /// Memory request per node in GB (default: 64).
    pub memory_gb: usize,
}

/// Cold-start supervised fine-tuning hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SftConfig {
    /// Learning rate for SFT (default: 1e-4).
    pub learning_rate: f64,
    /// Batch size for SFT (default: 16).
    pub batch_size: usize,
    /// Number of training epochs (default: 3).
    pub epochs: usize,
    /// Maximum tokenized sequence length (default: 2048).
    pub max_seq_length: usize,
}

/// GRPO training hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpoConfig {
    /// Learning rate for RL (default: 1e-6).
    pub learning_rate: f64,
    /// Batch size for RL (default: 64).
    pub batch_size: usize,
    /// Group size G for GRPO advantage estimation (default: 8).
    pub group_size: usize,
    /// KL divergence coefficient (default: 0.01).
    pub kl_coeff: f64,
    /// PPO clipping epsilon (default: 0.2).
    pub clip_epsilon: f64,
    /// Maximum prompt length in tokens (default: 6000).
    pub max_prompt_length: usize,
    /// Maximum response length in tokens (default: 1024).
    pub max_response_length: usize,
    /// Total training steps (default: 150).
    pub total_steps: usize,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            experiment_name: "tooluse-grpo".into(),
            trainer: TrainerConfig {
                program: "python3".into(),
                sft_module: "verl.trainer.fsdp_sft_trainer".into(),
                grpo_module: "verl.trainer.main_ppo".into(),
                extra_overrides: Vec::new(),
            },
            paths: PathsConfig {
                train_file: "data/train.parquet".into(),
                val_file: "data/val.parquet".into(),
                checkpoint_dir: "checkpoints".into(),
            },
            cluster: ClusterConfig {
                nodes: 1,
                gpus_per_node: 8,
                memory_gb: 64,
            },
            sft: SftConfig {
                learning_rate: 1e-4,
                batch_size: 16,
                epochs: 3,
                max_seq_length: 2048,
            },
            grpo: GrpoConfig {
                learning_rate: 1e-6,
                batch_size: 64,
                group_size: 8,
                kl_coeff: 0.01,
                clip_epsilon: 0.2,
                max_prompt_length: 6000,
                max_response_length: 1024,
                total_steps: 150,
            },
            reward: RewardConfig::default(),
        }
    }
}
