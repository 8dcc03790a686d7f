//! Trainer job launches: wiring configuration into the external framework.
//!
//! A [`TrainerLaunch`] turns a [`LaunchConfig`] into one invocation of the
//! external training framework's CLI:
//!
//!   1. validate run prerequisites (data files, checkpoint directory),
//!   2. assemble the argument list (module + `key=value` overrides) and the
//!      reward environment variables,
//!   3. write a run manifest into the checkpoint directory,
//!   4. spawn the trainer with inherited stdio and propagate its exit status.
//!
//! There is no retry path: a missing prerequisite or a non-zero trainer exit
//! surfaces as an error, which the binary reports and converts into a
//! non-zero process exit.

use std::fmt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::Command;
use tracing::info;
use uuid::Uuid;

use crate::config::LaunchConfig;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Which training phase to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrainPhase {
    /// Cold-start supervised fine-tuning.
    Sft,
    /// GRPO reinforcement learning.
    Grpo,
}

impl fmt::Display for TrainPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainPhase::Sft => write!(f, "sft"),
            TrainPhase::Grpo => write!(f, "grpo"),
        }
    }
}

// ---------------------------------------------------------------------------
// Run manifest
// ---------------------------------------------------------------------------

/// A record of one launch, written into the checkpoint directory so that a
/// run can be traced back to the exact command and reward variant it used.
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    /// Fresh identifier for this run (UUID v4).
    pub run_id: String,
    /// Experiment label from the launch configuration.
    pub experiment_name: String,
    /// The launched phase.
    pub phase: TrainPhase,
    /// UTC timestamp taken at launch time.
    pub started_at: DateTime<Utc>,
    /// The program the trainer runs under.
    pub program: String,
    /// Full argument list passed to the program.
    pub args: Vec<String>,
    /// Reward environment forwarded to the trainer.
    pub env: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// Launch
// ---------------------------------------------------------------------------

/// One prepared trainer invocation.
pub struct TrainerLaunch {
    config: LaunchConfig,
    phase: TrainPhase,
}

impl TrainerLaunch {
    /// Prepare a launch for the given phase.
    pub fn new(config: LaunchConfig, phase: TrainPhase) -> Self {
        Self { config, phase }
    }

    /// Check every filesystem prerequisite before anything is spawned.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing path: train file, val file,
    /// or checkpoint directory.
    pub fn validate(&self) -> Result<()> {
        let paths = &self.config.paths;
        ensure_exists(&paths.train_file, "training data file")?;
        ensure_exists(&paths.val_file, "validation data file")?;
        if !paths.checkpoint_dir.is_dir() {
            bail!(
                "checkpoint directory {} does not exist; create it before launching",
                paths.checkpoint_dir.display()
            );
        }
        Ok(())
    }

    /// The argument list for the trainer program: the phase module followed
    /// by `key=value` overrides.
    pub fn build_args(&self) -> Vec<String> {
        let config = &self.config;
        let mut args = vec!["-m".to_string()];

        match self.phase {
            TrainPhase::Sft => {
                args.push(config.trainer.sft_module.clone());
                args.push(format!("data.train_files={}", config.paths.train_file.display()));
                args.push(format!("data.val_files={}", config.paths.val_file.display()));
                args.push(format!("data.max_length={}", config.sft.max_seq_length));
                args.push(format!("data.train_batch_size={}", config.sft.batch_size));
                args.push(format!("optim.lr={}", config.sft.learning_rate));
                args.push(format!("trainer.total_epochs={}", config.sft.epochs));
            }
            TrainPhase::Grpo => {
                args.push(config.trainer.grpo_module.clone());
                args.push("algorithm.adv_estimator=grpo".to_string());
                args.push(format!("data.train_files={}", config.paths.train_file.display()));
                args.push(format!("data.val_files={}", config.paths.val_file.display()));
                args.push(format!("data.train_batch_size={}", config.grpo.batch_size));
                args.push(format!("data.max_prompt_length={}", config.grpo.max_prompt_length));
                args.push(format!(
                    "data.max_response_length={}",
                    config.grpo.max_response_length
                ));
                args.push(format!(
                    "actor_rollout_ref.actor.optim.lr={}",
                    config.grpo.learning_rate
                ));
                args.push(format!(
                    "actor_rollout_ref.actor.clip_ratio={}",
                    config.grpo.clip_epsilon
                ));
                args.push(format!("actor_rollout_ref.rollout.n={}", config.grpo.group_size));
                args.push(format!("algorithm.kl_ctrl.kl_coef={}", config.grpo.kl_coeff));
                args.push(format!(
                    "trainer.total_training_steps={}",
                    config.grpo.total_steps
                ));
            }
        }

        // Shared trainer plumbing: cluster resources, checkpoints, run label.
        args.push(format!("trainer.nnodes={}", config.cluster.nodes));
        args.push(format!("trainer.n_gpus_per_node={}", config.cluster.gpus_per_node));
        args.push(format!(
            "trainer.default_local_dir={}",
            config.paths.checkpoint_dir.join(self.phase.to_string()).display()
        ));
        args.push(format!("trainer.experiment_name={}", config.experiment_name));

        args.extend(config.trainer.extra_overrides.iter().cloned());
        args
    }

    /// The environment forwarded to the trainer so its reward hook resolves
    /// the same variants. The launch-level experiment name wins over one set
    /// in the reward section.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = self.config.reward.to_env_vars();
        vars.retain(|(key, _)| key != "EXPERIMENT_NAME");
        vars.push((
            "EXPERIMENT_NAME".to_string(),
            self.config.experiment_name.clone(),
        ));
        vars
    }

    /// A shell-style rendering of the invocation, for `--dry-run` output.
    pub fn render_command(&self) -> String {
        let env = self
            .env_vars()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        let args = self.build_args().join(" ");
        format!("{env} {} {args}", self.config.trainer.program)
    }

    /// Build the manifest for this launch, stamping a fresh run id and the
    /// current UTC time.
    pub fn manifest(&self) -> RunManifest {
        RunManifest {
            run_id: Uuid::new_v4().to_string(),
            experiment_name: self.config.experiment_name.clone(),
            phase: self.phase,
            started_at: Utc::now(),
            program: self.config.trainer.program.clone(),
            args: self.build_args(),
            env: self.env_vars(),
        }
    }

    /// Validate, write the run manifest, spawn the trainer, and wait for it.
    ///
    /// # Errors
    ///
    /// Returns an error when a prerequisite is missing, the trainer cannot
    /// be spawned, or it exits with a non-zero status.
    pub async fn launch(&self) -> Result<RunManifest> {
        self.validate()?;

        let manifest = self.manifest();
        let manifest_path = self
            .config
            .paths
            .checkpoint_dir
            .join(format!("run-{}-{}.json", self.phase, manifest.run_id));
        let json = serde_json::to_string_pretty(&manifest)?;
        tokio::fs::write(&manifest_path, json)
            .await
            .with_context(|| format!("Failed to write run manifest {}", manifest_path.display()))?;

        info!(
            run_id = %manifest.run_id,
            phase = %self.phase,
            experiment = %manifest.experiment_name,
            "Launching trainer"
        );

        let status = Command::new(&manifest.program)
            .args(&manifest.args)
            .envs(manifest.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .status()
            .await
            .with_context(|| format!("Failed to spawn trainer program {}", manifest.program))?;

        if !status.success() {
            bail!(
                "trainer exited with status {} for phase {}",
                status.code().map_or_else(|| "signal".to_string(), |c| c.to_string()),
                self.phase
            );
        }

        info!(run_id = %manifest.run_id, "Trainer finished successfully");
        Ok(manifest)
    }
}

fn ensure_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("{what} {} does not exist", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContributionKind, RewardConfig};

    fn test_config() -> LaunchConfig {
        LaunchConfig {
            experiment_name: "unit-test".into(),
            ..LaunchConfig::default()
        }
    }

    // ------------------------------------------------------------------
    // build_args
    // ------------------------------------------------------------------

    #[test]
    fn test_sft_args() {
        let launch = TrainerLaunch::new(test_config(), TrainPhase::Sft);
        let args = launch.build_args();

        assert_eq!(args[0], "-m");
        assert_eq!(args[1], "verl.trainer.fsdp_sft_trainer");
        assert!(args.contains(&"optim.lr=0.0001".to_string()));
        assert!(args.contains(&"trainer.total_epochs=3".to_string()));
        assert!(args.contains(&"trainer.experiment_name=unit-test".to_string()));
    }

    #[test]
    fn test_grpo_args() {
        let launch = TrainerLaunch::new(test_config(), TrainPhase::Grpo);
        let args = launch.build_args();

        assert_eq!(args[1], "verl.trainer.main_ppo");
        assert!(args.contains(&"algorithm.adv_estimator=grpo".to_string()));
        assert!(args.contains(&"actor_rollout_ref.rollout.n=8".to_string()));
        assert!(args.contains(&"algorithm.kl_ctrl.kl_coef=0.01".to_string()));
        assert!(args.contains(&"trainer.n_gpus_per_node=8".to_string()));
        assert!(args.contains(&"trainer.total_training_steps=150".to_string()));
    }

    #[test]
    fn test_args_deterministic() {
        let launch = TrainerLaunch::new(test_config(), TrainPhase::Grpo);
        assert_eq!(launch.build_args(), launch.build_args());
    }

    #[test]
    fn test_extra_overrides_appended() {
        let mut config = test_config();
        config.trainer.extra_overrides = vec!["trainer.logger=[console]".into()];
        let launch = TrainerLaunch::new(config, TrainPhase::Grpo);
        let args = launch.build_args();
        assert_eq!(args.last().map(String::as_str), Some("trainer.logger=[console]"));
    }

    // ------------------------------------------------------------------
    // env_vars
    // ------------------------------------------------------------------

    #[test]
    fn test_env_vars_carry_reward_variant() {
        let mut config = test_config();
        config.reward = RewardConfig {
            contribution: Some(ContributionKind::C0),
            beta: 0.05,
            ..RewardConfig::default()
        };
        let launch = TrainerLaunch::new(config, TrainPhase::Grpo);
        let env = launch.env_vars();

        assert!(env.contains(&("CONTRIBUTION".to_string(), "1".to_string())));
        assert!(env.contains(&("CONTRIB_TYPE".to_string(), "C0".to_string())));
        assert!(env.contains(&("BETA".to_string(), "0.05".to_string())));
    }

    #[test]
    fn test_launch_experiment_name_wins() {
        let mut config = test_config();
        config.reward.experiment_name = Some("stale-name".into());
        let launch = TrainerLaunch::new(config, TrainPhase::Sft);
        let env = launch.env_vars();

        let names: Vec<&str> = env
            .iter()
            .filter(|(k, _)| k == "EXPERIMENT_NAME")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(names, vec!["unit-test"]);
    }

    // ------------------------------------------------------------------
    // validate
    // ------------------------------------------------------------------

    #[test]
    fn test_validate_missing_paths() {
        let mut config = test_config();
        config.paths.train_file = "/nonexistent/train.parquet".into();
        config.paths.checkpoint_dir = "/nonexistent/checkpoints".into();
        let launch = TrainerLaunch::new(config, TrainPhase::Sft);

        let err = launch.validate().unwrap_err();
        assert!(err.to_string().contains("train"));
    }

    // ------------------------------------------------------------------
    // render_command
    // ------------------------------------------------------------------

    #[test]
    fn test_render_command_shape() {
        let launch = TrainerLaunch::new(test_config(), TrainPhase::Grpo);
        let rendered = launch.render_command();
        assert!(rendered.contains("python3 -m verl.trainer.main_ppo"));
        assert!(rendered.contains("EXPERIMENT_NAME=unit-test"));
    }
}
