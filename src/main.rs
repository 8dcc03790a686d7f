//! Remora: reward shaping and job launch for tool-use RL fine-tuning.
//!
//! Provides subcommands for the pieces that sit on top of the external
//! trainer:
//!
//! - `score`   -- Score a solution against a ground truth and print the
//!               reward breakdown
//! - `launch`  -- Validate prerequisites and launch an SFT or GRPO run
//! - `config`  -- Print the reward configuration resolved from the
//!               current environment

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use remora::config::{LaunchConfig, RewardConfig};
use remora::launch::{TrainPhase, TrainerLaunch};
use remora::reward::{contrib_value_delta_scaled, RewardScorer, StepContext};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Remora: reward shaping and job launch for tool-use RL fine-tuning.
#[derive(Parser)]
#[command(name = "remora", version, about)]
struct Cli {
    /// Path to a JSON launch configuration (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a solution file against a ground-truth file.
    Score {
        /// Path to the generated solution text.
        solution: PathBuf,

        /// Path to the ground-truth reference text.
        ground_truth: PathBuf,

        /// Global training step (drives the scheduled reward variants).
        #[arg(long, default_value_t = 0)]
        step: usize,

        /// Previous step context as inline JSON (e.g. '{"bb_hash": "{}"}').
        #[arg(long)]
        prev_context: Option<String>,

        /// Current step context as inline JSON.
        #[arg(long)]
        cur_context: Option<String>,

        /// Also print the progress-scaled value-delta diagnostic for this
        /// task complexity.
        #[arg(long)]
        task_complexity: Option<f64>,
    },

    /// Validate prerequisites and launch a trainer run.
    Launch {
        #[command(subcommand)]
        phase: LaunchPhase,
    },

    /// Print the reward configuration resolved from the environment.
    Config,
}

#[derive(Subcommand)]
enum LaunchPhase {
    /// Cold-start supervised fine-tuning.
    Sft {
        /// Print the assembled command instead of running it.
        #[arg(long)]
        dry_run: bool,
    },

    /// GRPO reinforcement learning.
    Grpo {
        /// Print the assembled command instead of running it.
        #[arg(long)]
        dry_run: bool,
    },
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load or create the launch configuration.
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str::<LaunchConfig>(&text)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?
        }
        None => LaunchConfig::default(),
    };

    // An EXPERIMENT_NAME in the environment overrides the config file.
    if let Ok(name) = std::env::var("EXPERIMENT_NAME") {
        if !name.is_empty() {
            config.experiment_name = name;
        }
    }

    // A config file pins the reward variant explicitly; otherwise the
    // environment decides, exactly as inside the trainer.
    let reward_override = cli.config.is_some().then(|| config.reward.clone());

    match cli.command {
        Commands::Score {
            solution,
            ground_truth,
            step,
            prev_context,
            cur_context,
            task_complexity,
        } => cmd_score(
            reward_override,
            &solution,
            &ground_truth,
            step,
            prev_context.as_deref(),
            cur_context.as_deref(),
            task_complexity,
        ),
        Commands::Launch { phase } => match phase {
            LaunchPhase::Sft { dry_run } => cmd_launch(config, TrainPhase::Sft, dry_run).await,
            LaunchPhase::Grpo { dry_run } => cmd_launch(config, TrainPhase::Grpo, dry_run).await,
        },
        Commands::Config => cmd_config(),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn parse_context(raw: Option<&str>) -> Result<StepContext> {
    match raw {
        Some(text) => {
            let value: serde_json::Value =
                serde_json::from_str(text).context("Step context is not valid JSON")?;
            Ok(StepContext::from_value(&value))
        }
        None => Ok(StepContext::default()),
    }
}

fn cmd_score(
    reward_override: Option<RewardConfig>,
    solution_path: &PathBuf,
    ground_truth_path: &PathBuf,
    step: usize,
    prev_context: Option<&str>,
    cur_context: Option<&str>,
    task_complexity: Option<f64>,
) -> Result<()> {
    let solution = std::fs::read_to_string(solution_path)
        .with_context(|| format!("Failed to read solution from {}", solution_path.display()))?;
    let ground_truth = std::fs::read_to_string(ground_truth_path).with_context(|| {
        format!("Failed to read ground truth from {}", ground_truth_path.display())
    })?;

    let scorer = match reward_override {
        Some(reward) => RewardScorer::new(reward),
        None => RewardScorer::from_env(),
    };

    let prev = parse_context(prev_context)?;
    let cur = parse_context(cur_context)?;

    let result = scorer.score(&solution, &ground_truth, step, &prev, &cur);

    println!("Reward breakdown (step {step}):");
    println!("  format:       {:+.3}", result.format);
    println!("  correctness:  {:+.3}", result.correctness);
    println!("  length:       {:+.3}", result.length);
    println!("  contribution: {:+.3}", result.contribution);
    println!("  total:        {:+.3}", result.total);

    if let Some(complexity) = task_complexity {
        let scaled = contrib_value_delta_scaled(
            prev.value_or_default(),
            cur.value_or_default(),
            step,
            complexity,
        );
        println!();
        println!("Progress-scaled value delta (complexity {complexity}): {scaled:.3}");
    }

    Ok(())
}

async fn cmd_launch(config: LaunchConfig, phase: TrainPhase, dry_run: bool) -> Result<()> {
    let launch = TrainerLaunch::new(config, phase);

    if dry_run {
        println!("{}", launch.render_command());
        return Ok(());
    }

    let manifest = launch.launch().await?;
    tracing::info!(
        run_id = %manifest.run_id,
        phase = %phase,
        "Launch complete"
    );
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = RewardConfig::from_env();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
