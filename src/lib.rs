//! Remora: reward shaping and job launch for tool-use RL fine-tuning.
//!
//! The actual training loop (actor/critic orchestration, rollout scheduling,
//! distributed inference) is owned by an external RL framework. This crate
//! provides the two pieces that sit on top of it:
//!
//! - a per-step reward scorer composed of format, correctness, length, and
//!   contribution sub-rewards, with variant selection via an explicit
//!   configuration structure or the process environment;
//! - a job launcher that validates run prerequisites and wires the reward
//!   configuration plus training hyperparameters into the trainer's CLI.

pub mod config;
pub mod launch;
pub mod reward;
