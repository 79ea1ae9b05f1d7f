//! Prediction run options and the run lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FoldyxError, Result};

pub const MIN_RECYCLING_STEPS: u32 = 1;
pub const MAX_RECYCLING_STEPS: u32 = 10;
pub const MIN_DIFFUSION_SAMPLES: u32 = 1;
pub const MAX_DIFFUSION_SAMPLES: u32 = 10;

/// Options forwarded to the prediction tool for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Query the remote MSA service
    #[serde(default = "default_true")]
    pub use_msa_server: bool,

    /// Enable inference-time potentials (more physical poses, slower)
    #[serde(default)]
    pub use_potentials: bool,

    #[serde(default = "default_recycling_steps")]
    pub recycling_steps: u32,

    #[serde(default = "default_diffusion_samples")]
    pub diffusion_samples: u32,

    #[serde(default = "default_gpu_count")]
    pub gpu_count: u32,
}

fn default_true() -> bool { true }
fn default_recycling_steps() -> u32 { 3 }
fn default_diffusion_samples() -> u32 { 1 }
fn default_gpu_count() -> u32 { 1 }

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_msa_server: true,
            use_potentials: false,
            recycling_steps: default_recycling_steps(),
            diffusion_samples: default_diffusion_samples(),
            gpu_count: default_gpu_count(),
        }
    }
}

impl RunOptions {
    /// Check every numeric option against its allowed range.
    /// `available_gpus` is the upper bound for `gpu_count` (treated as at least 1).
    pub fn validate(&self, available_gpus: u32) -> Result<()> {
        check_range("recycling_steps", self.recycling_steps, MIN_RECYCLING_STEPS, MAX_RECYCLING_STEPS)?;
        check_range("diffusion_samples", self.diffusion_samples, MIN_DIFFUSION_SAMPLES, MAX_DIFFUSION_SAMPLES)?;
        check_range("gpu_count", self.gpu_count, 1, available_gpus.max(1))?;
        Ok(())
    }
}

fn check_range(name: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if value < min || value > max {
        return Err(FoldyxError::Validation(format!(
            "{} must be between {} and {} (got {})",
            name, min, max, value
        )));
    }
    Ok(())
}

/// Structure file format requested from the prediction tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureFormat {
    Mmcif,
    Pdb,
}

impl StructureFormat {
    /// Value passed to `--output_format`.
    pub fn as_flag(&self) -> &'static str {
        match self {
            StructureFormat::Mmcif => "mmcif",
            StructureFormat::Pdb   => "pdb",
        }
    }

    /// Extension of the files the tool writes for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            StructureFormat::Mmcif => "cif",
            StructureFormat::Pdb   => "pdb",
        }
    }
}

impl Default for StructureFormat {
    fn default() -> Self { StructureFormat::Mmcif }
}

/// Lifecycle of a single prediction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    /// Writing the job description
    Configuring,
    /// Child process launched
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }

    /// Move to `next`, rejecting transitions outside
    /// Idle → Configuring → Running → Succeeded | Failed.
    /// Failure is reachable from any non-terminal state.
    pub fn advance(self, next: RunState) -> Result<RunState> {
        let allowed = match (self, next) {
            (RunState::Idle, RunState::Configuring) => true,
            (RunState::Configuring, RunState::Running) => true,
            (RunState::Running, RunState::Succeeded) => true,
            (s, RunState::Failed) => !s.is_terminal(),
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(FoldyxError::Validation(format!(
                "invalid run state transition {} -> {}",
                self, next
            )))
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle        => "idle",
            RunState::Configuring => "configuring",
            RunState::Running     => "running",
            RunState::Succeeded   => "succeeded",
            RunState::Failed      => "failed",
        };
        f.write_str(s)
    }
}
