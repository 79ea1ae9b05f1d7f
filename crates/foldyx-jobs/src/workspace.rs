//! Per-run directory layout.
//!
//! ```text
//! <workspace>/run-<uuid>/
//!     input/<job_name>.yaml
//!     output/            <- tool --out_dir
//! ```

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use foldyx_common::Result;

use crate::builder::JobDescription;

pub const INPUT_DIR_NAME: &str = "input";
pub const OUTPUT_DIR_NAME: &str = "output";

/// Directories and files belonging to one run.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    pub root: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub job_name: String,
}

impl RunDirectory {
    /// Create `run-<id>/{input,output}` under `workspace`.
    pub async fn create(workspace: &Path, run_id: Uuid, job_name: &str) -> Result<Self> {
        let root = workspace.join(format!("run-{}", run_id));
        let input_dir = root.join(INPUT_DIR_NAME);
        let output_dir = root.join(OUTPUT_DIR_NAME);

        fs::create_dir_all(&input_dir).await?;
        fs::create_dir_all(&output_dir).await?;

        Ok(Self {
            root,
            input_dir,
            output_dir,
            job_name: job_name.to_string(),
        })
    }

    pub fn job_file(&self) -> PathBuf {
        self.input_dir.join(format!("{}.yaml", self.job_name))
    }

    /// Folder the tool creates inside `--out_dir`: `boltz_results_<input dir name>`.
    pub fn results_prefix(&self) -> String {
        let stem = self
            .input_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| INPUT_DIR_NAME.to_string());
        format!("boltz_results_{}", stem)
    }

    pub async fn write_job(&self, job: &JobDescription) -> Result<PathBuf> {
        let path = self.job_file();
        fs::write(&path, job.to_yaml()?).await?;
        info!("Job description written to {:?}", path);
        Ok(path)
    }
}
