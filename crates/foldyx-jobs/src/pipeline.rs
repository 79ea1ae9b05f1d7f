//! Orchestrator for one prediction run.
//!
//! prepare (validate, build, write job) → launch (spawn tool) → collect.
//! The web layer drives the steps individually so it can stream the log in
//! between; `run` chains them for callers that only want the outcome.

use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use foldyx_common::{ChainEntry, FoldyxError, Result, RunOptions, RunState, StructureFormat};
use foldyx_config::Config;

use crate::artifacts::{ArtifactLayout, CollectedResults, ResultCollector};
use crate::builder::{build_job, AffinityRequest, JobDescription};
use crate::runner::{JobRunner, RunHandle, RunLog};
use crate::workspace::RunDirectory;

/// A run whose job file is on disk, ready to launch.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub run_id: Uuid,
    pub dir: RunDirectory,
    pub job: JobDescription,
    pub job_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub log: RunLog,
    pub results: CollectedResults,
}

#[derive(Debug, Clone)]
pub struct PredictionPipeline {
    workspace: PathBuf,
    job_name: String,
    format: StructureFormat,
    runner: JobRunner,
}

impl PredictionPipeline {
    pub fn new<P: AsRef<Path>>(workspace: P, job_name: &str, runner: JobRunner) -> Self {
        let format = runner.tool().output_format;
        Self {
            workspace: workspace.as_ref().to_path_buf(),
            job_name: job_name.to_string(),
            format,
            runner,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.workspace.path,
            &config.workspace.job_name,
            JobRunner::new(config.tool.clone()),
        )
    }

    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Validate options, build the job document and write it into a fresh
    /// run directory. Nothing touches the disk if validation fails.
    pub async fn prepare(
        &self,
        run_id: Uuid,
        entries: &[ChainEntry],
        affinity: Option<&AffinityRequest>,
        options: &RunOptions,
        available_gpus: u32,
    ) -> Result<PreparedRun> {
        options.validate(available_gpus)?;
        let job = build_job(entries, affinity)?;

        let dir = RunDirectory::create(&self.workspace, run_id, &self.job_name).await?;
        let job_path = dir.write_job(&job).await?;
        info!("Prepared run {} in {:?}", run_id, dir.root);

        Ok(PreparedRun { run_id, dir, job, job_path })
    }

    pub fn launch(&self, prepared: &PreparedRun, options: &RunOptions) -> Result<RunHandle> {
        self.runner.start(&prepared.dir.input_dir, &prepared.dir.output_dir, options)
    }

    pub fn layout(&self, dir: &RunDirectory) -> ArtifactLayout {
        ArtifactLayout::for_run(dir, self.format)
    }

    pub async fn collect(&self, dir: &RunDirectory) -> Result<CollectedResults> {
        ResultCollector::collect(&self.layout(dir)).await
    }

    /// Full run. `on_line` sees every log line as it arrives.
    pub async fn run<F>(
        &self,
        entries: &[ChainEntry],
        affinity: Option<&AffinityRequest>,
        options: &RunOptions,
        available_gpus: u32,
        mut on_line: F,
    ) -> Result<RunOutcome>
    where
        F: FnMut(&str),
    {
        let mut state = RunState::Idle.advance(RunState::Configuring)?;

        let outcome = async {
            let prepared = self
                .prepare(Uuid::new_v4(), entries, affinity, options, available_gpus)
                .await?;
            let mut handle = self.launch(&prepared, options)?;
            state = state.advance(RunState::Running)?;

            while let Some(line) = handle.next_line().await {
                on_line(&line);
            }
            let log = handle.finish().await?;
            let results = self.collect(&prepared.dir).await?;
            Ok::<_, FoldyxError>(RunOutcome { log, results })
        }
        .await;

        match &outcome {
            Ok(_) => {
                state.advance(RunState::Succeeded)?;
            }
            Err(e) => {
                warn!("Run failed while {}: {}", state, e);
                state.advance(RunState::Failed)?;
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldyx_common::MoleculeType;
    use foldyx_config::ToolConfig;

    fn pipeline(ws: &Path) -> PredictionPipeline {
        PredictionPipeline::new(ws, "prediction_config", JobRunner::new(ToolConfig::default()))
    }

    #[tokio::test]
    async fn test_prepare_writes_job_file() {
        let ws = tempfile::tempdir().unwrap();
        let entries = vec![
            ChainEntry::new("A", MoleculeType::Protein, "MKT"),
            ChainEntry::new("L", MoleculeType::LigandCcd, "ATP"),
        ];
        let prepared = pipeline(ws.path())
            .prepare(
                Uuid::new_v4(),
                &entries,
                Some(&AffinityRequest::new("L")),
                &RunOptions::default(),
                1,
            )
            .await
            .unwrap();

        let yaml = std::fs::read_to_string(&prepared.job_path).unwrap();
        assert!(yaml.contains("binder: L"));
        assert_eq!(prepared.job.sequences.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_options_create_nothing() {
        let ws = tempfile::tempdir().unwrap();
        let opts = RunOptions { gpu_count: 4, ..RunOptions::default() };
        let err = pipeline(ws.path())
            .prepare(Uuid::new_v4(), &[ChainEntry::new("A", MoleculeType::Protein, "MKT")], None, &opts, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, FoldyxError::Validation(_)));
        assert_eq!(std::fs::read_dir(ws.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_bad_binder_creates_nothing() {
        let ws = tempfile::tempdir().unwrap();
        let err = pipeline(ws.path())
            .prepare(
                Uuid::new_v4(),
                &[ChainEntry::new("A", MoleculeType::Protein, "MKT")],
                Some(&AffinityRequest::new("Z")),
                &RunOptions::default(),
                1,
            )
            .await
            .unwrap_err();
        assert!(err.is_user_error());
        assert_eq!(std::fs::read_dir(ws.path()).unwrap().count(), 0);
    }
}
