use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FoldyxError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Prediction tool not found: `{program}` is not installed or not on PATH")]
    ToolNotFound { program: String },

    #[error("Prediction tool exited with {}", exit_label(.code))]
    Process { code: Option<i32>, log: String },

    #[error("Run was cancelled")]
    Cancelled,

    #[error("Run exceeded the {secs}s time limit")]
    TimedOut { secs: u64 },

    #[error("Expected artifact missing: {0}")]
    MissingArtifact(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl FoldyxError {
    /// True for errors the user fixes by editing input rather than re-running.
    pub fn is_user_error(&self) -> bool {
        matches!(self, FoldyxError::Validation(_) | FoldyxError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, FoldyxError>;
