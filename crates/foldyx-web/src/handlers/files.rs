//! Downloads of the collected result files.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use foldyx_common::StructureFormat;

use crate::error::{WebError, WebResult};
use crate::state::SharedState;

/// GET /api/runs/{run_id}/files/{kind} where kind is
/// `structure`, `confidence` or `affinity`.
pub async fn download_file(
    State(state): State<SharedState>,
    Path((run_id, kind)): Path<(Uuid, String)>,
) -> WebResult<Response> {
    let run = state.run(run_id).await.ok_or(WebError::RunNotFound(run_id))?;
    let results = run
        .results
        .ok_or_else(|| WebError::FileUnavailable(kind.clone()))?;

    let (path, content_type): (Option<PathBuf>, &'static str) = match kind.as_str() {
        "structure" => {
            let content_type = match results.structure.as_ref().map(|s| s.format) {
                Some(StructureFormat::Pdb) => "chemical/x-pdb",
                _ => "chemical/x-cif",
            };
            (results.structure.map(|s| s.path), content_type)
        }
        "confidence" => (results.confidence_path, "application/json"),
        "affinity" => (results.affinity_path, "application/json"),
        _ => (None, "application/octet-stream"),
    };
    let path = path.ok_or_else(|| WebError::FileUnavailable(kind.clone()))?;

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| WebError::Core(e.into()))?;
    debug!("Serving {:?} for run {}", path, run_id);

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| kind.clone());
    let disposition = format!("attachment; filename=\"{}\"", filename);

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
