//! System status: tool, devices, workspace.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub version: &'static str,
    pub tool: String,
    pub output_format: &'static str,
    pub timeout_minutes: u64,
    pub gpu_count: u32,
    pub workspace: String,
    pub active_runs: usize,
}

/// GET /api/system
pub async fn api_system(State(state): State<SharedState>) -> Json<SystemInfo> {
    let tool = &state.config.tool;
    Json(SystemInfo {
        version: env!("CARGO_PKG_VERSION"),
        tool: tool.executable.clone(),
        output_format: tool.output_format.as_flag(),
        timeout_minutes: tool.timeout_minutes,
        gpu_count: state.gpu_count,
        workspace: state.config.workspace.path.clone(),
        active_runs: state.active_runs().await,
    })
}
