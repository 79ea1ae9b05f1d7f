//! Run launch, the background task that drives a run, and the run page.

use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use foldyx_common::{FoldyxError, Result, RunOptions, RunState};
use foldyx_jobs::builder::AffinityRequest;
use foldyx_jobs::runner::RunHandle;
use foldyx_jobs::summary::SummaryRow;
use foldyx_jobs::workspace::RunDirectory;

use crate::error::{WebError, WebResult};
use crate::handlers::editor::render_editor;
use crate::handlers::layout::{escape_html, page, Banner};
use crate::state::{AppEvent, RunRecord, SharedState};

// ── Form input ────────────────────────────────────────────────────────────────

/// Unchecked checkboxes are absent from the form body. Number inputs arrive
/// as text; a cleared field is sent as an empty value.
#[derive(Deserialize)]
pub struct RunForm {
    pub use_msa_server: Option<String>,
    pub use_potentials: Option<String>,
    pub recycling_steps: Option<String>,
    pub diffusion_samples: Option<String>,
    pub gpu_count: Option<String>,
    pub predict_affinity: Option<String>,
    pub binder: Option<String>,
}

impl RunForm {
    fn options(&self, defaults: &RunOptions) -> Result<RunOptions> {
        Ok(RunOptions {
            use_msa_server: self.use_msa_server.is_some(),
            use_potentials: self.use_potentials.is_some(),
            recycling_steps: parse_count("recycling_steps", &self.recycling_steps, defaults.recycling_steps)?,
            diffusion_samples: parse_count("diffusion_samples", &self.diffusion_samples, defaults.diffusion_samples)?,
            gpu_count: parse_count("gpu_count", &self.gpu_count, defaults.gpu_count)?,
        })
    }

    fn affinity(&self) -> Option<AffinityRequest> {
        self.predict_affinity.as_ref()?;
        Some(AffinityRequest::new(self.binder.clone().unwrap_or_default()))
    }
}

/// Blank or absent falls back to the default.
fn parse_count(field: &str, raw: &Option<String>, default: u32) -> Result<u32> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse().map_err(|_| {
            FoldyxError::Validation(format!("{} must be a whole number, got '{}'", field, value))
        }),
    }
}

// ── Launch ────────────────────────────────────────────────────────────────────

/// POST /session/{id}/run
///
/// Validation failures stay on the editor page as a banner. Once the job
/// file is written the run exists, and any later failure (missing tool
/// included) is reported on the run page.
pub async fn start_run(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    Form(form): Form<RunForm>,
) -> WebResult<Response> {
    let session = state
        .session(session_id)
        .await
        .ok_or(WebError::SessionNotFound(session_id))?;

    let affinity = form.affinity();
    let run_id = Uuid::new_v4();

    let prepared = async {
        let options = form.options(&state.config.defaults)?;
        let prepared = state
            .pipeline
            .prepare(run_id, session.chains.entries(), affinity.as_ref(), &options, state.gpu_count)
            .await?;
        Ok::<_, FoldyxError>((options, prepared))
    };
    let (options, prepared) = match prepared.await {
        Ok(prepared) => prepared,
        Err(e) => {
            warn!("Run not started for session {}: {}", session_id, e);
            let banner = Banner::Error(e.to_string());
            return Ok(render_editor(&state, session_id, Some(&banner)).await?.into_response());
        }
    };

    let mut record = RunRecord::new(
        run_id,
        session_id,
        options.clone(),
        affinity.map(|a| a.binder),
    );
    record.transition(RunState::Configuring);
    record.dir = Some(prepared.dir.clone());
    record.command = Some(
        state
            .pipeline
            .runner()
            .command(&prepared.dir.input_dir, &prepared.dir.output_dir, &options)
            .display(),
    );
    state.insert_run(record).await;

    match state.pipeline.launch(&prepared, &options) {
        Ok(handle) => {
            let cancel = handle.cancel_token();
            state
                .update_run(run_id, |run| {
                    run.transition(RunState::Running);
                    run.cancel = Some(cancel);
                })
                .await;
            state.publish(AppEvent::RunStatus { run_id, state: RunState::Running, message: None });
            tokio::spawn(drive_run(state.clone(), run_id, handle, prepared.dir));
            info!("Run {} started", run_id);
        }
        Err(e) => {
            error!("Run {} failed to start: {}", run_id, e);
            fail_run(&state, run_id, &e).await;
        }
    }

    Ok(Redirect::to(&format!("/runs/{}", run_id)).into_response())
}

/// Single consumer of the run's output: mirrors every line into the record
/// and onto the event channel, then records the outcome.
pub async fn drive_run(state: SharedState, run_id: Uuid, mut handle: RunHandle, dir: RunDirectory) {
    while let Some(line) = handle.next_line().await {
        state.append_log(run_id, line).await;
    }

    let outcome = match handle.finish().await {
        Ok(_) => state.pipeline.collect(&dir).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(results) => {
            let results = results.without_payload();
            let mut message = "Prediction finished.".to_string();
            for note in &results.notes {
                message.push(' ');
                message.push_str(note);
            }
            state
                .update_run(run_id, |run| {
                    run.exit_code = Some(0);
                    run.results = Some(results);
                    run.message = Some(message.clone());
                    run.transition(RunState::Succeeded);
                })
                .await;
            info!("Run {} succeeded", run_id);
            state.publish(AppEvent::RunStatus {
                run_id,
                state: RunState::Succeeded,
                message: Some(message),
            });
        }
        Err(e) => fail_run(&state, run_id, &e).await,
    }
}

fn failure_message(e: &FoldyxError) -> String {
    match e {
        FoldyxError::Process { .. } => format!("{}. See the log above for details.", e),
        FoldyxError::Cancelled => "Run cancelled.".to_string(),
        _ => e.to_string(),
    }
}

async fn fail_run(state: &SharedState, run_id: Uuid, e: &FoldyxError) {
    let message = failure_message(e);
    warn!("Run {} failed: {}", run_id, e);
    state
        .update_run(run_id, |run| {
            if let FoldyxError::Process { code, .. } = e {
                run.exit_code = *code;
            }
            run.message = Some(message.clone());
            run.transition(RunState::Failed);
        })
        .await;
    state.publish(AppEvent::RunStatus { run_id, state: RunState::Failed, message: Some(message) });
}

// ── API ───────────────────────────────────────────────────────────────────────

/// GET /api/runs/{run_id}
pub async fn api_run(
    State(state): State<SharedState>,
    Path(run_id): Path<Uuid>,
) -> WebResult<Json<RunRecord>> {
    state.run(run_id).await.map(Json).ok_or(WebError::RunNotFound(run_id))
}

/// POST /api/runs/{run_id}/cancel
pub async fn cancel_run(
    State(state): State<SharedState>,
    Path(run_id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let run = state.run(run_id).await.ok_or(WebError::RunNotFound(run_id))?;
    let token = run.cancel.filter(|_| run.state == RunState::Running)
        .ok_or(WebError::NotRunning(run_id))?;
    token.cancel();
    info!("Cancellation requested for run {}", run_id);
    Ok(Json(json!({ "status": "cancelling", "run_id": run_id })))
}

// ── Run page ──────────────────────────────────────────────────────────────────

/// GET /runs/{run_id}
pub async fn run_page(
    State(state): State<SharedState>,
    Path(run_id): Path<Uuid>,
) -> WebResult<Html<String>> {
    let run = state.run(run_id).await.ok_or(WebError::RunNotFound(run_id))?;
    let structure = match run.results.as_ref().and_then(|r| r.structure.as_ref()) {
        Some(artifact) => match artifact.read_base64().await {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!("Run {}: cannot read {:?}: {}", run_id, artifact.path, e);
                None
            }
        },
        None => None,
    };
    Ok(Html(render_run_page(&run, structure.as_deref())))
}

fn summary_table(title: &str, rows: &[SummaryRow], available: bool) -> String {
    if !available {
        return format!(r#"<div class="card"><div class="card-header">{}</div>
            <p class="p-4 text-muted">No data was generated.</p></div>"#, title);
    }
    let rows: String = rows.iter().map(|r| {
        format!(r#"<tr><td>{}</td><td class="text-end mono">{}</td></tr>"#, r.label, escape_html(&r.value))
    }).collect();
    format!(r#"<div class="card"><div class="card-header">{}</div>
        <table class="table"><tbody>{}</tbody></table></div>"#, title, rows)
}

/// `structure` is the base64 payload of the structure file, read per request.
fn render_results(run: &RunRecord, structure: Option<&str>) -> String {
    let Some(results) = &run.results else {
        return String::new();
    };

    let viewer = match (&results.structure, structure) {
        (Some(s), Some(payload)) => format!(
            r#"<div class="viewer" id="structure-viewer" data-format="{}" data-structure="{}"></div>"#,
            s.format.extension(),
            payload
        ),
        (Some(_), None) => r#"<div class="viewer viewer-empty">The structure file could not be read.</div>"#.to_string(),
        (None, _) => r#"<div class="viewer viewer-empty">No structure file was produced.</div>"#.to_string(),
    };

    let mut downloads = Vec::new();
    if results.structure.is_some() {
        downloads.push(("structure", "Structure"));
    }
    if results.confidence_path.is_some() {
        downloads.push(("confidence", "Confidence JSON"));
    }
    if results.affinity_path.is_some() {
        downloads.push(("affinity", "Affinity JSON"));
    }
    let download_links: String = downloads.iter().map(|(kind, label)| {
        format!(r#"<a class="btn btn-outline" href="/api/runs/{}/files/{}">{}</a>"#, run.id, kind, label)
    }).collect();

    let affinity = if run.binder.is_some() {
        summary_table("Affinity", &results.affinity.rows(), results.affinity.available)
    } else {
        String::new()
    };

    format!(r#"
    <div class="card mb-4">
        <div class="card-header">Predicted structure</div>
        {viewer}
        <div class="d-flex gap-3 p-4">{downloads}</div>
    </div>
    <div class="grid-2 mb-4">
        {confidence}
        {affinity}
    </div>"#,
        viewer = viewer,
        downloads = download_links,
        confidence = summary_table("Confidence", &results.confidence.rows(), results.confidence.available),
        affinity = affinity,
    )
}

pub fn render_run_page(run: &RunRecord, structure: Option<&str>) -> String {
    let log: String = run.log.iter().map(|l| escape_html(l) + "\n").collect();
    let message = run.message.as_deref().map(escape_html).unwrap_or_default();
    let cancel_button = if run.state == RunState::Running {
        format!(r#"<button class="btn btn-danger" id="cancel-run" data-run="{}">Cancel run</button>"#, run.id)
    } else {
        String::new()
    };

    let body = format!(r#"
    <div class="page-header">
        <div>
            <h1 class="page-title">Prediction run</h1>
            <p class="text-muted mono">{id}</p>
        </div>
        <div class="d-flex gap-3">
            <span class="badge badge-{state}" id="run-state">{state}</span>
            {cancel}
            <a class="btn btn-outline" href="/session/{sid}">Back to editor</a>
        </div>
    </div>

    <div class="card mb-4">
        <div class="card-header">Command</div>
        <pre class="mono p-4">{command}</pre>
    </div>

    <div class="card mb-4">
        <div class="card-header">Log</div>
        <pre class="run-log" id="run-log" data-run="{id}" data-state="{state}" data-lines="{lines}">{log}</pre>
        <p class="p-4" id="run-message">{message}</p>
    </div>
    {results}"#,
        id = run.id,
        state = run.state,
        cancel = cancel_button,
        sid = run.session_id,
        command = escape_html(run.command.as_deref().unwrap_or("")),
        lines = run.log.len(),
        log = log,
        message = message,
        results = render_results(run, structure),
    );

    page("Prediction run", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_options() {
        let form = RunForm {
            use_msa_server: None,
            use_potentials: Some("on".into()),
            recycling_steps: Some("5".into()),
            diffusion_samples: Some(" ".into()),
            gpu_count: None,
            predict_affinity: None,
            binder: Some("L".into()),
        };
        let opts = form.options(&RunOptions::default()).unwrap();
        assert!(!opts.use_msa_server);
        assert!(opts.use_potentials);
        assert_eq!(opts.recycling_steps, 5);
        assert_eq!(opts.diffusion_samples, 1);
        assert!(form.affinity().is_none());
    }

    #[test]
    fn test_non_numeric_count_is_a_validation_error() {
        let err = parse_count("gpu_count", &Some("two".into()), 1).unwrap_err();
        assert!(matches!(err, FoldyxError::Validation(_)));
        assert!(err.to_string().contains("gpu_count must be a whole number"));
        assert_eq!(parse_count("gpu_count", &Some("".into()), 3).unwrap(), 3);
        assert_eq!(parse_count("gpu_count", &None, 3).unwrap(), 3);
        assert_eq!(parse_count("gpu_count", &Some(" 2 ".into()), 3).unwrap(), 2);
    }

    #[test]
    fn test_affinity_requires_checkbox() {
        let form = RunForm {
            use_msa_server: Some("on".into()),
            use_potentials: None,
            recycling_steps: None,
            diffusion_samples: None,
            gpu_count: None,
            predict_affinity: Some("on".into()),
            binder: Some(" L ".into()),
        };
        assert_eq!(form.affinity().unwrap().binder, "L");
    }

    #[test]
    fn test_failure_messages() {
        let msg = failure_message(&FoldyxError::Process { code: Some(1), log: String::new() });
        assert!(msg.contains("exit code 1"));
        assert_eq!(failure_message(&FoldyxError::Cancelled), "Run cancelled.");
    }

    #[test]
    fn test_viewer_uses_payload_read_per_request() {
        use foldyx_common::StructureFormat;
        use foldyx_jobs::artifacts::{CollectedResults, StructureArtifact};
        use foldyx_jobs::summary::{AffinitySummary, ConfidenceSummary};

        let mut run = RunRecord::new(Uuid::nil(), Uuid::nil(), RunOptions::default(), None);
        run.results = Some(CollectedResults {
            structure: Some(StructureArtifact {
                path: "/gone/prediction_config_model_0.cif".into(),
                format: StructureFormat::Mmcif,
                base64: String::new(),
            }),
            confidence: ConfidenceSummary::empty(),
            affinity: AffinitySummary::empty(),
            confidence_path: None,
            affinity_path: None,
            notes: Vec::new(),
        });

        let html = render_run_page(&run, Some("ZGF0YQ=="));
        assert!(html.contains(r#"data-structure="ZGF0YQ==""#));

        let html = render_run_page(&run, None);
        assert!(!html.contains("structure-viewer"));
        assert!(html.contains("could not be read"));
    }

    #[test]
    fn test_run_page_escapes_log() {
        let mut run = RunRecord::new(Uuid::nil(), Uuid::nil(), RunOptions::default(), None);
        run.log.push("<warn> low memory".into());
        let html = render_run_page(&run, None);
        assert!(html.contains("&lt;warn&gt; low memory"));
        assert!(!html.contains("cancel-run"));
    }
}
