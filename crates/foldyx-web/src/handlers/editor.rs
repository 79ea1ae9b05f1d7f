//! Sequence editor pages: chain table, edit forms, presets and run options.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use foldyx_common::{FoldyxError, MoleculeType, Result, RunOptions};
use foldyx_jobs::builder::{build_job, AffinityRequest};
use foldyx_jobs::editor::{Preset, SequenceSet};

use crate::error::{WebError, WebResult};
use crate::handlers::layout::{escape_html, page, render_banner, Banner};
use crate::state::{AppState, RunSummary, Session, SharedState};

/// Sequences longer than this are shortened in the chain table.
const SEQUENCE_PREVIEW_CHARS: usize = 60;

// ── Form input ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AddChainForm {
    pub chain_id: String,
    pub molecule_type: String,
    pub sequence: String,
}

#[derive(Deserialize)]
pub struct DeleteChainsForm {
    /// Comma-separated chain ids: "A, B"
    pub ids: String,
}

#[derive(Deserialize)]
pub struct PresetForm {
    pub preset: String,
}

#[derive(Deserialize, Default)]
pub struct PreviewQuery {
    pub binder: Option<String>,
}

// ── Handlers ──────────────────────────────────────────────────────────────────

pub async fn new_session(State(state): State<SharedState>) -> Redirect {
    let id = state.create_session().await;
    info!("Created session {}", id);
    Redirect::to(&format!("/session/{}", id))
}

pub async fn editor_page(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
) -> WebResult<Html<String>> {
    render_editor(&state, session_id, None).await
}

pub async fn add_chain(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    Form(form): Form<AddChainForm>,
) -> WebResult<Html<String>> {
    edit(&state, session_id, |chains| {
        let molecule_type: MoleculeType = form.molecule_type.parse()?;
        let next = chains.add(&form.chain_id, molecule_type, &form.sequence)?;
        let message = format!("Added chain {} ({})", form.chain_id.trim(), molecule_type.label());
        Ok((next, message))
    })
    .await
}

pub async fn delete_chains(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    Form(form): Form<DeleteChainsForm>,
) -> WebResult<Html<String>> {
    edit(&state, session_id, |chains| {
        let ids = parse_id_list(&form.ids);
        if ids.is_empty() {
            return Err(FoldyxError::Validation("enter at least one chain id to delete".into()));
        }
        let removed: Vec<&str> = ids.iter().copied().filter(|id| chains.contains(id)).collect();
        let next = chains.delete(&ids)?;
        Ok((next, format!("Deleted chains: {}", removed.join(", "))))
    })
    .await
}

pub async fn clear_chains(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
) -> WebResult<Html<String>> {
    edit(&state, session_id, |chains| Ok((chains.clear(), "Cleared all chains".to_string()))).await
}

pub async fn load_preset(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    Form(form): Form<PresetForm>,
) -> WebResult<Html<String>> {
    edit(&state, session_id, |_| {
        let preset: Preset = form.preset.parse()?;
        Ok((SequenceSet::preset(preset), format!("Loaded example: {}", preset.label())))
    })
    .await
}

/// GET /session/{id}/job.yaml: the document a run would write right now.
pub async fn job_preview(
    State(state): State<SharedState>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<PreviewQuery>,
) -> WebResult<Response> {
    let session = state
        .session(session_id)
        .await
        .ok_or(WebError::SessionNotFound(session_id))?;

    let affinity = query
        .binder
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(AffinityRequest::new);
    let yaml = build_job(session.chains.entries(), affinity.as_ref())?.to_yaml()?;

    Ok(([(header::CONTENT_TYPE, "application/yaml; charset=utf-8")], yaml).into_response())
}

// ── Editing ───────────────────────────────────────────────────────────────────

/// Apply one editor operation under the session lock. A failed operation
/// leaves the chains untouched and becomes an error banner.
async fn edit<F>(state: &AppState, session_id: Uuid, op: F) -> WebResult<Html<String>>
where
    F: FnOnce(&SequenceSet) -> Result<(SequenceSet, String)>,
{
    let banner = {
        let mut sessions = state.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(WebError::SessionNotFound(session_id))?;
        match op(&session.chains) {
            Ok((next, message)) => {
                session.chains = next;
                Banner::Info(message)
            }
            Err(e) => {
                debug!("Edit rejected for session {}: {}", session_id, e);
                Banner::Error(e.to_string())
            }
        }
    };
    render_editor(state, session_id, Some(&banner)).await
}

fn parse_id_list(raw: &str) -> Vec<&str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

// ── Rendering ─────────────────────────────────────────────────────────────────

pub async fn render_editor(
    state: &AppState,
    session_id: Uuid,
    banner: Option<&Banner>,
) -> WebResult<Html<String>> {
    let session = state
        .session(session_id)
        .await
        .ok_or(WebError::SessionNotFound(session_id))?;

    let newest_first: Vec<Uuid> = session.runs.iter().rev().copied().collect();
    let runs = state.run_summaries(&newest_first).await;

    Ok(Html(render_editor_page(
        session_id,
        &session,
        &runs,
        &state.config.defaults,
        state.gpu_count,
        banner,
    )))
}

fn render_editor_page(
    session_id: Uuid,
    session: &Session,
    runs: &[RunSummary],
    defaults: &RunOptions,
    gpu_count: u32,
    banner: Option<&Banner>,
) -> String {
    let chains = &session.chains;

    let chain_rows: String = if chains.is_empty() {
        r#"<tr><td colspan="4" class="text-center text-muted py-4">
            No chains yet. Add one below or load an example.
        </td></tr>"#.to_string()
    } else {
        chains.entries().iter().map(|e| {
            let preview: String = e.sequence.chars().take(SEQUENCE_PREVIEW_CHARS).collect();
            let ellipsis = if e.sequence.chars().count() > SEQUENCE_PREVIEW_CHARS { "…" } else { "" };
            format!(r#"<tr>
                <td class="chain-id">{}</td>
                <td><span class="badge badge-{}">{}</span></td>
                <td class="mono" title="{}">{}{}</td>
                <td class="text-end text-muted">{}</td>
            </tr>"#,
                escape_html(&e.chain_id),
                e.molecule_type.as_str(),
                e.molecule_type.label(),
                escape_html(&e.sequence),
                escape_html(&preview),
                ellipsis,
                e.sequence.chars().count())
        }).collect()
    };

    let type_options: String = MoleculeType::ALL.iter().map(|t| {
        format!(r#"<option value="{}">{}</option>"#, t.as_str(), t.label())
    }).collect();

    let preset_options: String = Preset::ALL.iter().map(|p| {
        format!(r#"<option value="{}">{}</option>"#, p.as_str(), p.label())
    }).collect();

    let ligands = chains.ligand_ids();
    let binder_options: String = if ligands.is_empty() {
        r#"<option value="">No ligand chains</option>"#.to_string()
    } else {
        ligands.iter().map(|id| {
            let id = escape_html(id);
            format!(r#"<option value="{}">{}</option>"#, id, id)
        }).collect()
    };

    let run_rows: String = if runs.is_empty() {
        r#"<li class="text-muted">No runs in this session yet.</li>"#.to_string()
    } else {
        runs.iter().map(|r| {
            format!(r#"<li><a href="/runs/{}">{}</a> <span class="badge badge-{}">{}</span></li>"#,
                r.id, r.created_at.format("%Y-%m-%d %H:%M:%S"), r.state, r.state)
        }).collect()
    };

    let checked = |on: bool| if on { "checked" } else { "" };

    let body = format!(r#"
    <div class="page-header">
        <div>
            <h1 class="page-title">Sequence configuration</h1>
            <p class="text-muted">Session started {started} · {count} chain(s)</p>
        </div>
    </div>
    {banner}

    <div class="card mb-4">
        <div class="card-header">Chains</div>
        <div class="table-container">
            <table class="table">
                <thead><tr><th>ID</th><th>Type</th><th>Sequence</th><th class="text-end">Length</th></tr></thead>
                <tbody>{chain_rows}</tbody>
            </table>
        </div>
    </div>

    <div class="grid-2 mb-4">
        <div class="card">
            <div class="card-header">Add chain</div>
            <form method="POST" action="/session/{sid}/chains" class="p-4">
                <label>Chain ID <input type="text" name="chain_id" class="form-control" placeholder="A" required></label>
                <label>Molecule type <select name="molecule_type" class="form-control">{type_options}</select></label>
                <label>Sequence / SMILES / CCD code
                    <textarea name="sequence" class="form-control mono" rows="4" required></textarea>
                </label>
                <button type="submit" class="btn btn-primary">Add chain</button>
            </form>
        </div>
        <div class="card">
            <div class="card-header">Manage</div>
            <form method="POST" action="/session/{sid}/chains/delete" class="p-4 d-flex gap-3">
                <input type="text" name="ids" class="form-control" placeholder="Chain IDs to delete, e.g. A, B">
                <button type="submit" class="btn btn-outline">Delete</button>
            </form>
            <form method="POST" action="/session/{sid}/chains/clear" class="p-4">
                <button type="submit" class="btn btn-danger">Clear all chains</button>
            </form>
            <form method="POST" action="/session/{sid}/preset" class="p-4 d-flex gap-3">
                <select name="preset" class="form-control">{preset_options}</select>
                <button type="submit" class="btn btn-outline">Load example</button>
            </form>
        </div>
    </div>

    <div class="card mb-4">
        <div class="card-header">Run prediction</div>
        <form method="POST" action="/session/{sid}/run" class="p-4" id="run-form">
            <div class="grid-3">
                <label><input type="checkbox" name="use_msa_server" value="on" {msa}> Use MSA server</label>
                <label><input type="checkbox" name="use_potentials" value="on" {potentials}> Use inference potentials</label>
                <label><input type="checkbox" name="predict_affinity" value="on" id="predict-affinity"> Predict affinity</label>
            </div>
            <div class="grid-3">
                <label>Recycling steps <input type="number" name="recycling_steps" class="form-control" min="1" max="10" value="{recycling}"></label>
                <label>Diffusion samples <input type="number" name="diffusion_samples" class="form-control" min="1" max="10" value="{diffusion}"></label>
                <label>GPUs <input type="number" name="gpu_count" class="form-control" min="1" max="{gpus}" value="{gpu_default}"></label>
            </div>
            <label>Affinity binder <select name="binder" class="form-control" id="binder-select">{binder_options}</select></label>
            <div class="d-flex gap-3">
                <button type="submit" class="btn btn-primary">Run prediction</button>
                <a class="btn btn-outline" id="preview-link" href="/session/{sid}/job.yaml" target="_blank">Preview job YAML</a>
            </div>
        </form>
    </div>

    <div class="card">
        <div class="card-header">Runs</div>
        <ul class="run-list p-4">{run_rows}</ul>
    </div>"#,
        started = session.created_at.format("%Y-%m-%d %H:%M UTC"),
        count = chains.len(),
        banner = render_banner(banner),
        chain_rows = chain_rows,
        sid = session_id,
        type_options = type_options,
        preset_options = preset_options,
        msa = checked(defaults.use_msa_server),
        potentials = checked(defaults.use_potentials),
        recycling = defaults.recycling_steps,
        diffusion = defaults.diffusion_samples,
        gpus = gpu_count,
        gpu_default = defaults.gpu_count.min(gpu_count).max(1),
        binder_options = binder_options,
        run_rows = run_rows,
    );

    page("Sequence configuration", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("A, B,,C "), vec!["A", "B", "C"]);
        assert!(parse_id_list(" , ").is_empty());
    }

    #[test]
    fn test_long_sequences_are_shortened() {
        let mut session = Session::new();
        session.chains = session
            .chains
            .add("A", MoleculeType::Protein, &"M".repeat(100))
            .unwrap();
        let html = render_editor_page(
            Uuid::nil(),
            &session,
            &[],
            &RunOptions::default(),
            1,
            None,
        );
        assert!(html.contains(&format!("{}…", "M".repeat(SEQUENCE_PREVIEW_CHARS))));
        assert!(html.contains(">100<"));
    }

    #[test]
    fn test_sequence_text_is_escaped() {
        let mut session = Session::new();
        session.chains = session
            .chains
            .add("X", MoleculeType::LigandSmiles, "C<O>N")
            .unwrap();
        let html = render_editor_page(Uuid::nil(), &session, &[], &RunOptions::default(), 1, None);
        assert!(html.contains("C&lt;O&gt;N"));
        assert!(!html.contains("C<O>N"));
    }
}
