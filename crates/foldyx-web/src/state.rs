//! Shared application state for the web server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use foldyx_common::{RunOptions, RunState};
use foldyx_config::Config;
use foldyx_jobs::artifacts::CollectedResults;
use foldyx_jobs::editor::SequenceSet;
use foldyx_jobs::pipeline::PredictionPipeline;
use foldyx_jobs::runner::CancelToken;
use foldyx_jobs::workspace::RunDirectory;

/// Events pushed to connected clients via SSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    /// Full state of a run, sent once when a client subscribes
    RunSnapshot { run_id: Uuid, state: RunState, log: Vec<String>, message: Option<String> },
    /// One line of tool output; `seq` is its index in the run log
    RunLog { run_id: Uuid, seq: usize, line: String },
    /// Lifecycle change
    RunStatus { run_id: Uuid, state: RunState, message: Option<String> },
}

impl AppEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            AppEvent::RunSnapshot { run_id, .. }
            | AppEvent::RunLog { run_id, .. }
            | AppEvent::RunStatus { run_id, .. } => *run_id,
        }
    }
}

/// One browser editing session.
#[derive(Debug, Clone)]
pub struct Session {
    pub chains: SequenceSet,
    /// Runs launched from this session, newest last
    pub runs: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            chains: SequenceSet::new(),
            runs: Vec::new(),
            created_at: now,
            last_seen: now,
        }
    }

    fn idle_longer_than(&self, limit: Duration, now: DateTime<Utc>) -> bool {
        // a clock step backwards counts as fresh
        (now - self.last_seen).to_std().map(|idle| idle > limit).unwrap_or(false)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything known about one prediction run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub state: RunState,
    pub options: RunOptions,
    pub binder: Option<String>,
    /// Command line as launched
    pub command: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub log: Vec<String>,
    /// Terminal status text shown under the log
    pub message: Option<String>,
    pub exit_code: Option<i32>,
    pub results: Option<CollectedResults>,
    #[serde(skip)]
    pub dir: Option<RunDirectory>,
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

/// The few fields the editor lists for each run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub id: Uuid,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(id: Uuid, session_id: Uuid, options: RunOptions, binder: Option<String>) -> Self {
        Self {
            id,
            session_id,
            state: RunState::Idle,
            options,
            binder,
            command: None,
            created_at: Utc::now(),
            finished_at: None,
            log: Vec::new(),
            message: None,
            exit_code: None,
            results: None,
            dir: None,
            cancel: None,
        }
    }

    /// Apply a lifecycle transition; out-of-order transitions are logged and ignored.
    pub fn transition(&mut self, next: RunState) {
        match self.state.advance(next) {
            Ok(state) => {
                self.state = state;
                if state.is_terminal() {
                    self.finished_at = Some(Utc::now());
                    self.cancel = None;
                }
            }
            Err(e) => warn!("Run {}: {}", self.id, e),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub config: Config,
    pub pipeline: PredictionPipeline,
    /// Detected at startup; upper bound for the gpu option
    pub gpu_count: u32,
    /// Sessions idle for longer are dropped
    pub session_idle: Duration,
    pub sessions: RwLock<HashMap<Uuid, Session>>,
    pub runs: RwLock<HashMap<Uuid, RunRecord>>,
    /// Broadcast channel for SSE push events
    pub event_tx: broadcast::Sender<AppEvent>,
}

impl AppState {
    pub fn new(config: Config, gpu_count: u32) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        let pipeline = PredictionPipeline::from_config(&config);
        let session_idle = Duration::from_secs(config.server.session_idle_minutes.saturating_mul(60));
        Self {
            config,
            pipeline,
            gpu_count: gpu_count.max(1),
            session_idle,
            sessions: RwLock::new(HashMap::new()),
            runs: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.event_tx.subscribe()
    }

    /// Send to connected clients. Having no subscribers is fine.
    pub fn publish(&self, event: AppEvent) {
        let _ = self.event_tx.send(event);
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    pub async fn create_session(&self) -> Uuid {
        self.sweep_sessions(Utc::now()).await;
        let id = Uuid::new_v4();
        self.sessions.write().await.insert(id, Session::new());
        id
    }

    /// Copy of the session; counts as activity.
    pub async fn session(&self, id: Uuid) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id)?;
        session.last_seen = Utc::now();
        Some(session.clone())
    }

    /// Drop sessions idle longer than `session_idle` at `now`, together with
    /// their finished run records. Active runs are kept. Run directories on
    /// disk are left alone. Returns the number of sessions removed.
    pub async fn sweep_sessions(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<(Uuid, Vec<Uuid>)> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, s)| s.idle_longer_than(self.session_idle, now))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|s| (id, s.runs)))
                .collect()
        };
        if expired.is_empty() {
            return 0;
        }

        let mut runs = self.runs.write().await;
        for (_, run_ids) in &expired {
            for run_id in run_ids {
                if runs.get(run_id).is_some_and(|r| !r.is_active()) {
                    runs.remove(run_id);
                }
            }
        }
        info!("Dropped {} idle session(s)", expired.len());
        expired.len()
    }

    // ── Runs ──────────────────────────────────────────────────────────────────

    pub async fn insert_run(&self, record: RunRecord) {
        let (run_id, session_id) = (record.id, record.session_id);
        self.runs.write().await.insert(run_id, record);
        if let Some(session) = self.sessions.write().await.get_mut(&session_id) {
            session.runs.push(run_id);
        }
    }

    pub async fn run(&self, id: Uuid) -> Option<RunRecord> {
        self.runs.read().await.get(&id).cloned()
    }

    /// Summaries for `ids` in the given order; unknown ids are skipped.
    pub async fn run_summaries(&self, ids: &[Uuid]) -> Vec<RunSummary> {
        let runs = self.runs.read().await;
        ids.iter()
            .filter_map(|id| runs.get(id))
            .map(|r| RunSummary { id: r.id, state: r.state, created_at: r.created_at })
            .collect()
    }

    /// Mutate a run record in place; `None` if the run is unknown.
    pub async fn update_run<F, T>(&self, id: Uuid, f: F) -> Option<T>
    where
        F: FnOnce(&mut RunRecord) -> T,
    {
        self.runs.write().await.get_mut(&id).map(f)
    }

    /// Append a log line and forward it to subscribers.
    pub async fn append_log(&self, id: Uuid, line: String) {
        let seq = self
            .update_run(id, |run| {
                run.log.push(line.clone());
                run.log.len() - 1
            })
            .await;
        if let Some(seq) = seq {
            self.publish(AppEvent::RunLog { run_id: id, seq, line });
        }
    }

    pub async fn active_runs(&self) -> usize {
        self.runs.read().await.values().filter(|r| r.is_active()).count()
    }
}

pub type SharedState = Arc<AppState>;
