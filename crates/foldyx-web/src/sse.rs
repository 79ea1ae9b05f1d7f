//! Server-Sent Events (SSE) streaming of run logs and status.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::error::{WebError, WebResult};
use crate::state::{AppEvent, SharedState};

fn to_sse(event: &AppEvent) -> Option<Event> {
    serde_json::to_string(event).ok().map(|data| Event::default().data(data))
}

/// GET /api/runs/{run_id}/events
///
/// Sends a snapshot of the log so far, then live `run_log` / `run_status`
/// events for this run. Lines already in the snapshot are not repeated.
pub async fn run_events(
    State(state): State<SharedState>,
    Path(run_id): Path<Uuid>,
) -> WebResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // subscribe before reading the record so no line falls in between
    let rx = state.subscribe();
    let run = state.run(run_id).await.ok_or(WebError::RunNotFound(run_id))?;
    let seen = run.log.len();

    let snapshot = AppEvent::RunSnapshot {
        run_id,
        state: run.state,
        log: run.log,
        message: run.message,
    };
    let initial = tokio_stream::iter(to_sse(&snapshot).map(Ok::<_, Infallible>));

    let live = BroadcastStream::new(rx).filter_map(move |result| {
        let event = result.ok()?;
        if event.run_id() != run_id {
            return None;
        }
        if let AppEvent::RunLog { seq, .. } = &event {
            if *seq < seen {
                return None;
            }
        }
        to_sse(&event).map(Ok::<_, Infallible>)
    });

    Ok(Sse::new(initial.chain(live)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}
