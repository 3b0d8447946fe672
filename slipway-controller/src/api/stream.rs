//! Streaming API Handlers
//!
//! Server-sent event streams for one execution and for cluster-wide
//! rollout activity. A stream that hits an error sends an `error` event and
//! closes.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
};
use serde::Serialize;
use slipway_core::domain::execution::{ExecutionStatus, StageStatus};
use slipway_core::dto::execution::LogChunk;
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, Duration};
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::execution::find;
use crate::state::AppState;

const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(500);
const CLUSTER_EVENT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Cluster event uids remembered for de-duplication
const MAX_SEEN_EVENTS: usize = 1024;

type EventSender = mpsc::Sender<Result<Event, Infallible>>;

/// Payload of a streamed `status` event
#[derive(Debug, PartialEq, Serialize)]
struct StatusSnapshot {
    status: ExecutionStatus,
    stages: Vec<(String, StageStatus)>,
}

#[derive(Serialize)]
struct StreamError {
    error: String,
}

/// Sends one named JSON event; `false` once the client is gone
async fn send_json<T: Serialize>(tx: &EventSender, name: &str, payload: &T) -> bool {
    let event = match serde_json::to_string(payload) {
        Ok(json) => Event::default().event(name).data(json),
        Err(e) => {
            tracing::error!("Failed to serialize {} event: {}", name, e);
            return true;
        }
    };
    tx.send(Ok(event)).await.is_ok()
}

async fn send_error(tx: &EventSender, message: impl Into<String>) {
    let _ = send_json(
        tx,
        "error",
        &StreamError {
            error: message.into(),
        },
    )
    .await;
}

/// GET /executions/{id}/stream
///
/// Events: `status` whenever the execution or a stage changes state, `log`
/// with new entries of a stage, and a final `complete` carrying the
/// finished execution.
pub async fn stream_execution(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Sse<KeepAliveStream<ReceiverStream<Result<Event, Infallible>>>>> {
    // Unknown executions fail with 404 before the stream opens
    find(&state, id).await?;

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(follow_execution(state, id, tx));

    tracing::debug!("Execution stream opened for {}", id);
    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

async fn follow_execution(state: AppState, id: Uuid, tx: EventSender) {
    let mut offsets: HashMap<Uuid, usize> = HashMap::new();
    let mut last_snapshot: Option<StatusSnapshot> = None;
    let mut ticker = time::interval(STREAM_POLL_INTERVAL);

    loop {
        ticker.tick().await;

        let execution = match state.executions.find_by_id(id).await {
            Ok(Some(execution)) => execution,
            Ok(None) => {
                send_error(&tx, format!("execution {} no longer exists", id)).await;
                break;
            }
            Err(e) => {
                send_error(&tx, e.to_string()).await;
                break;
            }
        };

        let snapshot = StatusSnapshot {
            status: execution.status,
            stages: execution
                .stages
                .iter()
                .map(|s| (s.name.clone(), s.status))
                .collect(),
        };
        if last_snapshot.as_ref() != Some(&snapshot) {
            if !send_json(&tx, "status", &snapshot).await {
                break;
            }
            last_snapshot = Some(snapshot);
        }

        for stage in &execution.stages {
            let offset = offsets.entry(stage.log_id).or_insert(0);
            let (entries, next_offset) = state.logs.read_from(stage.log_id, *offset).await;
            if entries.is_empty() {
                continue;
            }
            *offset = next_offset;

            let chunk = LogChunk {
                stage: stage.name.clone(),
                entries,
                next_offset,
            };
            if !send_json(&tx, "log", &chunk).await {
                tracing::debug!("Execution stream for {} closed by client", id);
                return;
            }
        }

        if execution.is_finished() {
            let _ = send_json(&tx, "complete", &execution).await;
            break;
        }
    }

    tracing::debug!("Execution stream for {} finished", id);
}

/// GET /stream
///
/// Named events: `deployments`, `rollout-progress` and `health-checks` from
/// the controller, `events` from the watched namespace of the cluster.
pub async fn stream_cluster(
    State(state): State<AppState>,
) -> Sse<KeepAliveStream<ReceiverStream<Result<Event, Infallible>>>> {
    let (tx, rx) = mpsc::channel(64);
    let events = state.events.subscribe();
    tokio::spawn(follow_cluster(state, events, tx));

    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

async fn follow_cluster(
    state: AppState,
    mut events: broadcast::Receiver<slipway_core::domain::event::ControllerEvent>,
    tx: EventSender,
) {
    let namespace = state.config.watch_namespace.clone();
    let mut seen: HashSet<String> = HashSet::new();
    let mut ticker = time::interval(CLUSTER_EVENT_POLL_INTERVAL);

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    let Some(name) = event.cluster_stream_name() else {
                        continue;
                    };
                    if !send_json(&tx, name, &event).await {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Cluster stream lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = ticker.tick() => {
                let cluster_events = match state.cluster.list_events(&namespace).await {
                    Ok(events) => events,
                    Err(e) => {
                        send_error(&tx, format!("failed to list cluster events: {}", e)).await;
                        break;
                    }
                };

                if seen.len() > MAX_SEEN_EVENTS {
                    seen.clear();
                }
                for event in cluster_events {
                    if !seen.insert(event.uid.clone()) {
                        continue;
                    }
                    if !send_json(&tx, "events", &event).await {
                        return;
                    }
                }
            }
        }
    }

    tracing::debug!("Cluster stream closed");
}
