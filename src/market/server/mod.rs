// SPDX-License-Identifier: MIT

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adk::error::Result;
use crate::market::config::{Provider, WorkflowConfig};
use crate::market::history::{self, DirectoryReportStore, ReportStore};
use crate::market::workflow::{ResearchGraph, StageEvent, WorkflowState};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    config: Arc<WorkflowConfig>,
    store: Arc<dyn ReportStore>,
}

impl AppState {
    pub fn new(config: WorkflowConfig, store: Arc<dyn ReportStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }
}

pub async fn serve(
    port: u16,
    config: WorkflowConfig,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let store = Arc::new(DirectoryReportStore::new(config.history_dir.clone()));
    let app = router(AppState::new(config, store));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/reports", post(create_report))
        .route("/api/reports/stream", post(stream_report))
        .route("/api/history", get(list_history))
        .route("/api/history/{id}", get(get_history))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub topic: String,
    #[serde(default)]
    pub provider: Option<Provider>,
    #[serde(default)]
    pub max_revisions: Option<u32>,
    /// Keep a copy in the report history (default: yes)
    #[serde(default)]
    pub save: Option<bool>,
}

impl ReportRequest {
    /// Server config with this request's overrides applied
    fn config(&self, base: &WorkflowConfig) -> WorkflowConfig {
        let mut config = base.clone();
        if let Some(provider) = self.provider {
            if provider != config.provider {
                // A configured model name belongs to the old provider
                config.model_name = None;
            }
            config.provider = provider;
        }
        if let Some(cap) = self.max_revisions {
            config.max_revisions = cap;
        }
        config
    }

    fn should_save(&self) -> bool {
        self.save.unwrap_or(true)
    }
}

/// Server-sent event payloads
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerEvent {
    Stage(StageEvent),
    Done {
        output_dir: PathBuf,
        report_id: Option<String>,
    },
    Error {
        message: String,
    },
}

fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}

/// Write `report.md` and optionally record the run in history
async fn finish_run(
    store: &dyn ReportStore,
    state: &WorkflowState,
    save: bool,
) -> Result<Option<String>> {
    history::write_run_report(state).await?;
    if save {
        Ok(Some(history::save_run(store, state).await?))
    } else {
        Ok(None)
    }
}

async fn create_report(
    State(app): State<AppState>,
    Json(payload): Json<ReportRequest>,
) -> (StatusCode, Json<Value>) {
    let graph = match ResearchGraph::from_config(&payload.config(&app.config)) {
        Ok(graph) => graph,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to build workflow: {}", e),
            )
        }
    };

    let state = match graph.run(&payload.topic).await {
        Ok(state) => state,
        Err(e) => {
            log::error!("Report generation failed: {}", e);
            let status = if payload.topic.trim().is_empty() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            return error_response(status, format!("Execution failed: {}", e));
        }
    };

    match finish_run(app.store.as_ref(), &state, payload.should_save()).await {
        Ok(report_id) => (
            StatusCode::OK,
            Json(json!({
                "status": "completed",
                "report_id": report_id,
                "output_dir": state.output_dir,
                "report": state.final_report,
                "charts": state.chart_files,
                "revision_count": state.revision_count,
            })),
        ),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to store report: {}", e),
        ),
    }
}

async fn stream_report(
    State(app): State<AppState>,
    Json(payload): Json<ReportRequest>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(100);

    tokio::spawn(async move {
        log::info!("Starting streaming report for topic: {}", payload.topic);

        let graph = match ResearchGraph::from_config(&payload.config(&app.config)) {
            Ok(graph) => graph,
            Err(e) => {
                log::error!("Failed to build workflow: {}", e);
                let _ = tx
                    .send(ServerEvent::Error {
                        message: format!("Build failed: {}", e),
                    })
                    .await;
                return;
            }
        };

        let mut events = Box::pin(graph.run_stream(&payload.topic));
        let mut last: Option<WorkflowState> = None;
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    last = Some(event.state.clone());
                    if tx.send(ServerEvent::Stage(event)).await.is_err() {
                        log::info!("Client disconnected, abandoning run");
                        return;
                    }
                }
                Err(e) => {
                    log::error!("Report execution failed: {}", e);
                    let _ = tx
                        .send(ServerEvent::Error {
                            message: format!("Execution Error: {}", e),
                        })
                        .await;
                    return;
                }
            }
        }

        let Some(state) = last else { return };
        let done = match finish_run(app.store.as_ref(), &state, payload.should_save()).await {
            Ok(report_id) => ServerEvent::Done {
                output_dir: state.output_dir.clone(),
                report_id,
            },
            Err(e) => ServerEvent::Error {
                message: format!("Failed to store report: {}", e),
            },
        };
        let _ = tx.send(done).await;
        log::info!("Streaming report finished");
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1)))
}

async fn list_history(State(app): State<AppState>) -> (StatusCode, Json<Value>) {
    match app.store.list().await {
        Ok(reports) => (StatusCode::OK, Json(json!(reports))),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn get_history(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match app.store.load(&id).await {
        Ok(Some(report)) => (
            StatusCode::OK,
            Json(json!({
                "metadata": report.metadata,
                "content": report.content,
                "chart_paths": report.chart_paths,
                "document_path": report.document_path,
            })),
        ),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Report not found"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
