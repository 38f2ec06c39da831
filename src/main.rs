// Define data modules
mod models;      // Data structures (Task, TaskDraft, TaskPatch, Db)
mod temporal;    // Local date-times and date-component resolution
mod extraction;  // Structured extraction over the Gemini API
mod normalizer;  // Free text -> TaskDraft, with fallback
mod query;       // Filter / sort / group over task lists
mod store;       // Persistent storage (db.json) and change feed
mod board;       // In-memory task list with optimistic writes
mod dashboard;   // Dashboard stats and calendar views
mod config;      // Environment configuration
mod error;       // Error types and HTTP mapping
mod state;       // Shared handler state
mod routes_tasks;   // HTTP handlers for task APIs
mod routes_query;   // HTTP handlers for query / dashboard / calendar APIs

use std::sync::Arc;

use anyhow::{Context, Result};
// Import axum routing utilities and Router
use axum::{
    Router,
    routing::{get, post, put},
};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use crate::board::{TaskBoard, follow_changes};
use crate::config::AppConfig;
use crate::extraction::GeminiExtractor;
use crate::normalizer::Normalizer;
use crate::state::AppState;
use crate::store::{JsonFileStore, TaskStore};

fn install_tracing() {
    // RUST_LOG overrides; INFO by default.
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .compact()
        .try_init();
}

fn router(state: AppState) -> Router {
    let api = Router::new()
        // tasks
        .route("/tasks", get(routes_tasks::get_tasks).post(routes_tasks::create_task))
        .route("/tasks/parse", post(routes_tasks::parse_task))
        .route("/tasks/quick-add", post(routes_tasks::quick_add))
        .route("/tasks/:id", put(routes_tasks::update_task).delete(routes_tasks::delete_task))
        .route("/tasks/:id/toggle", post(routes_tasks::toggle_task))
        // views
        .route("/query", post(routes_query::query_tasks))
        .route("/dashboard", get(routes_query::get_dashboard))
        .route("/calendar", get(routes_query::get_calendar_day))
        .route("/summary", get(routes_query::get_summary));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    install_tracing();

    let config = AppConfig::from_env()?;

    let store = Arc::new(JsonFileStore::new(config.db_path.clone()));
    // Subscribe before the first load so no change slips between the two.
    let feed = store.subscribe(&config.user_id);

    let mut board = TaskBoard::new(config.user_id.clone());
    board
        .refresh(store.as_ref())
        .await
        .with_context(|| format!("failed to load {}", store.path().display()))?;
    info!(tasks = board.tasks().len(), user = %board.user_id(), "task board loaded");
    let board = Arc::new(Mutex::new(board));

    tokio::spawn(follow_changes(Arc::clone(&board), Arc::clone(&store), feed));

    if config.gemini.api_key.is_none() {
        info!("GEMINI_API_KEY not set; free-text entry will use the raw text as the title");
    }
    let normalizer = Arc::new(Normalizer::new(GeminiExtractor::new(config.gemini.clone())));

    let app = router(AppState {
        store,
        board,
        normalizer,
    });

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    info!("server running at http://{}", config.addr);
    info!("API base: http://{}/api", config.addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
