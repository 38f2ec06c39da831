// --------------------------------------------------
// Handles API endpoints related to task CRUD operations
// and natural-language task entry.
//
// Responsibilities:
// - Create / read / update / delete tasks (through the board,
//   so writes are optimistic and rolled back on failure)
// - Advance task status (todo -> in-progress -> done -> todo)
// - Normalize free text into a draft, optionally creating it
// -------------------------------------------------

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{Task, TaskDraft, TaskPatch};
use crate::state::AppState;
use crate::temporal::now_fixed_offset;

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("invalid id"))
}

// -----------------------------
// GET /api/tasks
// Returns the user's tasks, newest first
// -----------------------------
pub async fn get_tasks(State(state): State<AppState>) -> Json<Vec<Task>> {
    let board = state.board.lock().await;
    Json(board.tasks().to_vec())
}

// -----------------------------
// POST /api/tasks
// Creates a new task from a draft
// -----------------------------
pub async fn create_task(
    State(state): State<AppState>,
    Json(draft): Json<TaskDraft>,
) -> Result<Json<Task>, ApiError> {
    if draft.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title required"));
    }

    let mut board = state.board.lock().await;
    let task = board.create(state.store.as_ref(), draft).await.into_result()?;
    Ok(Json(task))
}

// -----------------------------
// PUT /api/tasks/:id
// Applies a partial update to an existing task
// ----------------------------
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    let id = parse_id(&id)?;

    if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        return Err(ApiError::BadRequest("title required"));
    }

    let mut board = state.board.lock().await;
    let task = board.update(state.store.as_ref(), id, &patch).await.into_result()?;
    Ok(Json(task))
}

// -----------------------------
// DELETE /api/tasks/:id
// Removes a task permanently
// -----------------------------
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;

    let mut board = state.board.lock().await;
    board.delete(state.store.as_ref(), id).await.into_result()?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// -----------------------------
// POST /api/tasks/:id/toggle
// Advances task status along the fixed cycle
// -----------------------------
pub async fn toggle_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let id = parse_id(&id)?;

    let mut board = state.board.lock().await;
    let task = board.toggle_status(state.store.as_ref(), id).await.into_result()?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct TextInput {
    pub text: String,
}

// -----------------------------
// POST /api/tasks/parse
// Normalizes free text into a draft (nothing is saved)
// -----------------------------
pub async fn parse_task(
    State(state): State<AppState>,
    Json(input): Json<TextInput>,
) -> Result<Json<TaskDraft>, ApiError> {
    if input.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text required"));
    }
    let draft = state.normalizer.normalize(&input.text, now_fixed_offset()).await;
    Ok(Json(draft))
}

// -----------------------------
// POST /api/tasks/quick-add
// Normalizes free text and saves the result
// -----------------------------
pub async fn quick_add(
    State(state): State<AppState>,
    Json(input): Json<TextInput>,
) -> Result<Json<Task>, ApiError> {
    if input.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text required"));
    }
    let draft = state.normalizer.normalize(&input.text, now_fixed_offset()).await;

    let mut board = state.board.lock().await;
    let task = board.create(state.store.as_ref(), draft).await.into_result()?;
    Ok(Json(task))
}
