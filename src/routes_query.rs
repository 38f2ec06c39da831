use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dashboard;
use crate::models::TaskStatus;
use crate::query::{self, FilterSpec};
use crate::state::AppState;
use crate::temporal::now_fixed_offset;

// POST /api/query
// Body is a `FilterSpec`; every field is optional.
pub async fn query_tasks(State(state): State<AppState>, Json(filters): Json<FilterSpec>) -> Response {
    let now = now_fixed_offset().naive_local();
    let board = state.board.lock().await;
    let result = query::evaluate(board.tasks(), &filters, now);
    Json(result).into_response()
}

// GET /api/dashboard
pub async fn get_dashboard(State(state): State<AppState>) -> Response {
    let now = now_fixed_offset().naive_local();
    let board = state.board.lock().await;
    Json(dashboard::summarize(board.tasks(), now)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub date: String, // "YYYY-MM-DD"
}

// GET /api/calendar?date=YYYY-MM-DD
pub async fn get_calendar_day(State(state): State<AppState>, Query(q): Query<CalendarQuery>) -> Response {
    let date = match NaiveDate::parse_from_str(&q.date, "%Y-%m-%d") {
        Ok(d) => d,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid date").into_response(),
    };

    let board = state.board.lock().await;
    Json(dashboard::tasks_on(board.tasks(), date)).into_response()
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub completed: usize,
    pub pending: usize,
    pub message: String,
}

// GET /api/summary
// Short motivational line; falls back to a fixed message when unavailable.
pub async fn get_summary(State(state): State<AppState>) -> Json<SummaryResponse> {
    let (completed, pending) = {
        let board = state.board.lock().await;
        let done = board.tasks().iter().filter(|t| t.status == TaskStatus::Done).count();
        (done, board.tasks().len() - done)
    };

    let message = state.normalizer.daily_summary(completed, pending).await;
    Json(SummaryResponse {
        completed,
        pending,
        message,
    })
}
