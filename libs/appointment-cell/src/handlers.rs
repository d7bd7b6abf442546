// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use shared_models::error::AppError;
use shared_models::session::Session;

use crate::models::{AppointmentFilter, AppointmentStatus, DateBucket, TransitionAction};
use crate::services::board::AppointmentBoard;

// ==============================================================================
// QUERY & BODY STRUCTS
// ==============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub query: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub bucket: Option<DateBucket>,
    /// Wait for pending reference fetches before answering.
    pub settle: Option<bool>,
}

impl AppointmentListQuery {
    fn to_filter(&self) -> AppointmentFilter {
        AppointmentFilter {
            query: self.query.clone(),
            status: self.status,
            date_bucket: self.bucket.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub action: TransitionAction,
}

// ==============================================================================
// HANDLERS
// ==============================================================================

pub async fn list_appointments(
    State(board): State<Arc<AppointmentBoard>>,
    Extension(session): Extension<Session>,
    Query(params): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    board.ensure_loaded().await;

    let criteria = params.to_filter();

    if params.settle.unwrap_or(false) {
        board.prefetch_references(&session);
        board.resolver().settle().await;
    }

    let rows = board.rows(&session, &criteria);
    debug!("Listing {} appointments for {} {}", rows.len(), session.role, session.user_id);

    Ok(Json(json!({
        "success": true,
        "count": rows.len(),
        "degraded": board.is_degraded(),
        "appointments": rows,
    })))
}

pub async fn get_appointment(
    State(board): State<Arc<AppointmentBoard>>,
    Extension(session): Extension<Session>,
    Path(appointment_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    board.ensure_loaded().await;

    let row = board
        .row(&appointment_id, &session)
        .ok_or_else(|| AppError::NotFound(format!("Appointment {} not found", appointment_id)))?;

    Ok(Json(json!({
        "success": true,
        "appointment": row,
    })))
}

pub async fn refresh_appointments(
    State(board): State<Arc<AppointmentBoard>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Value>, AppError> {
    debug!("Refresh requested by {} {}", session.role, session.user_id);
    let summary = board.load().await;

    Ok(Json(json!({
        "success": true,
        "summary": summary,
    })))
}

pub async fn transition_appointment(
    State(board): State<Arc<AppointmentBoard>>,
    Extension(session): Extension<Session>,
    Path(appointment_id): Path<String>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Value>, AppError> {
    board.ensure_loaded().await;

    let today = board.today();
    let appointment = board
        .transition(&appointment_id, request.action, &session, today)
        .await?;

    let legal_actions = board.machine().legal_actions(&appointment, session.role, today);

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "legalActions": legal_actions,
    })))
}
