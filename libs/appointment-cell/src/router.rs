// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_utils::extractor::session_middleware;

use crate::handlers;
use crate::services::board::AppointmentBoard;

pub fn appointment_routes(board: Arc<AppointmentBoard>) -> Router {
    // Every route acts on behalf of an explicit session
    let session_routes = Router::new()
        .route("/", get(handlers::list_appointments))
        .route("/refresh", post(handlers::refresh_appointments))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/transition", post(handlers::transition_appointment))
        .layer(middleware::from_fn(session_middleware));

    Router::new()
        .merge(session_routes)
        .with_state(board)
}
