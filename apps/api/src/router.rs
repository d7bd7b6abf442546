use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use appointment_cell::AppointmentBoard;

pub fn create_router(board: Arc<AppointmentBoard>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic portal API is running!" }))
        .nest("/appointments", appointment_routes(board))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use reference_cell::{EndpointCatalog, LastKnownGoodDirectory, LazyReferenceResolver};
    use serde_json::json;
    use shared_utils::test_utils::{MockClinicResponses, ScriptedBackend};
    use tower::ServiceExt;

    fn app() -> Router {
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond(
            "GET",
            "/appointments",
            json!([MockClinicResponses::appointment_record(101, "6", "12", "2025-07-01", "Scheduled")]),
        );
        let resolver = Arc::new(LazyReferenceResolver::new(
            backend,
            EndpointCatalog::default(),
            Arc::new(LastKnownGoodDirectory::new()),
        ));
        create_router(Arc::new(AppointmentBoard::new(resolver)))
    }

    #[tokio::test]
    async fn root_answers_without_a_session() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request builds"))
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn appointments_are_nested_and_session_gated() {
        let anonymous = app()
            .oneshot(Request::builder().uri("/appointments/101").body(Body::empty()).expect("request builds"))
            .await
            .expect("router responds");
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let patient = app()
            .oneshot(
                Request::builder()
                    .uri("/appointments/101")
                    .header("x-user-id", "6")
                    .header("x-user-role", "patient")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("router responds");
        assert_eq!(patient.status(), StatusCode::OK);
    }
}
