use axum::{
    body::Body,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use shared_models::error::AppError;
use shared_models::session::{Role, Session};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

// Builds the explicit Session from the headers set by the portal front end.
// Authentication happens upstream; this only carries identity and role.
pub async fn session_middleware(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let session = session_from_headers(request.headers())?;

    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

pub fn session_from_headers(headers: &HeaderMap) -> Result<Session, AppError> {
    let user_id = header_str(headers, USER_ID_HEADER)?;
    let role = header_str(headers, USER_ROLE_HEADER)?
        .parse::<Role>()
        .map_err(|e| AppError::Auth(e.to_string()))?;

    Ok(Session::new(user_id, role))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    let value = headers
        .get(name)
        .ok_or_else(|| AppError::Auth(format!("Missing {} header", name)))?
        .to_str()
        .map_err(|_| AppError::Auth(format!("Invalid {} header format", name)))?
        .trim();

    if value.is_empty() {
        return Err(AppError::Auth(format!("Empty {} header", name)));
    }

    Ok(value)
}

// Function to extract the session from request extensions
pub fn extract_session<B>(request: &Request<B>) -> Result<Session, AppError> {
    request
        .extensions()
        .get::<Session>()
        .cloned()
        .ok_or_else(|| AppError::Auth("Session not found in request extensions".to_string()))
}
