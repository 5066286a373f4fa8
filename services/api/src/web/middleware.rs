//! services/api/src/web/middleware.rs
//!
//! Identity middleware. Guests are allowed through; signed-in users are tagged.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use lingo_core::ports::{AccountStore, PortError};
use std::sync::Arc;
use tracing::{debug, error};

use crate::web::state::{AppState, Identity};

pub const SESSION_COOKIE: &str = "session";

/// Reads the auth session id from the `Cookie` header.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then_some(value)
        })
}

/// Middleware that validates the auth session cookie, if any, and inserts an
/// [`Identity`] into the request extensions for handlers to use.
pub async fn identify(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let identity = match session_cookie(req.headers()) {
        Some(auth_session_id) => match state.db.validate_auth_session(auth_session_id).await {
            Ok(user_id) => Identity::Account(user_id),
            Err(PortError::Unauthorized) => {
                debug!("Expired or unknown auth session; continuing as guest.");
                Identity::Guest
            }
            Err(e) => {
                error!("Failed to validate auth session: {:?}", e);
                Identity::Guest
            }
        },
        None => Identity::Guest,
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}
