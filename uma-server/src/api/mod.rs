pub(crate) mod health;
pub(crate) mod permission;
pub(crate) mod resource_set;
pub(crate) mod rpt;
pub(crate) mod scopes;

use crate::state::AppState;
use axum::Router;
use http::{header::AUTHORIZATION, HeaderMap};

/// Combines all API routes into a single router
pub(super) fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(scopes::router())
        .merge(uma_routes())
}

/// Routes gated by a bearer grant, checked per handler since the required
/// scope differs between resource server and client calls
fn uma_routes() -> Router<AppState> {
    Router::new()
        .merge(resource_set::router())
        .merge(permission::router())
        .merge(rpt::router())
}

/// Raw `Authorization` header, if present and readable
pub(crate) fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}
