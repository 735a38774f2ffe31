use crate::api::authorization;
use crate::errors::UmaError;
use crate::openapi::RPT_TAG;
use crate::state::AppState;
use crate::uma::{RptRequest, RptStatus};
use axum::{
    extract::{Form, Json, State},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub(crate) struct RptResponse {
    pub rpt: String,
}

/// Form body of an introspection call
#[derive(Debug, Deserialize, ToSchema)]
pub(crate) struct IntrospectionRequest {
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/uma/rpt",
    tag = RPT_TAG,
    request_body = RptRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer AAT"),
    ),
    responses(
        (status = 200, description = "Ticket redeemed into the returned RPT", body = RptResponse),
        (status = 400, description = "Ticket is missing, unknown or expired"),
        (status = 403, description = "Claims are required or the RPT can't be extended")
    )
)]
pub(crate) async fn request_rpt_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RptRequest>,
) -> Result<Response, UmaError> {
    let rpt = state
        .uma
        .request_rpt(authorization(&headers), request)
        .await?;
    Ok(Json(RptResponse { rpt: rpt.code }).into_response())
}

#[utoipa::path(
    post,
    path = "/uma/rpt/status",
    tag = RPT_TAG,
    request_body(content = IntrospectionRequest, content_type = "application/x-www-form-urlencoded"),
    params(
        ("Authorization" = String, Header, description = "Bearer PAT"),
    ),
    responses(
        (status = 200, description = "Introspection result", body = RptStatus),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub(crate) async fn rpt_status_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(request): Form<IntrospectionRequest>,
) -> Result<Response, UmaError> {
    let status = state
        .uma
        .introspect(authorization(&headers), &request.token)
        .await?;
    Ok(Json(status).into_response())
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/uma/rpt", post(request_rpt_handler))
        .route("/uma/rpt/status", post(rpt_status_handler))
}
