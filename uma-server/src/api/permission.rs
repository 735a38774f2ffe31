use crate::api::authorization;
use crate::errors::UmaError;
use crate::openapi::PERMISSION_TAG;
use crate::state::AppState;
use axum::{
    extract::{Json, Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use http::{header::HOST, HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Permission requested by a resource server on behalf of a client
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub(crate) struct PermissionRequest {
    #[serde(alias = "resource_set_id")]
    pub resource_id: String,
    /// Scope URLs, a subset of the resource set's scopes
    #[serde(alias = "resource_scopes", default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub(crate) struct TicketResponse {
    pub ticket: String,
}

#[utoipa::path(
    post,
    path = "/uma/permission",
    tag = PERMISSION_TAG,
    request_body = PermissionRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer PAT"),
    ),
    responses(
        (status = 201, description = "Permission registered", body = TicketResponse),
        (status = 400, description = "Unknown resource set or scope"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Token lacks the protection scope or resource belongs to another client")
    )
)]
pub(crate) async fn register_permission_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PermissionRequest>,
) -> Result<Response, UmaError> {
    let issuing_host = headers
        .get(HOST)
        .and_then(|host| host.to_str().ok())
        .unwrap_or_default();
    let permission = state
        .uma
        .register_permission(
            authorization(&headers),
            &request.resource_id,
            &request.scopes,
            issuing_host,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(TicketResponse {
            ticket: permission.ticket,
        }),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/uma/permission/{configuration_code}",
    tag = PERMISSION_TAG,
    params(
        ("configuration_code" = String, Path, description = "Configuration code handed out during claims gathering"),
        ("Authorization" = String, Header, description = "Bearer AAT"),
    ),
    responses(
        (status = 200, description = "Ticket behind the configuration code", body = TicketResponse),
        (status = 404, description = "Unknown or expired configuration code")
    )
)]
pub(crate) async fn ticket_by_configuration_code_handler(
    State(state): State<AppState>,
    Path(configuration_code): Path<String>,
    headers: HeaderMap,
) -> Result<Response, UmaError> {
    let ticket = state
        .uma
        .ticket_for_configuration_code(authorization(&headers), &configuration_code)
        .await?;
    Ok(Json(TicketResponse { ticket }).into_response())
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/uma/permission", post(register_permission_handler))
        .route(
            "/uma/permission/{configuration_code}",
            get(ticket_by_configuration_code_handler),
        )
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestFixture;
    use http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_permission_returns_ticket() {
        let fixture = TestFixture::new().await;
        let pat = fixture.protection_token("rs-client").await;
        let resource = fixture.register_resource(&pat, &["view", "edit"]).await;

        let response = fixture
            .post(
                "/uma/permission",
                &json!({ "resource_set_id": resource, "scopes": [fixture.scope_url("view")] }),
                Some(&pat),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        let ticket = response.json["ticket"].as_str().unwrap();

        let permission = fixture.state.uma.tickets.get_by_ticket(ticket).await.unwrap();
        assert_eq!(permission.resource_id, resource);
        assert_eq!(permission.am_host, "as.example.com");
    }

    #[tokio::test]
    async fn test_register_permission_validates_resource_and_scopes() {
        let fixture = TestFixture::new().await;
        let pat = fixture.protection_token("rs-client").await;
        let resource = fixture.register_resource(&pat, &["view"]).await;

        let out_of_set = fixture
            .post(
                "/uma/permission",
                &json!({ "resource_id": resource, "scopes": [fixture.scope_url("edit")] }),
                Some(&pat),
            )
            .await;
        out_of_set.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(out_of_set.json["error"], "invalid_resource_set_scope");

        let unknown = fixture
            .post(
                "/uma/permission",
                &json!({ "resource_id": "missing", "scopes": [fixture.scope_url("view")] }),
                Some(&pat),
            )
            .await;
        unknown.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(unknown.json["error"], "invalid_resource_set_id");
    }

    #[tokio::test]
    async fn test_configuration_code_resolves_to_ticket() {
        let fixture = TestFixture::new().await;
        let pat = fixture.protection_token("rs-client").await;
        let resource = fixture.register_resource(&pat, &["view"]).await;
        let ticket = fixture.register_permission(&pat, &resource, &["view"]).await;
        let code = fixture
            .state
            .uma
            .tickets
            .get_by_ticket(&ticket)
            .await
            .unwrap()
            .configuration_code;
        let aat = fixture.authorization_token("client", "alice").await;

        let response = fixture
            .get_with_token(&format!("/uma/permission/{code}"), &aat)
            .await;
        response.assert_ok();
        assert_eq!(response.json["ticket"], ticket.as_str());

        fixture
            .get_with_token("/uma/permission/unknown.0", &aat)
            .await
            .assert_status(StatusCode::NOT_FOUND);
        fixture
            .get_with_token(&format!("/uma/permission/{code}"), &pat)
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}
