use crate::errors::UmaError;
use crate::models::{ScopeDescription, ScopeKind};
use crate::openapi::SCOPES_TAG;
use crate::state::AppState;
use axum::{
    extract::{Json, Path, State},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Scope description as published to resource servers and clients
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub(crate) struct ScopeView {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_uri: Option<String>,
    pub kind: ScopeKind,
    pub url: String,
}

impl ScopeView {
    fn new(scope: ScopeDescription, base_endpoint: &str) -> Self {
        Self {
            url: scope.url(base_endpoint),
            id: scope.id,
            name: scope.display_name,
            icon_uri: scope.icon_uri,
            kind: scope.kind,
        }
    }
}

#[utoipa::path(
    get,
    path = "/uma/scopes",
    tag = SCOPES_TAG,
    responses(
        (status = 200, description = "All registered scopes", body = Vec<ScopeView>)
    )
)]
pub(crate) async fn list_scopes_handler(State(state): State<AppState>) -> Result<Response, UmaError> {
    let catalog = &state.uma.scopes;
    let scopes: Vec<ScopeView> = catalog
        .all()
        .await?
        .into_iter()
        .map(|scope| ScopeView::new(scope, catalog.base_endpoint()))
        .collect();
    Ok(Json(scopes).into_response())
}

#[utoipa::path(
    get,
    path = "/uma/scopes/{id}",
    tag = SCOPES_TAG,
    params(
        ("id" = String, Path, description = "Scope id"),
    ),
    responses(
        (status = 200, description = "Scope description", body = ScopeView),
        (status = 404, description = "Unknown scope")
    )
)]
pub(crate) async fn get_scope_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, UmaError> {
    let catalog = &state.uma.scopes;
    let scope = catalog.get_by_id(&id).await?;
    Ok(Json(ScopeView::new(scope, catalog.base_endpoint())).into_response())
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/uma/scopes", get(list_scopes_handler))
        .route("/uma/scopes/{id}", get(get_scope_handler))
}

#[cfg(test)]
mod tests {
    use super::ScopeView;
    use crate::models::ScopeKind;
    use crate::test_utils::TestFixture;
    use http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_scopes() {
        let fixture = TestFixture::new().await;
        let response = fixture.get("/uma/scopes").await;
        response.assert_ok();

        let scopes = response.json_as::<Vec<ScopeView>>();
        let ids: Vec<&str> = scopes.iter().map(|scope| scope.id.as_str()).collect();
        assert_eq!(ids, vec!["delete", "edit", "print", "view"]);
        assert_eq!(scopes[2].kind, ScopeKind::External);
    }

    #[tokio::test]
    async fn test_get_scope_by_id() {
        let fixture = TestFixture::new().await;

        let view = fixture.get("/uma/scopes/view").await;
        view.assert_ok();
        assert_eq!(
            view.json,
            json!({
                "id": "view",
                "name": "View",
                "kind": "internal",
                "url": "https://as.example.com/scopes/view",
            })
        );

        let print = fixture.get("/uma/scopes/print").await;
        assert_eq!(print.json["kind"], "external");
        assert_eq!(print.json["url"], "https://rs.example.com/scopes/print");

        let missing = fixture.get("/uma/scopes/missing").await;
        missing.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(missing.json["error"], "not_found");
    }
}
