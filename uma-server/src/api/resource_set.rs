use crate::api::authorization;
use crate::errors::UmaError;
use crate::models::ResourceSet;
use crate::openapi::RESOURCE_SET_TAG;
use crate::state::AppState;
use crate::uma::ResourceRegistration;
use axum::{
    extract::{Json, Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Resource set description sent by the resource server
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub(crate) struct ResourceSetRequest {
    /// Human readable name of the resource set
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_uri: Option<String>,
    /// Scope URLs available on the resource set
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl From<ResourceSetRequest> for ResourceRegistration {
    fn from(request: ResourceSetRequest) -> Self {
        Self {
            name: request.name,
            uri: request.uri,
            icon_uri: request.icon_uri,
            scopes: request.scopes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub(crate) struct ResourceSetId {
    #[serde(rename = "_id")]
    pub id: String,
}

/// Stored resource set with its scopes rendered as URLs
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub(crate) struct ResourceSetDescription {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_uri: Option<String>,
    pub scopes: Vec<String>,
}

async fn describe(state: &AppState, resource: ResourceSet) -> Result<ResourceSetDescription, UmaError> {
    Ok(ResourceSetDescription {
        scopes: state.uma.scopes.urls_for(&resource.scopes).await?,
        id: resource.id,
        name: resource.name,
        uri: resource.uri,
        icon_uri: resource.icon_uri,
    })
}

#[utoipa::path(
    post,
    path = "/uma/resource_set",
    tag = RESOURCE_SET_TAG,
    request_body = ResourceSetRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer PAT"),
    ),
    responses(
        (status = 201, description = "Resource set registered", body = ResourceSetId),
        (status = 400, description = "Invalid resource set description"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Token lacks the protection scope")
    )
)]
pub(crate) async fn register_resource_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ResourceSetRequest>,
) -> Result<Response, UmaError> {
    let resource = state
        .uma
        .register_resource(authorization(&headers), request.into())
        .await?;
    Ok((StatusCode::CREATED, Json(ResourceSetId { id: resource.id })).into_response())
}

#[utoipa::path(
    get,
    path = "/uma/resource_set",
    tag = RESOURCE_SET_TAG,
    params(
        ("Authorization" = String, Header, description = "Bearer PAT"),
    ),
    responses(
        (status = 200, description = "Ids of the caller's resource sets", body = Vec<String>),
        (status = 401, description = "Missing or invalid token")
    )
)]
pub(crate) async fn list_resources_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, UmaError> {
    let ids = state.uma.list_resources(authorization(&headers)).await?;
    Ok(Json(ids).into_response())
}

#[utoipa::path(
    get,
    path = "/uma/resource_set/{id}",
    tag = RESOURCE_SET_TAG,
    params(
        ("id" = String, Path, description = "Resource set id"),
        ("Authorization" = String, Header, description = "Bearer PAT"),
    ),
    responses(
        (status = 200, description = "Resource set description", body = ResourceSetDescription),
        (status = 404, description = "Unknown resource set")
    )
)]
pub(crate) async fn get_resource_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, UmaError> {
    let resource = state.uma.get_resource(authorization(&headers), &id).await?;
    Ok(Json(describe(&state, resource).await?).into_response())
}

#[utoipa::path(
    put,
    path = "/uma/resource_set/{id}",
    tag = RESOURCE_SET_TAG,
    request_body = ResourceSetRequest,
    params(
        ("id" = String, Path, description = "Resource set id"),
        ("Authorization" = String, Header, description = "Bearer PAT"),
    ),
    responses(
        (status = 200, description = "Resource set updated", body = ResourceSetId),
        (status = 400, description = "Invalid resource set description"),
        (status = 404, description = "Unknown resource set")
    )
)]
pub(crate) async fn update_resource_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ResourceSetRequest>,
) -> Result<Response, UmaError> {
    let resource = state
        .uma
        .update_resource(authorization(&headers), &id, request.into())
        .await?;
    Ok(Json(ResourceSetId { id: resource.id }).into_response())
}

#[utoipa::path(
    delete,
    path = "/uma/resource_set/{id}",
    tag = RESOURCE_SET_TAG,
    params(
        ("id" = String, Path, description = "Resource set id"),
        ("Authorization" = String, Header, description = "Bearer PAT"),
    ),
    responses(
        (status = 204, description = "Resource set removed"),
        (status = 404, description = "Unknown resource set")
    )
)]
pub(crate) async fn delete_resource_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, UmaError> {
    state
        .uma
        .delete_resource(authorization(&headers), &id)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/uma/resource_set",
            post(register_resource_handler).get(list_resources_handler),
        )
        .route(
            "/uma/resource_set/{id}",
            get(get_resource_handler)
                .put(update_resource_handler)
                .delete(delete_resource_handler),
        )
}
