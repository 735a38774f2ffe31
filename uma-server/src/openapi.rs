use crate::api;
use crate::models::ScopeKind;
use crate::uma::{GrantedPermission, RptRequest, RptStatus};
use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const RESOURCE_SET_TAG: &str = "Resource Set Registration API";
pub(crate) const PERMISSION_TAG: &str = "Permission Registration API";
pub(crate) const RPT_TAG: &str = "RPT API";
pub(crate) const SCOPES_TAG: &str = "Scopes API";

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health::health_check,
        api::resource_set::register_resource_handler,
        api::resource_set::list_resources_handler,
        api::resource_set::get_resource_handler,
        api::resource_set::update_resource_handler,
        api::resource_set::delete_resource_handler,
        api::permission::register_permission_handler,
        api::permission::ticket_by_configuration_code_handler,
        api::rpt::request_rpt_handler,
        api::rpt::rpt_status_handler,
        api::scopes::list_scopes_handler,
        api::scopes::get_scope_handler,
    ),
    components(schemas(
        api::health::Health,
        api::resource_set::ResourceSetRequest,
        api::resource_set::ResourceSetId,
        api::resource_set::ResourceSetDescription,
        api::permission::PermissionRequest,
        api::permission::TicketResponse,
        api::rpt::RptResponse,
        api::rpt::IntrospectionRequest,
        api::scopes::ScopeView,
        ScopeKind,
        RptRequest,
        RptStatus,
        GrantedPermission,
    )),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = RESOURCE_SET_TAG, description = "Resource set registration by resource servers"),
        (name = PERMISSION_TAG, description = "Permission ticket registration"),
        (name = RPT_TAG, description = "Requesting Party Token issuance and introspection"),
        (name = SCOPES_TAG, description = "Scope descriptions"),
    ),
    info(
        title = "UMA Authorization Server API",
        description = "User-Managed Access authorization server",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
