use super::{
    grants::GrantLookup, resource_catalog::ResourceCatalog, rpt_store::RptStore,
    scope_catalog::ScopeCatalog, ticket_store::PermissionTicketStore,
};
use crate::errors::UmaError;
use crate::models::{AuthorizationGrant, Expirable, Permission, ResourceSet, Rpt, UmaScopeType};
use chrono::Utc;
use log::{error, trace, warn};
use std::sync::Arc;

/// Gates every UMA call: bearer grants, ticket and RPT freshness, and the
/// consistency of permission registrations with the registered resources.
pub struct AuthorizationValidator {
    grants: Arc<dyn GrantLookup>,
    scopes: Arc<ScopeCatalog>,
    resources: Arc<ResourceCatalog>,
    tickets: Arc<PermissionTicketStore>,
    rpts: Arc<RptStore>,
    restrict_resource_to_associated_client: bool,
}

impl AuthorizationValidator {
    pub fn new(
        grants: Arc<dyn GrantLookup>,
        scopes: Arc<ScopeCatalog>,
        resources: Arc<ResourceCatalog>,
        tickets: Arc<PermissionTicketStore>,
        rpts: Arc<RptStore>,
        restrict_resource_to_associated_client: bool,
    ) -> Self {
        Self {
            grants,
            scopes,
            resources,
            tickets,
            rpts,
            restrict_resource_to_associated_client,
        }
    }

    /// Resolve the `Authorization` header to a live grant carrying `scope`
    pub async fn require_grant(
        &self,
        authorization: Option<&str>,
        scope: UmaScopeType,
    ) -> Result<AuthorizationGrant, UmaError> {
        trace!("Validate authorization for {} scope", scope);
        let Some(header) = authorization else {
            warn!("Missing Authorization header");
            return Err(UmaError::Unauthorized(
                "Missing Authorization header".to_string(),
            ));
        };
        let token = match header.get(..7) {
            Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => header[7..].trim(),
            _ => {
                warn!("Invalid Authorization header format, missing 'Bearer ' prefix");
                return Err(UmaError::Unauthorized(
                    "Authorization header must carry a bearer token".to_string(),
                ));
            }
        };
        if token.is_empty() {
            warn!("Empty bearer token");
            return Err(UmaError::Unauthorized("Token is invalid".to_string()));
        }

        let Some(grant) = self.grants.lookup_grant(token).await else {
            warn!("Token is invalid");
            return Err(UmaError::Unauthorized("Token is invalid".to_string()));
        };
        if grant.is_expired_at(Utc::now()) {
            warn!("Token of client {} is expired", grant.client_id);
            return Err(UmaError::Unauthorized("Token is expired".to_string()));
        }
        if !grant.has_scope(scope) {
            warn!(
                "Token of client {} lacks the {} scope",
                grant.client_id, scope
            );
            return Err(UmaError::Forbidden(format!(
                "Token doesn't carry the {scope} scope"
            )));
        }
        Ok(grant)
    }

    /// Load the ticket and make sure it hasn't expired
    pub async fn require_valid_ticket(&self, ticket: Option<&str>) -> Result<Permission, UmaError> {
        let Some(ticket) = ticket.map(str::trim).filter(|ticket| !ticket.is_empty()) else {
            error!("Ticket is null or blank.");
            return Err(UmaError::InvalidTicket("Ticket is missing".to_string()));
        };
        let Some(mut permission) = self.tickets.get_by_ticket(ticket).await else {
            error!("Unable to find permission registered for given ticket");
            return Err(UmaError::InvalidTicket("Ticket is unknown".to_string()));
        };
        permission.check_expired(Utc::now());
        if !permission.is_valid() {
            error!("Permission is not valid.");
            return Err(UmaError::ExpiredTicket(
                "Permission is not valid.".to_string(),
            ));
        }
        Ok(permission)
    }

    /// Load the RPT and make sure it hasn't expired
    pub async fn require_valid_rpt(&self, code: &str) -> Result<Rpt, UmaError> {
        let Some(mut rpt) = self.rpts.get_by_code(code).await? else {
            error!("RPT is null");
            return Err(UmaError::NotAuthorizedPermission(
                "RPT is unknown".to_string(),
            ));
        };
        rpt.check_expired(Utc::now());
        if !rpt.is_valid() {
            error!("RPT is not valid. Expired: true");
            return Err(UmaError::NotAuthorizedPermission(
                "RPT is not valid".to_string(),
            ));
        }
        Ok(rpt)
    }

    /// The resource must exist exactly once and declare every requested scope
    pub async fn require_registered_resource_and_scopes(
        &self,
        resource_id: &str,
        scope_urls: &[String],
    ) -> Result<ResourceSet, UmaError> {
        if resource_id.trim().is_empty() {
            error!("Resource id is empty");
            return Err(UmaError::InvalidResourceSetId(
                "Resource id is empty".to_string(),
            ));
        }
        let mut found = self.resources.find_all_by_id(resource_id).await?;
        if found.len() != 1 {
            error!("Resource isn't registered or there are two resources with same Id");
            return Err(UmaError::InvalidResourceSetId(format!(
                "Resource {resource_id} isn't registered"
            )));
        }
        let resource = found.remove(0);

        if scope_urls.is_empty() {
            error!("There are no scopes requested");
            return Err(UmaError::InvalidResourceSetScope(
                "At least one scope must be requested".to_string(),
            ));
        }
        let registered = self.scopes.urls_for(&resource.scopes).await?;
        if let Some(unknown) = scope_urls.iter().find(|url| !registered.contains(url)) {
            error!("At least one of the scopes isn't registered");
            return Err(UmaError::InvalidResourceSetScope(format!(
                "Scope {unknown} isn't registered for resource {resource_id}"
            )));
        }
        Ok(resource)
    }

    /// With `restrict_resource_to_associated_client`, only the owning client may
    /// register permissions for a resource
    pub fn require_resource_client(
        &self,
        resource: &ResourceSet,
        grant: &AuthorizationGrant,
    ) -> Result<(), UmaError> {
        if self.restrict_resource_to_associated_client && resource.owning_client != grant.client_id {
            warn!(
                "Client {} isn't associated with resource {}",
                grant.client_id, resource.id
            );
            return Err(UmaError::Forbidden(
                "Resource is associated with another client".to_string(),
            ));
        }
        Ok(())
    }
}
