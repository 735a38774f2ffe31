use super::{
    grants::{self, GrantLookup},
    resource_catalog::{ResourceCatalog, ResourceRegistration},
    rpt_store::RptStore,
    scope_catalog::ScopeCatalog,
    ticket_store::PermissionTicketStore,
    validator::AuthorizationValidator,
};
use crate::config::UmaConfig;
use crate::errors::UmaError;
use crate::models::{Expirable, Permission, ResourceSet, Rpt, UmaScopeType};
use crate::store::Store;
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use utoipa::ToSchema;

/// Body of an RPT request
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RptRequest {
    /// RPT to extend instead of the one bound to the bearer grant
    #[serde(default)]
    pub rpt: Option<String>,
    /// Permission ticket to redeem
    #[serde(default)]
    pub ticket: Option<String>,
    /// Claims gathered for the requesting party
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub claims: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Introspection result for an RPT
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct RptStatus {
    pub active: bool,
    /// Expiry as seconds since the epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issue time as seconds since the epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<GrantedPermission>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// The requesting party
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl RptStatus {
    fn inactive() -> Self {
        Self {
            active: false,
            exp: None,
            iat: None,
            permissions: None,
            client_id: None,
            sub: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct GrantedPermission {
    pub resource_id: String,
    /// Scope URLs
    pub scopes: Vec<String>,
    pub exp: i64,
}

/// Entries removed by one cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tickets: usize,
    pub rpts: usize,
    pub grants: usize,
}

/// The UMA endpoints' behavior, independent of HTTP
pub struct UmaService {
    store: Arc<Store>,
    pub scopes: Arc<ScopeCatalog>,
    pub resources: Arc<ResourceCatalog>,
    pub tickets: Arc<PermissionTicketStore>,
    pub rpts: Arc<RptStore>,
    pub validator: AuthorizationValidator,
    am_host: String,
    ticket_lifetime: Duration,
    claims_required_scopes: HashSet<String>,
}

impl UmaService {
    pub fn new(config: &UmaConfig, store: Arc<Store>, grants: Arc<dyn GrantLookup>) -> Self {
        let am_host = url::Url::parse(&config.issuer)
            .ok()
            .and_then(|issuer| issuer.host_str().map(str::to_string))
            .unwrap_or_else(|| config.issuer.clone());

        let scopes = Arc::new(ScopeCatalog::new(store.clone(), config));
        let resources = Arc::new(ResourceCatalog::new(store.clone(), scopes.clone()));
        let tickets = Arc::new(PermissionTicketStore::new(store.clone(), scopes.clone()));
        let rpts = Arc::new(RptStore::new(store.clone(), tickets.clone(), &am_host));
        let validator = AuthorizationValidator::new(
            grants,
            scopes.clone(),
            resources.clone(),
            tickets.clone(),
            rpts.clone(),
            config.restrict_resource_to_associated_client,
        );

        Self {
            store,
            scopes,
            resources,
            tickets,
            rpts,
            validator,
            am_host,
            ticket_lifetime: config.ticket_lifetime(),
            claims_required_scopes: config.claims_required_scopes.iter().cloned().collect(),
        }
    }

    pub async fn register_resource(
        &self,
        authorization: Option<&str>,
        registration: ResourceRegistration,
    ) -> Result<ResourceSet, UmaError> {
        let grant = self
            .validator
            .require_grant(authorization, UmaScopeType::Protection)
            .await?;
        self.resources.register(&grant.client_id, registration).await
    }

    pub async fn list_resources(&self, authorization: Option<&str>) -> Result<Vec<String>, UmaError> {
        let grant = self
            .validator
            .require_grant(authorization, UmaScopeType::Protection)
            .await?;
        self.resources.list_by_owner(&grant.client_id).await
    }

    pub async fn get_resource(
        &self,
        authorization: Option<&str>,
        id: &str,
    ) -> Result<ResourceSet, UmaError> {
        let grant = self
            .validator
            .require_grant(authorization, UmaScopeType::Protection)
            .await?;
        self.resources.get_owned(&grant.client_id, id).await
    }

    pub async fn update_resource(
        &self,
        authorization: Option<&str>,
        id: &str,
        registration: ResourceRegistration,
    ) -> Result<ResourceSet, UmaError> {
        let grant = self
            .validator
            .require_grant(authorization, UmaScopeType::Protection)
            .await?;
        self.resources
            .update(&grant.client_id, id, registration)
            .await
    }

    pub async fn delete_resource(&self, authorization: Option<&str>, id: &str) -> Result<(), UmaError> {
        let grant = self
            .validator
            .require_grant(authorization, UmaScopeType::Protection)
            .await?;
        self.resources.remove(&grant.client_id, id).await
    }

    /// Register a permission for a subset of a resource's scopes and mint its ticket
    pub async fn register_permission(
        &self,
        authorization: Option<&str>,
        resource_id: &str,
        scope_urls: &[String],
        issuing_host: &str,
    ) -> Result<Permission, UmaError> {
        let grant = self
            .validator
            .require_grant(authorization, UmaScopeType::Protection)
            .await?;
        let resource = self
            .validator
            .require_registered_resource_and_scopes(resource_id, scope_urls)
            .await?;
        self.validator.require_resource_client(&resource, &grant)?;

        self.tickets
            .issue(
                &resource.id,
                scope_urls,
                &self.am_host,
                issuing_host,
                self.ticket_lifetime,
            )
            .await
    }

    /// Resolve a configuration code polled during claims gathering to its ticket
    pub async fn ticket_for_configuration_code(
        &self,
        authorization: Option<&str>,
        configuration_code: &str,
    ) -> Result<String, UmaError> {
        self.validator
            .require_grant(authorization, UmaScopeType::Authorization)
            .await?;
        self.tickets
            .get_ticket_by_configuration_code(configuration_code)
            .await
            .ok_or_else(|| {
                UmaError::NotFound("Configuration code is unknown or expired".to_string())
            })
    }

    /// Redeem a ticket, folding its permission into a new or existing RPT
    pub async fn request_rpt(
        &self,
        authorization: Option<&str>,
        request: RptRequest,
    ) -> Result<Rpt, UmaError> {
        let grant = self
            .validator
            .require_grant(authorization, UmaScopeType::Authorization)
            .await?;
        let permission = self
            .validator
            .require_valid_ticket(request.ticket.as_deref())
            .await?;

        if !self.claims_required_scopes.is_empty() {
            let has_claims = request.claims.as_ref().is_some_and(|claims| !claims.is_empty());
            let urls = self.scopes.urls_for(&permission.scopes).await?;
            if !has_claims && urls.iter().any(|url| self.claims_required_scopes.contains(url)) {
                warn!(
                    "Claims are required to grant permission for resource {}",
                    permission.resource_id
                );
                return Err(UmaError::NeedClaims {
                    ticket: permission.ticket,
                });
            }
        }

        let rpt = match request.rpt.as_deref().map(str::trim).filter(|rpt| !rpt.is_empty()) {
            Some(code) => {
                let rpt = self.validator.require_valid_rpt(code).await?;
                if rpt.client_id != grant.client_id {
                    warn!(
                        "Client {} tried to extend an RPT of client {}",
                        grant.client_id, rpt.client_id
                    );
                    return Err(UmaError::NotAuthorizedPermission(
                        "RPT was issued to another client".to_string(),
                    ));
                }
                rpt
            }
            None => self.rpts.create_or_reuse(&grant).await?,
        };

        self.rpts.attach_permission(&rpt, &permission).await
    }

    /// Introspect an RPT on behalf of a resource server. Unknown and expired
    /// tokens are reported inactive.
    pub async fn introspect(
        &self,
        authorization: Option<&str>,
        token: &str,
    ) -> Result<RptStatus, UmaError> {
        self.validator
            .require_grant(authorization, UmaScopeType::Protection)
            .await?;

        let Some(mut rpt) = self.rpts.get_by_code(token).await? else {
            debug!("Introspected RPT is unknown");
            return Ok(RptStatus::inactive());
        };
        rpt.check_expired(Utc::now());
        if !rpt.is_valid() {
            debug!("Introspected RPT is expired");
            return Ok(RptStatus::inactive());
        }

        let mut permissions = Vec::new();
        for permission in self.rpts.permissions_of(&rpt).await {
            permissions.push(GrantedPermission {
                scopes: self.scopes.urls_for(&permission.scopes).await?,
                resource_id: permission.resource_id,
                exp: permission.expires_at.timestamp(),
            });
        }

        Ok(RptStatus {
            active: true,
            exp: Some(rpt.expires_at.timestamp()),
            iat: Some(rpt.issued_at.timestamp()),
            permissions: Some(permissions),
            client_id: Some(rpt.client_id),
            sub: Some(rpt.user_id),
        })
    }

    /// Remove tickets, RPTs and grants that expired at or before `now`
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let report = SweepReport {
            tickets: self.tickets.sweep_expired(now).await,
            rpts: self.rpts.sweep_expired(now).await,
            grants: grants::sweep_expired_grants(&self.store, now).await,
        };
        if report != SweepReport::default() {
            info!(
                "Cleanup removed {} ticket, {} RPT and {} grant entries",
                report.tickets, report.rpts, report.grants
            );
        }
        report
    }
}
