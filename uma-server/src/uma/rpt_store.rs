use super::{ticket_store::PermissionTicketStore, tokens};
use crate::errors::UmaError;
use crate::models::{AuthorizationGrant, Expirable, Permission, Rpt};
use crate::store::{EntryKey, EntryKind, EntryStore, Store};
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use std::sync::Arc;

const MAX_LINK_ATTEMPTS: usize = 3;

/// What the grant link currently points at
enum LinkedRpt {
    Active(Rpt),
    /// Code of a token that is gone, expired or not the grant's
    Stale(String),
    Missing,
}

/// Requesting Party Tokens, stored under the branch of the client they were
/// issued to. Each bearer grant is linked to the RPT minted under it
/// (`rpt_grant/<digest>` holding the code) so later redemptions extend it.
pub struct RptStore {
    store: Arc<Store>,
    tickets: Arc<PermissionTicketStore>,
    am_host: String,
}

impl RptStore {
    pub fn new(store: Arc<Store>, tickets: Arc<PermissionTicketStore>, am_host: &str) -> Self {
        Self {
            store,
            tickets,
            am_host: am_host.to_string(),
        }
    }

    /// Returns the active RPT minted under `grant`, or mints a new one that
    /// expires together with the grant. Concurrent redemptions under one grant
    /// agree on a single token: the link is claimed first-writer-wins and
    /// losers discard what they minted.
    pub async fn create_or_reuse(&self, grant: &AuthorizationGrant) -> Result<Rpt, UmaError> {
        let link = grant_link_key(&grant.token);
        let now = Utc::now();

        for _ in 0..MAX_LINK_ATTEMPTS {
            let stale = match self.linked_rpt(&link, grant, now).await? {
                LinkedRpt::Active(rpt) => {
                    debug!("Reusing RPT for client {}", grant.client_id);
                    return Ok(rpt);
                }
                LinkedRpt::Stale(code) => Some(code),
                LinkedRpt::Missing => None,
            };

            let rpt = Rpt {
                code: tokens::generate_secure_token(),
                issued_at: now,
                expires_at: grant.expires_at,
                user_id: grant.user_id.clone(),
                client_id: grant.client_id.clone(),
                am_host: self.am_host.clone(),
                permissions: Vec::new(),
                expired: false,
            };
            self.store
                .persist(&rpt_key(&rpt), &rpt, Some(rpt.expires_at))
                .await?;

            if self.claim_link(&link, stale, &rpt).await? {
                info!(
                    "Issued RPT for client {} expiring at {}",
                    rpt.client_id, rpt.expires_at
                );
                return Ok(rpt);
            }

            debug!(
                "RPT of client {} was minted concurrently, discarding own",
                grant.client_id
            );
            self.store.remove(&rpt_key(&rpt)).await?;
        }

        error!(
            "Failed to settle the RPT of client {} after {} attempts",
            grant.client_id, MAX_LINK_ATTEMPTS
        );
        Err(UmaError::ServerError("Failed to issue RPT".to_string()))
    }

    async fn linked_rpt(
        &self,
        link: &EntryKey,
        grant: &AuthorizationGrant,
        now: DateTime<Utc>,
    ) -> Result<LinkedRpt, UmaError> {
        let code = match self.store.find::<String>(link).await {
            Ok(Some(entry)) => entry.value,
            Ok(None) => return Ok(LinkedRpt::Missing),
            Err(e) => {
                error!("Failed to load RPT link of grant: {}", e);
                return Ok(LinkedRpt::Missing);
            }
        };
        if let Some(mut rpt) = self.get_by_code(&code).await? {
            rpt.check_expired(now);
            if rpt.is_valid() && rpt.client_id == grant.client_id {
                return Ok(LinkedRpt::Active(rpt));
            }
        }
        Ok(LinkedRpt::Stale(code))
    }

    /// Point the grant link at `rpt`. A link is only replaced while it still
    /// holds the `stale` code; returns `false` when another redemption won.
    async fn claim_link(
        &self,
        link: &EntryKey,
        stale: Option<String>,
        rpt: &Rpt,
    ) -> Result<bool, UmaError> {
        if let Some(stale) = stale {
            let code = rpt.code.clone();
            let swapped = self
                .store
                .merge(link, move |current: &mut String| {
                    if *current == stale {
                        *current = code.clone();
                    }
                })
                .await?;
            if let Some(entry) = swapped {
                return Ok(entry.value == rpt.code);
            }
        }
        Ok(self
            .store
            .persist_if_absent(link, &rpt.code, Some(rpt.expires_at))
            .await?)
    }

    /// Look up an RPT by code. Store failures are logged and reported as
    /// absent; two tokens sharing a code are a server error.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Rpt>, UmaError> {
        let mut found = match self.store.find_by_id::<Rpt>(EntryKind::Rpt, code).await {
            Ok(found) => found,
            Err(e) => {
                error!("Failed to load RPT: {}", e);
                return Ok(None);
            }
        };
        match found.len() {
            0 => Ok(None),
            1 => Ok(Some(found.remove(0).value)),
            count => {
                error!("Found {} RPTs sharing one code", count);
                Err(UmaError::ServerError("RPT code is not unique".to_string()))
            }
        }
    }

    /// Append `permission` to the token. Attaching a ticket twice is a no-op.
    pub async fn attach_permission(
        &self,
        rpt: &Rpt,
        permission: &Permission,
    ) -> Result<Rpt, UmaError> {
        let ticket = permission.ticket.clone();
        let updated = self
            .store
            .merge(&rpt_key(rpt), move |stored: &mut Rpt| {
                if !stored.permissions.contains(&ticket) {
                    stored.permissions.push(ticket.clone());
                }
            })
            .await?;

        match updated {
            Some(entry) => {
                debug!(
                    "Attached permission for resource {} to RPT, now holding {}",
                    permission.resource_id,
                    entry.value.permissions.len()
                );
                Ok(entry.value)
            }
            None => {
                error!("RPT disappeared before permission could be attached");
                Err(UmaError::NotAuthorizedPermission(
                    "RPT is not valid".to_string(),
                ))
            }
        }
    }

    /// Live permissions of the token. References to tickets that are gone or
    /// expired are skipped.
    pub async fn permissions_of(&self, rpt: &Rpt) -> Vec<Permission> {
        let now = Utc::now();
        let mut permissions = Vec::with_capacity(rpt.permissions.len());
        for ticket in &rpt.permissions {
            let Some(mut permission) = self.tickets.get_by_ticket(ticket).await else {
                debug!("Skipping unresolvable permission reference");
                continue;
            };
            permission.check_expired(now);
            if permission.is_valid() {
                permissions.push(permission);
            }
        }
        permissions
    }

    pub async fn find_permission_for_resource(
        &self,
        rpt: &Rpt,
        resource_id: &str,
    ) -> Option<Permission> {
        self.permissions_of(rpt)
            .await
            .into_iter()
            .find(|permission| permission.resource_id == resource_id)
    }

    pub async fn delete(&self, rpt: &Rpt) -> bool {
        match self.store.remove(&rpt_key(rpt)).await {
            Ok(removed) => removed,
            Err(e) => {
                error!("Failed to remove RPT: {}", e);
                false
            }
        }
    }

    /// Remove tokens and grant links expiring at or before `now`
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for kind in [EntryKind::Rpt, EntryKind::RptGrant] {
            match self.store.remove_expired(kind, now).await {
                Ok(count) => removed += count,
                Err(e) => error!("Failed to sweep expired {} entries: {}", kind, e),
            }
        }
        removed
    }
}

fn rpt_key(rpt: &Rpt) -> EntryKey {
    EntryKey::owned(EntryKind::Rpt, &rpt.client_id, &rpt.code)
}

fn grant_link_key(bearer_token: &str) -> EntryKey {
    EntryKey::new(EntryKind::RptGrant, tokens::digest(bearer_token))
}
