use super::{scope_catalog::ScopeCatalog, tokens};
use crate::errors::UmaError;
use crate::models::Permission;
use crate::store::{EntryKey, EntryKind, EntryStore, Store};
use chrono::{DateTime, Duration, Utc};
use log::{debug, error, warn};
use std::sync::Arc;

/// Fresh tickets are drawn again when they collide with a stored one
const MAX_ISSUE_ATTEMPTS: usize = 3;

/// Permission tickets, keyed by ticket with a configuration-code link
/// (`ticket_code/<code>` holding the ticket).
pub struct PermissionTicketStore {
    store: Arc<Store>,
    scopes: Arc<ScopeCatalog>,
}

impl PermissionTicketStore {
    pub fn new(store: Arc<Store>, scopes: Arc<ScopeCatalog>) -> Self {
        Self { store, scopes }
    }

    /// Register a permission for `resource_id` and mint its ticket
    pub async fn issue(
        &self,
        resource_id: &str,
        scope_urls: &[String],
        am_host: &str,
        issuing_host: &str,
        ttl: Duration,
    ) -> Result<Permission, UmaError> {
        let scopes = self.scopes.resolve(scope_urls).await?;
        let issued_at = Utc::now();
        let expires_at = issued_at + ttl;

        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            let permission = Permission {
                ticket: tokens::generate_secure_token(),
                resource_id: resource_id.to_string(),
                scopes: scopes.clone(),
                am_host: am_host.to_string(),
                issuing_host: issuing_host.to_string(),
                configuration_code: tokens::generate_configuration_code(issued_at),
                issued_at,
                expires_at,
                expired: false,
            };

            let ticket_key = ticket_key(&permission.ticket);
            if !self
                .store
                .persist_if_absent(&ticket_key, &permission, Some(expires_at))
                .await?
            {
                warn!("Ticket collision on attempt {}, drawing a new one", attempt);
                continue;
            }
            if !self
                .store
                .persist_if_absent(
                    &code_key(&permission.configuration_code),
                    &permission.ticket,
                    Some(expires_at),
                )
                .await?
            {
                warn!(
                    "Configuration code collision on attempt {}, drawing a new one",
                    attempt
                );
                self.store.remove(&ticket_key).await?;
                continue;
            }

            debug!(
                "Issued ticket for resource {} expiring at {}",
                resource_id, expires_at
            );
            return Ok(permission);
        }

        error!("Failed to mint a unique ticket after {} attempts", MAX_ISSUE_ATTEMPTS);
        Err(UmaError::ServerError(
            "Failed to issue permission ticket".to_string(),
        ))
    }

    /// Look up a ticket. Store failures are logged and reported as absent.
    pub async fn get_by_ticket(&self, ticket: &str) -> Option<Permission> {
        match self.store.find::<Permission>(&ticket_key(ticket)).await {
            Ok(found) => found.map(|entry| entry.value),
            Err(e) => {
                error!("Failed to load ticket: {}", e);
                None
            }
        }
    }

    pub async fn get_ticket_by_configuration_code(&self, code: &str) -> Option<String> {
        let ticket = match self.store.find::<String>(&code_key(code)).await {
            Ok(found) => found?.value,
            Err(e) => {
                error!("Failed to load configuration code {}: {}", code, e);
                return None;
            }
        };
        // The link can outlive a deleted ticket until the next sweep
        self.get_by_ticket(&ticket).await.map(|permission| permission.ticket)
    }

    pub async fn delete(&self, ticket: &str) -> bool {
        let Some(permission) = self.get_by_ticket(ticket).await else {
            return false;
        };
        if let Err(e) = self
            .store
            .remove(&code_key(&permission.configuration_code))
            .await
        {
            error!("Failed to remove configuration code link: {}", e);
        }
        match self.store.remove(&ticket_key(ticket)).await {
            Ok(removed) => removed,
            Err(e) => {
                error!("Failed to remove ticket: {}", e);
                false
            }
        }
    }

    /// Remove tickets and code links expiring at or before `now`
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for kind in [EntryKind::Ticket, EntryKind::TicketCode] {
            match self.store.remove_expired(kind, now).await {
                Ok(count) => removed += count,
                Err(e) => error!("Failed to sweep expired {} entries: {}", kind, e),
            }
        }
        removed
    }
}

fn ticket_key(ticket: &str) -> EntryKey {
    EntryKey::new(EntryKind::Ticket, ticket)
}

fn code_key(code: &str) -> EntryKey {
    EntryKey::new(EntryKind::TicketCode, code)
}
