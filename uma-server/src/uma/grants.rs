use super::tokens;
use crate::models::AuthorizationGrant;
use crate::store::{EntryKey, EntryKind, EntryStore, Store, StoreError};
use async_trait::async_trait;
use log::error;
use std::sync::Arc;

/// Resolves the bearer token of an inbound call to the OAuth2 grant behind it
#[async_trait]
pub trait GrantLookup: Send + Sync {
    async fn lookup_grant(&self, bearer_token: &str) -> Option<AuthorizationGrant>;
}

/// Grant lookup over grants that the token endpoint publishes into the shared
/// store, keyed by a digest of the bearer token.
pub struct StoreGrantLookup {
    store: Arc<Store>,
}

impl StoreGrantLookup {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub async fn register(
        &self,
        bearer_token: &str,
        grant: &AuthorizationGrant,
    ) -> Result<(), StoreError> {
        self.store
            .persist(&grant_key(bearer_token), grant, Some(grant.expires_at))
            .await
    }
}

#[async_trait]
impl GrantLookup for StoreGrantLookup {
    async fn lookup_grant(&self, bearer_token: &str) -> Option<AuthorizationGrant> {
        match self
            .store
            .find::<AuthorizationGrant>(&grant_key(bearer_token))
            .await
        {
            Ok(found) => found.map(|entry| AuthorizationGrant {
                token: bearer_token.to_string(),
                ..entry.value
            }),
            Err(e) => {
                error!("Failed to look up grant: {}", e);
                None
            }
        }
    }
}

fn grant_key(bearer_token: &str) -> EntryKey {
    EntryKey::new(EntryKind::Grant, tokens::digest(bearer_token))
}

/// Sweep grants expiring at or before `now`
pub async fn sweep_expired_grants(store: &Store, now: chrono::DateTime<chrono::Utc>) -> usize {
    match store.remove_expired(EntryKind::Grant, now).await {
        Ok(count) => count,
        Err(e) => {
            error!("Failed to sweep expired grants: {}", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UmaConfig;
    use crate::models::UmaScopeType;
    use crate::store::create_store;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_registered_grant_is_found_by_token() {
        let store = Arc::new(create_store(&UmaConfig::for_test()).await.unwrap());
        let grants = StoreGrantLookup::new(store.clone());
        let grant = AuthorizationGrant {
            client_id: "client".to_string(),
            user_id: "alice".to_string(),
            scopes: [UmaScopeType::Authorization.as_str().to_string()].into(),
            expires_at: Utc::now() + Duration::seconds(60),
            token: String::new(),
        };
        grants.register("bearer-1", &grant).await.unwrap();

        let found = grants.lookup_grant("bearer-1").await.unwrap();
        assert_eq!(found.client_id, "client");
        assert_eq!(found.token, "bearer-1");
        assert!(found.has_scope(UmaScopeType::Authorization));
        assert!(!found.has_scope(UmaScopeType::Protection));
        assert!(grants.lookup_grant("bearer-2").await.is_none());

        assert_eq!(
            sweep_expired_grants(&store, grant.expires_at).await,
            1
        );
        assert!(grants.lookup_grant("bearer-1").await.is_none());
    }
}
