use crate::config::UmaConfig;
use crate::store::{create_store, EntryStore, Store, StoreError};
use crate::uma::{StoreGrantLookup, UmaService};
use log::warn;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<UmaConfig>,
    pub store: Arc<Store>,
    pub grants: Arc<StoreGrantLookup>,
    pub uma: Arc<UmaService>,
}

impl AppState {
    /// Creates the state with the store backend selected in the configuration
    pub async fn new(config: &UmaConfig) -> Result<Self, StoreError> {
        let store = create_store(config).await?;
        Ok(Self::with_existing_store(config, store))
    }

    pub fn with_existing_store(config: &UmaConfig, store: Store) -> Self {
        let store = Arc::new(store);
        let grants = Arc::new(StoreGrantLookup::new(store.clone()));
        let uma = Arc::new(UmaService::new(config, store.clone(), grants.clone()));
        Self {
            config: Arc::new(config.clone()),
            store,
            grants,
            uma,
        }
    }

    /// Registers the configured scopes
    pub async fn seed_scopes(&self) -> Result<usize, crate::errors::UmaError> {
        self.uma.scopes.seed(&self.config.scopes).await
    }

    pub async fn health_check(&self) -> bool {
        match self.store.health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Store health check failed: {}", e);
                false
            }
        }
    }

    #[cfg(test)]
    pub async fn for_testing(config: &UmaConfig) -> Self {
        let state = Self::new(config)
            .await
            .expect("Failed to create test state");
        state
            .seed_scopes()
            .await
            .expect("Failed to seed test scopes");
        state
    }
}
