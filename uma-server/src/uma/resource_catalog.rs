use super::{scope_catalog::ScopeCatalog, tokens};
use crate::errors::UmaError;
use crate::models::ResourceSet;
use crate::store::{EntryKey, EntryKind, EntryStore, Filter, Store};
use log::{debug, error};
use std::sync::Arc;

/// Resource set fields supplied by the resource server, scopes given as URLs
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRegistration {
    pub name: String,
    pub uri: Option<String>,
    pub icon_uri: Option<String>,
    pub scopes: Vec<String>,
}

impl ResourceRegistration {
    fn validate(&self) -> Result<(), UmaError> {
        if self.name.trim().is_empty() {
            return Err(UmaError::ValidationError(
                "Resource name must not be blank".to_string(),
            ));
        }
        if self.scopes.is_empty() {
            return Err(UmaError::ValidationError(
                "Resource must declare at least one scope".to_string(),
            ));
        }
        for uri in [&self.uri, &self.icon_uri].into_iter().flatten() {
            url::Url::parse(uri)
                .map_err(|e| UmaError::ValidationError(format!("Invalid URI '{uri}': {e}")))?;
        }
        Ok(())
    }
}

/// Resource sets, stored under the branch of their owning client
pub struct ResourceCatalog {
    store: Arc<Store>,
    scopes: Arc<ScopeCatalog>,
}

impl ResourceCatalog {
    pub fn new(store: Arc<Store>, scopes: Arc<ScopeCatalog>) -> Self {
        Self { store, scopes }
    }

    pub async fn register(
        &self,
        owner: &str,
        registration: ResourceRegistration,
    ) -> Result<ResourceSet, UmaError> {
        registration.validate()?;
        let resource = ResourceSet {
            id: tokens::generate_id(),
            name: registration.name,
            uri: registration.uri,
            icon_uri: registration.icon_uri,
            scopes: self.scopes.resolve(&registration.scopes).await?,
            owning_client: owner.to_string(),
        };
        self.store.persist(&key(&resource), &resource, None).await?;
        debug!("Registered resource {} for client {}", resource.id, owner);
        Ok(resource)
    }

    pub async fn update(
        &self,
        owner: &str,
        id: &str,
        registration: ResourceRegistration,
    ) -> Result<ResourceSet, UmaError> {
        registration.validate()?;
        let mut resource = self.get_owned(owner, id).await?;
        resource.name = registration.name;
        resource.uri = registration.uri;
        resource.icon_uri = registration.icon_uri;
        resource.scopes = self.scopes.resolve(&registration.scopes).await?;
        self.store.persist(&key(&resource), &resource, None).await?;
        debug!("Updated resource {}", id);
        Ok(resource)
    }

    pub async fn remove(&self, owner: &str, id: &str) -> Result<(), UmaError> {
        let resource = self.get_owned(owner, id).await?;
        self.store.remove(&key(&resource)).await?;
        debug!("Removed resource {}", id);
        Ok(())
    }

    /// Every stored resource carrying `id`, whichever client owns it
    pub async fn find_all_by_id(&self, id: &str) -> Result<Vec<ResourceSet>, UmaError> {
        Ok(self
            .store
            .find_by_id(EntryKind::Resource, id)
            .await?
            .into_iter()
            .map(|entry| entry.value)
            .collect())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<ResourceSet, UmaError> {
        let mut found = self.find_all_by_id(id).await?;
        match found.len() {
            0 => Err(UmaError::NotFound(format!("Resource {id} not found"))),
            1 => Ok(found.remove(0)),
            count => {
                error!("Found {} resources sharing id {}", count, id);
                Err(UmaError::ServerError(format!(
                    "Resource id {id} is not unique"
                )))
            }
        }
    }

    /// Like [`ResourceCatalog::get_by_id`], but resources of other clients are reported missing
    pub async fn get_owned(&self, owner: &str, id: &str) -> Result<ResourceSet, UmaError> {
        let resource = self.get_by_id(id).await?;
        if resource.owning_client != owner {
            debug!("Client {} asked for resource {} of another client", owner, id);
            return Err(UmaError::NotFound(format!("Resource {id} not found")));
        }
        Ok(resource)
    }

    pub async fn list_by_owner(&self, owner: &str) -> Result<Vec<String>, UmaError> {
        let mut ids: Vec<String> = self
            .store
            .find_many::<ResourceSet>(&Filter::owned_by(EntryKind::Resource, owner))
            .await?
            .into_iter()
            .map(|entry| entry.value.id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

fn key(resource: &ResourceSet) -> EntryKey {
    EntryKey::owned(EntryKind::Resource, &resource.owning_client, &resource.id)
}
