use super::tokens;
use crate::config::{ScopeSeed, UmaConfig};
use crate::errors::UmaError;
use crate::models::{ScopeDescription, ScopeKind, ScopeRef};
use crate::store::{EntryKey, EntryKind, EntryStore, Filter, Store};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// Resolves scope URLs to persisted scope descriptions.
///
/// Internal scopes are matched by their synthesized URL, External ones through
/// a unique URL link (`scope_url/<digest>` pointing at the scope id). Unknown
/// URLs are registered as `ExternalAuto` when `add_scopes_automatically` is on.
pub struct ScopeCatalog {
    store: Arc<Store>,
    base_endpoint: String,
    add_scopes_automatically: bool,
}

impl ScopeCatalog {
    pub fn new(store: Arc<Store>, config: &UmaConfig) -> Self {
        Self {
            store,
            base_endpoint: config.base_endpoint().to_string(),
            add_scopes_automatically: config.add_scopes_automatically,
        }
    }

    pub fn base_endpoint(&self) -> &str {
        &self.base_endpoint
    }

    /// Register the configured scopes, replacing earlier descriptions with the same id
    pub async fn seed(&self, seeds: &[ScopeSeed]) -> Result<usize, UmaError> {
        for seed in seeds {
            let scope = ScopeDescription {
                id: seed.id.clone(),
                display_name: seed.display_name.clone(),
                icon_uri: seed.icon_uri.clone(),
                kind: if seed.url.is_some() {
                    ScopeKind::External
                } else {
                    ScopeKind::Internal
                },
                url: seed.url.clone(),
            };
            self.store
                .persist(&EntryKey::new(EntryKind::Scope, &scope.id), &scope, None)
                .await?;
            if let Some(url) = &scope.url {
                self.store
                    .persist(&url_key(url), &scope.reference(), None)
                    .await?;
            }
            debug!("Seeded {:?} scope {}", scope.kind, scope.id);
        }
        info!("Registered {} configured scopes", seeds.len());
        Ok(seeds.len())
    }

    pub async fn all(&self) -> Result<Vec<ScopeDescription>, UmaError> {
        let mut scopes: Vec<ScopeDescription> = self
            .store
            .find_many(&Filter::all(EntryKind::Scope))
            .await?
            .into_iter()
            .map(|entry| entry.value)
            .collect();
        scopes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(scopes)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<ScopeDescription, UmaError> {
        self.find(id)
            .await?
            .ok_or_else(|| UmaError::NotFound(format!("Scope {id} not found")))
    }

    async fn find(&self, id: &str) -> Result<Option<ScopeDescription>, UmaError> {
        Ok(self
            .store
            .find(&EntryKey::new(EntryKind::Scope, id))
            .await?
            .map(|entry| entry.value))
    }

    /// Map scope URLs to scope references, preserving order and dropping duplicates
    pub async fn resolve(&self, urls: &[String]) -> Result<Vec<ScopeRef>, UmaError> {
        let mut seen = HashSet::new();
        let mut refs = Vec::with_capacity(urls.len());
        for url in urls {
            if !seen.insert(url.as_str()) {
                continue;
            }
            let reference = self.resolve_one(url).await?;
            if !refs.contains(&reference) {
                refs.push(reference);
            }
        }
        Ok(refs)
    }

    async fn resolve_one(&self, url: &str) -> Result<ScopeRef, UmaError> {
        if let Some(reference) = self.find_internal(url).await? {
            return Ok(reference);
        }
        if let Some(reference) = self.find_external(url).await? {
            return Ok(reference);
        }
        if !self.add_scopes_automatically {
            warn!("Scope {} is not registered and auto-registration is off", url);
            return Err(UmaError::InvalidScope(format!(
                "Scope {url} is not registered"
            )));
        }
        self.register_auto(url).await
    }

    async fn find_internal(&self, url: &str) -> Result<Option<ScopeRef>, UmaError> {
        let Some(id) = url
            .strip_prefix(self.base_endpoint.as_str())
            .and_then(|rest| rest.strip_prefix("/scopes/"))
        else {
            return Ok(None);
        };
        Ok(self
            .find(id)
            .await?
            .filter(|scope| scope.kind == ScopeKind::Internal && scope.url(&self.base_endpoint) == url)
            .map(|scope| scope.reference()))
    }

    async fn find_external(&self, url: &str) -> Result<Option<ScopeRef>, UmaError> {
        let Some(link) = self.store.find::<ScopeRef>(&url_key(url)).await? else {
            return Ok(None);
        };
        let found = self.find(link.value.as_str()).await?;
        if found.is_none() {
            warn!("Scope link for {} points at missing scope {}", url, link.value);
        }
        Ok(found.map(|scope| scope.reference()))
    }

    /// Persist a new ExternalAuto scope for `url`. Concurrent first sightings
    /// race on the URL link; the losers drop their row and use the winner's.
    async fn register_auto(&self, url: &str) -> Result<ScopeRef, UmaError> {
        let scope = ScopeDescription {
            id: tokens::generate_id(),
            display_name: None,
            icon_uri: None,
            kind: ScopeKind::ExternalAuto,
            url: Some(url.to_string()),
        };
        let scope_key = EntryKey::new(EntryKind::Scope, &scope.id);
        self.store.persist(&scope_key, &scope, None).await?;

        if self
            .store
            .persist_if_absent(&url_key(url), &scope.reference(), None)
            .await?
        {
            info!("Auto-registered scope {} for {}", scope.id, url);
            return Ok(scope.reference());
        }

        debug!("Scope {} was registered concurrently, discarding {}", url, scope.id);
        self.store.remove(&scope_key).await?;
        self.find_external(url).await?.ok_or_else(|| {
            UmaError::ServerError(format!("Scope registration for {url} vanished"))
        })
    }

    /// Inverse of [`ScopeCatalog::resolve`]. References that no longer resolve are skipped.
    pub async fn urls_for(&self, refs: &[ScopeRef]) -> Result<Vec<String>, UmaError> {
        let mut urls = Vec::with_capacity(refs.len());
        for reference in refs {
            match self.find(reference.as_str()).await? {
                Some(scope) => urls.push(scope.url(&self.base_endpoint)),
                None => warn!("Skipping unknown scope reference {}", reference),
            }
        }
        Ok(urls)
    }
}

fn url_key(url: &str) -> EntryKey {
    EntryKey::new(EntryKind::ScopeUrl, tokens::digest(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::create_store;

    async fn catalog(auto: bool) -> ScopeCatalog {
        let mut config = UmaConfig::for_test();
        config.add_scopes_automatically = auto;
        let store = Arc::new(create_store(&config).await.unwrap());
        let catalog = ScopeCatalog::new(store, &config);
        catalog
            .seed(&[
                ScopeSeed {
                    id: "view".to_string(),
                    display_name: Some("View".to_string()),
                    icon_uri: None,
                    url: None,
                },
                ScopeSeed {
                    id: "print".to_string(),
                    display_name: None,
                    icon_uri: None,
                    url: Some("https://rs.example.com/print".to_string()),
                },
            ])
            .await
            .unwrap();
        catalog
    }

    #[tokio::test]
    async fn test_resolves_internal_and_external_scopes() {
        let catalog = catalog(false).await;
        let refs = catalog
            .resolve(&[
                "https://as.example.com/scopes/view".to_string(),
                "https://rs.example.com/print".to_string(),
                "https://as.example.com/scopes/view".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(refs, vec![ScopeRef("view".into()), ScopeRef("print".into())]);

        let urls = catalog.urls_for(&refs).await.unwrap();
        assert_eq!(
            urls,
            vec![
                "https://as.example.com/scopes/view".to_string(),
                "https://rs.example.com/print".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_scope_is_rejected_without_auto_registration() {
        let catalog = catalog(false).await;
        let result = catalog
            .resolve(&["https://rs.example.com/delete".to_string()])
            .await;
        assert!(matches!(result, Err(UmaError::InvalidScope(_))));
        assert_eq!(catalog.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_auto_registration_is_idempotent() {
        let catalog = catalog(true).await;
        let url = vec!["https://rs.example.com/delete".to_string()];

        let first = catalog.resolve(&url).await.unwrap();
        let second = catalog.resolve(&url).await.unwrap();
        assert_eq!(first, second);

        let scopes = catalog.all().await.unwrap();
        assert_eq!(scopes.len(), 3);
        let auto: Vec<_> = scopes
            .iter()
            .filter(|scope| scope.kind == ScopeKind::ExternalAuto)
            .collect();
        assert_eq!(auto.len(), 1);
        assert_eq!(auto[0].url.as_deref(), Some("https://rs.example.com/delete"));
    }

    #[tokio::test]
    async fn test_concurrent_first_resolution_persists_one_scope() {
        let catalog = Arc::new(catalog(true).await);
        let mut handles = vec![];
        for _ in 0..10 {
            let catalog = catalog.clone();
            handles.push(tokio::spawn(async move {
                catalog
                    .resolve(&["https://rs.example.com/share".to_string()])
                    .await
                    .unwrap()
            }));
        }
        let mut refs = HashSet::new();
        for handle in handles {
            refs.extend(handle.await.unwrap());
        }
        assert_eq!(refs.len(), 1);

        let auto = catalog
            .all()
            .await
            .unwrap()
            .into_iter()
            .filter(|scope| scope.kind == ScopeKind::ExternalAuto)
            .count();
        assert_eq!(auto, 1);
    }

    #[tokio::test]
    async fn test_internal_prefix_with_unknown_id_is_not_internal() {
        let catalog = catalog(false).await;
        let result = catalog
            .resolve(&["https://as.example.com/scopes/missing".to_string()])
            .await;
        assert!(matches!(result, Err(UmaError::InvalidScope(_))));
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let catalog = catalog(false).await;
        assert_eq!(
            catalog.get_by_id("view").await.unwrap().display_name.as_deref(),
            Some("View")
        );
        assert!(matches!(
            catalog.get_by_id("nope").await,
            Err(UmaError::NotFound(_))
        ));
    }
}
