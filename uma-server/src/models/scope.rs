use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Defined by the authorization server, URL synthesized from the issuer
    Internal,
    /// URL supplied by a resource server and registered ahead of time
    External,
    /// External scope registered on first sight
    ExternalAuto,
}

/// Reference to a persisted [`ScopeDescription`], i.e. its id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ScopeRef(pub String);

impl ScopeRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ScopeDescription {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_uri: Option<String>,
    pub kind: ScopeKind,
    /// Stored only for External scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ScopeDescription {
    pub fn reference(&self) -> ScopeRef {
        ScopeRef(self.id.clone())
    }

    /// The URL this scope is known by. Internal scopes derive it from the
    /// issuer's base endpoint instead of storing it.
    pub fn url(&self, base_endpoint: &str) -> String {
        match (self.kind, &self.url) {
            (ScopeKind::Internal, _) | (_, None) => format!("{base_endpoint}/scopes/{}", self.id),
            (_, Some(url)) => url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_url_is_synthesized() {
        let scope = ScopeDescription {
            id: "view".to_string(),
            display_name: None,
            icon_uri: None,
            kind: ScopeKind::Internal,
            url: None,
        };
        assert_eq!(
            scope.url("https://as.example.com"),
            "https://as.example.com/scopes/view"
        );
    }

    #[test]
    fn test_external_url_is_stored() {
        let scope = ScopeDescription {
            id: "abc".to_string(),
            display_name: None,
            icon_uri: None,
            kind: ScopeKind::ExternalAuto,
            url: Some("https://rs.example.com/print".to_string()),
        };
        assert_eq!(scope.url("https://as.example.com"), "https://rs.example.com/print");
        assert_eq!(
            serde_json::to_value(&scope).unwrap()["kind"],
            "external_auto"
        );
    }
}
