use super::ScopeRef;
use serde::{Deserialize, Serialize};

/// A resource set registered by the resource server of `owning_client`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceSet {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_uri: Option<String>,
    pub scopes: Vec<ScopeRef>,
    pub owning_client: String,
}
