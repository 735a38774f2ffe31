use serde::Deserialize;

/// A scope description registered by the authorization server at startup.
///
/// Seeds without a `url` become Internal scopes whose URL is synthesized from
/// the issuer; seeds with a `url` become External scopes.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ScopeSeed {
    pub id: String,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub icon_uri: Option<String>,

    #[serde(default)]
    pub url: Option<String>,
}
