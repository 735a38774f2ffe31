use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Scope a bearer grant must carry to call an UMA endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UmaScopeType {
    /// Resource server calls (PAT)
    Protection,
    /// Client calls (AAT)
    Authorization,
}

impl UmaScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protection => "uma_protection",
            Self::Authorization => "uma_authorization",
        }
    }
}

impl fmt::Display for UmaScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pre-validated OAuth2 grant behind a bearer token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorizationGrant {
    pub client_id: String,
    pub user_id: String,
    pub scopes: HashSet<String>,
    pub expires_at: DateTime<Utc>,
    /// Bearer token the grant was looked up with
    #[serde(skip)]
    pub token: String,
}

impl AuthorizationGrant {
    pub fn has_scope(&self, scope: UmaScopeType) -> bool {
        self.scopes.contains(scope.as_str())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
