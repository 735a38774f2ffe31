use super::Expirable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Requesting Party Token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rpt {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
    pub client_id: String,
    pub am_host: String,
    /// Tickets of the permissions folded into this token, append-only
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(skip)]
    pub expired: bool,
}

impl Expirable for Rpt {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    fn mark_expired(&mut self) {
        self.expired = true;
    }

    fn is_marked_expired(&self) -> bool {
        self.expired
    }
}
