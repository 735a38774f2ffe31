use super::{Expirable, ScopeRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Permission ticket record created by a permission registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Permission {
    pub ticket: String,
    pub resource_id: String,
    pub scopes: Vec<ScopeRef>,
    pub am_host: String,
    pub issuing_host: String,
    pub configuration_code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub expired: bool,
}

impl Expirable for Permission {
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn permission(expires_at: DateTime<Utc>) -> Permission {
        Permission {
            ticket: "t".to_string(),
            resource_id: "r".to_string(),
            scopes: vec![],
            am_host: "as.example.com".to_string(),
            issuing_host: "rs.example.com".to_string(),
            configuration_code: "c.0".to_string(),
            issued_at: Utc::now(),
            expires_at,
            expired: false,
        }
    }

    #[test]
    fn test_past_expiry_is_never_valid() {
        let now = Utc::now();
        let mut stale = permission(now - Duration::seconds(1));
        for _ in 0..3 {
            stale.check_expired(now);
            assert!(!stale.is_valid());
        }
        // Marked records don't come back even if checked against an earlier clock
        stale.check_expired(now - Duration::hours(1));
        assert!(!stale.is_valid());
    }

    #[test]
    fn test_future_expiry_stays_valid_until_then() {
        let now = Utc::now();
        let mut fresh = permission(now + Duration::seconds(10));
        fresh.check_expired(now);
        assert!(fresh.is_valid());
        fresh.check_expired(now + Duration::seconds(9));
        assert!(fresh.is_valid());
        fresh.check_expired(now + Duration::seconds(10));
        assert!(!fresh.is_valid());
    }

    #[test]
    fn test_expired_flag_is_not_persisted() {
        let mut record = permission(Utc::now());
        record.expired = true;
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("expired").is_none());
        let restored: Permission = serde_json::from_value(json).unwrap();
        assert!(restored.is_valid());
    }
}
