//! Records persisted by the UMA stores.

mod grant;
mod permission;
mod resource;
mod rpt;
mod scope;

pub use grant::{AuthorizationGrant, UmaScopeType};
pub use permission::Permission;
pub use resource::ResourceSet;
pub use rpt::Rpt;
pub use scope::{ScopeDescription, ScopeKind, ScopeRef};

use chrono::{DateTime, Utc};

/// Records with a lazily evaluated expiry.
///
/// Expiry is never pushed: a record only learns that it is stale when a
/// reader calls [`Expirable::check_expired`], and once stale it stays stale.
pub trait Expirable {
    fn expires_at(&self) -> DateTime<Utc>;

    fn mark_expired(&mut self);

    fn is_marked_expired(&self) -> bool;

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    fn check_expired(&mut self, now: DateTime<Utc>) {
        if self.is_expired_at(now) {
            self.mark_expired();
        }
    }

    fn is_valid(&self) -> bool {
        !self.is_marked_expired()
    }
}
