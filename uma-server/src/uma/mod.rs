//! UMA authorization server core: catalogs, ticket and RPT stores, validation
//! and the cleanup sweeper.

pub mod grants;
pub mod resource_catalog;
pub mod rpt_store;
pub mod scope_catalog;
pub mod service;
pub mod sweeper;
pub mod ticket_store;
pub mod tokens;
pub mod validator;

pub use grants::StoreGrantLookup;
pub use resource_catalog::ResourceRegistration;
pub use service::{GrantedPermission, RptRequest, RptStatus, UmaService};
pub use sweeper::CleanupSweeper;
