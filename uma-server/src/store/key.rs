//! Storage paths of persisted entries.
//!
//! Every entry lives at a hierarchical path `kind/id`, or `kind/owner/id` for
//! kinds that are stored under their owning client.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Scope,
    /// Unique link from a scope URL digest to its scope id
    ScopeUrl,
    Resource,
    Ticket,
    /// Unique link from a configuration code to its ticket
    TicketCode,
    Rpt,
    /// Link from a bearer grant digest to the RPT minted under it
    RptGrant,
    Grant,
}

impl EntryKind {
    pub const ALL: [EntryKind; 8] = [
        Self::Scope,
        Self::ScopeUrl,
        Self::Resource,
        Self::Ticket,
        Self::TicketCode,
        Self::Rpt,
        Self::RptGrant,
        Self::Grant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scope => "scope",
            Self::ScopeUrl => "scope_url",
            Self::Resource => "resource",
            Self::Ticket => "ticket",
            Self::TicketCode => "ticket_code",
            Self::Rpt => "rpt",
            Self::RptGrant => "rpt_grant",
            Self::Grant => "grant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Entries of these kinds are stored in a branch per owning client
    pub fn is_owner_scoped(&self) -> bool {
        matches!(self, Self::Resource | Self::Rpt)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub kind: EntryKind,
    pub owner: Option<String>,
    pub id: String,
}

impl EntryKey {
    pub fn new(kind: EntryKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            owner: None,
            id: id.into(),
        }
    }

    pub fn owned(kind: EntryKind, owner: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind,
            owner: Some(owner.into()),
            id: id.into(),
        }
    }

    pub fn path(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}/{}/{}", self.kind, owner, self.id),
            None => format!("{}/{}", self.kind, self.id),
        }
    }

    /// Owner-agnostic path used to index entries by id
    pub fn id_path(&self) -> String {
        format!("{}/{}", self.kind, self.id)
    }

    /// Path of the owner branch this entry lives in
    pub fn branch(&self) -> Option<String> {
        self.owner
            .as_ref()
            .map(|owner| format!("{}/{}", self.kind, owner))
    }

    pub fn parse(path: &str) -> Option<Self> {
        let (kind, rest) = path.split_once('/')?;
        let kind = EntryKind::parse(kind)?;
        if kind.is_owner_scoped() {
            let (owner, id) = rest.rsplit_once('/')?;
            Some(Self::owned(kind, owner, id))
        } else {
            Some(Self::new(kind, rest))
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Selects entries of one kind, optionally restricted to one owner branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub kind: EntryKind,
    pub owner: Option<String>,
}

impl Filter {
    pub fn all(kind: EntryKind) -> Self {
        Self { kind, owner: None }
    }

    pub fn owned_by(kind: EntryKind, owner: impl Into<String>) -> Self {
        Self {
            kind,
            owner: Some(owner.into()),
        }
    }

    pub fn matches(&self, key: &EntryKey) -> bool {
        key.kind == self.kind
            && match &self.owner {
                Some(owner) => key.owner.as_deref() == Some(owner.as_str()),
                None => true,
            }
    }
}
