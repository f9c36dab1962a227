//! Capabilities held on a document and the access level derived from them.
//!
//! The room store only keeps a flat `user id -> capability set` map plus the
//! creator id. [`AccessLevel`] is computed once from those two inputs and then
//! passed around, so callers never repeat the "is creator / has write" checks.

use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ids::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Read,
    Write,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Read => "room:read",
            Capability::Write => "room:write",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "room:read" => Some(Capability::Read),
            "room:write" => Some(Capability::Write),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The capabilities one user holds on one document.
///
/// Unknown capability strings coming back from the room store (presence-only
/// grants and the like) are dropped on decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet(Vec<Capability>);

impl CapabilitySet {
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let mut items: Vec<Capability> = capabilities.into_iter().collect();
        items.sort();
        items.dedup();
        Self(items)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    /// Write implies read; there is no write-without-read state.
    pub fn can_write(&self) -> bool {
        self.contains(Capability::Write)
    }

    pub fn can_read(&self) -> bool {
        self.can_write() || self.contains(Capability::Read)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(|cap| cap.as_str()))
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        Ok(Self::new(raw.iter().filter_map(|value| Capability::parse(value))))
    }
}

/// `usersAccesses` as stored on the room record.
pub type UserAccesses = BTreeMap<UserId, CapabilitySet>;

/// Partial `usersAccesses` update. `None` revokes the user's entry.
pub type AccessPatch = BTreeMap<UserId, Option<CapabilitySet>>;

/// Level requested when sharing a document with someone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantLevel {
    Editor,
    Viewer,
}

impl GrantLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            GrantLevel::Editor => "editor",
            GrantLevel::Viewer => "viewer",
        }
    }

    pub fn capabilities(self) -> CapabilitySet {
        match self {
            GrantLevel::Editor => CapabilitySet::new([Capability::Write]),
            GrantLevel::Viewer => CapabilitySet::new([Capability::Read]),
        }
    }
}

impl fmt::Display for GrantLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantLevel {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "editor" => Ok(GrantLevel::Editor),
            "viewer" => Ok(GrantLevel::Viewer),
            other => Err(anyhow!("unknown access level: {other}")),
        }
    }
}

/// Role of a user on a document, derived from the creator id and the
/// capability map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessLevel {
    Owner,
    Editor(CapabilitySet),
    Viewer(CapabilitySet),
    None,
}

impl AccessLevel {
    pub fn derive(creator_id: &UserId, accesses: &UserAccesses, user_id: &UserId) -> Self {
        if creator_id == user_id {
            return AccessLevel::Owner;
        }

        match accesses.get(user_id) {
            Some(caps) if caps.can_write() => AccessLevel::Editor(caps.clone()),
            Some(caps) if caps.can_read() => AccessLevel::Viewer(caps.clone()),
            _ => AccessLevel::None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccessLevel::Owner => "owner",
            AccessLevel::Editor(_) => "editor",
            AccessLevel::Viewer(_) => "viewer",
            AccessLevel::None => "none",
        }
    }

    pub fn can_open(&self) -> bool {
        !matches!(self, AccessLevel::None)
    }

    pub fn can_edit(&self) -> bool {
        matches!(self, AccessLevel::Owner | AccessLevel::Editor(_))
    }

    pub fn is_owner(&self) -> bool {
        matches!(self, AccessLevel::Owner)
    }

    /// Whether the user holds write through the capability map. The owner
    /// always counts as a writer.
    pub fn has_write(&self) -> bool {
        match self {
            AccessLevel::Owner => true,
            AccessLevel::Editor(caps) | AccessLevel::Viewer(caps) => caps.can_write(),
            AccessLevel::None => false,
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for AccessLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}
