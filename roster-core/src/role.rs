//! Project role type

use crate::RoleId;
use serde::{Deserialize, Serialize};

/// A named permission category within a project (e.g. "Developers").
///
/// Identity is `id`. The name is unique among roles; the backing store
/// enforces that, not this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
        }
    }

    /// Copy of this role with a different name. The id never changes.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            id: self.id,
            name: name.into(),
            description: self.description.clone(),
        }
    }

    /// Copy of this role with a different description.
    pub fn with_description(&self, description: impl Into<String>) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            description: description.into(),
        }
    }
}

/// A role that has not been persisted yet; the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub description: String,
}

impl NewRole {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Attach the id assigned by the store.
    pub fn with_id(self, id: RoleId) -> Role {
        Role {
            id,
            name: self.name,
            description: self.description,
        }
    }
}
