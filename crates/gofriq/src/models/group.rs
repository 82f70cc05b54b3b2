//! Group model. Groups are content-scoping boundaries, not clients.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Reserved group readable by anonymous callers.
pub const PUBLIC_GROUP: &str = "public";

/// Reserved group granting administrative operations.
pub const ADMIN_GROUP: &str = "admin";

/// A content-scoping boundary owning sources, documents and clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_guid: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub active: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Group {
    /// Create a new active group.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            group_guid: Uuid::new_v4(),
            name: name.into(),
            description: None,
            created_at: now,
            updated_at: now,
            active: true,
            metadata: BTreeMap::new(),
        }
    }

    /// Whether this is the anonymous-readable group.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.name == PUBLIC_GROUP
    }

    /// Whether this group grants administrative scope.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.name == ADMIN_GROUP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names() {
        assert!(Group::new("public").is_public());
        assert!(Group::new("admin").is_admin());
        let g = Group::new("apac-research");
        assert!(!g.is_public());
        assert!(!g.is_admin());
    }

    #[test]
    fn test_new_group_active() {
        assert!(Group::new("emea").active);
    }
}
