use crate::permission::Permission;
use crate::types::{RoleName, UserId};
use chrono::{DateTime, Utc};

/// One role assignment in a user's append-only history.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoleHistoryEntry {
    pub role: RoleName,
    pub assigned_by: UserId,
    pub assigned_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// The permission-relevant slice of a user record.
///
/// `permissions` is a denormalized snapshot copied from the role at
/// assignment time and is the authoritative set at evaluation time; role
/// changes do not apply until the snapshot is refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserRecord {
    pub id: UserId,
    pub role: RoleName,
    pub permissions: Vec<Permission>,
    pub role_history: Vec<RoleHistoryEntry>,
}

impl UserRecord {
    /// Creates a user with an empty snapshot; the evaluator materializes
    /// permissions lazily on first check.
    pub fn new(id: UserId, role: RoleName) -> Self {
        Self {
            id,
            role,
            permissions: Vec::new(),
            role_history: Vec::new(),
        }
    }
}
