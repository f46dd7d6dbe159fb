use crate::audit::{AuditEntry, AuditFilter};
use crate::error::StoreError;
use crate::permission::Permission;
use crate::role::{Role, RoleDraft};
use crate::types::{RoleId, RoleName, UserId};
use crate::user::RoleHistoryEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Store interface for role records.
#[async_trait]
pub trait RoleStore {
    /// Looks up a role by its store-assigned id.
    async fn role_by_id(&self, id: &RoleId) -> std::result::Result<Option<Role>, StoreError>;

    /// Looks up a role by name.
    async fn role_by_name(&self, name: &RoleName)
    -> std::result::Result<Option<Role>, StoreError>;

    /// Persists a new role and assigns its id.
    async fn create_role(
        &self,
        draft: RoleDraft,
        is_system_role: bool,
    ) -> std::result::Result<Role, StoreError>;

    /// Replaces a role record. Last write wins.
    async fn update_role(&self, role: Role) -> std::result::Result<(), StoreError>;

    /// Removes a role record.
    async fn delete_role(&self, id: &RoleId) -> std::result::Result<(), StoreError>;

    /// Lists roles, highest priority first.
    async fn list_roles(
        &self,
        include_inactive: bool,
    ) -> std::result::Result<Vec<Role>, StoreError>;
}

/// Store interface for the permission-relevant user slice.
#[async_trait]
pub trait UserStore {
    /// Loads a user's permission slice.
    async fn user(&self, id: &UserId)
    -> std::result::Result<Option<crate::UserRecord>, StoreError>;

    /// Persists a user's denormalized permission snapshot.
    async fn save_permission_snapshot(
        &self,
        id: &UserId,
        permissions: Vec<Permission>,
    ) -> std::result::Result<(), StoreError>;

    /// Users currently holding a role, by name.
    async fn users_with_role(
        &self,
        role: &RoleName,
    ) -> std::result::Result<Vec<UserId>, StoreError>;

    /// Number of users currently holding a role.
    async fn count_users_with_role(
        &self,
        role: &RoleName,
    ) -> std::result::Result<u64, StoreError>;

    /// Overwrites the snapshot of every user holding `role`; returns the
    /// affected users so their cache entries can be invalidated.
    async fn refresh_role_snapshots(
        &self,
        role: &RoleName,
        permissions: &[Permission],
    ) -> std::result::Result<Vec<UserId>, StoreError>;

    /// Applies a role assignment: sets the role, replaces the snapshot and
    /// appends the history entry, as one store operation.
    async fn apply_role_assignment(
        &self,
        id: &UserId,
        entry: RoleHistoryEntry,
        permissions: Vec<Permission>,
    ) -> std::result::Result<(), StoreError>;
}

/// Store interface for the audit log.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Appends an entry, assigning its sequence id.
    async fn append(&self, entry: AuditEntry) -> std::result::Result<AuditEntry, StoreError>;

    /// Returns filtered entries, newest first, honoring pagination.
    async fn query(&self, filter: &AuditFilter)
    -> std::result::Result<Vec<AuditEntry>, StoreError>;

    /// Counts matching entries, ignoring pagination.
    async fn count(&self, filter: &AuditFilter) -> std::result::Result<u64, StoreError>;

    /// Sets the review fields on an entry; returns false when the id is
    /// unknown.
    async fn mark_reviewed(
        &self,
        id: u64,
        reviewer: &UserId,
        at: DateTime<Utc>,
    ) -> std::result::Result<bool, StoreError>;

    /// Removes entries whose retention date is at or before `now`.
    async fn delete_expired(&self, now: DateTime<Utc>) -> std::result::Result<u64, StoreError>;

    /// Removes entries written before `cutoff`, regardless of retention.
    async fn delete_before(&self, cutoff: DateTime<Utc>)
    -> std::result::Result<u64, StoreError>;
}

/// Composite store trait for the role/user side.
pub trait Store: RoleStore + UserStore + Send + Sync {}

impl<T> Store for T where T: RoleStore + UserStore + Send + Sync {}
