//! Shared in-memory fixtures for unit tests.

use std::collections::HashMap;
use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::{AuditEntry, AuditFilter};
use crate::cache::Cache;
use crate::error::StoreError;
use crate::permission::Permission;
use crate::role::{Role, RoleDraft, RoleMetadata};
use crate::store::{AuditStore, RoleStore, UserStore};
use crate::types::{RoleId, RoleName, UserId};
use crate::user::{RoleHistoryEntry, UserRecord};

pub(crate) fn perm(value: &str) -> Permission {
    Permission::new(value).unwrap()
}

pub(crate) fn user_id(value: &str) -> UserId {
    UserId::new(value).unwrap()
}

pub(crate) fn role_name(value: &str) -> RoleName {
    RoleName::new(value).unwrap()
}

/// Role/user store fixture.
#[derive(Debug, Default, Clone)]
pub(crate) struct TestStore {
    roles: Arc<RwLock<HashMap<RoleId, Role>>>,
    users: Arc<RwLock<HashMap<UserId, UserRecord>>>,
    seq: Arc<AtomicU64>,
}

impl TestStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_user(&self, user: UserRecord) {
        self.users
            .write()
            .expect("poisoned lock")
            .insert(user.id.clone(), user);
    }

    pub(crate) fn add_role(&self, role: Role) {
        self.roles
            .write()
            .expect("poisoned lock")
            .insert(role.id.clone(), role);
    }

    pub(crate) fn add_role_named(
        &self,
        name: &str,
        permissions: &[&str],
        is_active: bool,
        is_system_role: bool,
    ) -> Role {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let role = Role {
            id: RoleId::from_string(format!("role_{seq}")),
            name: role_name(name),
            display_name: name.replace('_', " "),
            description: String::new(),
            permissions: permissions.iter().map(|p| perm(p)).collect(),
            priority: 50,
            is_system_role,
            is_active,
            metadata: RoleMetadata::default(),
        };
        self.add_role(role.clone());
        role
    }
}

#[async_trait]
impl RoleStore for TestStore {
    async fn role_by_id(&self, id: &RoleId) -> std::result::Result<Option<Role>, StoreError> {
        Ok(self.roles.read().expect("poisoned lock").get(id).cloned())
    }

    async fn role_by_name(
        &self,
        name: &RoleName,
    ) -> std::result::Result<Option<Role>, StoreError> {
        Ok(self
            .roles
            .read()
            .expect("poisoned lock")
            .values()
            .find(|role| &role.name == name)
            .cloned())
    }

    async fn create_role(
        &self,
        draft: RoleDraft,
        is_system_role: bool,
    ) -> std::result::Result<Role, StoreError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let role = Role {
            id: RoleId::from_string(format!("role_{seq}")),
            name: draft.name,
            display_name: draft.display_name,
            description: draft.description,
            permissions: draft.permissions,
            priority: draft.priority,
            is_system_role,
            is_active: draft.is_active,
            metadata: RoleMetadata::default(),
        };
        self.add_role(role.clone());
        Ok(role)
    }

    async fn update_role(&self, role: Role) -> std::result::Result<(), StoreError> {
        self.add_role(role);
        Ok(())
    }

    async fn delete_role(&self, id: &RoleId) -> std::result::Result<(), StoreError> {
        self.roles.write().expect("poisoned lock").remove(id);
        Ok(())
    }

    async fn list_roles(
        &self,
        include_inactive: bool,
    ) -> std::result::Result<Vec<Role>, StoreError> {
        let guard = self.roles.read().expect("poisoned lock");
        let mut roles: Vec<Role> = guard
            .values()
            .filter(|role| include_inactive || role.is_active)
            .cloned()
            .collect();
        roles.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.name.cmp(&b.name)));
        Ok(roles)
    }
}

#[async_trait]
impl UserStore for TestStore {
    async fn user(
        &self,
        id: &UserId,
    ) -> std::result::Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().expect("poisoned lock").get(id).cloned())
    }

    async fn save_permission_snapshot(
        &self,
        id: &UserId,
        permissions: Vec<Permission>,
    ) -> std::result::Result<(), StoreError> {
        if let Some(user) = self.users.write().expect("poisoned lock").get_mut(id) {
            user.permissions = permissions;
        }
        Ok(())
    }

    async fn users_with_role(
        &self,
        role: &RoleName,
    ) -> std::result::Result<Vec<UserId>, StoreError> {
        Ok(self
            .users
            .read()
            .expect("poisoned lock")
            .values()
            .filter(|user| &user.role == role)
            .map(|user| user.id.clone())
            .collect())
    }

    async fn count_users_with_role(
        &self,
        role: &RoleName,
    ) -> std::result::Result<u64, StoreError> {
        Ok(self
            .users
            .read()
            .expect("poisoned lock")
            .values()
            .filter(|user| &user.role == role)
            .count() as u64)
    }

    async fn refresh_role_snapshots(
        &self,
        role: &RoleName,
        permissions: &[Permission],
    ) -> std::result::Result<Vec<UserId>, StoreError> {
        let mut guard = self.users.write().expect("poisoned lock");
        let mut affected = Vec::new();
        for user in guard.values_mut() {
            if &user.role == role {
                user.permissions = permissions.to_vec();
                affected.push(user.id.clone());
            }
        }
        Ok(affected)
    }

    async fn apply_role_assignment(
        &self,
        id: &UserId,
        entry: RoleHistoryEntry,
        permissions: Vec<Permission>,
    ) -> std::result::Result<(), StoreError> {
        let mut guard = self.users.write().expect("poisoned lock");
        let Some(user) = guard.get_mut(id) else {
            return Err(format!("user not found: {id}").into());
        };
        user.role = entry.role.clone();
        user.permissions = permissions;
        user.role_history.push(entry);
        Ok(())
    }
}

/// Audit store fixture.
#[derive(Debug, Default, Clone)]
pub(crate) struct TestAuditLog {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
    seq: Arc<AtomicU64>,
}

impl TestAuditLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for TestAuditLog {
    async fn append(
        &self,
        mut entry: AuditEntry,
    ) -> std::result::Result<AuditEntry, StoreError> {
        entry.id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries
            .write()
            .expect("poisoned lock")
            .push(entry.clone());
        Ok(entry)
    }

    async fn query(
        &self,
        filter: &AuditFilter,
    ) -> std::result::Result<Vec<AuditEntry>, StoreError> {
        let guard = self.entries.read().expect("poisoned lock");
        let mut matched: Vec<AuditEntry> = guard
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        let matched: Vec<AuditEntry> = matched.into_iter().skip(filter.offset).collect();
        Ok(match filter.limit {
            Some(limit) => matched.into_iter().take(limit).collect(),
            None => matched,
        })
    }

    async fn count(&self, filter: &AuditFilter) -> std::result::Result<u64, StoreError> {
        let guard = self.entries.read().expect("poisoned lock");
        Ok(guard.iter().filter(|entry| filter.matches(entry)).count() as u64)
    }

    async fn mark_reviewed(
        &self,
        id: u64,
        reviewer: &UserId,
        at: DateTime<Utc>,
    ) -> std::result::Result<bool, StoreError> {
        let mut guard = self.entries.write().expect("poisoned lock");
        let Some(entry) = guard.iter_mut().find(|entry| entry.id == id) else {
            return Ok(false);
        };
        entry.reviewed = true;
        entry.reviewed_by = Some(reviewer.clone());
        entry.reviewed_at = Some(at);
        Ok(true)
    }

    async fn delete_expired(
        &self,
        now: DateTime<Utc>,
    ) -> std::result::Result<u64, StoreError> {
        let mut guard = self.entries.write().expect("poisoned lock");
        let before = guard.len();
        guard.retain(|entry| entry.retention_date > now);
        Ok((before - guard.len()) as u64)
    }

    async fn delete_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> std::result::Result<u64, StoreError> {
        let mut guard = self.entries.write().expect("poisoned lock");
        let before = guard.len();
        guard.retain(|entry| entry.timestamp >= cutoff);
        Ok((before - guard.len()) as u64)
    }
}

/// Audit store that fails every append, for best-effort-boundary tests.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FailingAuditLog;

#[async_trait]
impl AuditStore for FailingAuditLog {
    async fn append(&self, _entry: AuditEntry) -> std::result::Result<AuditEntry, StoreError> {
        Err("audit backend unavailable".into())
    }

    async fn query(
        &self,
        _filter: &AuditFilter,
    ) -> std::result::Result<Vec<AuditEntry>, StoreError> {
        Err("audit backend unavailable".into())
    }

    async fn count(&self, _filter: &AuditFilter) -> std::result::Result<u64, StoreError> {
        Err("audit backend unavailable".into())
    }

    async fn mark_reviewed(
        &self,
        _id: u64,
        _reviewer: &UserId,
        _at: DateTime<Utc>,
    ) -> std::result::Result<bool, StoreError> {
        Err("audit backend unavailable".into())
    }

    async fn delete_expired(
        &self,
        _now: DateTime<Utc>,
    ) -> std::result::Result<u64, StoreError> {
        Err("audit backend unavailable".into())
    }

    async fn delete_before(
        &self,
        _cutoff: DateTime<Utc>,
    ) -> std::result::Result<u64, StoreError> {
        Err("audit backend unavailable".into())
    }
}

/// Cache fixture without TTL, for invalidation-behavior tests.
#[derive(Debug, Default, Clone)]
pub(crate) struct TestCache {
    permissions: Arc<RwLock<HashMap<UserId, Vec<Permission>>>>,
    decisions: Arc<RwLock<HashMap<(UserId, Permission), bool>>>,
}

impl TestCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for TestCache {
    async fn get_permissions(&self, user: &UserId) -> Option<Vec<Permission>> {
        self.permissions
            .read()
            .expect("poisoned lock")
            .get(user)
            .cloned()
    }

    async fn set_permissions(&self, user: &UserId, perms: Vec<Permission>) {
        self.permissions
            .write()
            .expect("poisoned lock")
            .insert(user.clone(), perms);
    }

    async fn get_decision(&self, user: &UserId, permission: &Permission) -> Option<bool> {
        self.decisions
            .read()
            .expect("poisoned lock")
            .get(&(user.clone(), permission.clone()))
            .copied()
    }

    async fn set_decision(&self, user: &UserId, permission: &Permission, allowed: bool) {
        self.decisions
            .write()
            .expect("poisoned lock")
            .insert((user.clone(), permission.clone()), allowed);
    }

    async fn invalidate_user(&self, user: &UserId) {
        self.permissions.write().expect("poisoned lock").remove(user);
        self.decisions
            .write()
            .expect("poisoned lock")
            .retain(|(owner, _), _| owner != user);
    }

    async fn invalidate_all(&self) {
        self.permissions.write().expect("poisoned lock").clear();
        self.decisions.write().expect("poisoned lock").clear();
    }
}
