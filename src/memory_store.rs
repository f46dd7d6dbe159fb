use std::collections::HashMap;
use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::{AuditEntry, AuditFilter};
use crate::error::StoreError;
use crate::permission::Permission;
use crate::role::{Role, RoleDraft, RoleMetadata, builtin_roles};
use crate::store::{AuditStore, RoleStore, UserStore};
use crate::types::{RoleId, RoleName, UserId};
use crate::user::{RoleHistoryEntry, UserRecord};

/// In-memory role/user store for tests and demos.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    roles: RwLock<HashMap<RoleId, Role>>,
    users: RwLock<HashMap<UserId, UserRecord>>,
    role_seq: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the builtin default-role table. Idempotent by name.
    pub fn bootstrap_builtin_roles(&self) {
        let mut guard = self.inner.roles.write().expect("poisoned lock");
        for role in builtin_roles() {
            let exists = guard.values().any(|existing| existing.name == role.name);
            if !exists {
                guard.insert(role.id.clone(), role);
            }
        }
    }

    /// Seeds a user with an empty permission snapshot.
    pub fn seed_user(&self, id: UserId, role: RoleName) {
        let mut guard = self.inner.users.write().expect("poisoned lock");
        guard.insert(id.clone(), UserRecord::new(id, role));
    }

    /// Seeds a user with an explicit snapshot.
    pub fn seed_user_with_snapshot(
        &self,
        id: UserId,
        role: RoleName,
        permissions: Vec<Permission>,
    ) {
        let mut guard = self.inner.users.write().expect("poisoned lock");
        let mut user = UserRecord::new(id.clone(), role);
        user.permissions = permissions;
        guard.insert(id, user);
    }
}

#[async_trait]
impl RoleStore for MemoryStore {
    async fn role_by_id(&self, id: &RoleId) -> std::result::Result<Option<Role>, StoreError> {
        let guard = self.inner.roles.read().expect("poisoned lock");
        Ok(guard.get(id).cloned())
    }

    async fn role_by_name(
        &self,
        name: &RoleName,
    ) -> std::result::Result<Option<Role>, StoreError> {
        let guard = self.inner.roles.read().expect("poisoned lock");
        Ok(guard.values().find(|role| &role.name == name).cloned())
    }

    async fn create_role(
        &self,
        draft: RoleDraft,
        is_system_role: bool,
    ) -> std::result::Result<Role, StoreError> {
        let seq = self.inner.role_seq.fetch_add(1, Ordering::Relaxed) + 1;
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
        let mut guard = self.inner.roles.write().expect("poisoned lock");
        guard.insert(role.id.clone(), role.clone());
        Ok(role)
    }

    async fn update_role(&self, role: Role) -> std::result::Result<(), StoreError> {
        let mut guard = self.inner.roles.write().expect("poisoned lock");
        guard.insert(role.id.clone(), role);
        Ok(())
    }

    async fn delete_role(&self, id: &RoleId) -> std::result::Result<(), StoreError> {
        let mut guard = self.inner.roles.write().expect("poisoned lock");
        guard.remove(id);
        Ok(())
    }

    async fn list_roles(
        &self,
        include_inactive: bool,
    ) -> std::result::Result<Vec<Role>, StoreError> {
        let guard = self.inner.roles.read().expect("poisoned lock");
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
impl UserStore for MemoryStore {
    async fn user(
        &self,
        id: &UserId,
    ) -> std::result::Result<Option<UserRecord>, StoreError> {
        let guard = self.inner.users.read().expect("poisoned lock");
        Ok(guard.get(id).cloned())
    }

    async fn save_permission_snapshot(
        &self,
        id: &UserId,
        permissions: Vec<Permission>,
    ) -> std::result::Result<(), StoreError> {
        let mut guard = self.inner.users.write().expect("poisoned lock");
        if let Some(user) = guard.get_mut(id) {
            user.permissions = permissions;
        }
        Ok(())
    }

    async fn users_with_role(
        &self,
        role: &RoleName,
    ) -> std::result::Result<Vec<UserId>, StoreError> {
        let guard = self.inner.users.read().expect("poisoned lock");
        Ok(guard
            .values()
            .filter(|user| &user.role == role)
            .map(|user| user.id.clone())
            .collect())
    }

    async fn count_users_with_role(
        &self,
        role: &RoleName,
    ) -> std::result::Result<u64, StoreError> {
        let guard = self.inner.users.read().expect("poisoned lock");
        Ok(guard.values().filter(|user| &user.role == role).count() as u64)
    }

    async fn refresh_role_snapshots(
        &self,
        role: &RoleName,
        permissions: &[Permission],
    ) -> std::result::Result<Vec<UserId>, StoreError> {
        let mut guard = self.inner.users.write().expect("poisoned lock");
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
        let mut guard = self.inner.users.write().expect("poisoned lock");
        let Some(user) = guard.get_mut(id) else {
            return Err(format!("user not found: {id}").into());
        };
        user.role = entry.role.clone();
        user.permissions = permissions;
        user.role_history.push(entry);
        Ok(())
    }
}

/// In-memory audit log for tests and demos.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditLog {
    inner: Arc<AuditInner>,
}

#[derive(Debug, Default)]
struct AuditInner {
    entries: RwLock<Vec<AuditEntry>>,
    seq: AtomicU64,
}

impl MemoryAuditLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total stored entries, unfiltered.
    pub fn len(&self) -> usize {
        self.inner.entries.read().expect("poisoned lock").len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditStore for MemoryAuditLog {
    async fn append(
        &self,
        mut entry: AuditEntry,
    ) -> std::result::Result<AuditEntry, StoreError> {
        entry.id = self.inner.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let mut guard = self.inner.entries.write().expect("poisoned lock");
        guard.push(entry.clone());
        Ok(entry)
    }

    async fn query(
        &self,
        filter: &AuditFilter,
    ) -> std::result::Result<Vec<AuditEntry>, StoreError> {
        let guard = self.inner.entries.read().expect("poisoned lock");
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
        let guard = self.inner.entries.read().expect("poisoned lock");
        Ok(guard.iter().filter(|entry| filter.matches(entry)).count() as u64)
    }

    async fn mark_reviewed(
        &self,
        id: u64,
        reviewer: &UserId,
        at: DateTime<Utc>,
    ) -> std::result::Result<bool, StoreError> {
        let mut guard = self.inner.entries.write().expect("poisoned lock");
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
        let mut guard = self.inner.entries.write().expect("poisoned lock");
        let before = guard.len();
        guard.retain(|entry| entry.retention_date > now);
        Ok((before - guard.len()) as u64)
    }

    async fn delete_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> std::result::Result<u64, StoreError> {
        let mut guard = self.inner.entries.write().expect("poisoned lock");
        let before = guard.len();
        guard.retain(|entry| entry.timestamp >= cutoff);
        Ok((before - guard.len()) as u64)
    }
}
