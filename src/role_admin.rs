use crate::audit::{AuditAction, AuditRecord, AuditSink, NoAuditSink};
use crate::cache::{Cache, NoCache};
use crate::error::{Error, Result};
use crate::permission::PermissionRegistry;
use crate::role::{Role, RoleDraft, RolePatch};
use crate::store::Store;
use crate::types::{RoleId, RoleName, UserId};
use crate::user::RoleHistoryEntry;
use chrono::Utc;

/// Role administration workflow.
///
/// Every mutation completes its cache invalidation before returning, so a
/// permission check issued after the call observes the new state. Audit
/// writes are best-effort and never roll back the primary mutation.
#[derive(Debug)]
pub struct RoleAdmin<S, C = NoCache, L = NoAuditSink> {
    store: S,
    cache: C,
    audit: L,
    registry: PermissionRegistry,
}

/// Builder for [`RoleAdmin`].
pub struct RoleAdminBuilder<S, C = NoCache, L = NoAuditSink> {
    store: S,
    cache: C,
    audit: L,
    registry: PermissionRegistry,
}

impl<S> RoleAdminBuilder<S, NoCache, NoAuditSink> {
    /// Creates a builder with no cache, no audit sink and the default
    /// commerce permission registry.
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: NoCache,
            audit: NoAuditSink,
            registry: PermissionRegistry::default(),
        }
    }
}

impl<S, C, L> RoleAdminBuilder<S, C, L> {
    /// Sets the cache to invalidate on mutations.
    pub fn cache<C2: Cache>(self, cache: C2) -> RoleAdminBuilder<S, C2, L> {
        RoleAdminBuilder {
            store: self.store,
            cache,
            audit: self.audit,
            registry: self.registry,
        }
    }

    /// Sets the audit sink.
    pub fn audit<L2: AuditSink>(self, audit: L2) -> RoleAdminBuilder<S, C, L2> {
        RoleAdminBuilder {
            store: self.store,
            cache: self.cache,
            audit,
            registry: self.registry,
        }
    }

    /// Overrides the permission registry.
    pub fn registry(mut self, registry: PermissionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Builds the service.
    pub fn build(self) -> RoleAdmin<S, C, L> {
        RoleAdmin {
            store: self.store,
            cache: self.cache,
            audit: self.audit,
            registry: self.registry,
        }
    }
}

impl<S, C, L> RoleAdmin<S, C, L>
where
    S: Store,
    C: Cache,
    L: AuditSink,
{
    /// Creates a non-system role.
    ///
    /// Fails closed before any write: required fields, unique name and
    /// registry validation of every permission.
    pub async fn create(&self, draft: RoleDraft, actor: &UserId) -> Result<Role> {
        draft.validate()?;
        for permission in &draft.permissions {
            self.registry.validate(permission)?;
        }
        if self
            .store
            .role_by_name(&draft.name)
            .await
            .map_err(Error::from)?
            .is_some()
        {
            return Err(Error::DuplicateRole(draft.name));
        }

        let role = self
            .store
            .create_role(draft, false)
            .await
            .map_err(Error::from)?;

        self.audit
            .record(
                AuditRecord::new(actor.clone(), AuditAction::CreateRole, "role")
                    .resource_id(role.id.as_str())
                    .details(format!(
                        "created role {} with permissions {:?}",
                        role.name,
                        permission_names(&role)
                    )),
            )
            .await;
        Ok(role)
    }

    /// Applies a partial update to a role.
    ///
    /// System roles accept only `is_active`; any other patched field
    /// rejects the whole update. Permission changes are registry-validated
    /// first, then propagated to every holder's snapshot, and those users'
    /// cache entries are invalidated before this returns.
    pub async fn update(&self, id: &RoleId, patch: RolePatch, actor: &UserId) -> Result<Role> {
        let before = self
            .store
            .role_by_id(id)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::not_found("role", id.as_str()))?;

        if before.is_system_role
            && let Some(field) = patch.system_role_violation()
        {
            return Err(Error::SystemRoleProtected {
                role: before.name,
                field,
            });
        }
        if let Some(permissions) = &patch.permissions {
            for permission in permissions {
                self.registry.validate(permission)?;
            }
        }

        let mut after = before.clone();
        if let Some(display_name) = patch.display_name {
            after.display_name = display_name;
        }
        if let Some(description) = patch.description {
            after.description = description;
        }
        if let Some(priority) = patch.priority {
            after.priority = priority;
        }
        if let Some(is_active) = patch.is_active {
            after.is_active = is_active;
        }
        let permissions_changed = match patch.permissions {
            Some(permissions) => {
                after.permissions = permissions;
                after.permissions != before.permissions
            }
            None => false,
        };

        self.store
            .update_role(after.clone())
            .await
            .map_err(Error::from)?;

        if permissions_changed {
            let affected = self
                .store
                .refresh_role_snapshots(&after.name, &after.permissions)
                .await
                .map_err(Error::from)?;
            for user in &affected {
                self.cache.invalidate_user(user).await;
            }
            tracing::debug!(
                role = %after.name,
                users = affected.len(),
                "role permissions propagated"
            );
        }

        self.audit
            .record(
                AuditRecord::new(actor.clone(), AuditAction::UpdateRole, "role")
                    .resource_id(after.id.as_str())
                    .details(format!(
                        "permissions: {:?} -> {:?}; active: {} -> {}",
                        permission_names(&before),
                        permission_names(&after),
                        before.is_active,
                        after.is_active
                    )),
            )
            .await;
        Ok(after)
    }

    /// Deletes a role.
    ///
    /// System roles never delete; a role with assigned users reports the
    /// count. The audit entry is written before the record is removed.
    pub async fn delete(&self, id: &RoleId, actor: &UserId) -> Result<()> {
        let role = self
            .store
            .role_by_id(id)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::not_found("role", id.as_str()))?;

        if role.is_system_role {
            return Err(Error::SystemRoleDeletion(role.name));
        }
        let user_count = self
            .store
            .count_users_with_role(&role.name)
            .await
            .map_err(Error::from)?;
        if user_count > 0 {
            return Err(Error::RoleInUse {
                role: role.name,
                user_count,
            });
        }

        self.audit
            .record(
                AuditRecord::new(actor.clone(), AuditAction::DeleteRole, "role")
                    .resource_id(role.id.as_str())
                    .details(format!("deleted role {}", role.name)),
            )
            .await;
        self.store.delete_role(id).await.map_err(Error::from)
    }

    /// Assigns a role to a user.
    ///
    /// Copies the role's permission list onto the user's snapshot, appends
    /// role history, touches the role's assignment metadata and
    /// invalidates the user's cache before returning.
    pub async fn assign(
        &self,
        user: &UserId,
        role_name: &RoleName,
        actor: &UserId,
        reason: Option<String>,
    ) -> Result<()> {
        let record = self
            .store
            .user(user)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::not_found("user", user.as_str()))?;
        let mut role = self
            .store
            .role_by_name(role_name)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::not_found("role", role_name.as_str()))?;
        if !role.is_active {
            return Err(Error::RoleInactive(role.name));
        }

        let now = Utc::now();
        let history = RoleHistoryEntry {
            role: role.name.clone(),
            assigned_by: actor.clone(),
            assigned_at: now,
            reason,
        };
        self.store
            .apply_role_assignment(user, history, role.permissions.clone())
            .await
            .map_err(Error::from)?;

        role.metadata.last_assigned = Some(now);
        role.metadata.user_count = self
            .store
            .count_users_with_role(&role.name)
            .await
            .map_err(Error::from)?;
        self.store
            .update_role(role.clone())
            .await
            .map_err(Error::from)?;

        self.cache.invalidate_user(user).await;

        self.audit
            .record(
                AuditRecord::new(actor.clone(), AuditAction::AssignRole, "user")
                    .resource_id(user.as_str())
                    .details(format!(
                        "role: {} -> {}; permissions: {:?} -> {:?}",
                        record.role,
                        role.name,
                        record
                            .permissions
                            .iter()
                            .map(|p| p.as_str())
                            .collect::<Vec<_>>(),
                        role.permissions
                            .iter()
                            .map(|p| p.as_str())
                            .collect::<Vec<_>>()
                    )),
            )
            .await;
        Ok(())
    }

    /// Lists roles, highest priority first.
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<Role>> {
        self.store
            .list_roles(include_inactive)
            .await
            .map_err(Error::from)
    }
}

fn permission_names(role: &Role) -> Vec<&str> {
    role.permissions.iter().map(|p| p.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditFilter, AuditTrail};
    use crate::store::UserStore;
    use crate::test_support::{
        FailingAuditLog, TestAuditLog, TestCache, TestStore, perm, role_name, user_id,
    };
    use crate::user::UserRecord;
    use futures::executor::block_on;

    fn admin_with(
        store: TestStore,
        log: TestAuditLog,
    ) -> RoleAdmin<TestStore, NoCache, AuditTrail<TestAuditLog>> {
        RoleAdminBuilder::new(store)
            .audit(AuditTrail::new(log))
            .build()
    }

    fn draft(name: &str, perms: &[&str]) -> RoleDraft {
        RoleDraft::new(role_name(name), "Warehouse Clerk")
            .permissions(perms.iter().map(|p| perm(p)).collect())
    }

    #[test]
    fn create_should_persist_and_audit() {
        let store = TestStore::new();
        let log = TestAuditLog::new();
        let admin = admin_with(store.clone(), log.clone());

        let role = block_on(admin.create(
            draft("warehouse_clerk", &["products.read"]),
            &user_id("admin_1"),
        ))
        .unwrap();
        assert!(!role.is_system_role);
        assert!(role.is_active);

        let entries =
            block_on(AuditTrail::new(log).query(&AuditFilter::default())).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::CreateRole);
    }

    #[test]
    fn create_should_reject_duplicate_name() {
        let store = TestStore::new();
        store.add_role_named("warehouse_clerk", &[], true, false);
        let admin = admin_with(store, TestAuditLog::new());

        let result = block_on(admin.create(draft("warehouse_clerk", &[]), &user_id("admin_1")));
        assert!(matches!(result, Err(Error::DuplicateRole(_))));
    }

    #[test]
    fn create_should_reject_unregistered_permission() {
        let admin = admin_with(TestStore::new(), TestAuditLog::new());

        let result = block_on(admin.create(
            draft("warehouse_clerk", &["warehouse.read"]),
            &user_id("admin_1"),
        ));
        assert!(matches!(result, Err(Error::InvalidPermission(_))));
    }

    #[test]
    fn create_should_reject_blank_display_name_before_any_write() {
        let store = TestStore::new();
        let admin = admin_with(store.clone(), TestAuditLog::new());

        let mut bad = draft("warehouse_clerk", &[]);
        bad.display_name = "  ".to_string();
        assert!(matches!(
            block_on(admin.create(bad, &user_id("admin_1"))),
            Err(Error::Validation(_))
        ));
        assert!(block_on(admin.list(true)).unwrap().is_empty());
    }

    #[test]
    fn update_should_reject_protected_fields_on_system_roles() {
        let store = TestStore::new();
        let role = store.add_role_named("admin", &["*"], true, true);
        let admin = admin_with(store.clone(), TestAuditLog::new());

        let patch = RolePatch {
            permissions: Some(vec![perm("products.read")]),
            ..RolePatch::default()
        };
        let result = block_on(admin.update(&role.id, patch, &user_id("admin_1")));
        assert!(matches!(
            result,
            Err(Error::SystemRoleProtected {
                field: "permissions",
                ..
            })
        ));

        // Nothing was applied.
        let unchanged = block_on(admin.list(true)).unwrap();
        assert_eq!(unchanged[0].permissions, vec![perm("*")]);
    }

    #[test]
    fn update_should_allow_deactivating_system_roles() {
        let store = TestStore::new();
        let role = store.add_role_named("admin", &["*"], true, true);
        let admin = admin_with(store, TestAuditLog::new());

        let patch = RolePatch {
            is_active: Some(false),
            ..RolePatch::default()
        };
        let updated = block_on(admin.update(&role.id, patch, &user_id("admin_1"))).unwrap();
        assert!(!updated.is_active);
    }

    #[test]
    fn update_should_propagate_permissions_and_invalidate_holders() {
        let store = TestStore::new();
        let role = store.add_role_named("warehouse_clerk", &["products.read"], true, false);
        let mut holder = UserRecord::new(user_id("user_1"), role_name("warehouse_clerk"));
        holder.permissions = vec![perm("products.read")];
        store.add_user(holder);

        let cache = TestCache::new();
        block_on(crate::cache::Cache::set_decision(
            &cache,
            &user_id("user_1"),
            &perm("products.update"),
            false,
        ));

        let admin = RoleAdminBuilder::new(store.clone())
            .cache(cache.clone())
            .build();
        let patch = RolePatch {
            permissions: Some(vec![perm("products.read"), perm("products.update")]),
            ..RolePatch::default()
        };
        block_on(admin.update(&role.id, patch, &user_id("admin_1"))).unwrap();

        let refreshed = block_on(store.user(&user_id("user_1"))).unwrap().unwrap();
        assert_eq!(
            refreshed.permissions,
            vec![perm("products.read"), perm("products.update")]
        );
        assert_eq!(
            block_on(crate::cache::Cache::get_decision(
                &cache,
                &user_id("user_1"),
                &perm("products.update"),
            )),
            None
        );
    }

    #[test]
    fn update_should_fail_for_unknown_role() {
        let admin = admin_with(TestStore::new(), TestAuditLog::new());
        let result = block_on(admin.update(
            &crate::types::RoleId::from_string("role_404".to_string()),
            RolePatch::default(),
            &user_id("admin_1"),
        ));
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn delete_should_reject_system_roles() {
        let store = TestStore::new();
        let role = store.add_role_named("admin", &["*"], true, true);
        let admin = admin_with(store, TestAuditLog::new());

        let result = block_on(admin.delete(&role.id, &user_id("admin_1")));
        assert!(matches!(result, Err(Error::SystemRoleDeletion(_))));
    }

    #[test]
    fn delete_should_report_assigned_user_count() {
        let store = TestStore::new();
        let role = store.add_role_named("warehouse_clerk", &[], true, false);
        store.add_user(UserRecord::new(user_id("user_1"), role_name("warehouse_clerk")));
        store.add_user(UserRecord::new(user_id("user_2"), role_name("warehouse_clerk")));
        let admin = admin_with(store, TestAuditLog::new());

        let result = block_on(admin.delete(&role.id, &user_id("admin_1")));
        match result {
            Err(Error::RoleInUse { user_count, .. }) => assert_eq!(user_count, 2),
            other => panic!("expected RoleInUse, got {other:?}"),
        }
    }

    #[test]
    fn delete_should_remove_unreferenced_role_and_audit() {
        let store = TestStore::new();
        let role = store.add_role_named("warehouse_clerk", &[], true, false);
        let log = TestAuditLog::new();
        let admin = admin_with(store, log.clone());

        block_on(admin.delete(&role.id, &user_id("admin_1"))).unwrap();
        assert!(block_on(admin.list(true)).unwrap().is_empty());

        let entries =
            block_on(AuditTrail::new(log).query(&AuditFilter::default())).unwrap();
        assert_eq!(entries[0].action, AuditAction::DeleteRole);
    }

    #[test]
    fn assign_should_copy_snapshot_history_and_metadata() {
        let store = TestStore::new();
        store.add_role_named(
            "inventory_manager",
            &["products.read", "products.update"],
            true,
            false,
        );
        store.add_user(UserRecord::new(user_id("user_1"), role_name("customer")));
        let log = TestAuditLog::new();
        let admin = admin_with(store.clone(), log.clone());

        block_on(admin.assign(
            &user_id("user_1"),
            &role_name("inventory_manager"),
            &user_id("admin_1"),
            Some("promotion".to_string()),
        ))
        .unwrap();

        let user = block_on(store.user(&user_id("user_1"))).unwrap().unwrap();
        assert_eq!(user.role, role_name("inventory_manager"));
        assert_eq!(
            user.permissions,
            vec![perm("products.read"), perm("products.update")]
        );
        assert_eq!(user.role_history.len(), 1);
        assert_eq!(user.role_history[0].assigned_by, user_id("admin_1"));
        assert_eq!(user.role_history[0].reason.as_deref(), Some("promotion"));

        let roles = block_on(admin.list(true)).unwrap();
        let role = roles
            .iter()
            .find(|r| r.name == role_name("inventory_manager"))
            .unwrap();
        assert!(role.metadata.last_assigned.is_some());
        assert_eq!(role.metadata.user_count, 1);

        let entries =
            block_on(AuditTrail::new(log).query(&AuditFilter::default())).unwrap();
        assert_eq!(entries[0].action, AuditAction::AssignRole);
        assert!(entries[0].details.as_deref().unwrap().contains("customer"));
    }

    #[test]
    fn assign_should_reject_inactive_role() {
        let store = TestStore::new();
        store.add_role_named("warehouse_clerk", &[], false, false);
        store.add_user(UserRecord::new(user_id("user_1"), role_name("customer")));
        let admin = admin_with(store, TestAuditLog::new());

        let result = block_on(admin.assign(
            &user_id("user_1"),
            &role_name("warehouse_clerk"),
            &user_id("admin_1"),
            None,
        ));
        assert!(matches!(result, Err(Error::RoleInactive(_))));
    }

    #[test]
    fn assign_should_fail_for_unknown_user_or_role() {
        let store = TestStore::new();
        store.add_role_named("warehouse_clerk", &[], true, false);
        let admin = admin_with(store.clone(), TestAuditLog::new());

        let missing_user = block_on(admin.assign(
            &user_id("ghost"),
            &role_name("warehouse_clerk"),
            &user_id("admin_1"),
            None,
        ));
        assert!(matches!(missing_user, Err(Error::NotFound { .. })));

        store.add_user(UserRecord::new(user_id("user_1"), role_name("customer")));
        let missing_role = block_on(admin.assign(
            &user_id("user_1"),
            &role_name("ghost_role"),
            &user_id("admin_1"),
            None,
        ));
        assert!(matches!(missing_role, Err(Error::NotFound { .. })));
    }

    #[test]
    fn audit_failure_should_not_abort_the_mutation() {
        let store = TestStore::new();
        let admin = RoleAdminBuilder::new(store)
            .audit(AuditTrail::new(FailingAuditLog))
            .build();

        let role = block_on(admin.create(
            draft("warehouse_clerk", &["products.read"]),
            &user_id("admin_1"),
        ))
        .unwrap();
        assert_eq!(role.name, role_name("warehouse_clerk"));
    }
}
