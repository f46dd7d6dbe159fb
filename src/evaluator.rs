use crate::audit::{AuditAction, AuditRecord, AuditSink, NoAuditSink, Outcome, RequestContext};
use crate::cache::{Cache, NoCache};
use crate::error::{Error, Result};
use crate::permission::{Permission, PermissionRegistry, matches};
use crate::role::builtin_role_permissions;
use crate::store::Store;
use crate::types::UserId;

/// Authorization decision.
///
/// A denial is a value, never an error: callers translate `Deny` into a
/// rejection response and call [`Evaluator::log_denied`] themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Permission is granted.
    Allow,
    /// Permission is denied.
    Deny,
}

impl Decision {
    fn from_bool(allowed: bool) -> Self {
        if allowed { Self::Allow } else { Self::Deny }
    }

    /// Whether the decision grants access.
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Permission evaluator with pluggable store, cache and audit sink.
///
/// Resolution order on a cache miss: user snapshot, then role record,
/// then the builtin default-role table, then wildcard matching.
#[derive(Debug)]
pub struct Evaluator<S, C = NoCache, L = NoAuditSink> {
    store: S,
    cache: C,
    audit: L,
    registry: PermissionRegistry,
}

/// Builder for [`Evaluator`].
pub struct EvaluatorBuilder<S, C = NoCache, L = NoAuditSink> {
    store: S,
    cache: C,
    audit: L,
    registry: PermissionRegistry,
}

impl<S> EvaluatorBuilder<S, NoCache, NoAuditSink> {
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

impl<S, C, L> EvaluatorBuilder<S, C, L> {
    /// Sets the cache implementation.
    pub fn cache<C2: Cache>(self, cache: C2) -> EvaluatorBuilder<S, C2, L> {
        EvaluatorBuilder {
            store: self.store,
            cache,
            audit: self.audit,
            registry: self.registry,
        }
    }

    /// Sets the audit sink used by [`Evaluator::log_denied`].
    pub fn audit<L2: AuditSink>(self, audit: L2) -> EvaluatorBuilder<S, C, L2> {
        EvaluatorBuilder {
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

    /// Builds the evaluator.
    pub fn build(self) -> Evaluator<S, C, L> {
        Evaluator {
            store: self.store,
            cache: self.cache,
            audit: self.audit,
            registry: self.registry,
        }
    }
}

impl<S, C, L> Evaluator<S, C, L>
where
    S: Store,
    C: Cache,
    L: AuditSink,
{
    /// Checks whether a user holds a permission.
    ///
    /// Malformed or unregistered permission strings are denied (and
    /// logged) without touching the store. Boolean results are cached per
    /// (user, permission).
    pub async fn check(&self, user: &UserId, permission: &Permission) -> Result<Decision> {
        if let Err(error) = self.registry.validate(permission) {
            tracing::warn!(%permission, %error, "permission rejected before evaluation");
            return Ok(Decision::Deny);
        }

        if let Some(allowed) = self.cache.get_decision(user, permission).await {
            return Ok(Decision::from_bool(allowed));
        }

        let granted = self.user_permissions(user).await?;
        let allowed = granted.iter().any(Permission::is_global_wildcard)
            || granted.iter().any(|g| g == permission)
            || granted
                .iter()
                .any(|g| g.is_resource_wildcard() && matches(permission, g));

        self.cache.set_decision(user, permission, allowed).await;
        Ok(Decision::from_bool(allowed))
    }

    /// Checks that the user holds every permission in the list.
    ///
    /// Each permission is evaluated independently so all of them benefit
    /// from the cache. An empty list is always denied.
    pub async fn check_all(&self, user: &UserId, permissions: &[Permission]) -> Result<Decision> {
        if permissions.is_empty() {
            return Ok(Decision::Deny);
        }
        for permission in permissions {
            if !self.check(user, permission).await?.is_allow() {
                return Ok(Decision::Deny);
            }
        }
        Ok(Decision::Allow)
    }

    /// Checks that the user holds at least one permission in the list.
    /// An empty list is always denied.
    pub async fn check_any(&self, user: &UserId, permissions: &[Permission]) -> Result<Decision> {
        for permission in permissions {
            if self.check(user, permission).await?.is_allow() {
                return Ok(Decision::Allow);
            }
        }
        Ok(Decision::Deny)
    }

    /// Resolves the user's effective permission set.
    ///
    /// A non-empty stored snapshot is authoritative. Otherwise the role's
    /// permission list is materialized onto the user (with the builtin
    /// default-role table as the bootstrapping fallback) and cached.
    pub async fn user_permissions(&self, user: &UserId) -> Result<Vec<Permission>> {
        if let Some(perms) = self.cache.get_permissions(user).await {
            return Ok(perms);
        }

        let record = self
            .store
            .user(user)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::not_found("user", user.as_str()))?;

        let perms = if !record.permissions.is_empty() {
            record.permissions
        } else {
            let role_perms = match self
                .store
                .role_by_name(&record.role)
                .await
                .map_err(Error::from)?
            {
                Some(role) => role.permissions,
                None => builtin_role_permissions(&record.role).unwrap_or_default(),
            };
            self.store
                .save_permission_snapshot(user, role_perms.clone())
                .await
                .map_err(Error::from)?;
            role_perms
        };

        self.cache.set_permissions(user, perms.clone()).await;
        Ok(perms)
    }

    /// Records a denial as an UNAUTHORIZED_ACCESS audit entry.
    ///
    /// Best-effort; the sink swallows persistence failures. Callers invoke
    /// this after translating a `Deny` into a rejection.
    pub async fn log_denied(
        &self,
        user: &UserId,
        permission: &Permission,
        context: RequestContext,
    ) {
        let record = AuditRecord::new(user.clone(), AuditAction::UnauthorizedAccess, "permission")
            .resource_id(permission.as_str())
            .context(context)
            .outcome(Outcome::failed(
                403,
                0,
                format!("missing permission: {permission}"),
            ));
        self.audit.record(record).await;
    }

    /// Invalidates all cached state for a user.
    pub async fn invalidate_user(&self, user: &UserId) {
        self.cache.invalidate_user(user).await;
    }
}
