use crate::permission::Permission;
use crate::types::UserId;
use async_trait::async_trait;

/// Cache interface for resolved permission state.
///
/// Holds two entry shapes, both TTL-bounded by the implementation: the
/// per-user permission snapshot and per-(user, permission) boolean
/// decisions. Implementations must be safe under concurrent read and
/// invalidate from many in-flight requests.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Gets the cached permission set for a user.
    async fn get_permissions(&self, user: &UserId) -> Option<Vec<Permission>>;

    /// Sets the cached permission set for a user.
    async fn set_permissions(&self, user: &UserId, perms: Vec<Permission>);

    /// Gets a cached allow/deny decision for a (user, permission) pair.
    async fn get_decision(&self, user: &UserId, permission: &Permission) -> Option<bool>;

    /// Sets a cached allow/deny decision for a (user, permission) pair.
    async fn set_decision(&self, user: &UserId, permission: &Permission, allowed: bool);

    /// Removes all entries for a user.
    async fn invalidate_user(&self, user: &UserId);

    /// Clears everything.
    async fn invalidate_all(&self);
}

/// No-op cache implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl Cache for NoCache {
    async fn get_permissions(&self, _user: &UserId) -> Option<Vec<Permission>> {
        None
    }

    async fn set_permissions(&self, _user: &UserId, _perms: Vec<Permission>) {}

    async fn get_decision(&self, _user: &UserId, _permission: &Permission) -> Option<bool> {
        None
    }

    async fn set_decision(&self, _user: &UserId, _permission: &Permission, _allowed: bool) {}

    async fn invalidate_user(&self, _user: &UserId) {}

    async fn invalidate_all(&self) {}
}
