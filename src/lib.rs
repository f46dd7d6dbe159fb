//! Authorization and accountability core for a commerce platform.
//!
//! This crate provides a `resource.action` permission grammar with wildcard
//! grants, a deny-by-default permission evaluator backed by pluggable async
//! stores and an optional decision cache, a role administration workflow with
//! system-role protections, a risk-classified audit trail, and a credential
//! hashing service with legacy-digest migration. Use [`Evaluator`] for
//! permission checks and [`RoleAdmin`] for role lifecycle operations.
//!
//! # Examples
//!
//! Basic permission check using the in-memory store (enable `memory-store`):
//! ```no_run
//! use commerce_authz::{EvaluatorBuilder, Permission, UserId};
//! # #[cfg(feature = "memory-store")]
//! # {
//! use commerce_authz::MemoryStore;
//! let store = MemoryStore::new();
//! store.bootstrap_builtin_roles();
//! let evaluator = EvaluatorBuilder::new(store).build();
//! let user = UserId::try_from("user_1").unwrap();
//! let permission = Permission::try_from("products.read").unwrap();
//! let _ = evaluator.check(&user, &permission);
//! # }
//! ```
//!
//! Creating a process-local decision cache (enable `memory-cache`):
//! ```no_run
//! # #[cfg(feature = "memory-cache")]
//! # {
//! use commerce_authz::MemoryCache;
//! use std::time::Duration;
//! let cache = MemoryCache::new().with_ttl(Duration::from_secs(60));
//! # let _ = cache;
//! # }
//! ```
#![forbid(unsafe_code)]

mod audit;
mod cache;
mod credential;
mod error;
mod evaluator;
mod permission;
mod role;
mod role_admin;
mod store;
mod types;
mod user;

#[cfg(feature = "memory-cache")]
mod memory_cache;

#[cfg(feature = "memory-store")]
mod memory_store;

#[cfg(test)]
mod test_support;

pub use crate::audit::{
    ActionStats, ActorStats, AuditAction, AuditEntry, AuditFilter, AuditRecord, AuditSink,
    AuditTrail, NoAuditSink, Outcome, RequestContext, RetentionDays, RiskConfig, RiskLevel,
};
pub use crate::cache::{Cache, NoCache};
pub use crate::credential::{
    CredentialService, DigestAlgorithm, StoredDigest, parse_digest,
};
pub use crate::error::{CredentialError, Error, Result, StoreError};
pub use crate::evaluator::{Decision, Evaluator, EvaluatorBuilder};
pub use crate::permission::{Permission, PermissionRegistry};
pub use crate::role::{
    Role, RoleDraft, RoleMetadata, RolePatch, builtin_role_permissions, builtin_roles,
};
pub use crate::role_admin::{RoleAdmin, RoleAdminBuilder};
pub use crate::store::{AuditStore, RoleStore, Store, UserStore};
pub use crate::types::{RoleId, RoleName, UserId};
pub use crate::user::{RoleHistoryEntry, UserRecord};

#[cfg(feature = "memory-store")]
pub use crate::memory_store::{MemoryAuditLog, MemoryStore};

#[cfg(feature = "memory-cache")]
pub use crate::memory_cache::{MemoryCache, SweeperHandle};
