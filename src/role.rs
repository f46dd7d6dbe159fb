use crate::error::{Error, Result};
use crate::permission::Permission;
use crate::types::{RoleId, RoleName};
use chrono::{DateTime, Utc};

/// Display-ordering bounds for [`Role::priority`]. Priority never resolves
/// conflicting grants; a user holds exactly one role.
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 100;

/// Derived role bookkeeping. `user_count` is informational, never
/// authoritative; deletion checks always recount from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RoleMetadata {
    pub user_count: u64,
    pub last_assigned: Option<DateTime<Utc>>,
}

/// A named, ordered bundle of permissions assignable to a user.
///
/// Plain data record; all behavior lives in [`crate::RoleAdmin`] and the
/// evaluator. System role names never change once persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Role {
    pub id: RoleId,
    pub name: RoleName,
    pub display_name: String,
    pub description: String,
    pub permissions: Vec<Permission>,
    pub priority: u8,
    pub is_system_role: bool,
    pub is_active: bool,
    pub metadata: RoleMetadata,
}

/// Input for role creation; the store assigns the id.
#[derive(Debug, Clone)]
pub struct RoleDraft {
    pub name: RoleName,
    pub display_name: String,
    pub description: String,
    pub permissions: Vec<Permission>,
    pub priority: u8,
    pub is_active: bool,
}

impl RoleDraft {
    /// Creates a draft with defaults (priority 50, active, no permissions).
    pub fn new(name: RoleName, display_name: impl Into<String>) -> Self {
        Self {
            name,
            display_name: display_name.into(),
            description: String::new(),
            permissions: Vec::new(),
            priority: 50,
            is_active: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Checks required fields and bounds. Permission grammar and registry
    /// validation happen separately in the admin workflow.
    pub fn validate(&self) -> Result<()> {
        if self.display_name.trim().is_empty() {
            return Err(Error::Validation(
                "display_name must not be empty".to_string(),
            ));
        }
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&self.priority) {
            return Err(Error::Validation(format!(
                "priority must be between {MIN_PRIORITY} and {MAX_PRIORITY}"
            )));
        }
        Ok(())
    }
}

/// Partial update for an existing role. `None` fields are left untouched.
///
/// For system roles every field except `is_active` is rejected outright;
/// the update is never partially applied.
#[derive(Debug, Clone, Default)]
pub struct RolePatch {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<Permission>>,
    pub priority: Option<u8>,
    pub is_active: Option<bool>,
}

impl RolePatch {
    /// Returns the first patched field a system role refuses to change.
    pub fn system_role_violation(&self) -> Option<&'static str> {
        if self.display_name.is_some() {
            return Some("display_name");
        }
        if self.description.is_some() {
            return Some("description");
        }
        if self.permissions.is_some() {
            return Some("permissions");
        }
        if self.priority.is_some() {
            return Some("priority");
        }
        None
    }
}

fn builtin(name: &str, display_name: &str, priority: u8, permissions: &[&str]) -> Role {
    Role {
        id: RoleId::from_string(format!("builtin:{name}")),
        name: RoleName::from_string(name.to_string()),
        display_name: display_name.to_string(),
        description: format!("Built-in {display_name} role"),
        permissions: permissions
            .iter()
            .map(|value| Permission::from_string((*value).to_string()))
            .collect(),
        priority,
        is_system_role: true,
        is_active: true,
        metadata: RoleMetadata::default(),
    }
}

/// The fixed default-role table.
///
/// Used to bootstrap an empty store and as the evaluator's fallback when a
/// user's role name has no stored Role record.
pub fn builtin_roles() -> Vec<Role> {
    vec![
        builtin("super_admin", "Super Administrator", 100, &["*"]),
        builtin(
            "admin",
            "Administrator",
            90,
            &[
                "products.*",
                "categories.*",
                "orders.*",
                "carts.*",
                "users.*",
                "roles.*",
                "audit.read",
                "audit.export",
                "settings.*",
                "reports.*",
            ],
        ),
        builtin(
            "order_manager",
            "Order Manager",
            70,
            &["orders.*", "carts.read", "reports.read"],
        ),
        builtin(
            "inventory_manager",
            "Inventory Manager",
            60,
            &["products.read", "products.update", "categories.read"],
        ),
        builtin(
            "support_agent",
            "Support Agent",
            40,
            &["orders.read", "carts.read", "users.read"],
        ),
        builtin("customer", "Customer", 10, &["carts.read"]),
    ]
}

/// Looks up the default permission list for a builtin role name.
pub fn builtin_role_permissions(name: &RoleName) -> Option<Vec<Permission>> {
    builtin_roles()
        .into_iter()
        .find(|role| &role.name == name)
        .map(|role| role.permissions)
}
