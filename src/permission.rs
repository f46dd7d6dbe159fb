use crate::error::{Error, Result};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Global wildcard granting every permission.
pub const GLOBAL_WILDCARD: &str = "*";

/// Permission string wrapper (`resource.action`, `resource.*` or `*`).
///
/// Matching is case-sensitive and never normalizes; the grammar only
/// admits lowercase segments in the first place.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Permission(String);

impl Permission {
    /// Parses and validates a permission string.
    ///
    /// Accepts the global wildcard `*`, a per-resource wildcard
    /// `resource.*`, or a concrete `resource.action` pair. Segments are
    /// restricted to `[a-z0-9_]`.
    pub fn new(value: impl AsRef<str>) -> Result<Self> {
        let raw = value.as_ref().trim();
        if raw.is_empty() {
            return Err(Error::InvalidPermission(
                "permission must not be empty".to_string(),
            ));
        }
        if raw == GLOBAL_WILDCARD {
            return Ok(Self(raw.to_string()));
        }
        let Some((resource, action)) = raw.split_once('.') else {
            return Err(Error::InvalidPermission(
                "permission must be in resource.action format".to_string(),
            ));
        };
        if !is_valid_segment(resource) {
            return Err(Error::InvalidPermission(
                "resource segment contains invalid characters".to_string(),
            ));
        }
        if action != "*" && !is_valid_segment(action) {
            return Err(Error::InvalidPermission(
                "action segment contains invalid characters".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Creates a permission from a trusted string without validation.
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the resource segment, or `None` for the global wildcard.
    pub fn resource(&self) -> Option<&str> {
        self.0.split_once('.').map(|(resource, _)| resource)
    }

    /// Returns the action segment, or `None` for the global wildcard.
    pub fn action(&self) -> Option<&str> {
        self.0.split_once('.').map(|(_, action)| action)
    }

    /// Whether this is the global wildcard `*`.
    pub fn is_global_wildcard(&self) -> bool {
        self.0 == GLOBAL_WILDCARD
    }

    /// Whether this is a per-resource wildcard (`resource.*`).
    pub fn is_resource_wildcard(&self) -> bool {
        self.action() == Some("*")
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Permission {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Permission {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Permission {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
}

/// Returns whether a granted permission satisfies a required one.
///
/// Exact equality, the global wildcard, or a per-resource wildcard with a
/// matching resource prefix. Two-segment only; there are no deny rules and
/// no precedence between overlapping grants.
pub fn matches(required: &Permission, granted: &Permission) -> bool {
    if granted.is_global_wildcard() {
        return true;
    }
    if granted == required {
        return true;
    }
    if let Some(prefix) = granted.as_str().strip_suffix(".*") {
        return required.resource() == Some(prefix);
    }
    false
}

/// Closed registry of known `(resource, action)` pairs.
///
/// Permission strings are opaque but never free-form: a concrete permission
/// must name a registered pair, and a per-resource wildcard must name a
/// registered resource, before it is persisted on a role or evaluated.
#[derive(Debug, Clone)]
pub struct PermissionRegistry {
    resources: BTreeMap<String, Vec<String>>,
}

impl Default for PermissionRegistry {
    fn default() -> Self {
        Self::commerce()
    }
}

impl PermissionRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            resources: BTreeMap::new(),
        }
    }

    /// The default commerce permission table.
    pub fn commerce() -> Self {
        Self::empty()
            .with_resource("products", &["read", "create", "update", "delete", "export"])
            .with_resource("categories", &["read", "create", "update", "delete"])
            .with_resource("orders", &["read", "update", "delete", "refund", "export"])
            .with_resource("carts", &["read", "delete"])
            .with_resource("users", &["read", "create", "update", "delete", "export"])
            .with_resource("roles", &["read", "create", "update", "delete", "assign"])
            .with_resource("audit", &["read", "export", "review", "purge"])
            .with_resource("settings", &["read", "update"])
            .with_resource("reports", &["read", "export"])
    }

    /// Registers a resource with its allowed actions.
    pub fn with_resource(mut self, resource: &str, actions: &[&str]) -> Self {
        self.resources.insert(
            resource.to_string(),
            actions.iter().map(|action| action.to_string()).collect(),
        );
        self
    }

    /// Whether a resource is registered.
    pub fn knows_resource(&self, resource: &str) -> bool {
        self.resources.contains_key(resource)
    }

    /// Validates a permission against the registry.
    ///
    /// The global wildcard is always valid; a per-resource wildcard needs a
    /// registered resource; a concrete permission needs a registered pair.
    pub fn validate(&self, permission: &Permission) -> Result<()> {
        if permission.is_global_wildcard() {
            return Ok(());
        }
        let (Some(resource), Some(action)) = (permission.resource(), permission.action()) else {
            return Err(Error::InvalidPermission(format!(
                "unknown permission: {permission}"
            )));
        };
        let Some(actions) = self.resources.get(resource) else {
            return Err(Error::InvalidPermission(format!(
                "unknown resource: {resource}"
            )));
        };
        if action == "*" || actions.iter().any(|known| known == action) {
            Ok(())
        } else {
            Err(Error::InvalidPermission(format!(
                "unknown action {action} for resource {resource}"
            )))
        }
    }

    /// Parses and registry-validates a permission string in one step.
    pub fn parse(&self, value: impl AsRef<str>) -> Result<Permission> {
        let permission = Permission::new(value)?;
        self.validate(&permission)?;
        Ok(permission)
    }
}
