use crate::types::RoleName;
use thiserror::Error;

/// Store-layer error type.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Store error wrapper.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
    /// Invalid identifier input.
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// Invalid permission input.
    #[error("invalid permission: {0}")]
    InvalidPermission(String),
    /// Missing or malformed role fields.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Role or user identifier did not resolve.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    /// Role name already taken.
    #[error("role name already exists: {0}")]
    DuplicateRole(RoleName),
    /// System roles only permit activation changes.
    #[error("system role {role} is protected; field {field} cannot be changed")]
    SystemRoleProtected { role: RoleName, field: &'static str },
    /// System roles cannot be deleted.
    #[error("system role {0} cannot be deleted")]
    SystemRoleDeletion(RoleName),
    /// Role deletion blocked by assigned users.
    #[error("role {role} is assigned to {user_count} user(s) and cannot be deleted")]
    RoleInUse { role: RoleName, user_count: u64 },
    /// Role assignment attempted against a deactivated role.
    #[error("role {0} is not active")]
    RoleInactive(RoleName),
}

impl Error {
    /// Convenience constructor for not-found conditions.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

/// Errors raised by the credential service.
///
/// Verification failure against the wrong secret is not an error; it is
/// `Ok(false)`. These variants cover hashing failures and digests the
/// service refuses to interpret.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Secret below the configured minimum length.
    #[error("secret must be at least {min} characters")]
    SecretTooShort { min: usize },
    /// Underlying hash computation failed.
    #[error("hashing failed: {0}")]
    Hash(String),
    /// Stored digest matches no known format; the account needs a reset.
    #[error("unrecognized digest format")]
    UnrecognizedDigest,
    /// The background hashing task was cancelled or panicked.
    #[error("background hashing task failed")]
    Background,
}
