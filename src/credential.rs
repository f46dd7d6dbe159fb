use crate::error::CredentialError;

/// bcrypt work factor for all new digests.
pub const DEFAULT_COST: u32 = 12;

/// Minimum accepted secret length.
pub const DEFAULT_MIN_SECRET_LEN: usize = 8;

/// Hashing algorithm recognized in a stored digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    /// The single modern algorithm; the only one ever verified.
    Bcrypt,
    /// A superseded format. Never verified; forces the reset path.
    Legacy,
}

/// A stored digest with its algorithm tag resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredDigest<'a> {
    pub algorithm: DigestAlgorithm,
    pub payload: &'a str,
}

/// Tags a stored digest by format.
///
/// Modern digests are bcrypt strings. Legacy digests are unsalted hex
/// (MD5/SHA-1/SHA-256 lengths) or carry a `sha256$` prefix. Anything else
/// is unrecognized and treated as "needs reset" by callers.
pub fn parse_digest(stored: &str) -> Result<StoredDigest<'_>, CredentialError> {
    let trimmed = stored.trim();
    if trimmed.is_empty() {
        return Err(CredentialError::UnrecognizedDigest);
    }
    if trimmed.starts_with("$2a$") || trimmed.starts_with("$2b$") || trimmed.starts_with("$2y$") {
        return Ok(StoredDigest {
            algorithm: DigestAlgorithm::Bcrypt,
            payload: trimmed,
        });
    }
    if let Some(payload) = trimmed.strip_prefix("sha256$") {
        if !payload.is_empty() {
            return Ok(StoredDigest {
                algorithm: DigestAlgorithm::Legacy,
                payload,
            });
        }
        return Err(CredentialError::UnrecognizedDigest);
    }
    let is_hex = trimmed.chars().all(|ch| ch.is_ascii_hexdigit());
    if is_hex && matches!(trimmed.len(), 32 | 40 | 64) {
        return Ok(StoredDigest {
            algorithm: DigestAlgorithm::Legacy,
            payload: trimmed,
        });
    }
    Err(CredentialError::UnrecognizedDigest)
}

/// Hashes and verifies user secrets.
///
/// One fixed modern algorithm for every new digest; there is no runtime
/// algorithm choice, so verification is deterministic. Hashing is
/// CPU-bound and runs on the blocking thread pool, never on the async
/// request path.
#[derive(Debug, Clone)]
pub struct CredentialService {
    cost: u32,
    min_secret_len: usize,
}

impl Default for CredentialService {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialService {
    /// Creates a service with cost 12 and an 8-character minimum.
    pub fn new() -> Self {
        Self {
            cost: DEFAULT_COST,
            min_secret_len: DEFAULT_MIN_SECRET_LEN,
        }
    }

    /// Overrides the bcrypt work factor.
    pub fn with_cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }

    /// Overrides the minimum secret length.
    pub fn with_min_secret_len(mut self, min: usize) -> Self {
        self.min_secret_len = min;
        self
    }

    fn check_secret(&self, secret: &str) -> Result<(), CredentialError> {
        if secret.len() < self.min_secret_len {
            return Err(CredentialError::SecretTooShort {
                min: self.min_secret_len,
            });
        }
        Ok(())
    }

    /// Hashes a secret under the modern algorithm.
    pub async fn hash(&self, secret: &str) -> Result<String, CredentialError> {
        self.check_secret(secret)?;
        let secret = secret.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(secret, cost))
            .await
            .map_err(|_| CredentialError::Background)?
            .map_err(|error| CredentialError::Hash(error.to_string()))
    }

    /// Verifies a secret against a stored digest.
    ///
    /// Legacy digests always fail verification; the caller sees the same
    /// `false` as for a wrong secret, while the reason is logged for
    /// operators. Unrecognized formats are an error, not a denial.
    pub async fn verify(&self, secret: &str, stored: &str) -> Result<bool, CredentialError> {
        let digest = parse_digest(stored)?;
        match digest.algorithm {
            DigestAlgorithm::Legacy => {
                tracing::warn!("legacy digest presented for verification; reset required");
                Ok(false)
            }
            DigestAlgorithm::Bcrypt => {
                if secret.is_empty() {
                    return Ok(false);
                }
                let secret = secret.to_string();
                let stored = digest.payload.to_string();
                tokio::task::spawn_blocking(move || bcrypt::verify(secret, &stored))
                    .await
                    .map_err(|_| CredentialError::Background)?
                    .map_err(|error| CredentialError::Hash(error.to_string()))
            }
        }
    }

    /// Whether a stored digest must be re-hashed. True only for
    /// legacy-tagged digests.
    pub fn needs_upgrade(&self, stored: &str) -> Result<bool, CredentialError> {
        Ok(parse_digest(stored)?.algorithm == DigestAlgorithm::Legacy)
    }

    /// Re-hashes a secret under the modern algorithm.
    ///
    /// Legacy digests cannot be verified, so the re-hash is unconditional;
    /// the caller must have re-authenticated the user independently (a
    /// reset flow). Modern digests are verified first: `None` means the
    /// supplied secret did not match and nothing was produced.
    pub async fn migrate(
        &self,
        secret: &str,
        stored: &str,
    ) -> Result<Option<String>, CredentialError> {
        match parse_digest(stored)?.algorithm {
            DigestAlgorithm::Legacy => Ok(Some(self.hash(secret).await?)),
            DigestAlgorithm::Bcrypt => {
                if self.verify(secret, stored).await? {
                    Ok(Some(self.hash(secret).await?))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // MD5 of "password"; representative of the superseded format.
    const LEGACY_DIGEST: &str = "5f4dcc3b5aa765d61d8327deb882cf99";

    fn service() -> CredentialService {
        // Minimum bcrypt cost keeps the tests fast.
        CredentialService::new().with_cost(4)
    }

    #[tokio::test]
    async fn hash_then_verify_should_round_trip() {
        let service = service();
        let digest = service.hash("correct horse").await.unwrap();
        assert!(service.verify("correct horse", &digest).await.unwrap());
        assert!(!service.verify("wrong secret", &digest).await.unwrap());
    }

    #[tokio::test]
    async fn hash_should_reject_short_secrets() {
        let result = service().hash("short").await;
        assert!(matches!(
            result,
            Err(CredentialError::SecretTooShort { min: 8 })
        ));
    }

    #[tokio::test]
    async fn legacy_digests_should_never_verify() {
        let service = service();
        assert!(!service.verify("password", LEGACY_DIGEST).await.unwrap());
        assert!(!service.verify("anything", "sha256$deadbeef").await.unwrap());
    }

    #[test]
    fn needs_upgrade_should_flag_only_legacy_digests() {
        let service = service();
        assert!(service.needs_upgrade(LEGACY_DIGEST).unwrap());
        assert!(service.needs_upgrade("sha256$deadbeef").unwrap());
        assert!(
            !service
                .needs_upgrade("$2b$04$abcdefghijklmnopqrstuvABCDEFGHIJKLMNOPQRSTUVWXYZ012345")
                .unwrap()
        );
    }

    #[test]
    fn unrecognized_digest_should_be_an_error_not_a_denial() {
        let service = service();
        assert!(matches!(
            service.needs_upgrade("not-a-digest"),
            Err(CredentialError::UnrecognizedDigest)
        ));
        assert!(matches!(
            parse_digest(""),
            Err(CredentialError::UnrecognizedDigest)
        ));
    }

    #[tokio::test]
    async fn migrate_should_rehash_legacy_unconditionally() {
        let service = service();
        let migrated = service.migrate("new password", LEGACY_DIGEST).await.unwrap();
        let digest = migrated.expect("legacy digests migrate unconditionally");
        assert!(service.verify("new password", &digest).await.unwrap());
        assert!(!service.needs_upgrade(&digest).unwrap());
    }

    #[tokio::test]
    async fn migrate_should_verify_modern_digests_first() {
        let service = service();
        let digest = service.hash("correct horse").await.unwrap();

        let migrated = service.migrate("correct horse", &digest).await.unwrap();
        assert!(migrated.is_some());

        let refused = service.migrate("wrong secret", &digest).await.unwrap();
        assert!(refused.is_none());
    }
}
