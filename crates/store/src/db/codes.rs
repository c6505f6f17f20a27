//! Verification code repository.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use corner_shop_core::VerificationPurpose;

use super::{Collections, RepositoryError};
use crate::backend::Collection;
use crate::models::VerificationCode;

/// Repository for verification codes, keyed by identifier and purpose.
pub struct CodeRepository<'a> {
    collections: &'a Collections,
}

impl<'a> CodeRepository<'a> {
    /// Create a new code repository.
    #[must_use]
    pub const fn new(collections: &'a Collections) -> Self {
        Self { collections }
    }

    /// Every stored code, including expired ones.
    pub async fn list_all(&self) -> Vec<VerificationCode> {
        self.collections
            .entries(Collection::Codes)
            .await
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value(value) {
                Ok(code) => Some(code),
                Err(e) => {
                    tracing::warn!(error = %e, key = %key, "Skipping malformed verification code");
                    None
                }
            })
            .collect()
    }

    /// The stored code for an identifier and purpose.
    pub async fn get(
        &self,
        identifier: &str,
        purpose: VerificationPurpose,
    ) -> Option<VerificationCode> {
        let value = self
            .collections
            .get_entry(Collection::Codes, &VerificationCode::key(identifier, purpose))
            .await?;
        serde_json::from_value(value).ok()
    }

    /// Store `code`, replacing any code for the same identifier and purpose,
    /// and drop every other code expired at `now` in the same write.
    ///
    /// Returns the number of expired codes dropped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the codes could not be loaded or
    /// saved.
    pub async fn put(
        &self,
        code: VerificationCode,
        now: DateTime<Utc>,
    ) -> Result<usize, RepositoryError> {
        self.update(|codes| {
            let pruned = prune(codes, now);
            codes.insert(VerificationCode::key(&code.identifier, code.purpose), code);
            pruned
        })
        .await
    }

    /// Drop every code expired at `now`. Returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the codes could not be loaded or
    /// saved.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.update(|codes| prune(codes, now)).await
    }

    /// Read-modify-write over all codes under the collection lock. Codes that
    /// cannot be decoded are not passed to `f` and are kept as stored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the codes could not be loaded or
    /// saved.
    pub async fn update<R, F>(&self, f: F) -> Result<R, RepositoryError>
    where
        F: FnOnce(&mut BTreeMap<String, VerificationCode>) -> R + Send,
    {
        self.collections
            .update_map(
                Collection::Codes,
                |codes: &mut BTreeMap<String, VerificationCode>| Ok(f(codes)),
            )
            .await
    }
}

fn prune(codes: &mut BTreeMap<String, VerificationCode>, now: DateTime<Utc>) -> usize {
    let before = codes.len();
    codes.retain(|_, code| !code.is_expired_at(now));
    before - codes.len()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::db::tests::local_collections;

    fn code(identifier: &str, expires_at: DateTime<Utc>) -> VerificationCode {
        VerificationCode {
            identifier: identifier.to_owned(),
            purpose: VerificationPurpose::EmailVerification,
            code: "123456".to_owned(),
            created_at: expires_at - TimeDelta::minutes(10),
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_put_replaces_and_prunes() {
        let (_dir, collections) = local_collections();
        let repo = CodeRepository::new(&collections);
        let now = Utc::now();

        repo.put(code("old@example.com", now - TimeDelta::minutes(1)), now - TimeDelta::minutes(20))
            .await
            .unwrap();
        repo.put(code("ada@example.com", now + TimeDelta::minutes(5)), now)
            .await
            .unwrap();

        let mut replacement = code("ada@example.com", now + TimeDelta::minutes(10));
        replacement.code = "654321".to_owned();
        let pruned = repo.put(replacement, now).await.unwrap();

        assert_eq!(pruned, 0);
        let codes = repo.list_all().await;
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].code, "654321");
        assert!(repo.get("old@example.com", VerificationPurpose::EmailVerification).await.is_none());
    }

    #[tokio::test]
    async fn test_prune_expired() {
        let (_dir, collections) = local_collections();
        let repo = CodeRepository::new(&collections);
        let now = Utc::now();

        repo.put(code("a@example.com", now + TimeDelta::minutes(1)), now)
            .await
            .unwrap();
        repo.put(code("b@example.com", now + TimeDelta::minutes(2)), now)
            .await
            .unwrap();

        let pruned = repo
            .prune_expired(now + TimeDelta::seconds(90))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
        assert!(repo.get("b@example.com", VerificationPurpose::EmailVerification).await.is_some());
    }
}
