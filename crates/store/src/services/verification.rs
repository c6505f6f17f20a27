//! Single-use, expiring verification codes.
//!
//! A code is six decimal digits, stored under `(identifier, purpose)`. Issuing
//! a new code replaces the previous one for the same pair, so at most one
//! code per pair is ever valid. Redeeming deletes the code; a second redeem
//! finds nothing.

use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;
use tracing::instrument;

use corner_shop_core::VerificationPurpose;

use crate::db::{CodeRepository, Collections, RepositoryError};
use crate::models::VerificationCode;

/// Why a code was not accepted.
#[derive(Debug, Error)]
pub enum RedeemError {
    /// No code is stored for the identifier and purpose (never issued,
    /// already redeemed, or pruned).
    #[error("no verification code found")]
    NotFound,

    #[error("verification code does not match")]
    InvalidCode,

    #[error("verification code has expired")]
    Expired,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A freshly issued code, to be sent to the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and redeems verification codes.
pub struct VerificationCodes<'a> {
    codes: CodeRepository<'a>,
}

impl<'a> VerificationCodes<'a> {
    /// Create a verification code manager.
    #[must_use]
    pub const fn new(collections: &'a Collections) -> Self {
        Self {
            codes: CodeRepository::new(collections),
        }
    }

    /// Issue a code valid from now.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the code could not be stored.
    pub async fn issue(
        &self,
        identifier: &str,
        purpose: VerificationPurpose,
    ) -> Result<IssuedCode, RepositoryError> {
        self.issue_at(identifier, purpose, Utc::now()).await
    }

    /// Issue a code valid from `now` for the purpose's validity window.
    ///
    /// Replaces any code stored for the same identifier and purpose, and
    /// drops every other expired code in the same write.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the code could not be stored.
    #[instrument(skip(self, identifier))]
    pub async fn issue_at(
        &self,
        identifier: &str,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> Result<IssuedCode, RepositoryError> {
        let code = VerificationCode {
            identifier: normalize(identifier),
            purpose,
            code: generate_code(),
            created_at: now,
            expires_at: now + purpose.validity(),
        };
        let issued = IssuedCode {
            code: code.code.clone(),
            expires_at: code.expires_at,
        };

        let pruned = self.codes.put(code, now).await?;
        if pruned > 0 {
            tracing::debug!(pruned, "Dropped expired verification codes");
        }

        Ok(issued)
    }

    /// Redeem a code now.
    ///
    /// # Errors
    ///
    /// Returns the reason the code was rejected.
    pub async fn redeem(
        &self,
        identifier: &str,
        purpose: VerificationPurpose,
        supplied: &str,
    ) -> Result<(), RedeemError> {
        self.redeem_at(identifier, purpose, supplied, Utc::now()).await
    }

    /// Redeem a code at time `now`.
    ///
    /// Fails closed: anything other than a stored, matching, unexpired code
    /// is rejected. A matching code is deleted. An expired code is deleted
    /// when it is found. A wrong code leaves the stored code in place.
    ///
    /// # Errors
    ///
    /// Returns `RedeemError::NotFound`, `RedeemError::InvalidCode` or
    /// `RedeemError::Expired`, or `RedeemError::Repository` if the codes
    /// could not be loaded or saved.
    #[instrument(skip(self, identifier, supplied))]
    pub async fn redeem_at(
        &self,
        identifier: &str,
        purpose: VerificationPurpose,
        supplied: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RedeemError> {
        let key = VerificationCode::key(&normalize(identifier), purpose);
        let supplied = supplied.trim();

        self.codes
            .update(|codes| {
                let Some(stored) = codes.get(&key) else {
                    return Err(RedeemError::NotFound);
                };
                if stored.is_expired_at(now) {
                    codes.remove(&key);
                    return Err(RedeemError::Expired);
                }
                if stored.code != supplied {
                    return Err(RedeemError::InvalidCode);
                }
                codes.remove(&key);
                Ok(())
            })
            .await?
    }

    /// Drop every code expired at `now`. Returns how many were dropped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the codes could not be loaded or saved.
    pub async fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        self.codes.prune_expired(now).await
    }
}

/// A random six digit code.
#[must_use]
pub fn generate_code() -> String {
    rand::rng().random_range(100_000..1_000_000_u32).to_string()
}

fn normalize(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::db::tests::local_collections;

    const EMAIL: VerificationPurpose = VerificationPurpose::EmailVerification;
    const RESET: VerificationPurpose = VerificationPurpose::PasswordReset;

    #[test]
    fn test_generate_code_is_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn test_expiry_windows() {
        let (_dir, collections) = local_collections();
        let codes = VerificationCodes::new(&collections);
        let now = Utc::now();

        let email = codes.issue_at("ada@example.com", EMAIL, now).await.unwrap();
        let reset = codes.issue_at("ada@example.com", RESET, now).await.unwrap();

        assert_eq!(email.expires_at - now, TimeDelta::minutes(10));
        assert_eq!(reset.expires_at - now, TimeDelta::minutes(15));
    }

    #[tokio::test]
    async fn test_redeem_once() {
        let (_dir, collections) = local_collections();
        let codes = VerificationCodes::new(&collections);
        let issued = codes.issue("ada@example.com", EMAIL).await.unwrap();

        codes.redeem("ada@example.com", EMAIL, &issued.code).await.unwrap();
        let second = codes.redeem("ada@example.com", EMAIL, &issued.code).await;
        assert!(matches!(second, Err(RedeemError::NotFound)));
    }

    #[tokio::test]
    async fn test_accepted_at_nine_fifty_nine() {
        let (_dir, collections) = local_collections();
        let codes = VerificationCodes::new(&collections);
        let now = Utc::now();
        let issued = codes.issue_at("ada@example.com", EMAIL, now).await.unwrap();

        let at = now + TimeDelta::minutes(9) + TimeDelta::seconds(59);
        codes
            .redeem_at("ada@example.com", EMAIL, &issued.code, at)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejected_at_ten_oh_one() {
        let (_dir, collections) = local_collections();
        let codes = VerificationCodes::new(&collections);
        let now = Utc::now();
        let issued = codes.issue_at("ada@example.com", EMAIL, now).await.unwrap();

        let at = now + TimeDelta::minutes(10) + TimeDelta::seconds(1);
        let result = codes.redeem_at("ada@example.com", EMAIL, &issued.code, at).await;
        assert!(matches!(result, Err(RedeemError::Expired)));

        // The expired code was deleted when it was found
        let again = codes.redeem_at("ada@example.com", EMAIL, &issued.code, at).await;
        assert!(matches!(again, Err(RedeemError::NotFound)));
    }

    #[tokio::test]
    async fn test_wrong_code_keeps_stored_code() {
        let (_dir, collections) = local_collections();
        let codes = VerificationCodes::new(&collections);
        let issued = codes.issue("ada@example.com", EMAIL).await.unwrap();
        let wrong = if issued.code == "999999" { "100000" } else { "999999" };

        let result = codes.redeem("ada@example.com", EMAIL, wrong).await;
        assert!(matches!(result, Err(RedeemError::InvalidCode)));
        codes.redeem("ada@example.com", EMAIL, &issued.code).await.unwrap();
    }

    #[tokio::test]
    async fn test_new_issue_supersedes_previous() {
        let (_dir, collections) = local_collections();
        let codes = VerificationCodes::new(&collections);
        let now = Utc::now();

        let mut first = codes.issue_at("ada@example.com", RESET, now).await.unwrap();
        let mut second = codes.issue_at("ada@example.com", RESET, now).await.unwrap();
        while second.code == first.code {
            first = second;
            second = codes.issue_at("ada@example.com", RESET, now).await.unwrap();
        }

        let stale = codes.redeem_at("ada@example.com", RESET, &first.code, now).await;
        assert!(matches!(stale, Err(RedeemError::InvalidCode)));
        codes
            .redeem_at("ada@example.com", RESET, &second.code, now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_purposes_and_identifiers_are_separate() {
        let (_dir, collections) = local_collections();
        let codes = VerificationCodes::new(&collections);
        let issued = codes.issue(" Ada@Example.com ", EMAIL).await.unwrap();

        let other_purpose = codes.redeem("ada@example.com", RESET, &issued.code).await;
        assert!(matches!(other_purpose, Err(RedeemError::NotFound)));
        let other_identifier = codes.redeem("bob@example.com", EMAIL, &issued.code).await;
        assert!(matches!(other_identifier, Err(RedeemError::NotFound)));

        codes.redeem("ADA@example.com", EMAIL, &issued.code).await.unwrap();
    }

    #[tokio::test]
    async fn test_issue_prunes_other_expired_codes() {
        let (_dir, collections) = local_collections();
        let codes = VerificationCodes::new(&collections);
        let now = Utc::now();

        codes.issue_at("old@example.com", EMAIL, now).await.unwrap();
        codes
            .issue_at("ada@example.com", EMAIL, now + TimeDelta::minutes(11))
            .await
            .unwrap();

        let stored = CodeRepository::new(&collections).list_all().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].identifier, "ada@example.com");
    }
}
