//! Stored verification codes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use corner_shop_core::VerificationPurpose;

/// A single-use code proving control of an email address.
///
/// Stored in the `codes` map under [`VerificationCode::key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationCode {
    /// Normalized email address the code was sent to.
    pub identifier: String,
    pub purpose: VerificationPurpose,
    /// Six ASCII digits.
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationCode {
    /// Map key for an identifier and purpose.
    #[must_use]
    pub fn key(identifier: &str, purpose: VerificationPurpose) -> String {
        format!("{identifier}:{purpose}")
    }

    /// Whether the code is past its expiry at `now`. A code is still valid
    /// at the exact expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(
            VerificationCode::key("ada@example.com", VerificationPurpose::PasswordReset),
            "ada@example.com:password_reset"
        );
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let created_at = Utc::now();
        let code = VerificationCode {
            identifier: "ada@example.com".to_owned(),
            purpose: VerificationPurpose::EmailVerification,
            code: "123456".to_owned(),
            created_at,
            expires_at: created_at + TimeDelta::minutes(10),
        };

        assert!(!code.is_expired_at(code.expires_at));
        assert!(code.is_expired_at(code.expires_at + TimeDelta::seconds(1)));
    }
}
