//! Stored credential types.

use serde::{Deserialize, Serialize};

/// A password digest in PHC string format (e.g. `$argon2id$v=19$...`).
///
/// Serialized under the `password` field of user records. `Debug` never
/// prints the digest.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Wrap an already computed digest.
    #[must_use]
    pub const fn new(digest: String) -> Self {
        Self(digest)
    }

    /// Get the digest text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the value looks like a PHC digest rather than a legacy
    /// cleartext password.
    #[must_use]
    pub fn is_phc(&self) -> bool {
        self.0.starts_with('$')
    }
}

impl std::fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordDigest([REDACTED])")
    }
}
