//! Customer accounts: registration, login, email verification and password
//! reset.
//!
//! Passwords are stored as Argon2id digests. Records written before hashing
//! was introduced hold the cleartext password; those still authenticate and
//! are rehashed on the first successful login.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde_json::json;
use thiserror::Error;
use tracing::instrument;

use corner_shop_core::{Email, EmailError, PasswordDigest, Phone, PhoneError, UserId, VerificationPurpose};

use super::notifier::{Notification, Notifier, Template, send_best_effort};
use super::verification::{RedeemError, VerificationCodes};
use crate::db::users::UserWriteError;
use crate::db::{Collections, RepositoryError, UserRepository};
use crate::models::{NewUser, User};

/// Minimum password length in characters.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length in characters.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Invalid phone number.
    #[error("invalid phone: {0}")]
    InvalidPhone(#[from] PhoneError),

    /// First or last name missing.
    #[error("first and last name are required")]
    MissingName,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    #[error("email already registered")]
    DuplicateEmail,

    #[error("phone already registered")]
    DuplicatePhone,

    /// Invalid credentials (wrong password or user not found).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No account uses the email address.
    #[error("account not found")]
    UnknownAccount,

    /// Verification code rejected.
    #[error("verification failed: {0}")]
    Code(RedeemError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Repository error.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<UserWriteError> for AccountError {
    fn from(e: UserWriteError) -> Self {
        match e {
            UserWriteError::DuplicateEmail => Self::DuplicateEmail,
            UserWriteError::DuplicatePhone => Self::DuplicatePhone,
            UserWriteError::Repository(e) => Self::Repository(e),
        }
    }
}

impl From<RedeemError> for AccountError {
    fn from(e: RedeemError) -> Self {
        match e {
            RedeemError::Repository(e) => Self::Repository(e),
            other => Self::Code(other),
        }
    }
}

/// Account operations.
pub struct Accounts<'a, N> {
    users: UserRepository<'a>,
    codes: VerificationCodes<'a>,
    notifier: &'a N,
}

impl<'a, N: Notifier> Accounts<'a, N> {
    /// Create an account service.
    #[must_use]
    pub const fn new(collections: &'a Collections, notifier: &'a N) -> Self {
        Self {
            users: UserRepository::new(collections),
            codes: VerificationCodes::new(collections),
            notifier,
        }
    }

    /// Register a new user and send an email verification code.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input, `AccountError::DuplicateEmail`
    /// or `AccountError::DuplicatePhone` if either is taken, or
    /// `AccountError::Repository` if the user could not be stored.
    #[instrument(skip_all)]
    pub async fn register(&self, input: NewUser) -> Result<User, AccountError> {
        let first_name = input.first_name.trim().to_owned();
        let last_name = input.last_name.trim().to_owned();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(AccountError::MissingName);
        }
        let email = Email::parse(&input.email)?;
        let phone = Phone::parse(&input.phone)?;
        validate_password(&input.password)?;

        let user = User {
            id: UserId::generate(),
            first_name,
            last_name,
            email,
            phone,
            password: hash_password(&input.password)?,
            email_verified: false,
            created_at: chrono::DateTime::default(),
            updated_at: chrono::DateTime::default(),
        };

        let user = self.users.create(user).await?;
        tracing::info!(user_id = %user.id, "User registered");

        if let Err(e) = self.send_code(&user, VerificationPurpose::EmailVerification).await {
            tracing::warn!(error = %e, user_id = %user.id, "Could not issue email verification code");
        }

        Ok(user)
    }

    /// Check an email and password.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::InvalidCredentials` if no user has the email or
    /// the password does not match.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AccountError> {
        let email = Email::parse(email).map_err(|_| AccountError::InvalidCredentials)?;
        let user = self
            .users
            .get_by_email(&email)
            .await
            .ok_or(AccountError::InvalidCredentials)?;

        if user.password.is_phc() {
            verify_password(password, user.password.as_str())?;
            return Ok(user);
        }

        if user.password.as_str() != password {
            return Err(AccountError::InvalidCredentials);
        }

        // Legacy cleartext record: replace it with a digest now that we know
        // the password.
        match hash_password(password) {
            Ok(digest) => {
                if let Err(e) = self.users.set_password(&user.id, digest).await {
                    tracing::warn!(error = %e, user_id = %user.id, "Could not rehash legacy password");
                } else {
                    tracing::info!(user_id = %user.id, "Rehashed legacy password");
                }
            }
            Err(e) => tracing::warn!(error = %e, user_id = %user.id, "Could not rehash legacy password"),
        }
        Ok(user)
    }

    /// Send a fresh email verification code to an unverified user.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::UnknownAccount` if no user has the email, or
    /// `AccountError::Repository` if the code could not be stored.
    pub async fn resend_verification(&self, email: &str) -> Result<(), AccountError> {
        let user = self.find(email).await?;
        if user.email_verified {
            return Ok(());
        }
        self.send_code(&user, VerificationPurpose::EmailVerification)
            .await
    }

    /// Confirm a user's email address with a code.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::UnknownAccount` if no user has the email,
    /// `AccountError::Code` if the code is rejected, or
    /// `AccountError::Repository` on storage failure.
    #[instrument(skip_all)]
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<User, AccountError> {
        let user = self.find(email).await?;
        self.codes
            .redeem(user.email.as_str(), VerificationPurpose::EmailVerification, code)
            .await?;
        self.users.mark_email_verified(&user.id).await?;
        tracing::info!(user_id = %user.id, "Email verified");

        self.users
            .get_by_id(&user.id)
            .await
            .ok_or(AccountError::UnknownAccount)
    }

    /// Send a password reset code.
    ///
    /// Succeeds without sending anything when no user has the email, so the
    /// response does not reveal which addresses are registered.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::InvalidEmail` for a malformed address, or
    /// `AccountError::Repository` if the code could not be stored.
    #[instrument(skip_all)]
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AccountError> {
        let email = Email::parse(email)?;
        let Some(user) = self.users.get_by_email(&email).await else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };
        self.send_code(&user, VerificationPurpose::PasswordReset).await
    }

    /// Set a new password using a reset code.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::WeakPassword` for an unacceptable password,
    /// `AccountError::Code` if the code is rejected (including when no user
    /// has the email), or `AccountError::Repository` on storage failure.
    #[instrument(skip_all)]
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AccountError> {
        validate_password(new_password)?;
        let email = Email::parse(email)?;
        let user = self
            .users
            .get_by_email(&email)
            .await
            .ok_or(AccountError::Code(RedeemError::NotFound))?;

        self.codes
            .redeem(user.email.as_str(), VerificationPurpose::PasswordReset, code)
            .await?;
        self.users
            .set_password(&user.id, hash_password(new_password)?)
            .await?;
        tracing::info!(user_id = %user.id, "Password reset");
        Ok(())
    }

    /// Change a user's phone number.
    ///
    /// # Errors
    ///
    /// Returns `AccountError::InvalidPhone` for a malformed number,
    /// `AccountError::DuplicatePhone` if another user has it, or
    /// `AccountError::Repository` with `RepositoryError::NotFound` if the
    /// user does not exist.
    pub async fn change_phone(&self, id: &UserId, phone: &str) -> Result<(), AccountError> {
        let phone = Phone::parse(phone)?;
        self.users.set_phone(id, phone).await?;
        tracing::info!(user_id = %id, "Phone changed");
        Ok(())
    }

    async fn find(&self, email: &str) -> Result<User, AccountError> {
        let email = Email::parse(email)?;
        self.users
            .get_by_email(&email)
            .await
            .ok_or(AccountError::UnknownAccount)
    }

    async fn send_code(&self, user: &User, purpose: VerificationPurpose) -> Result<(), AccountError> {
        let issued = self.codes.issue(user.email.as_str(), purpose).await?;
        let template = match purpose {
            VerificationPurpose::EmailVerification => Template::VerificationCode,
            VerificationPurpose::PasswordReset => Template::PasswordReset,
        };

        send_best_effort(
            self.notifier,
            Notification {
                template,
                to: user.email.to_string(),
                data: json!({
                    "name": user.display_name(),
                    "code": issued.code,
                    "expiresAt": issued.expires_at,
                    "validMinutes": purpose.validity().num_minutes(),
                }),
            },
        )
        .await;
        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Validate password requirements.
fn validate_password(password: &str) -> Result<(), AccountError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LENGTH {
        return Err(AccountError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    if len > MAX_PASSWORD_LENGTH {
        return Err(AccountError::WeakPassword(format!(
            "password must be at most {MAX_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<PasswordDigest, AccountError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| PasswordDigest::new(hash.to_string()))
        .map_err(|_| AccountError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AccountError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AccountError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AccountError::InvalidCredentials)
}
