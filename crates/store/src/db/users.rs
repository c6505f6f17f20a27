//! User repository.
//!
//! Users live in a map keyed by id. Email and phone uniqueness is checked
//! while holding the collection's write lock, so two registrations racing
//! for the same address cannot both succeed.

use std::collections::BTreeMap;

use chrono::Utc;
use thiserror::Error;

use corner_shop_core::{Email, PasswordDigest, Phone, UserId};

use super::{Collections, Record, RepositoryError};
use crate::backend::Collection;
use crate::models::User;

/// Errors from creating a user.
#[derive(Debug, Error)]
pub enum UserWriteError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("phone already registered")]
    DuplicatePhone,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Repository for customer accounts.
pub struct UserRepository<'a> {
    collections: &'a Collections,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(collections: &'a Collections) -> Self {
        Self { collections }
    }

    /// Every user, oldest first.
    pub async fn list_all(&self) -> Vec<User> {
        let mut users: Vec<User> = self.collections.list_all().await;
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        users
    }

    /// Get a user by id.
    pub async fn get_by_id(&self, id: &UserId) -> Option<User> {
        self.collections.get_by_id(id.as_str()).await
    }

    /// Get a user by email address.
    pub async fn get_by_email(&self, email: &Email) -> Option<User> {
        self.collections
            .list_all::<User>()
            .await
            .into_iter()
            .find(|u| &u.email == email)
    }

    /// Store a new user unless the email or phone is already registered.
    ///
    /// # Errors
    ///
    /// Returns `UserWriteError::DuplicateEmail` or
    /// `UserWriteError::DuplicatePhone` on a uniqueness violation.
    /// Returns `UserWriteError::Repository` if the users could not be loaded
    /// or saved.
    pub async fn create(&self, mut user: User) -> Result<User, UserWriteError> {
        self.collections
            .update_map(Collection::Users, |users: &mut BTreeMap<String, User>| {
                if users.values().any(|u| u.email == user.email) {
                    return Ok(Err(UserWriteError::DuplicateEmail));
                }
                if users.values().any(|u| u.phone == user.phone) {
                    return Ok(Err(UserWriteError::DuplicatePhone));
                }
                if users.contains_key(user.id.as_str()) {
                    return Err(RepositoryError::Conflict(format!("user {} exists", user.id)));
                }

                let now = Utc::now();
                user.set_timestamps(now, now);
                users.insert(user.id.as_str().to_owned(), user.clone());
                Ok(Ok(user))
            })
            .await?
    }

    /// Replace the password digest of a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Store` if the users could not be saved.
    pub async fn set_password(
        &self,
        id: &UserId,
        password: PasswordDigest,
    ) -> Result<(), RepositoryError> {
        self.modify(id, |user| user.password = password).await
    }

    /// Mark a user's email address as verified.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user does not exist.
    /// Returns `RepositoryError::Store` if the users could not be saved.
    pub async fn mark_email_verified(&self, id: &UserId) -> Result<(), RepositoryError> {
        self.modify(id, |user| user.email_verified = true).await
    }

    /// Change a user's phone number, keeping phones unique.
    ///
    /// # Errors
    ///
    /// Returns `UserWriteError::DuplicatePhone` if another user has the
    /// number. Returns `UserWriteError::Repository` with
    /// `RepositoryError::NotFound` if the user does not exist.
    pub async fn set_phone(&self, id: &UserId, phone: Phone) -> Result<(), UserWriteError> {
        self.collections
            .update_map(Collection::Users, |users: &mut BTreeMap<String, User>| {
                if users
                    .values()
                    .any(|u| u.phone == phone && u.id != *id)
                {
                    return Ok(Err(UserWriteError::DuplicatePhone));
                }
                let user = users.get_mut(id.as_str()).ok_or(RepositoryError::NotFound)?;
                if user.phone != phone {
                    user.phone = phone;
                    user.updated_at = Utc::now();
                }
                Ok(Ok(()))
            })
            .await?
    }

    async fn modify<F>(&self, id: &UserId, f: F) -> Result<(), RepositoryError>
    where
        F: FnOnce(&mut User) + Send,
    {
        self.collections
            .update_map(Collection::Users, |users: &mut BTreeMap<String, User>| {
                let user = users.get_mut(id.as_str()).ok_or(RepositoryError::NotFound)?;
                f(user);
                user.updated_at = Utc::now();
                Ok(())
            })
            .await
    }
}
