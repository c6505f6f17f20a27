//! Newsletter subscriber repository.

use chrono::Utc;

use corner_shop_core::Email;

use super::{Collections, Record, RepositoryError};
use crate::models::Subscriber;

/// Repository for newsletter subscribers.
pub struct SubscriberRepository<'a> {
    collections: &'a Collections,
}

impl<'a> SubscriberRepository<'a> {
    /// Create a new subscriber repository.
    #[must_use]
    pub const fn new(collections: &'a Collections) -> Self {
        Self { collections }
    }

    /// Every subscriber, oldest first.
    pub async fn list_all(&self) -> Vec<Subscriber> {
        let mut subscribers: Vec<Subscriber> = self.collections.list_all().await;
        subscribers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        subscribers
    }

    /// Subscribe an address. Returns the subscriber and whether it is new;
    /// subscribing an address twice keeps the original record.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the subscribers could not be saved.
    pub async fn subscribe(&self, email: &Email) -> Result<(Subscriber, bool), RepositoryError> {
        self.collections
            .update_list(|subscribers: &mut Vec<Subscriber>| {
                if let Some(existing) = subscribers.iter().find(|s| &s.email == email) {
                    return Ok((existing.clone(), false));
                }

                let mut subscriber = Subscriber::new(email.clone());
                let now = Utc::now();
                subscriber.set_timestamps(now, now);
                subscribers.push(subscriber.clone());
                Ok((subscriber, true))
            })
            .await
    }

    /// Remove an address. Returns whether it was subscribed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the subscribers could not be saved.
    pub async fn unsubscribe(&self, email: &Email) -> Result<bool, RepositoryError> {
        self.collections
            .update_list(|subscribers: &mut Vec<Subscriber>| {
                let before = subscribers.len();
                subscribers.retain(|s| &s.email != email);
                Ok(subscribers.len() != before)
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::tests::local_collections;

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let (_dir, collections) = local_collections();
        let repo = SubscriberRepository::new(&collections);

        let (first, created) = repo
            .subscribe(&Email::parse("Ada@Example.com").unwrap())
            .await
            .unwrap();
        assert!(created);

        let (second, created) = repo
            .subscribe(&Email::parse(" ada@example.com ").unwrap())
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(repo.list_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let (_dir, collections) = local_collections();
        let repo = SubscriberRepository::new(&collections);
        let email = Email::parse("ada@example.com").unwrap();

        repo.subscribe(&email).await.unwrap();
        assert!(repo.unsubscribe(&email).await.unwrap());
        assert!(!repo.unsubscribe(&email).await.unwrap());
        assert!(repo.list_all().await.is_empty());
    }
}
