//! Contact message repository.

use chrono::{DateTime, Utc};

use corner_shop_core::{Email, MessageId};

use super::{Collections, RepositoryError};
use crate::models::{ContactMessage, NewMessage};

/// Longest accepted message body, in characters.
const MAX_MESSAGE_CHARS: usize = 5_000;

/// Repository for contact form messages.
pub struct MessageRepository<'a> {
    collections: &'a Collections,
}

impl<'a> MessageRepository<'a> {
    /// Create a new message repository.
    #[must_use]
    pub const fn new(collections: &'a Collections) -> Self {
        Self { collections }
    }

    /// Every message, newest first.
    pub async fn list(&self) -> Vec<ContactMessage> {
        let mut messages: Vec<ContactMessage> = self.collections.list_all().await;
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        messages
    }

    /// Number of unread messages.
    pub async fn unread_count(&self) -> usize {
        self.list().await.iter().filter(|m| !m.read).count()
    }

    /// Store a submitted message.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` if the name or message is empty,
    /// the message is too long, or the email is invalid.
    /// Returns `RepositoryError::Store` if the messages could not be saved.
    pub async fn submit(&self, input: NewMessage) -> Result<ContactMessage, RepositoryError> {
        let name = input.name.trim().to_owned();
        let body = input.message.trim().to_owned();
        if name.is_empty() {
            return Err(RepositoryError::Validation("name is required".to_owned()));
        }
        if body.is_empty() {
            return Err(RepositoryError::Validation("message is required".to_owned()));
        }
        if body.chars().count() > MAX_MESSAGE_CHARS {
            return Err(RepositoryError::Validation(format!(
                "message is longer than {MAX_MESSAGE_CHARS} characters"
            )));
        }
        let email = Email::parse(&input.email)
            .map_err(|e| RepositoryError::Validation(format!("invalid email: {e}")))?;

        let message = ContactMessage {
            id: MessageId::generate(),
            name,
            email,
            phone: non_empty(input.phone),
            subject: non_empty(input.subject),
            message: body,
            read: false,
            created_at: DateTime::default(),
            updated_at: DateTime::default(),
        };

        self.collections.append(message).await
    }

    /// Mark a message as read. Returns whether it exists.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the messages could not be saved.
    pub async fn mark_read(&self, id: &MessageId) -> Result<bool, RepositoryError> {
        self.collections
            .update_list(|messages: &mut Vec<ContactMessage>| {
                let Some(message) = messages.iter_mut().find(|m| &m.id == id) else {
                    return Ok(false);
                };
                if !message.read {
                    message.read = true;
                    message.updated_at = Utc::now();
                }
                Ok(true)
            })
            .await
    }

    /// Delete a message. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the messages could not be saved.
    pub async fn delete(&self, id: &MessageId) -> Result<bool, RepositoryError> {
        self.collections
            .remove_by_id::<ContactMessage>(id.as_str())
            .await
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::tests::local_collections;

    fn input(name: &str, email: &str, message: &str) -> NewMessage {
        NewMessage {
            name: name.to_owned(),
            email: email.to_owned(),
            phone: Some("  ".to_owned()),
            subject: Some("Wholesale".to_owned()),
            message: message.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_submit_list_mark_read_delete() {
        let (_dir, collections) = local_collections();
        let repo = MessageRepository::new(&collections);

        let first = repo
            .submit(input("Ada", "ada@example.com", "Do you ship to Abuja?"))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = repo
            .submit(input("Tunde", "tunde@example.com", "Bulk pricing?"))
            .await
            .unwrap();

        assert!(first.phone.is_none());
        assert_eq!(first.subject.as_deref(), Some("Wholesale"));

        let listed = repo.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(repo.unread_count().await, 2);

        assert!(repo.mark_read(&first.id).await.unwrap());
        assert_eq!(repo.unread_count().await, 1);
        assert!(!repo.mark_read(&MessageId::new("MSG-NONE")).await.unwrap());

        assert!(repo.delete(&first.id).await.unwrap());
        assert_eq!(repo.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_validates_input() {
        let (_dir, collections) = local_collections();
        let repo = MessageRepository::new(&collections);

        for bad in [
            input(" ", "ada@example.com", "hi"),
            input("Ada", "ada@example.com", "   "),
            input("Ada", "not-an-email", "hi"),
        ] {
            let err = repo.submit(bad).await.unwrap_err();
            assert!(matches!(err, RepositoryError::Validation(_)));
        }
        assert!(repo.list().await.is_empty());
    }
}
