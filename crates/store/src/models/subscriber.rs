//! Newsletter subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use corner_shop_core::{Email, SubscriberId};

use crate::backend::Collection;
use crate::db::Record;

/// A newsletter subscriber. Emails are unique within the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: SubscriberId,
    pub email: Email,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

impl Subscriber {
    /// A new subscriber under a fresh id.
    #[must_use]
    pub fn new(email: Email) -> Self {
        Self {
            id: SubscriberId::generate(),
            email,
            created_at: DateTime::default(),
        }
    }
}

impl Record for Subscriber {
    const COLLECTION: Collection = Collection::Subscribers;

    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_timestamps(&mut self, created_at: DateTime<Utc>, _updated_at: DateTime<Utc>) {
        self.created_at = created_at;
    }
}
