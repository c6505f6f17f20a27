//! Settings repository.

use serde_json::{Map, Value};
use thiserror::Error;

use super::{Collections, RepositoryError};
use crate::backend::Collection;
use crate::settings::{self, SettingsWarning, StoreSettings};

/// Error type for settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings key: {0}")]
    InvalidKey(String),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Repository for the flat settings map.
pub struct SettingsRepository<'a> {
    collections: &'a Collections,
}

impl<'a> SettingsRepository<'a> {
    /// Create a new settings repository.
    #[must_use]
    pub const fn new(collections: &'a Collections) -> Self {
        Self { collections }
    }

    /// Every stored setting.
    pub async fn entries(&self) -> Map<String, Value> {
        self.collections.entries(Collection::Settings).await
    }

    /// A single setting.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.collections.get_entry(Collection::Settings, key).await
    }

    /// The typed settings record and any values that were ignored.
    pub async fn load(&self) -> (StoreSettings, Vec<SettingsWarning>) {
        StoreSettings::from_entries(&self.entries().await)
    }

    /// Store a setting.
    ///
    /// Values for keys with a typed field must pass that field's validation.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidKey` for an empty or overlong key,
    /// `SettingsError::InvalidValue` for a value the typed record would
    /// reject, or `SettingsError::Repository` if the settings could not be
    /// saved.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        settings::validate_key(key).map_err(SettingsError::InvalidKey)?;
        settings::validate_value(key, &value).map_err(|message| SettingsError::InvalidValue {
            key: key.to_owned(),
            message,
        })?;

        self.collections
            .put_entry(Collection::Settings, key, value)
            .await?;
        Ok(())
    }

    /// Remove a setting. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Repository` if the settings could not be saved.
    pub async fn remove(&self, key: &str) -> Result<bool, SettingsError> {
        Ok(self
            .collections
            .remove_entry(Collection::Settings, key)
            .await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use corner_shop_core::Price;
    use serde_json::json;

    use super::*;
    use crate::db::tests::local_collections;
    use crate::settings::keys;

    #[tokio::test]
    async fn test_set_and_load() {
        let (_dir, collections) = local_collections();
        let repo = SettingsRepository::new(&collections);

        repo.set(keys::DEFAULT_DELIVERY_FEE, json!(2000)).await.unwrap();
        repo.set("hero_title", json!({"text": "Fresh jams"})).await.unwrap();

        let (settings, warnings) = repo.load().await;
        assert!(warnings.is_empty());
        assert_eq!(settings.delivery.default_fee, Price::from_units(2000));
        assert_eq!(repo.get("hero_title").await, Some(json!({"text": "Fresh jams"})));
    }

    #[tokio::test]
    async fn test_set_rejects_bad_key_and_value() {
        let (_dir, collections) = local_collections();
        let repo = SettingsRepository::new(&collections);

        let err = repo.set("", json!(1)).await.unwrap_err();
        assert!(matches!(err, SettingsError::InvalidKey(_)));

        let err = repo.set(&"k".repeat(101), json!(1)).await.unwrap_err();
        assert!(matches!(err, SettingsError::InvalidKey(_)));

        let err = repo
            .set(keys::FREE_DELIVERY_THRESHOLD, json!("lots"))
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidValue { .. }));

        assert!(repo.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove() {
        let (_dir, collections) = local_collections();
        let repo = SettingsRepository::new(&collections);
        repo.set(keys::ANNOUNCEMENT, json!("Closed on Sunday")).await.unwrap();

        assert!(repo.remove(keys::ANNOUNCEMENT).await.unwrap());
        assert!(!repo.remove(keys::ANNOUNCEMENT).await.unwrap());
        assert!(repo.load().await.0.announcement.is_none());
    }
}
