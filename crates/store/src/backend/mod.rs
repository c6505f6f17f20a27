//! Store backends for whole-collection persistence.
//!
//! # Architecture
//!
//! A collection is persisted as a single JSON document: an array for
//! list-shaped collections, an object for map-shaped ones. Backends only know
//! how to load and save a whole document; everything record-level lives in
//! [`crate::db`].
//!
//! Two backends exist:
//!
//! - [`KvClient`] - remote key-value store over its REST interface
//! - [`FileStore`] - one JSON file per collection under a data directory
//!
//! The choice is made once by [`select`] at process start and the resulting
//! [`Backend`] is passed to whoever needs it. There is no way back to the
//! remote store after a fallback; a restart is required.

mod file;
mod remote;

use std::fmt;
use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;

pub use file::FileStore;
pub use remote::KvClient;

use crate::config::{Durability, StoreConfig};

/// Errors that can occur while talking to a backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request to the remote store failed (includes timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store answered with an error.
    #[error("remote store error: {0}")]
    Remote(String),

    /// The remote store URL could not be parsed.
    #[error("invalid remote store URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Local file access failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored document is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Shape of a collection document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// JSON array of records, each with a unique `id`.
    List,
    /// JSON object of records keyed by string.
    Map,
}

impl Shape {
    /// The document stored for an empty collection.
    #[must_use]
    pub fn empty(self) -> Value {
        match self {
            Self::List => Value::Array(Vec::new()),
            Self::Map => Value::Object(serde_json::Map::new()),
        }
    }

    /// Whether `value` has this shape.
    #[must_use]
    pub fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::List, Value::Array(_)) | (Self::Map, Value::Object(_))
        )
    }
}

/// Named collections. The names are the storage keys and file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Products,
    Orders,
    Subscribers,
    Messages,
    Users,
    Codes,
    Settings,
}

impl Collection {
    /// Every collection.
    pub const ALL: [Self; 7] = [
        Self::Products,
        Self::Orders,
        Self::Subscribers,
        Self::Messages,
        Self::Users,
        Self::Codes,
        Self::Settings,
    ];

    /// Storage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Orders => "orders",
            Self::Subscribers => "subscribers",
            Self::Messages => "messages",
            Self::Users => "users",
            Self::Codes => "codes",
            Self::Settings => "settings",
        }
    }

    /// Document shape.
    #[must_use]
    pub const fn shape(self) -> Shape {
        match self {
            Self::Products | Self::Orders | Self::Subscribers | Self::Messages => Shape::List,
            Self::Users | Self::Codes | Self::Settings => Shape::Map,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown collection: {s}"))
    }
}

/// Which backend is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Remote,
    Local,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote => f.write_str("remote"),
            Self::Local => f.write_str("local"),
        }
    }
}

/// The backend chosen for this process.
#[derive(Debug, Clone)]
pub enum Backend {
    Remote(KvClient),
    Local(FileStore),
}

impl Backend {
    /// Load a whole collection document.
    ///
    /// Returns `Ok(None)` when the collection has never been written.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend could not be read. Read-only
    /// callers treat this as "not found"; read-modify-write callers abort.
    pub async fn load(&self, collection: Collection) -> Result<Option<Value>, StoreError> {
        match self {
            Self::Remote(client) => client.load(collection).await,
            Self::Local(files) => files.load(collection).await,
        }
    }

    /// Replace a whole collection document.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the write was not acknowledged. A local store
    /// in [`Durability::BestEffort`] mode never returns an error here.
    pub async fn save(&self, collection: Collection, value: &Value) -> Result<(), StoreError> {
        match self {
            Self::Remote(client) => client.save(collection, value).await,
            Self::Local(files) => files.save(collection, value).await,
        }
    }

    /// Which backend this is.
    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::Remote(_) => BackendKind::Remote,
            Self::Local(_) => BackendKind::Local,
        }
    }

    /// Whether an acknowledged save is guaranteed to have been stored.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        match self {
            Self::Remote(_) => true,
            Self::Local(files) => matches!(files.durability(), Durability::Strict),
        }
    }
}

/// Choose the backend for this process.
///
/// Uses the remote store when credentials are configured and it answers a
/// ping; otherwise (or on any error while setting it up) the local file store.
/// Never fails.
pub async fn select(config: &StoreConfig) -> Backend {
    let local = || Backend::Local(FileStore::new(config.data_dir.clone(), config.durability));

    let Some(remote) = &config.remote else {
        tracing::info!(
            data_dir = %config.data_dir.display(),
            "No remote store credentials, using local file store"
        );
        return local();
    };

    let client = match KvClient::new(remote, &config.key_prefix, config.remote_timeout) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Remote store misconfigured, falling back to local file store");
            return local();
        }
    };

    match client.ping().await {
        Ok(()) => {
            tracing::info!(endpoint = %client.endpoint(), "Using remote store");
            Backend::Remote(client)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Remote store unreachable, falling back to local file store");
            local()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::RemoteStoreConfig;

    #[test]
    fn test_collection_shapes() {
        assert_eq!(Collection::Products.shape(), Shape::List);
        assert_eq!(Collection::Messages.shape(), Shape::List);
        assert_eq!(Collection::Users.shape(), Shape::Map);
        assert_eq!(Collection::Codes.shape(), Shape::Map);
        assert_eq!(Collection::Settings.shape(), Shape::Map);
    }

    #[test]
    fn test_collection_names_round_trip() {
        for collection in Collection::ALL {
            assert_eq!(collection.name().parse::<Collection>().unwrap(), collection);
        }
        assert!("carts".parse::<Collection>().is_err());
    }

    #[test]
    fn test_shape_matches() {
        assert!(Shape::List.matches(&json!([])));
        assert!(!Shape::List.matches(&json!({})));
        assert!(Shape::Map.matches(&json!({})));
        assert!(!Shape::Map.matches(&json!("products")));
    }

    #[tokio::test]
    async fn test_select_without_credentials_is_local() {
        let dir = tempfile::tempdir().unwrap();
        let backend = select(&StoreConfig::local(dir.path())).await;
        assert_eq!(backend.kind(), BackendKind::Local);
        assert!(backend.is_durable());
    }

    #[tokio::test]
    async fn test_select_uses_remote_when_ping_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!(["PING"])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "PONG"})))
            .mount(&server)
            .await;

        let mut config = StoreConfig::local("unused");
        config.remote = Some(RemoteStoreConfig {
            url: server.uri(),
            token: SecretString::from("token"),
        });

        let backend = select(&config).await;
        assert_eq!(backend.kind(), BackendKind::Remote);
    }

    #[tokio::test]
    async fn test_select_falls_back_when_ping_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Unauthorized"})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::local(dir.path());
        config.remote = Some(RemoteStoreConfig {
            url: server.uri(),
            token: SecretString::from("wrong"),
        });

        let backend = select(&config).await;
        assert_eq!(backend.kind(), BackendKind::Local);
    }

    #[tokio::test]
    async fn test_select_falls_back_on_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"result": "PONG"}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::local(dir.path());
        config.remote_timeout = Duration::from_millis(50);
        config.remote = Some(RemoteStoreConfig {
            url: server.uri(),
            token: SecretString::from("token"),
        });

        let backend = select(&config).await;
        assert_eq!(backend.kind(), BackendKind::Local);
    }

    #[tokio::test]
    async fn test_select_falls_back_on_bad_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::local(dir.path());
        config.remote = Some(RemoteStoreConfig {
            url: "not a url".to_owned(),
            token: SecretString::from("token"),
        });

        let backend = select(&config).await;
        assert_eq!(backend.kind(), BackendKind::Local);
    }
}
