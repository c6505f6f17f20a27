//! Remote key-value store client.
//!
//! Speaks the REST dialect shared by hosted Redis services: every command is
//! a `POST` of a JSON array (`["SET", key, value]`) to the endpoint with a
//! bearer token, and the reply is `{"result": ...}` or `{"error": "..."}`.
//! Collections are stored as JSON text under `{prefix}{collection}`.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::{Collection, StoreError};
use crate::config::RemoteStoreConfig;

/// Longest response excerpt kept in error messages.
const ERROR_BODY_LIMIT: usize = 200;

/// Reply envelope of the REST interface.
#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the remote key-value store.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct KvClient {
    inner: Arc<KvClientInner>,
}

struct KvClientInner {
    client: reqwest::Client,
    endpoint: Url,
    token: SecretString,
    key_prefix: String,
}

impl std::fmt::Debug for KvClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvClient")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("key_prefix", &self.inner.key_prefix)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl KvClient {
    /// Create a new client. Every request is bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the HTTP client fails to build.
    pub fn new(
        config: &RemoteStoreConfig,
        key_prefix: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let endpoint = Url::parse(&config.url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(KvClientInner {
                client,
                endpoint,
                token: config.token.clone(),
                key_prefix: key_prefix.to_owned(),
            }),
        })
    }

    /// The REST endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Check that the store is reachable and the token is accepted.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the reply is not `PONG`.
    pub async fn ping(&self) -> Result<(), StoreError> {
        match self.command(&["PING"]).await? {
            Some(Value::String(reply)) if reply.eq_ignore_ascii_case("pong") => Ok(()),
            other => Err(StoreError::Remote(format!("unexpected PING reply: {other:?}"))),
        }
    }

    /// Load a collection document.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the stored text is not JSON.
    #[instrument(skip_all, fields(collection = %collection))]
    pub async fn load(&self, collection: Collection) -> Result<Option<Value>, StoreError> {
        let key = self.key(collection);
        match self.command(&["GET", &key]).await? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(text)) => Ok(Some(serde_json::from_str(&text)?)),
            // Some deployments auto-deserialize JSON values on read
            Some(value) => Ok(Some(value)),
        }
    }

    /// Store a collection document.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the store does not answer `OK`.
    #[instrument(skip_all, fields(collection = %collection))]
    pub async fn save(&self, collection: Collection, value: &Value) -> Result<(), StoreError> {
        let key = self.key(collection);
        let text = serde_json::to_string(value)?;
        match self.command(&["SET", &key, &text]).await? {
            Some(Value::String(reply)) if reply == "OK" => Ok(()),
            other => Err(StoreError::Remote(format!("unexpected SET reply: {other:?}"))),
        }
    }

    fn key(&self, collection: Collection) -> String {
        format!("{}{}", self.inner.key_prefix, collection.name())
    }

    /// Execute one command and return its `result`.
    async fn command(&self, args: &[&str]) -> Result<Option<Value>, StoreError> {
        let response = self
            .inner
            .client
            .post(self.inner.endpoint.clone())
            .bearer_auth(self.inner.token.expose_secret())
            .json(args)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let reply: Option<CommandReply> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let message = reply
                .and_then(|r| r.error)
                .unwrap_or_else(|| body.chars().take(ERROR_BODY_LIMIT).collect());
            return Err(StoreError::Remote(format!("HTTP {status}: {message}")));
        }

        let Some(reply) = reply else {
            return Err(StoreError::Remote(format!(
                "unparsable reply: {}",
                body.chars().take(ERROR_BODY_LIMIT).collect::<String>()
            )));
        };

        if let Some(error) = reply.error {
            return Err(StoreError::Remote(error));
        }

        debug!(command = args.first().copied().unwrap_or_default(), "Remote command ok");
        Ok(reply.result)
    }
}
