//! Process-wide store state.

use std::sync::Arc;

use crate::backend::{self, BackendKind};
use crate::config::StoreConfig;
use crate::db::Collections;
use crate::rate_limit::RateLimiter;

/// Store state shared by every caller in the process.
///
/// Cheaply cloneable via `Arc`. Holds the backend chosen at startup, the
/// per-collection write locks and the rate limiter.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StoreConfig,
    collections: Collections,
    rate_limiter: RateLimiter,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("backend", &self.backend_kind())
            .field("data_dir", &self.inner.config.data_dir)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Select the backend and build the shared state.
    ///
    /// Never fails: an unreachable remote store falls back to local files.
    pub async fn from_config(config: StoreConfig) -> Self {
        let backend = backend::select(&config).await;
        let collections = Collections::new(backend);
        let rate_limiter = RateLimiter::new(&config.rate_limit);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                collections,
                rate_limiter,
            }),
        }
    }

    /// Get a reference to the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Get a reference to the collections.
    #[must_use]
    pub fn collections(&self) -> &Collections {
        &self.inner.collections
    }

    /// Get a reference to the rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    /// Which backend was selected.
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.inner.collections.backend().kind()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_state_without_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::from_config(StoreConfig::local(dir.path())).await;

        assert_eq!(state.backend_kind(), BackendKind::Local);
        assert_eq!(state.config().data_dir, dir.path());
        assert!(state.rate_limiter().check("k").await.allowed);

        let clone = state.clone();
        assert!(std::ptr::eq(clone.collections(), state.collections()));
    }
}
