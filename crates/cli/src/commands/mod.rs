//! Command implementations.

pub mod codes;
pub mod orders;
pub mod settings;
pub mod store;

use corner_shop_store::db::settings::SettingsError;
use corner_shop_store::services::OrderError;
use corner_shop_store::{AppState, ConfigError, RepositoryError, StoreConfig, StoreError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Invalid JSON given on the command line.
    #[error("invalid JSON value: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The change needs `--yes`.
    #[error("{0}")]
    ConfirmationRequired(String),
}

/// Load configuration and select the backend.
///
/// # Errors
///
/// Returns `CliError::Config` if an environment variable is invalid.
pub async fn connect() -> Result<AppState, CliError> {
    let config = StoreConfig::from_env()?;
    let state = AppState::from_config(config).await;
    tracing::info!(backend = %state.backend_kind(), "Store ready");
    Ok(state)
}
