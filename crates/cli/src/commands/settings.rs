//! Settings inspection.

use corner_shop_store::AppState;
use corner_shop_store::db::SettingsRepository;

use super::CliError;

/// Log the effective settings and every value that falls back to a default.
pub async fn check(state: &AppState) {
    let (settings, warnings) = SettingsRepository::new(state.collections()).load().await;

    tracing::info!(
        store_name = ?settings.store_name,
        zones = settings.delivery.zones.len(),
        state_rates = settings.delivery.state_rates.len(),
        promo_codes = settings.promo_codes.len(),
        "Effective settings"
    );

    if warnings.is_empty() {
        tracing::info!("All settings valid");
    }
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
}

/// Store one setting.
///
/// # Errors
///
/// Returns `CliError::InvalidJson` if `value` is not JSON, or
/// `CliError::Settings` if the key or value is rejected.
pub async fn set(state: &AppState, key: &str, value: &str) -> Result<(), CliError> {
    let value: serde_json::Value = serde_json::from_str(value)?;
    SettingsRepository::new(state.collections())
        .set(key, value)
        .await?;
    tracing::info!(key, "Setting saved");
    Ok(())
}
