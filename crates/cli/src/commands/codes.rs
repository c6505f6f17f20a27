//! Verification code maintenance.

use chrono::Utc;

use corner_shop_store::AppState;
use corner_shop_store::services::VerificationCodes;

use super::CliError;

/// Delete every expired verification code.
///
/// # Errors
///
/// Returns `CliError::Repository` if the codes could not be loaded or saved.
pub async fn prune(state: &AppState) -> Result<(), CliError> {
    let removed = VerificationCodes::new(state.collections())
        .prune_expired(Utc::now())
        .await?;
    tracing::info!(removed, "Pruned expired verification codes");
    Ok(())
}
