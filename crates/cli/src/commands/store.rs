//! Backend status and raw collection dumps.

use serde_json::Value;

use corner_shop_store::{AppState, Collection};

use super::CliError;

/// Log the backend in use and the size of every collection.
pub async fn status(state: &AppState) {
    let backend = state.collections().backend();
    tracing::info!(
        backend = %backend.kind(),
        durable = backend.is_durable(),
        data_dir = %state.config().data_dir.display(),
        "Store status"
    );

    for collection in Collection::ALL {
        match backend.load(collection).await {
            Ok(Some(doc)) => tracing::info!(%collection, records = record_count(&doc), "Collection"),
            Ok(None) => tracing::info!(%collection, records = 0, "Collection (empty)"),
            Err(e) => tracing::warn!(%collection, error = %e, "Collection unreadable"),
        }
    }
}

/// Log every record of `collection` as pretty JSON, with password digests
/// and verification codes redacted.
///
/// # Errors
///
/// Returns `CliError::Store` if the collection could not be loaded.
pub async fn list(state: &AppState, collection: Collection) -> Result<(), CliError> {
    let doc = state
        .collections()
        .backend()
        .load(collection)
        .await?
        .unwrap_or_else(|| collection.shape().empty());

    let records: Vec<Value> = match doc {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        other => {
            tracing::warn!(%collection, "Collection has unexpected shape");
            vec![other]
        }
    };

    tracing::info!(%collection, records = records.len(), "Listing collection");
    for mut record in records {
        redact(collection, &mut record);
        tracing::info!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(())
}

const REDACTED: &str = "[redacted]";

/// Fields of `collection` records that must never reach the log.
const fn secret_fields(collection: Collection) -> &'static [&'static str] {
    match collection {
        Collection::Users => &["password"],
        Collection::Codes => &["code"],
        _ => &[],
    }
}

fn redact(collection: Collection, record: &mut Value) {
    let Value::Object(fields) = record else {
        return;
    };
    for field in secret_fields(collection) {
        if let Some(value) = fields.get_mut(*field) {
            *value = Value::String(REDACTED.to_owned());
        }
    }
}

fn record_count(doc: &Value) -> usize {
    match doc {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_redact_hides_passwords_and_codes() {
        let mut user = json!({"id": "u1", "email": "ada@example.com", "password": "hunter22"});
        redact(Collection::Users, &mut user);
        assert_eq!(user["password"], REDACTED);
        assert_eq!(user["email"], "ada@example.com");

        let mut code = json!({"email": "ada@example.com", "code": "123456", "purpose": "password_reset"});
        redact(Collection::Codes, &mut code);
        assert_eq!(code["code"], REDACTED);
        assert_eq!(code["purpose"], "password_reset");
    }

    #[test]
    fn test_redact_leaves_other_collections() {
        let mut message = json!({"id": "m1", "code": "DISCOUNT", "password": "n/a"});
        let original = message.clone();
        redact(Collection::Messages, &mut message);
        assert_eq!(message, original);

        let mut malformed = json!("password");
        redact(Collection::Users, &mut malformed);
        assert_eq!(malformed, json!("password"));
    }
}
