//! Record-level operations over whole-collection documents.
//!
//! # Collections
//!
//! - `products` - Catalog (list)
//! - `orders` - Orders with frozen customer and item snapshots (list)
//! - `subscribers` - Newsletter subscribers (list)
//! - `messages` - Contact form messages (list)
//! - `users` - Customer accounts keyed by id (map)
//! - `codes` - Verification codes keyed by `{identifier}:{purpose}` (map)
//! - `settings` - Flat key to JSON value map (map)
//!
//! # Concurrency
//!
//! Every read-modify-write holds the collection's async mutex from load to
//! save, so writers in this process never lose each other's updates. Plain
//! reads do not take the lock. Writers in other processes sharing the same
//! remote store are not coordinated; the last save wins.

pub mod codes;
pub mod messages;
pub mod orders;
pub mod products;
pub mod settings;
pub mod subscribers;
pub mod users;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

pub use codes::CodeRepository;
pub use messages::MessageRepository;
pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use settings::SettingsRepository;
pub use subscribers::SubscriberRepository;
pub use users::UserRepository;

use crate::backend::{Backend, Collection, Shape, StoreError};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The backend failed to load or save the collection.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate id).
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Input rejected before anything was written.
    #[error("validation failed: {0}")]
    Validation(String),
}

/// A record stored in a collection and addressed by a string id.
///
/// For list-shaped collections the id is the record's `id` field; for
/// map-shaped collections it is also the map key.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Collection holding records of this type.
    const COLLECTION: Collection;

    /// Unique id within the collection.
    fn id(&self) -> &str;

    /// Creation timestamp.
    fn created_at(&self) -> DateTime<Utc>;

    /// Set both timestamps. Records without an update timestamp ignore
    /// `updated_at`.
    fn set_timestamps(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>);
}

/// Field names ignored when deciding whether a replace changes anything.
const TIMESTAMP_FIELDS: [&str; 2] = ["createdAt", "updatedAt"];

/// Shared handle over the selected backend with per-collection write locks.
///
/// Cheap to clone; clones share the backend and the locks.
#[derive(Debug, Clone)]
pub struct Collections {
    inner: Arc<CollectionsInner>,
}

#[derive(Debug)]
struct CollectionsInner {
    backend: Backend,
    locks: WriteLocks,
}

#[derive(Debug, Default)]
struct WriteLocks {
    products: Mutex<()>,
    orders: Mutex<()>,
    subscribers: Mutex<()>,
    messages: Mutex<()>,
    users: Mutex<()>,
    codes: Mutex<()>,
    settings: Mutex<()>,
}

impl WriteLocks {
    const fn get(&self, collection: Collection) -> &Mutex<()> {
        match collection {
            Collection::Products => &self.products,
            Collection::Orders => &self.orders,
            Collection::Subscribers => &self.subscribers,
            Collection::Messages => &self.messages,
            Collection::Users => &self.users,
            Collection::Codes => &self.codes,
            Collection::Settings => &self.settings,
        }
    }
}

impl Collections {
    /// Wrap a backend.
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        Self {
            inner: Arc::new(CollectionsInner {
                backend,
                locks: WriteLocks::default(),
            }),
        }
    }

    /// The backend in use.
    #[must_use]
    pub fn backend(&self) -> &Backend {
        &self.inner.backend
    }

    /// Take the write lock of a collection.
    ///
    /// Held across a whole load, modify and save cycle.
    pub async fn lock(&self, collection: Collection) -> MutexGuard<'_, ()> {
        self.inner.locks.get(collection).lock().await
    }

    // =========================================================================
    // Documents
    // =========================================================================

    /// Load a collection for reading. Backend errors are logged and yield the
    /// empty document.
    async fn read_document(&self, collection: Collection) -> Value {
        match self.inner.backend.load(collection).await {
            Ok(value) => coerce(collection, value),
            Err(e) => {
                warn!(error = %e, collection = %collection, "Collection read failed, treating as empty");
                collection.shape().empty()
            }
        }
    }

    /// Load a collection for a read-modify-write. Backend errors abort the
    /// write so a collection that could not be read is never overwritten.
    async fn write_document(&self, collection: Collection) -> Result<Value, RepositoryError> {
        let value = self.inner.backend.load(collection).await?;
        Ok(coerce(collection, value))
    }

    async fn save_document(
        &self,
        collection: Collection,
        value: &Value,
    ) -> Result<(), RepositoryError> {
        self.inner.backend.save(collection, value).await?;
        Ok(())
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Every decodable record of a collection.
    ///
    /// Never fails: backend errors and malformed records are logged and
    /// skipped.
    pub async fn list_all<T: Record>(&self) -> Vec<T> {
        let document = self.read_document(T::COLLECTION).await;
        raw_records(document)
            .into_iter()
            .filter_map(decode_logged::<T>)
            .collect()
    }

    /// Get a record by id.
    pub async fn get_by_id<T: Record>(&self, id: &str) -> Option<T> {
        let document = self.read_document(T::COLLECTION).await;
        find(&document, id).cloned().and_then(decode_logged::<T>)
    }

    /// Insert a new record, stamping both timestamps with the current time.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a record with the same id
    /// exists, or `RepositoryError::Store` if the collection could not be
    /// loaded or saved.
    pub async fn append<T: Record>(&self, mut record: T) -> Result<T, RepositoryError> {
        let collection = T::COLLECTION;
        let _guard = self.lock(collection).await;
        let mut document = self.write_document(collection).await?;

        if find(&document, record.id()).is_some() {
            return Err(RepositoryError::Conflict(format!(
                "{collection} already contains {}",
                record.id()
            )));
        }

        let now = Utc::now();
        record.set_timestamps(now, now);
        let value = serde_json::to_value(&record).map_err(StoreError::from)?;

        match &mut document {
            Value::Array(items) => items.push(value),
            Value::Object(map) => {
                map.insert(record.id().to_owned(), value);
            }
            _ => unreachable_shape(collection)?,
        }

        self.save_document(collection, &document).await?;
        Ok(record)
    }

    /// Replace the record with `id`.
    ///
    /// The stored creation timestamp is kept and the update timestamp is set
    /// to now. When the incoming record equals the stored one apart from
    /// timestamps nothing is written and the stored record is returned, so
    /// repeating a replace changes nothing. Stored fields that `T` does not
    /// model are kept.
    ///
    /// Returns `Ok(None)` if no record has `id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Validation` if `record` carries a different
    /// id, or `RepositoryError::Store` if the collection could not be loaded
    /// or saved.
    pub async fn replace_by_id<T: Record>(
        &self,
        id: &str,
        mut record: T,
    ) -> Result<Option<T>, RepositoryError> {
        if record.id() != id {
            return Err(RepositoryError::Validation(format!(
                "record id {} does not match {id}",
                record.id()
            )));
        }

        let collection = T::COLLECTION;
        let _guard = self.lock(collection).await;
        let mut document = self.write_document(collection).await?;

        let Some(stored) = find(&document, id) else {
            return Ok(None);
        };

        let incoming = serde_json::to_value(&record).map_err(StoreError::from)?;
        let previous = decode_logged::<T>(stored.clone());
        let before = match &previous {
            Some(previous) => Some(serde_json::to_value(previous).map_err(StoreError::from)?),
            None => None,
        };
        if before
            .as_ref()
            .is_some_and(|before| same_ignoring_timestamps(before, &incoming))
        {
            return Ok(previous);
        }

        let created_at = previous
            .as_ref()
            .map_or_else(Utc::now, Record::created_at);
        record.set_timestamps(created_at, Utc::now());
        let value = serde_json::to_value(&record).map_err(StoreError::from)?;
        let value = match &before {
            Some(before) => merge_record(stored, before, &value),
            None => value,
        };

        if let Some(slot) = find_mut(&mut document, id) {
            *slot = value;
        }

        self.save_document(collection, &document).await?;
        Ok(Some(record))
    }

    /// Delete the record with `id`. Returns whether a record was removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the collection could not be loaded
    /// or saved.
    pub async fn remove_by_id<T: Record>(&self, id: &str) -> Result<bool, RepositoryError> {
        let collection = T::COLLECTION;
        let _guard = self.lock(collection).await;
        let mut document = self.write_document(collection).await?;

        let removed = match &mut document {
            Value::Array(items) => {
                let before = items.len();
                items.retain(|item| record_id(item) != Some(id));
                items.len() != before
            }
            Value::Object(map) => map.remove(id).is_some(),
            _ => false,
        };

        if removed {
            self.save_document(collection, &document).await?;
        }
        Ok(removed)
    }

    /// Read-modify-write over every record of a list-shaped collection.
    ///
    /// `f` sees every well-formed record. Malformed records are logged and
    /// kept in the document as stored. Records `f` leaves unchanged are
    /// written back exactly as they were read, and records it changes keep
    /// any fields `T` does not model. The collection is saved only if `f`
    /// returns `Ok` and changed something.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, or `RepositoryError::Store` if the
    /// collection could not be loaded or saved.
    pub async fn update_list<T, R, F>(&self, f: F) -> Result<R, RepositoryError>
    where
        T: Record,
        F: FnOnce(&mut Vec<T>) -> Result<R, RepositoryError> + Send,
    {
        let collection = T::COLLECTION;
        let _guard = self.lock(collection).await;
        let document = self.write_document(collection).await?;
        let stored: &[Value] = match &document {
            Value::Array(items) => items,
            _ => &[],
        };

        let mut slots = Vec::with_capacity(stored.len());
        let mut records = Vec::with_capacity(stored.len());
        for raw in stored {
            match decode_value::<T>(collection, raw) {
                Some(record) => {
                    let before = serde_json::to_value(&record).map_err(StoreError::from)?;
                    slots.push(Slot::Decoded {
                        key: record.id().to_owned(),
                        raw,
                        before,
                    });
                    records.push(record);
                }
                None => slots.push(Slot::Malformed { key: None, raw }),
            }
        }

        let result = f(&mut records)?;

        let mut after = Vec::with_capacity(records.len());
        for record in &records {
            after.push((
                record.id().to_owned(),
                serde_json::to_value(record).map_err(StoreError::from)?,
            ));
        }

        let updated = Value::Array(merge_records(slots, after).into_iter().map(|(_, v)| v).collect());
        if updated != document {
            self.save_document(collection, &updated).await?;
        }
        Ok(result)
    }

    // =========================================================================
    // Map entries
    // =========================================================================

    /// Every entry of a map-shaped collection. Never fails.
    pub async fn entries(&self, collection: Collection) -> Map<String, Value> {
        match self.read_document(collection).await {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// A single entry of a map-shaped collection.
    pub async fn get_entry(&self, collection: Collection, key: &str) -> Option<Value> {
        self.entries(collection).await.remove(key)
    }

    /// Insert or overwrite an entry of a map-shaped collection.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the collection could not be loaded
    /// or saved.
    pub async fn put_entry(
        &self,
        collection: Collection,
        key: &str,
        value: Value,
    ) -> Result<(), RepositoryError> {
        self.update_map(collection, |map: &mut BTreeMap<String, Value>| {
            map.insert(key.to_owned(), value);
            Ok(())
        })
        .await
    }

    /// Remove an entry of a map-shaped collection. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Store` if the collection could not be loaded
    /// or saved.
    pub async fn remove_entry(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<bool, RepositoryError> {
        self.update_map(collection, |map: &mut BTreeMap<String, Value>| {
            Ok(map.remove(key).is_some())
        })
        .await
    }

    /// Read-modify-write over a map-shaped collection with typed values.
    ///
    /// Behaves like [`Collections::update_list`]: malformed entries are
    /// invisible to `f` and kept as stored, unchanged entries are written
    /// back as read, and changed entries keep fields `V` does not model.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns, `RepositoryError::Validation` if the
    /// collection is not map-shaped, or `RepositoryError::Store` if the
    /// collection could not be loaded or saved.
    pub async fn update_map<V, R, F>(&self, collection: Collection, f: F) -> Result<R, RepositoryError>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce(&mut BTreeMap<String, V>) -> Result<R, RepositoryError> + Send,
    {
        if collection.shape() != Shape::Map {
            return Err(RepositoryError::Validation(format!(
                "{collection} is not a keyed collection"
            )));
        }

        let _guard = self.lock(collection).await;
        let document = self.write_document(collection).await?;
        let empty = Map::new();
        let stored: &Map<String, Value> = match &document {
            Value::Object(entries) => entries,
            _ => &empty,
        };

        let mut slots = Vec::with_capacity(stored.len());
        let mut map = BTreeMap::new();
        for (key, raw) in stored {
            match decode_value::<V>(collection, raw) {
                Some(value) => {
                    let before = serde_json::to_value(&value).map_err(StoreError::from)?;
                    slots.push(Slot::Decoded {
                        key: key.clone(),
                        raw,
                        before,
                    });
                    map.insert(key.clone(), value);
                }
                None => slots.push(Slot::Malformed {
                    key: Some(key.clone()),
                    raw,
                }),
            }
        }

        let result = f(&mut map)?;

        let mut after = Vec::with_capacity(map.len());
        for (key, value) in &map {
            after.push((key.clone(), serde_json::to_value(value).map_err(StoreError::from)?));
        }

        // A key `f` inserted over a malformed entry comes later and replaces it.
        let updated: Map<String, Value> = merge_records(slots, after)
            .into_iter()
            .filter_map(|(key, value)| key.map(|key| (key, value)))
            .collect();

        let updated = Value::Object(updated);
        if updated != document {
            self.save_document(collection, &updated).await?;
        }
        Ok(result)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Substitute the empty document for a missing collection and coerce a
/// payload of the wrong shape to empty.
fn coerce(collection: Collection, value: Option<Value>) -> Value {
    let shape = collection.shape();
    match value {
        None => shape.empty(),
        Some(value) if shape.matches(&value) => value,
        Some(value) => {
            warn!(
                collection = %collection,
                found = json_kind(&value),
                "Collection payload has the wrong shape, treating as empty"
            );
            shape.empty()
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn raw_records(document: Value) -> Vec<Value> {
    match document {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        _ => Vec::new(),
    }
}

fn record_id(value: &Value) -> Option<&str> {
    value.get("id").and_then(Value::as_str)
}

fn find<'a>(document: &'a Value, id: &str) -> Option<&'a Value> {
    match document {
        Value::Array(items) => items.iter().find(|item| record_id(item) == Some(id)),
        Value::Object(map) => map.get(id),
        _ => None,
    }
}

fn find_mut<'a>(document: &'a mut Value, id: &str) -> Option<&'a mut Value> {
    match document {
        Value::Array(items) => items.iter_mut().find(|item| record_id(item) == Some(id)),
        Value::Object(map) => map.get_mut(id),
        _ => None,
    }
}

fn decode_logged<T: Record>(value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, collection = %T::COLLECTION, "Skipping malformed record");
            None
        }
    }
}

fn decode_value<V: DeserializeOwned>(collection: Collection, value: &Value) -> Option<V> {
    match V::deserialize(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(error = %e, collection = %collection, "Leaving malformed record untouched");
            None
        }
    }
}

/// A stored record as seen by a typed read-modify-write.
enum Slot<'a> {
    /// Decoded; `before` is the typed value re-serialized.
    Decoded {
        key: String,
        raw: &'a Value,
        before: Value,
    },
    /// Could not be decoded; written back as stored. Map entries keep
    /// their key.
    Malformed { key: Option<String>, raw: &'a Value },
}

/// Rebuild a document from the stored slots and the records after a typed
/// update, matched by key.
///
/// Stored positions are kept; records removed by the update are dropped and
/// new ones follow in update order.
fn merge_records(slots: Vec<Slot<'_>>, after: Vec<(String, Value)>) -> Vec<(Option<String>, Value)> {
    let mut pending: BTreeMap<&str, VecDeque<usize>> = BTreeMap::new();
    for (index, (key, _)) in after.iter().enumerate() {
        pending.entry(key.as_str()).or_default().push_back(index);
    }

    let mut used = vec![false; after.len()];
    let mut merged = Vec::with_capacity(slots.len().max(after.len()));
    for slot in slots {
        match slot {
            Slot::Malformed { key, raw } => merged.push((key, raw.clone())),
            Slot::Decoded { key, raw, before } => {
                let Some(index) = pending.get_mut(key.as_str()).and_then(VecDeque::pop_front) else {
                    continue;
                };
                if let Some(flag) = used.get_mut(index) {
                    *flag = true;
                }
                if let Some((_, value)) = after.get(index) {
                    merged.push((Some(key), merge_record(raw, &before, value)));
                }
            }
        }
    }
    drop(pending);

    for ((key, value), used) in after.into_iter().zip(used) {
        if !used {
            merged.push((Some(key), value));
        }
    }
    merged
}

/// Apply a typed change to a stored record without dropping fields the type
/// does not model.
fn merge_record(raw: &Value, before: &Value, after: &Value) -> Value {
    if before == after {
        return raw.clone();
    }
    match (raw, before, after) {
        (Value::Object(raw), Value::Object(before), Value::Object(after)) => {
            let mut merged = raw.clone();
            for key in before.keys() {
                merged.remove(key);
            }
            for (key, value) in after {
                merged.insert(key.clone(), value.clone());
            }
            Value::Object(merged)
        }
        _ => after.clone(),
    }
}

fn same_ignoring_timestamps(stored: &Value, incoming: &Value) -> bool {
    let strip = |value: &Value| {
        let mut value = value.clone();
        if let Value::Object(map) = &mut value {
            for field in TIMESTAMP_FIELDS {
                map.remove(field);
            }
        }
        value
    };
    strip(stored) == strip(incoming)
}

fn unreachable_shape(collection: Collection) -> Result<(), RepositoryError> {
    Err(RepositoryError::DataCorruption(format!(
        "{collection} document has an unexpected shape"
    )))
}
