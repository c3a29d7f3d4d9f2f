//! In-memory storage implementation for document stores.
//!
//! This module provides a simple in-memory backend that keeps documents as BSON in
//! per-collection vectors behind async-safe read-write locks. Documents keep their insertion
//! order, which is also the order unsorted queries return them in.

use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{cmp::Ordering, collections::HashMap, fmt, sync::Arc};
use tracing::trace;

use docedge_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{StoreError, StoreResult},
    query::{Expr, Projection, Query, SortDirection, lookup_path},
};

use crate::evaluator::{Comparable, DocumentEvaluator};

type StoreMap = HashMap<String, Vec<Document>>;

/// Checks a document before it is written to a collection; `Err` carries the reason.
pub type DocumentValidator = Arc<dyn Fn(&Document) -> Result<(), String> + Send + Sync>;

/// Thread-safe in-memory document storage backend.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing). For small to medium
/// datasets this is typically acceptable. For larger datasets, use a persistent backend
/// like MongoDB.
///
/// # Example
///
/// ```ignore
/// use docedge_memory::InMemoryStore;
/// use docedge::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let stored = store.insert(doc! { "name": "Alice", "age": 30 }, "users").await?;
/// assert!(stored.contains_key("_id"));
/// ```
#[derive(Default, Clone)]
pub struct InMemoryStore {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
    validators: Arc<HashMap<String, DocumentValidator>>,
}

impl fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("validated_collections", &self.validators.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store without validators.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for constructing an `InMemoryStore` with validators.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = InMemoryStore::builder()
    ///     .validator("users", |user| match user.get_str("name") {
    ///         Ok(_) => Ok(()),
    ///         Err(_) => Err("name is required".to_string()),
    ///     })
    ///     .build()
    ///     .await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Names of the collections holding at least one write.
    pub async fn collections(&self) -> Vec<String> {
        self.store.read().await.keys().cloned().collect()
    }

    fn validate(&self, document: &Document, collection: &str) -> StoreResult<()> {
        match self.validators.get(collection) {
            Some(validator) => validator(document).map_err(StoreError::Validation),
            None => Ok(()),
        }
    }
}

fn sort_documents(documents: &mut [Document], query: &Query) {
    if query.sort.is_empty() {
        return;
    }

    // Stable, so ties keep insertion order.
    documents.sort_by(|a, b| {
        for key in &query.sort {
            let left = lookup_path(a, &key.field).map_or(Comparable::Null, Comparable::from);
            let right = lookup_path(b, &key.field).map_or(Comparable::Null, Comparable::from);

            let ordering = match key.direction {
                SortDirection::Asc => left.sort_cmp(&right),
                SortDirection::Desc => right.sort_cmp(&left),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    });
}

fn project(document: Document, projection: &Projection) -> Document {
    match projection {
        Projection::Include(paths) => {
            let mut projected = Document::new();

            if let Some(id) = document.get("_id") {
                projected.insert("_id", id.clone());
            }
            for path in paths {
                if let Some(value) = lookup_path(&document, path) {
                    set_path(&mut projected, path, value.clone());
                }
            }

            projected
        }
        Projection::Exclude(paths) => {
            let mut projected = document;

            for path in paths {
                remove_path(&mut projected, path);
            }

            projected
        }
    }
}

/// Writes `value` at a dotted path, creating intermediate documents as needed.
fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                set_path(child, rest, value);
            }
        }
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find(&self, query: Query, collection: &str) -> StoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut matched: Vec<Document> = documents
            .iter()
            .filter(|document| DocumentEvaluator::matches(document, query.filter.as_ref()))
            .cloned()
            .collect();
        sort_documents(&mut matched, &query);

        trace!(collection, matched = matched.len(), "Evaluated query");

        Ok(matched
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|document| match &query.projection {
                Some(projection) => project(document, projection),
                None => document,
            })
            .collect())
    }

    async fn count(&self, filter: Option<Expr>, collection: &str) -> StoreResult<u64> {
        let store = self.store.read().await;

        Ok(store.get(collection).map_or(0, |documents| {
            documents
                .iter()
                .filter(|document| DocumentEvaluator::matches(document, filter.as_ref()))
                .count() as u64
        }))
    }

    async fn insert(&self, document: Document, collection: &str) -> StoreResult<Document> {
        let stored = if document.contains_key("_id") {
            document
        } else {
            let mut stored = doc! { "_id": ObjectId::new() };
            for (key, value) in document {
                stored.insert(key, value);
            }
            stored
        };
        self.validate(&stored, collection)?;

        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        if let Some(id) = stored.get("_id") {
            let key = Comparable::from(id);
            if documents
                .iter()
                .any(|existing| existing.get("_id").map(Comparable::from).is_some_and(|other| other == key))
            {
                return Err(StoreError::DuplicateKey(id.to_string(), collection.to_string()));
            }
        }

        documents.push(stored.clone());
        trace!(collection, "Inserted document");

        Ok(stored)
    }

    async fn update_fields(&self, filter: Expr, fields: Document, collection: &str) -> StoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };
        let Some(target) = documents
            .iter_mut()
            .find(|document| DocumentEvaluator::new(document).evaluate(&filter))
        else {
            return Ok(0);
        };

        let mut updated = target.clone();
        for (path, value) in fields {
            set_path(&mut updated, &path, value);
        }
        self.validate(&updated, collection)?;

        *target = updated;
        Ok(1)
    }

    async fn replace(&self, filter: Expr, document: Document, collection: &str) -> StoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };
        let Some(target) = documents
            .iter_mut()
            .find(|document| DocumentEvaluator::new(document).evaluate(&filter))
        else {
            return Ok(0);
        };

        let mut replacement = document;
        if let (Some(id), false) = (target.get("_id"), replacement.contains_key("_id")) {
            let mut keyed = doc! { "_id": id.clone() };
            for (key, value) in replacement {
                keyed.insert(key, value);
            }
            replacement = keyed;
        }
        self.validate(&replacement, collection)?;

        *target = replacement;
        Ok(1)
    }

    async fn delete(&self, filter: Expr, collection: &str) -> StoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let before = documents.len();
        documents.retain(|document| !DocumentEvaluator::new(document).evaluate(&filter));

        Ok((before - documents.len()) as u64)
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docedge_memory::InMemoryStore;
/// use docedge::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    validators: HashMap<String, DocumentValidator>,
}

impl InMemoryStoreBuilder {
    /// Rejects writes to `collection` for which `validator` returns an error.
    /// Rejections surface as [`StoreError::Validation`].
    pub fn validator(
        mut self,
        collection: impl Into<String>,
        validator: impl Fn(&Document) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validators
            .insert(collection.into(), Arc::new(validator));
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    ///
    /// This always succeeds and returns a freshly initialized store.
    async fn build(self) -> StoreResult<Self::Backend> {
        Ok(InMemoryStore {
            store: Arc::default(),
            validators: Arc::new(self.validators),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docedge_core::query::Filter;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (name, age) in [("carol", 41), ("alice", 30), ("bob", 30), ("dave", 25)] {
            store
                .insert(doc! { "name": name, "age": age }, "users")
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn insert_assigns_object_id_and_rejects_duplicates() {
        let store = InMemoryStore::new();

        let stored = store.insert(doc! { "name": "Alice" }, "users").await.unwrap();
        assert!(matches!(stored.get("_id"), Some(Bson::ObjectId(_))));

        let err = store.insert(stored.clone(), "users").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_, collection) if collection == "users"));
    }

    #[tokio::test]
    async fn find_sorts_by_multiple_keys_then_pages() {
        let store = seeded().await;

        let query = Query::builder()
            .sort("age", SortDirection::Desc)
            .sort("name", SortDirection::Asc)
            .offset(1)
            .limit(2)
            .build();
        let names: Vec<_> = store
            .find(query, "users")
            .await
            .unwrap()
            .iter()
            .map(|user| user.get_str("name").unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn unsorted_results_keep_insertion_order() {
        let store = seeded().await;

        let names: Vec<_> = store
            .find(Query::filtered(Some(Filter::eq("age", 30))), "users")
            .await
            .unwrap()
            .iter()
            .map(|user| user.get_str("name").unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn projections_include_or_exclude_paths() {
        let store = InMemoryStore::new();
        store
            .insert(doc! { "_id": 1, "name": "Alice", "secret": "x", "address": { "city": "Oslo", "zip": "0150" } }, "users")
            .await
            .unwrap();

        let included = store
            .find(Query::builder().projection(Projection::Include(vec!["address.city".into()])).build(), "users")
            .await
            .unwrap();
        assert_eq!(included[0], doc! { "_id": 1, "address": { "city": "Oslo" } });

        let excluded = store
            .find(Query::builder().projection(Projection::Exclude(vec!["secret".into(), "address.zip".into()])).build(), "users")
            .await
            .unwrap();
        assert_eq!(excluded[0], doc! { "_id": 1, "name": "Alice", "address": { "city": "Oslo" } });
    }

    #[tokio::test]
    async fn update_fields_sets_dotted_paths_only() {
        let store = InMemoryStore::new();
        store
            .insert(doc! { "_id": 1, "name": "Alice", "address": { "city": "Oslo", "zip": "0150" } }, "users")
            .await
            .unwrap();

        let matched = store
            .update_fields(Filter::eq("_id", 1), doc! { "address.city": "Bergen" }, "users")
            .await
            .unwrap();
        assert_eq!(matched, 1);

        let stored = store.find_one(Query::new(), "users").await.unwrap().unwrap();
        assert_eq!(stored, doc! { "_id": 1, "name": "Alice", "address": { "city": "Bergen", "zip": "0150" } });
    }

    #[tokio::test]
    async fn validators_reject_writes() {
        let store = InMemoryStore::builder()
            .validator("users", |user| {
                user.get_str("name")
                    .map(|_| ())
                    .map_err(|_| "name is required".to_string())
            })
            .build()
            .await
            .unwrap();

        let err = store.insert(doc! { "age": 3 }, "users").await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(reason) if reason == "name is required"));

        store.insert(doc! { "_id": 1, "name": "Alice" }, "users").await.unwrap();
        let err = store
            .replace(Filter::eq("_id", 1), doc! { "age": 3 }, "users")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(store.count(None, "users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_removes_every_match() {
        let store = seeded().await;

        let deleted = store.delete(Filter::eq("age", 30), "users").await.unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(store.count(None, "users").await.unwrap(), 2);
        assert_eq!(store.delete(Filter::eq("age", 30), "missing").await.unwrap(), 0);
    }
}
