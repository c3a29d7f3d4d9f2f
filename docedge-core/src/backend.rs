//! Storage backend abstraction used by resource adapters.
//!
//! The [`StoreBackend`] trait is the narrow interface through which the core reaches the
//! external document store: point lookup, filtered find with projection/sort/skip/limit,
//! counting, insertion, partial and full updates, and deletion by filter. Documents are
//! plain BSON documents; the physical key of a document lives in its `_id` field.
//!
//! # Examples
//!
//! ```ignore
//! use docedge::backend::StoreBackend;
//! use docedge::query::{Filter, Query};
//! use bson::doc;
//!
//! let stored = backend.insert(doc! { "name": "Alice", "age": 30 }, "users").await?;
//! let adults = backend
//!     .find(Query::builder().filter(Filter::gte("age", 18)).build(), "users")
//!     .await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use std::{fmt::Debug, sync::Arc};

use crate::{
    error::StoreResult,
    query::{Expr, Query},
};

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Each call is expected to be atomic on its own; no guarantee is made
/// across calls.
///
/// # Error Handling
///
/// Writes rejected because of schema constraints must be reported as
/// [`StoreError::Validation`](crate::error::StoreError::Validation) so callers can tell
/// them apart from other failures.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the first document matching the query, if any.
    ///
    /// The default implementation runs [`find`](StoreBackend::find) with a limit of one.
    async fn find_one(&self, query: Query, collection: &str) -> StoreResult<Option<Document>> {
        let query = Query { limit: Some(1), ..query };

        Ok(self
            .find(query, collection)
            .await?
            .into_iter()
            .next())
    }

    /// Returns every document matching the query, honoring projection, sort, offset and limit.
    ///
    /// Querying a collection that does not exist yields an empty result.
    async fn find(&self, query: Query, collection: &str) -> StoreResult<Vec<Document>>;

    /// Counts the documents matching the filter (all documents when `None`).
    async fn count(&self, filter: Option<Expr>, collection: &str) -> StoreResult<u64>;

    /// Inserts a document and returns it as stored, including any store-assigned `_id`.
    async fn insert(&self, document: Document, collection: &str) -> StoreResult<Document>;

    /// Sets the given fields (keys may be dotted paths) on the first document matching the
    /// filter, leaving every other field untouched. Returns the number of matched documents.
    async fn update_fields(
        &self,
        filter: Expr,
        fields: Document,
        collection: &str,
    ) -> StoreResult<u64>;

    /// Replaces the first document matching the filter with the given document.
    /// Returns the number of matched documents.
    async fn replace(&self, filter: Expr, document: Document, collection: &str) -> StoreResult<u64>;

    /// Deletes every document matching the filter. Returns the number of deleted documents.
    async fn delete(&self, filter: Expr, collection: &str) -> StoreResult<u64>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> StoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend,
{
    async fn find_one(&self, query: Query, collection: &str) -> StoreResult<Option<Document>> {
        (**self).find_one(query, collection).await
    }

    async fn find(&self, query: Query, collection: &str) -> StoreResult<Vec<Document>> {
        (**self).find(query, collection).await
    }

    async fn count(&self, filter: Option<Expr>, collection: &str) -> StoreResult<u64> {
        (**self).count(filter, collection).await
    }

    async fn insert(&self, document: Document, collection: &str) -> StoreResult<Document> {
        (**self).insert(document, collection).await
    }

    async fn update_fields(
        &self,
        filter: Expr,
        fields: Document,
        collection: &str,
    ) -> StoreResult<u64> {
        (**self)
            .update_fields(filter, fields, collection)
            .await
    }

    async fn replace(&self, filter: Expr, document: Document, collection: &str) -> StoreResult<u64> {
        (**self)
            .replace(filter, document, collection)
            .await
    }

    async fn delete(&self, filter: Expr, collection: &str) -> StoreResult<u64> {
        (**self).delete(filter, collection).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> StoreResult<Self::Backend>;
}
