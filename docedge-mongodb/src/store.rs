use async_trait::async_trait;
use bson::{Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{ClientOptions, FindOptions},
};
use tracing::{debug, trace};

use docedge_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{StoreError, StoreResult},
    query::{Expr, Query},
};

use crate::query::{MongoQueryTranslator, projection_document, sort_document};

/// MongoDB rejects writes failing collection validation with this code.
const DOCUMENT_VALIDATION_FAILURE: i32 = 121;
const DUPLICATE_KEY: i32 = 11000;

fn store_error(err: MongoError, collection: &str) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DOCUMENT_VALIDATION_FAILURE => {
            StoreError::Validation(write.message.clone())
        }
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
            StoreError::DuplicateKey(write.message.clone(), collection.to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find(&self, query: Query, collection: &str) -> StoreResult<Vec<Document>> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(limit as i64);
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip as u64);
        }
        options.sort = sort_document(&query.sort);
        options.projection = query.projection.as_ref().map(projection_document);

        let filter = MongoQueryTranslator::filter(query.filter.as_ref())?;
        trace!(collection, %filter, "Running find");

        self.get_collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| store_error(e, collection))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| store_error(e, collection))
    }

    async fn count(&self, filter: Option<Expr>, collection: &str) -> StoreResult<u64> {
        self.get_collection(collection)
            .count_documents(MongoQueryTranslator::filter(filter.as_ref())?)
            .await
            .map_err(|e| store_error(e, collection))
    }

    async fn insert(&self, document: Document, collection: &str) -> StoreResult<Document> {
        let result = self
            .get_collection(collection)
            .insert_one(&document)
            .await
            .map_err(|e| store_error(e, collection))?;

        let mut stored = doc! { "_id": result.inserted_id };
        for (key, value) in document {
            if key != "_id" {
                stored.insert(key, value);
            }
        }

        debug!(collection, "Inserted document");
        Ok(stored)
    }

    async fn update_fields(&self, filter: Expr, fields: Document, collection: &str) -> StoreResult<u64> {
        let result = self
            .get_collection(collection)
            .update_one(MongoQueryTranslator::filter(Some(&filter))?, doc! { "$set": fields })
            .await
            .map_err(|e| store_error(e, collection))?;

        Ok(result.matched_count)
    }

    async fn replace(&self, filter: Expr, document: Document, collection: &str) -> StoreResult<u64> {
        let result = self
            .get_collection(collection)
            .replace_one(MongoQueryTranslator::filter(Some(&filter))?, document)
            .await
            .map_err(|e| store_error(e, collection))?;

        Ok(result.matched_count)
    }

    async fn delete(&self, filter: Expr, collection: &str) -> StoreResult<u64> {
        let result = self
            .get_collection(collection)
            .delete_many(MongoQueryTranslator::filter(Some(&filter))?)
            .await
            .map_err(|e| store_error(e, collection))?;

        Ok(result.deleted_count)
    }

    async fn shutdown(self) -> StoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> StoreResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| StoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| StoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
