//! Error types and result types for store, schema and resource operations.
//!
//! Three layers report failures:
//!
//! - [`StoreError`] - raised by [`StoreBackend`](crate::backend::StoreBackend) implementations
//! - [`SchemaError`] - raised while reading schema declarations
//! - [`ResourceError`] - the outcome of a [`Resource`](crate::resource::Resource) operation
//!
//! Store failures reach resource callers unchanged, except validation failures which are
//! surfaced as [`ResourceError::Unprocessable`].

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use std::convert::Infallible;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given key already exists in the collection.
    /// The first argument is the key value, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DuplicateKey(String, String),
    /// The store rejected a write because the document violates its schema constraints.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// The document has an invalid structure (e.g. it is not a BSON document).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// An unknown error occurred.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// A specialized `Result` type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for StoreError {
    fn from(err: SerdeJsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<Infallible> for StoreError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// Errors raised while reading a schema declaration.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The declaration of a field could not be understood.
    /// The first argument is the field path, the second describes the problem.
    #[error("Invalid declaration for field {0}: {1}")]
    InvalidField(String, String),
    /// A type name does not correspond to any known schema type.
    #[error("Unknown schema type: {0}")]
    UnknownType(String),
    /// The schema root is not an object.
    #[error("Schema must be an object")]
    NotAnObject,
}

/// The failure outcome of a resource operation.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The store rejected the write because of schema constraints.
    #[error("Unprocessable Entity")]
    Unprocessable,
    /// No document matched the requested identifier.
    #[error("Not Found")]
    NotFound,
    /// The request could not be served as given (e.g. no identifier could be resolved).
    #[error("{0}")]
    BadRequest(String),
    /// The operation is not supported by this resource.
    #[error("Not Supported")]
    NotSupported,
    /// No action is registered under the given name.
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    /// A resource could not be registered.
    #[error("Registration error: {0}")]
    Registration(String),
    /// Any other store failure, surfaced unchanged.
    #[error(transparent)]
    Store(StoreError),
}

impl ResourceError {
    /// Returns the HTTP status code a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ResourceError::Unprocessable => 422,
            ResourceError::NotFound => 404,
            ResourceError::BadRequest(_) => 400,
            ResourceError::NotSupported => 501,
            ResourceError::UnknownAction(_) => 404,
            ResourceError::Registration(_) => 409,
            ResourceError::Store(_) => 500,
        }
    }

    pub(crate) fn missing_id() -> Self {
        ResourceError::BadRequest("Missing ID".to_string())
    }
}

impl From<StoreError> for ResourceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(_) => ResourceError::Unprocessable,
            other => ResourceError::Store(other),
        }
    }
}

/// A specialized `Result` type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
