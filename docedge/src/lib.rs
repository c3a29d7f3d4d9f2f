//! Main docedge crate providing schema-driven CRUD resources over document stores.
//!
//! This crate is the primary entry point for users of docedge. It re-exports the core
//! types and functionality from the sub-crates and provides convenient access to the
//! different storage backends.
//!
//! # Features
//!
//! - **Schema translation** - Declare document shapes once, get a normalized schema and a public field mapping
//! - **Relation inference** - References between resources become registered relations, resolved lazily when needed
//! - **CRUD resources** - get, list, create, patch, update, remove and exists over any backend
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docedge::{prelude::*, memory::InMemoryStore};
//! use bson::doc;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ResourceError> {
//!     let factory = ResourceFactory::new(Arc::new(ResourceRegistry::new()), InMemoryStore::new());
//!
//!     let users = factory
//!         .resource(
//!             "user",
//!             RawSchema::new()
//!                 .field("name", RawType::String)
//!                 .field("password", RawField::new(RawType::String).private()),
//!         )
//!         .build()
//!         .await?;
//!     let pets = factory
//!         .resource(
//!             "pet",
//!             RawSchema::new()
//!                 .field("name", RawType::String)
//!                 .field("owner", RawField::reference("user").relation(RelationMeta::default().foreign_name("pets"))),
//!         )
//!         .build()
//!         .await?;
//!
//!     let alice = users.create(doc! { "name": "Alice", "password": "secret" }).await?.into_data();
//!     pets.create(doc! { "name": "Rex", "owner": alice.get("_id").cloned() }).await?;
//!
//!     // Private fields are left out and the owner is replaced by the user entry
//!     let page = pets
//!         .list(&QueryContext::builder().populate("owner").paginate(10, 0).build())
//!         .await?;
//!     println!("{} pets: {:?}", page.total().unwrap_or(0), page.data);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Schemas from JSON
//!
//! Schemas may also be declared as JSON, the way they are often kept next to API
//! definitions:
//!
//! ```ignore
//! let schema = RawSchema::from_json(&serde_json::json!({
//!     "name": { "type": "String", "unique": true },
//!     "owner": { "type": "ObjectId", "ref": "user", "relation": { "foreignName": "pets" } },
//!     "tags": ["String"]
//! }))?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docedge_core::{
    action, backend, context, convert, error, factory, infer, normalized, public, query,
    registry, resource, response, schema, translate,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docedge_memory::{DocumentValidator, InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docedge_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
