//! In-memory document storage backend for docedge.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Full query support** - Filtering on dotted paths, multi-key sorting, pagination and projections
//! - **Store-assigned keys** - Documents inserted without `_id` receive an `ObjectId`
//! - **Write validation** - Per-collection validators reject invalid documents
//!
//! # Quick Start
//!
//! ```ignore
//! use docedge::{factory::ResourceFactory, registry::ResourceRegistry, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = ResourceFactory::new(Arc::new(ResourceRegistry::new()), InMemoryStore::new());
//!     let users = factory.resource("user", user_schema).build().await?;
//!
//!     let created = users.create(doc! { "name": "Alice" }).await?;
//!     Ok(())
//! }
//! ```

pub mod evaluator;
pub mod store;

pub use store::{DocumentValidator, InMemoryStore, InMemoryStoreBuilder};
