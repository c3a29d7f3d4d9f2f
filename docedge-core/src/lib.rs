//! Schema translation, relation inference and CRUD resources over document stores.
//!
//! This crate is the core of the docedge project and provides:
//!
//! - **Schema declarations** ([`schema`]) - Raw field trees with references, defaults and storage flags
//! - **Normalization** ([`convert`], [`normalized`]) - Conversion into storage-neutral schemas, sharing sub-schemas through a cache
//! - **Public schemas** ([`public`]) - The externally visible field mapping of a resource
//! - **Relations** ([`registry`], [`infer`]) - A resource registry and the relations inferred from references
//! - **Resources** ([`resource`], [`factory`], [`action`]) - CRUD operations over a store backend
//! - **Query contexts** ([`context`], [`translate`]) - Transport-neutral requests and their translation to store filters
//! - **Store backend abstraction** ([`backend`], [`query`]) - Traits and query types for storage backends
//! - **Error handling** ([`error`]) - Error types carrying the status codes callers answer with
//!
//! # Example
//!
//! ```ignore
//! use docedge_core::{factory::ResourceFactory, registry::ResourceRegistry, schema::*};
//!
//! let factory = ResourceFactory::new(Arc::new(ResourceRegistry::new()), backend);
//!
//! let users = factory
//!     .resource("user", RawSchema::new().field("name", RawType::String))
//!     .build()
//!     .await?;
//! let pets = factory
//!     .resource(
//!         "pet",
//!         RawSchema::new()
//!             .field("name", RawType::String)
//!             .field("owner", RawField::reference("user").relation(RelationMeta::default().foreign_name("pets"))),
//!     )
//!     .build()
//!     .await?;
//!
//! let page = pets.list(&QueryContext::builder().populate("owner").paginate(10, 0).build()).await?;
//! ```

pub mod action;
pub mod backend;
pub mod context;
pub mod convert;
pub mod error;
pub mod factory;
pub mod infer;
pub mod normalized;
pub mod public;
pub mod query;
pub mod registry;
pub mod resource;
pub mod response;
pub mod schema;
pub mod translate;
