//! Convenient re-exports of commonly used types from docedge.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docedge::prelude::*;
//! ```
//!
//! This provides access to:
//! - Schema declarations and relation metadata
//! - Resources, their factory and the registry
//! - Query contexts and responses
//! - Store backends and builders
//! - Error types

pub use docedge_core::{
    action::{Action, ActionRef},
    backend::{StoreBackend, StoreBackendBuilder},
    context::{ContextFilter, FilterOperator, Pagination, QueryContext, QueryContextBuilder},
    error::{ResourceError, ResourceResult, SchemaError, StoreError, StoreResult},
    factory::{ResourceBuilder, ResourceFactory},
    public::{PublicEntry, PublicSchema},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, Sort, SortDirection},
    registry::{Cardinality, KeyField, Relation, ResourceInfo, ResourceRegistry},
    resource::{Resource, ResourceAdapter},
    response::{PaginationMeta, Response, ResponseMeta},
    schema::{FieldDefault, RawField, RawNode, RawSchema, RawType, RelationKind, RelationMeta, Schema},
};
