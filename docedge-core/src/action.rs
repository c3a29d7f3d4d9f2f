//! Named custom operations attached to a resource.
//!
//! An [`Action`] receives the resource it is attached to, the caller's query context and a
//! request body, and answers with a [`Response`] of its own shape. Actions are registered
//! on the [`ResourceBuilder`](crate::factory::ResourceBuilder) and invoked through
//! [`ResourceAdapter::call_action`](crate::resource::ResourceAdapter::call_action).
//!
//! ```ignore
//! struct CountAdults;
//!
//! #[async_trait]
//! impl<B: StoreBackend> Action<B> for CountAdults {
//!     fn name(&self) -> &str {
//!         "count-adults"
//!     }
//!
//!     async fn run(&self, users: &ResourceAdapter<B>, _: &QueryContext, _: Document) -> ResourceResult<Response<Bson>> {
//!         let adults = users.list(&QueryContext::builder().filter("age", FilterOperator::GreaterThanOrEquals, 18).build()).await?;
//!         Ok(Response::new(Bson::Int64(adults.data.len() as i64)))
//!     }
//! }
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::sync::Arc;

use crate::{
    backend::StoreBackend, context::QueryContext, error::ResourceResult,
    resource::ResourceAdapter, response::Response,
};

#[async_trait]
pub trait Action<B: StoreBackend>: Send + Sync {
    /// The name the action is invoked by.
    fn name(&self) -> &str;

    async fn run(
        &self,
        resource: &ResourceAdapter<B>,
        context: &QueryContext,
        body: Document,
    ) -> ResourceResult<Response<Bson>>;
}

pub type ActionRef<B> = Arc<dyn Action<B>>;
