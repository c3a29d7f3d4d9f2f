//! Response envelope returned by resource operations.
//!
//! Every successful operation yields a [`Response`] wrapping its payload. Paginated
//! listings additionally carry [`ResponseMeta`] with the total number of matching entries.

use serde::{Deserialize, Serialize};

/// The outcome of a successful resource operation.
///
/// # Example
///
/// ```ignore
/// use docedge::response::Response;
///
/// let response = Response::builder(vec![1, 2, 3])
///     .with_pagination(45, 3, 0)
///     .build();
///
/// assert_eq!(response.total(), Some(45));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Response<T> {
    /// The payload.
    pub data: T,
    /// Metadata, present for paginated listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

impl<T> Response<T> {
    /// Wraps a payload without metadata.
    pub fn new(data: T) -> Self {
        Response { data, meta: None }
    }

    /// Creates a new builder for a response with metadata.
    pub fn builder(data: T) -> ResponseBuilder<T> {
        ResponseBuilder::new(data)
    }

    /// Total number of matching entries, when the response is paginated.
    pub fn total(&self) -> Option<u64> {
        self.meta
            .as_ref()?
            .pagination
            .as_ref()
            .map(|pagination| pagination.total)
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ResponseMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationMeta>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaginationMeta {
    /// Total count of entries across all pages.
    pub total: u64,
    pub limit: usize,
    pub skip: usize,
}

impl PaginationMeta {
    /// Whether entries remain after this page.
    pub fn has_more(&self) -> bool {
        ((self.skip + self.limit) as u64) < self.total
    }
}

/// Builder for constructing [`Response`] instances with fluent API.
pub struct ResponseBuilder<T> {
    data: T,
    pagination: Option<PaginationMeta>,
}

impl<T> ResponseBuilder<T> {
    pub fn new(data: T) -> Self {
        Self { data, pagination: None }
    }

    /// Records the total match count and the page that was served.
    pub fn with_pagination(mut self, total: u64, limit: usize, skip: usize) -> Self {
        self.pagination = Some(PaginationMeta { total, limit, skip });
        self
    }

    pub fn build(self) -> Response<T> {
        Response {
            data: self.data,
            meta: self
                .pagination
                .map(|pagination| ResponseMeta { pagination: Some(pagination) }),
        }
    }
}
