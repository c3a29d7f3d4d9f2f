//! Transport-neutral query context handed to resource operations.
//!
//! A [`QueryContext`] carries what a caller asked for: an optional identifier, field
//! filters, a field selection, fields to populate, sort keys and pagination. It is
//! deserializable so a transport layer can build it straight from a request payload:
//!
//! ```ignore
//! let context: QueryContext = serde_json::from_value(json!({
//!     "filters": [{ "field": "age", "operator": "GreaterThanOrEquals", "value": 18 }],
//!     "sortBy": [["age", "desc"]],
//!     "pagination": { "limit": 10, "skip": 20 }
//! }))?;
//! ```

use bson::Bson;
use serde::{Deserialize, Serialize};

use crate::query::SortDirection;

/// Comparison requested by a context filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEquals,
    LowerThan,
    LowerThanOrEquals,
    /// Case-insensitive substring match.
    Similar,
    /// Value is one of a list.
    In,
    /// Any operator this library does not know; filters using it are ignored.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFilter {
    pub field: String,
    #[serde(alias = "type")]
    pub operator: FilterOperator,
    pub value: Bson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: usize,
    #[serde(default)]
    pub skip: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryContext {
    pub id: Option<Bson>,
    pub filters: Vec<ContextFilter>,
    /// External field names to return; empty means the default projection.
    pub fields: Vec<String>,
    pub populated_fields: Vec<String>,
    pub sort_by: Vec<(String, SortDirection)>,
    pub pagination: Option<Pagination>,
}

impl QueryContext {
    pub fn new() -> Self {
        QueryContext::default()
    }

    /// A context addressing a single entry.
    pub fn for_id(id: impl Into<Bson>) -> Self {
        QueryContext { id: Some(id.into()), ..QueryContext::default() }
    }

    pub fn builder() -> QueryContextBuilder {
        QueryContextBuilder { context: QueryContext::default() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryContextBuilder {
    context: QueryContext,
}

impl QueryContextBuilder {
    pub fn id(mut self, id: impl Into<Bson>) -> Self {
        self.context.id = Some(id.into());
        self
    }

    pub fn filter(
        mut self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<Bson>,
    ) -> Self {
        self.context.filters.push(ContextFilter {
            field: field.into(),
            operator,
            value: value.into(),
        });
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.context.fields.push(field.into());
        self
    }

    pub fn populate(mut self, field: impl Into<String>) -> Self {
        self.context.populated_fields.push(field.into());
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.context.sort_by.push((field.into(), direction));
        self
    }

    pub fn paginate(mut self, limit: usize, skip: usize) -> Self {
        self.context.pagination = Some(Pagination { limit, skip });
        self
    }

    pub fn build(self) -> QueryContext {
        self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_from_request_payload() {
        let context: QueryContext = serde_json::from_value(json!({
            "id": "abc",
            "filters": [
                { "field": "age", "operator": "GreaterThanOrEquals", "value": 18 },
                { "field": "name", "type": "Similar", "value": "ali" }
            ],
            "populatedFields": ["owner"],
            "sortBy": [["age", "desc"]],
            "pagination": { "limit": 10 }
        }))
        .unwrap();

        assert_eq!(context.id, Some(Bson::String("abc".into())));
        assert_eq!(context.filters[0].operator, FilterOperator::GreaterThanOrEquals);
        assert_eq!(context.filters[1].operator, FilterOperator::Similar);
        assert_eq!(context.populated_fields, vec!["owner".to_string()]);
        assert_eq!(context.sort_by, vec![("age".to_string(), SortDirection::Desc)]);
        assert_eq!(context.pagination, Some(Pagination { limit: 10, skip: 0 }));
    }

    #[test]
    fn unrecognized_operators_deserialize_as_unknown() {
        let filter: ContextFilter =
            serde_json::from_value(json!({ "field": "a", "operator": "Regex", "value": "x" })).unwrap();

        assert_eq!(filter.operator, FilterOperator::Unknown);
    }

    #[test]
    fn builder_collects_in_order() {
        let context = QueryContext::builder()
            .filter("age", FilterOperator::LowerThan, 40)
            .filter("age", FilterOperator::GreaterThan, 20)
            .sort("name", SortDirection::Asc)
            .paginate(5, 10)
            .build();

        assert_eq!(context.filters.len(), 2);
        assert_eq!(context.filters[1].operator, FilterOperator::GreaterThan);
        assert_eq!(context.pagination, Some(Pagination { limit: 5, skip: 10 }));
        assert_eq!(context.id, None);
    }
}
