//! Query translation from the docedge filter AST to MongoDB query syntax.
//!
//! This module translates abstract filter expressions into MongoDB BSON documents
//! for execution by the MongoDB query engine.

use bson::{Bson, Document, doc, oid::ObjectId};

use docedge_core::{
    error::StoreError,
    query::{Expr, FieldOp, Projection, QueryVisitor, Sort, SortDirection},
};

/// Translates filter expressions into MongoDB query documents.
///
/// Hexadecimal strings compared against `_id` are read as object ids, so identifiers
/// received as text match the keys MongoDB assigned.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    pub fn filter(expr: Option<&Expr>) -> Result<Document, StoreError> {
        match expr {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(doc! {}),
        }
    }

    fn key_value(field: &str, value: &Bson) -> Bson {
        match value {
            Bson::String(text) if field == "_id" => ObjectId::parse_str(text)
                .map(Bson::ObjectId)
                .unwrap_or_else(|_| value.clone()),
            Bson::Array(items) if field == "_id" => {
                Bson::Array(items.iter().map(|item| Self::key_value(field, item)).collect())
            }
            _ => value.clone(),
        }
    }
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = StoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let value = Self::key_value(field, value);

        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": regex::escape(&s), "$options": "i" },
                    Bson::Array(arr) => doc! { "$all": arr },
                    other => doc! { "$elemMatch": { "$eq": other } },
                },
                FieldOp::AnyOf => match value {
                    Bson::Array(arr) => doc! { "$in": arr },
                    single => doc! { "$in": [single] },
                },
            }
        })
    }
}

pub(crate) fn sort_document(sort: &[Sort]) -> Option<Document> {
    if sort.is_empty() {
        return None;
    }

    Some(
        sort.iter()
            .map(|key| {
                let direction = match key.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                };
                (key.field.clone(), Bson::Int32(direction))
            })
            .collect(),
    )
}

pub(crate) fn projection_document(projection: &Projection) -> Document {
    let (paths, flag) = match projection {
        Projection::Include(paths) => (paths, 1),
        Projection::Exclude(paths) => (paths, 0),
    };

    paths
        .iter()
        .map(|path| (path.clone(), Bson::Int32(flag)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docedge_core::query::Filter;

    #[test]
    fn translates_comparisons_under_and() {
        let filter = MongoQueryTranslator::filter(Some(&Filter::gte("age", 18).and(Filter::contains("name", "a.b")))).unwrap();

        assert_eq!(
            filter,
            doc! { "$and": [
                { "age": { "$gte": 18 } },
                { "name": { "$regex": "a\\.b", "$options": "i" } },
            ] }
        );
    }

    #[test]
    fn hex_ids_become_object_ids() {
        let id = ObjectId::new();

        assert_eq!(
            MongoQueryTranslator::filter(Some(&Filter::eq("_id", id.to_hex()))).unwrap(),
            doc! { "_id": { "$eq": id } }
        );
        assert_eq!(
            MongoQueryTranslator::filter(Some(&Filter::any_of("_id", vec![id.to_hex()]))).unwrap(),
            doc! { "_id": { "$in": [id] } }
        );
        assert_eq!(
            MongoQueryTranslator::filter(Some(&Filter::eq("_id", "plain"))).unwrap(),
            doc! { "_id": { "$eq": "plain" } }
        );
    }

    #[test]
    fn similar_text_matches_literally() {
        assert_eq!(
            MongoQueryTranslator::filter(Some(&Filter::contains("price", "$5 (net)+"))).unwrap(),
            doc! { "price": { "$regex": "\\$5 \\(net\\)\\+", "$options": "i" } }
        );
    }

    #[test]
    fn sort_keys_keep_their_order() {
        let sort = vec![
            Sort { field: "age".into(), direction: SortDirection::Desc },
            Sort { field: "name".into(), direction: SortDirection::Asc },
        ];

        let document = sort_document(&sort).unwrap();
        assert_eq!(document.keys().collect::<Vec<_>>(), vec!["age", "name"]);
        assert_eq!(document, doc! { "age": -1, "name": 1 });
        assert_eq!(sort_document(&[]), None);
    }

    #[test]
    fn projections_map_to_flags() {
        assert_eq!(
            projection_document(&Projection::Exclude(vec!["password".into()])),
            doc! { "password": 0 }
        );
    }
}
