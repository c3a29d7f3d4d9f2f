//! Translation of context filters into store filter expressions.

use bson::Bson;

use crate::{
    context::{ContextFilter, FilterOperator},
    query::{Expr, FieldOp},
    registry::ResourceInfo,
};

/// Builds store filters for one resource.
///
/// Conditions are keyed by storage field: a later filter on the same field replaces the
/// earlier one, including the identifier condition a lookup starts from.
pub struct FilterTranslator<'a> {
    info: &'a ResourceInfo,
}

impl<'a> FilterTranslator<'a> {
    pub fn new(info: &'a ResourceInfo) -> Self {
        FilterTranslator { info }
    }

    fn operator(operator: FilterOperator) -> Option<FieldOp> {
        match operator {
            FilterOperator::Equals => Some(FieldOp::Eq),
            FilterOperator::NotEquals => Some(FieldOp::Ne),
            FilterOperator::GreaterThan => Some(FieldOp::Gt),
            FilterOperator::GreaterThanOrEquals => Some(FieldOp::Gte),
            FilterOperator::LowerThan => Some(FieldOp::Lt),
            FilterOperator::LowerThanOrEquals => Some(FieldOp::Lte),
            FilterOperator::Similar => Some(FieldOp::Contains),
            FilterOperator::In => Some(FieldOp::AnyOf),
            FilterOperator::Unknown => None,
        }
    }

    /// Combines an optional identifier with the context filters.
    pub fn translate(&self, id: Option<Bson>, filters: &[ContextFilter]) -> Option<Expr> {
        self.translate_keyed(id.map(|id| (self.info.key_field.clone(), id)), filters)
    }

    /// Like [`translate`](Self::translate), with the identifier stored under `key`.
    pub fn translate_keyed(
        &self,
        key: Option<(String, Bson)>,
        filters: &[ContextFilter],
    ) -> Option<Expr> {
        let mut conditions: Vec<(String, Expr)> = Vec::new();

        if let Some((key, id)) = key {
            conditions.push((key.clone(), Expr::field(key, FieldOp::Eq, id)));
        }

        for filter in filters {
            let Some(op) = Self::operator(filter.operator) else { continue };
            let field = self.info.storage_name(&filter.field);
            let condition = Expr::field(field.clone(), op, filter.value.clone());

            match conditions.iter_mut().find(|(existing, _)| *existing == field) {
                Some((_, slot)) => *slot = condition,
                None => conditions.push((field, condition)),
            }
        }

        let mut exprs: Vec<Expr> = conditions
            .into_iter()
            .map(|(_, expr)| expr)
            .collect();

        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(Expr::And(exprs)),
        }
    }
}
