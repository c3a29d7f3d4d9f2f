//! Conversion of raw schema trees into normalized ones.
//!
//! [`SchemaConverter`] maps each [`RawNode`] to a [`NormalizedField`], dropping storage flags,
//! privacy markers and references. Shared sub-schemas are converted once per
//! [`SchemaCache`]: later occurrences reuse the cached result, and occurrences met while the
//! sub-schema is still being converted (self-reference) become non-owning back-references.
//!
//! When a [`RelationInferencer`] is supplied, root-level reference fields are reported to it
//! during the same walk. Nested fields never produce relations.

use std::{collections::HashMap, sync::Arc};
use tracing::{trace, warn};

use crate::{
    infer::RelationInferencer,
    normalized::{
        AutoValue, NormalizedDefault, NormalizedField, NormalizedSchema, NormalizedType,
        SubSchema, SubSchemaRef,
    },
    schema::{FieldDefault, RawField, RawNode, RawSchema, RawType, Schema, SchemaId},
};

/// Converted shared sub-schemas, keyed by schema identity.
///
/// The cache's scope decides how much work is shared: one cache per resource build converts
/// a sub-schema once per resource, a cache reused across builds converts it once overall.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: HashMap<SchemaId, Arc<SubSchema>>,
    conversions: usize,
}

impl SchemaCache {
    pub fn new() -> Self {
        SchemaCache::default()
    }

    pub fn get(&self, id: SchemaId) -> Option<&Arc<SubSchema>> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of sub-schema trees actually traversed through this cache.
    pub fn conversions(&self) -> usize {
        self.conversions
    }
}

pub struct SchemaConverter<'c> {
    cache: &'c mut SchemaCache,
}

impl<'c> SchemaConverter<'c> {
    pub fn new(cache: &'c mut SchemaCache) -> Self {
        SchemaConverter { cache }
    }

    /// Converts a tree without recording relations.
    pub fn convert(&mut self, tree: &RawSchema) -> NormalizedSchema {
        let mut normalized = NormalizedSchema::default();

        for (name, node) in tree.iter() {
            normalized.insert(name.to_string(), self.map_node(node));
        }

        normalized
    }

    /// Converts a resource's root tree, reporting its reference fields to `inferencer`.
    pub fn convert_root(
        &mut self,
        tree: &RawSchema,
        inferencer: &mut RelationInferencer<'_>,
    ) -> NormalizedSchema {
        let mut normalized = NormalizedSchema::default();

        for (name, node) in tree.iter() {
            match node {
                RawNode::Field(RawField { reference: Some(reference), .. }) => {
                    inferencer.reference(name, reference)
                }
                RawNode::Array(inner) => {
                    if let RawNode::Field(RawField { reference: Some(reference), .. }) = inner.as_ref() {
                        inferencer.reference_array(name, reference)
                    }
                }
                _ => {}
            }
            normalized.insert(name.to_string(), self.map_node(node));
        }

        normalized
    }

    /// Maps one raw node.
    pub fn map_node(&mut self, node: &RawNode) -> NormalizedField {
        match node {
            RawNode::Type(ty) => self.map_type(ty),
            RawNode::Field(field) => self.map_field(field),
            RawNode::Array(inner) => {
                NormalizedField::of(NormalizedType::Array(Box::new(self.map_node(inner))))
            }
        }
    }

    fn map_field(&mut self, field: &RawField) -> NormalizedField {
        NormalizedField {
            default: field.default.as_ref().map(|default| match default {
                FieldDefault::Value(value) => NormalizedDefault::Static(value.clone()),
                FieldDefault::Computed(compute) => NormalizedDefault::Auto(AutoValue(compute.clone())),
            }),
            allowed_values: field.allowed_values.clone(),
            ..self.map_type(&field.ty)
        }
    }

    fn map_type(&mut self, ty: &RawType) -> NormalizedField {
        let ty = match ty {
            RawType::String => NormalizedType::String,
            RawType::Number => NormalizedType::Number,
            RawType::Boolean => NormalizedType::Boolean,
            RawType::Buffer => NormalizedType::Buffer,
            RawType::ObjectId => NormalizedType::Reference,
            RawType::Mixed => NormalizedType::Mixed,
            RawType::Date => NormalizedType::Date,
            RawType::Object => {
                return NormalizedField { blackbox: true, ..NormalizedField::of(NormalizedType::Object) };
            }
            RawType::Nested(tree) => NormalizedType::Nested(self.convert(tree)),
            RawType::Schema(link) => self.sub_schema(link.id(), || link.upgrade()),
        };

        NormalizedField::of(ty)
    }

    fn sub_schema(
        &mut self,
        id: SchemaId,
        schema: impl FnOnce() -> Option<Arc<Schema>>,
    ) -> NormalizedType {
        if let Some(entry) = self.cache.entries.get(&id) {
            let reference = if entry.fields().is_some() {
                SubSchemaRef::Shared(entry.clone())
            } else {
                trace!(?id, "Sub-schema refers to itself");
                SubSchemaRef::Recursive { id, schema: Arc::downgrade(entry) }
            };
            return NormalizedType::SubSchema(reference);
        }

        let Some(schema) = schema() else {
            warn!(?id, "Sub-schema was dropped before conversion; treating it as mixed");
            return NormalizedType::Mixed;
        };

        let entry = Arc::new(SubSchema::pending(id));
        self.cache.entries.insert(id, entry.clone());
        self.cache.conversions += 1;

        let fields = self.convert(schema.tree());
        entry.complete(fields);

        NormalizedType::SubSchema(SubSchemaRef::Shared(entry))
    }
}
