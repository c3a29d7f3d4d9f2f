//! Normalized schema representation.
//!
//! This is what [`SchemaConverter`](crate::convert::SchemaConverter) produces from a
//! [`RawSchema`](crate::schema::RawSchema): only types, defaults and allowed values remain.
//! References, privacy markers and storage flags are gone.

use bson::Bson;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use crate::schema::SchemaId;

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedType {
    String,
    Number,
    Boolean,
    Buffer,
    /// Identifier of another document.
    Reference,
    /// Any value.
    Mixed,
    Date,
    /// Untyped object; always paired with `blackbox`.
    Object,
    /// A converted shared sub-schema.
    SubSchema(SubSchemaRef),
    /// A converted one-off sub-document.
    Nested(NormalizedSchema),
    Array(Box<NormalizedField>),
}

/// A normalized field descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedField {
    pub ty: NormalizedType,
    pub default: Option<NormalizedDefault>,
    pub allowed_values: Option<Vec<Bson>>,
    /// Set for untyped objects: their contents are not structurally validated.
    pub blackbox: bool,
}

impl NormalizedField {
    pub fn of(ty: NormalizedType) -> Self {
        NormalizedField { ty, default: None, allowed_values: None, blackbox: false }
    }

    /// The value the field takes, given what the caller supplied.
    ///
    /// Explicit values always win; otherwise the static default or the auto-value is used.
    pub fn resolve(&self, explicit: Option<&Bson>) -> Option<Bson> {
        match (&self.default, explicit) {
            (Some(NormalizedDefault::Auto(auto)), explicit) => Some(auto.resolve(explicit)),
            (_, Some(value)) => Some(value.clone()),
            (Some(NormalizedDefault::Static(value)), None) => Some(value.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedDefault {
    /// A literal default.
    Static(Bson),
    /// A computed default.
    Auto(AutoValue),
}

/// Keeps the caller's value when the field was set, computes one otherwise.
#[derive(Clone)]
pub struct AutoValue(pub(crate) Arc<dyn Fn() -> Bson + Send + Sync>);

impl AutoValue {
    pub fn resolve(&self, explicit: Option<&Bson>) -> Bson {
        match explicit {
            Some(value) => value.clone(),
            None => (self.0)(),
        }
    }
}

impl PartialEq for AutoValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for AutoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AutoValue(..)")
    }
}

/// A normalized schema tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSchema {
    fields: BTreeMap<String, NormalizedField>,
}

impl NormalizedSchema {
    pub fn get(&self, name: &str) -> Option<&NormalizedField> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NormalizedField)> {
        self.fields
            .iter()
            .map(|(name, field)| (name.as_str(), field))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn insert(&mut self, name: String, field: NormalizedField) {
        self.fields.insert(name, field);
    }
}

/// A converted shared sub-schema, filled once its conversion completes.
#[derive(Debug)]
pub struct SubSchema {
    id: SchemaId,
    fields: OnceLock<NormalizedSchema>,
}

impl SubSchema {
    pub(crate) fn pending(id: SchemaId) -> Self {
        SubSchema { id, fields: OnceLock::new() }
    }

    pub(crate) fn complete(&self, fields: NormalizedSchema) {
        let _ = self.fields.set(fields);
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    /// The converted fields; `None` only while the conversion is still running.
    pub fn fields(&self) -> Option<&NormalizedSchema> {
        self.fields.get()
    }
}

/// A handle on a converted sub-schema.
///
/// References met while the sub-schema itself is being converted are non-owning, so
/// self-referential schemas do not form reference cycles.
#[derive(Debug, Clone)]
pub enum SubSchemaRef {
    Shared(Arc<SubSchema>),
    Recursive { id: SchemaId, schema: Weak<SubSchema> },
}

impl SubSchemaRef {
    pub fn id(&self) -> SchemaId {
        match self {
            SubSchemaRef::Shared(schema) => schema.id,
            SubSchemaRef::Recursive { id, .. } => *id,
        }
    }

    pub fn get(&self) -> Option<Arc<SubSchema>> {
        match self {
            SubSchemaRef::Shared(schema) => Some(schema.clone()),
            SubSchemaRef::Recursive { schema, .. } => schema.upgrade(),
        }
    }
}

impl PartialEq for SubSchemaRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
