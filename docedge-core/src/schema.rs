//! Raw schema declarations.
//!
//! A resource's document shape is described by a [`RawSchema`]: a map from field names to
//! [`RawNode`]s. A node is either a bare type marker, a full field declaration
//! ([`RawField`]) carrying defaults, enumerations, references and storage flags, or an
//! array wrapping exactly one inner node.
//!
//! Sub-documents come in two flavors:
//!
//! - [`RawType::Nested`] - a plain, one-off nested map
//! - [`RawType::Schema`] - a shared [`Schema`] object with its own identity, which may be
//!   reused by several fields and may refer to itself (see [`Schema::recursive`])
//!
//! # Example
//!
//! ```ignore
//! use docedge::schema::{RawSchema, RawField, RawNode, RawType, Schema};
//!
//! let comment = Schema::recursive(|this| {
//!     RawSchema::new()
//!         .field("text", RawType::String)
//!         .field("replies", RawNode::array(this))
//! });
//!
//! let post = RawSchema::new()
//!     .field("title", RawField::new(RawType::String).unique())
//!     .field("author", RawField::reference("user"))
//!     .field("comments", RawNode::array(comment))
//!     .field("secret", RawField::new(RawType::String).private());
//! ```

use bson::{Bson, ser::serialize_to_bson};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::error::SchemaError;

static NEXT_SCHEMA_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a shared [`Schema`] object, assigned once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaId(u64);

impl SchemaId {
    fn next() -> Self {
        SchemaId(NEXT_SCHEMA_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The type a field is declared with.
#[derive(Debug, Clone)]
pub enum RawType {
    String,
    Number,
    Boolean,
    Buffer,
    /// Identifier of another document; the type of reference fields.
    ObjectId,
    /// Any value.
    Mixed,
    Date,
    /// An untyped object whose structure is not described.
    Object,
    /// A shared sub-schema.
    Schema(SchemaLink),
    /// A one-off nested sub-document.
    Nested(RawSchema),
}

impl RawType {
    fn from_name(name: &str) -> Result<Self, SchemaError> {
        Ok(match name {
            "String" => RawType::String,
            "Number" => RawType::Number,
            "Boolean" => RawType::Boolean,
            "Buffer" => RawType::Buffer,
            "ObjectId" => RawType::ObjectId,
            "Mixed" => RawType::Mixed,
            "Date" => RawType::Date,
            "Object" => RawType::Object,
            other => return Err(SchemaError::UnknownType(other.to_string())),
        })
    }
}

/// A node of a raw schema tree.
#[derive(Debug, Clone)]
pub enum RawNode {
    /// A bare type marker.
    Type(RawType),
    /// A field declaration with options.
    Field(RawField),
    /// A repeated field; the inner node describes the element type.
    Array(Box<RawNode>),
}

impl RawNode {
    /// Wraps a node into an array node.
    pub fn array(inner: impl Into<RawNode>) -> Self {
        RawNode::Array(Box::new(inner.into()))
    }

    /// Whether the node is excluded from the public projection.
    pub fn is_private(&self) -> bool {
        match self {
            RawNode::Type(_) => false,
            RawNode::Field(field) => field.private,
            RawNode::Array(inner) => inner.is_private(),
        }
    }

    /// Whether the node is left out of default store projections.
    pub fn is_hidden(&self) -> bool {
        match self {
            RawNode::Type(_) => false,
            RawNode::Field(field) => field.private || field.flags.select == Some(false),
            RawNode::Array(inner) => inner.is_hidden(),
        }
    }

    /// The declared type, looking through field declarations. Arrays have none.
    pub fn declared_type(&self) -> Option<&RawType> {
        match self {
            RawNode::Type(ty) => Some(ty),
            RawNode::Field(field) => Some(&field.ty),
            RawNode::Array(_) => None,
        }
    }
}

impl From<RawType> for RawNode {
    fn from(ty: RawType) -> Self {
        RawNode::Type(ty)
    }
}

impl From<RawField> for RawNode {
    fn from(field: RawField) -> Self {
        RawNode::Field(field)
    }
}

impl From<RawSchema> for RawNode {
    fn from(tree: RawSchema) -> Self {
        RawNode::Type(RawType::Nested(tree))
    }
}

impl From<Arc<Schema>> for RawNode {
    fn from(schema: Arc<Schema>) -> Self {
        RawNode::Type(RawType::Schema(schema.into()))
    }
}

impl From<SchemaLink> for RawNode {
    fn from(link: SchemaLink) -> Self {
        RawNode::Type(RawType::Schema(link))
    }
}

/// A raw schema tree: field names mapped to nodes.
#[derive(Debug, Clone, Default)]
pub struct RawSchema {
    fields: BTreeMap<String, RawNode>,
}

impl RawSchema {
    pub fn new() -> Self {
        RawSchema::default()
    }

    /// Adds a field and returns the schema, for chained construction.
    pub fn field(mut self, name: impl Into<String>, node: impl Into<RawNode>) -> Self {
        self.insert(name, node);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, node: impl Into<RawNode>) {
        self.fields.insert(name.into(), node.into());
    }

    pub fn get(&self, name: &str) -> Option<&RawNode> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawNode)> {
        self.fields
            .iter()
            .map(|(name, node)| (name.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reads a schema declared as JSON.
    ///
    /// Type markers are written as type names (`"String"`, `"ObjectId"`, `"Date"`, ...),
    /// arrays as one-element arrays, field declarations as objects with a `type` key, and
    /// nested sub-documents as objects without one:
    ///
    /// ```ignore
    /// let schema = RawSchema::from_json(&json!({
    ///     "name": { "type": "String", "unique": true },
    ///     "owner": { "type": "ObjectId", "ref": "user", "relation": { "foreignName": "pets" } },
    ///     "tags": ["String"],
    ///     "address": { "city": "String" }
    /// }))?;
    /// ```
    pub fn from_json(value: &Value) -> Result<Self, SchemaError> {
        match value {
            Value::Object(map) => Self::from_json_map(map, ""),
            _ => Err(SchemaError::NotAnObject),
        }
    }

    fn from_json_map(map: &Map<String, Value>, prefix: &str) -> Result<Self, SchemaError> {
        let mut schema = RawSchema::new();

        for (name, value) in map {
            let path = if prefix.is_empty() { name.clone() } else { format!("{prefix}.{name}") };
            schema.insert(name.clone(), node_from_json(value, &path)?);
        }

        Ok(schema)
    }
}

fn node_from_json(value: &Value, path: &str) -> Result<RawNode, SchemaError> {
    match value {
        Value::String(name) => Ok(RawNode::Type(RawType::from_name(name)?)),
        Value::Array(items) => match items.as_slice() {
            [inner] => Ok(RawNode::array(node_from_json(inner, path)?)),
            _ => Err(SchemaError::InvalidField(
                path.to_string(),
                "array declarations must wrap exactly one element".to_string(),
            )),
        },
        Value::Object(map) if map.contains_key("type") => {
            Ok(RawNode::Field(field_from_json(map, path)?))
        }
        Value::Object(map) => Ok(RawNode::Type(RawType::Nested(RawSchema::from_json_map(
            map, path,
        )?))),
        other => Err(SchemaError::InvalidField(
            path.to_string(),
            format!("unexpected declaration {other}"),
        )),
    }
}

fn field_from_json(map: &Map<String, Value>, path: &str) -> Result<RawField, SchemaError> {
    let invalid = |message: &str| SchemaError::InvalidField(path.to_string(), message.to_string());

    let ty = match map.get("type") {
        Some(Value::String(name)) => RawType::from_name(name)?,
        Some(Value::Object(nested)) => RawType::Nested(RawSchema::from_json_map(nested, path)?),
        _ => return Err(invalid("type must be a type name or a nested object")),
    };
    let mut field = RawField::new(ty);

    if let Some(default) = map.get("default") {
        let value = serialize_to_bson(default)
            .map_err(|err| invalid(&format!("invalid default: {err}")))?;
        field.default = Some(FieldDefault::Value(value));
    }
    if let Some(values) = map.get("enum") {
        let Value::Array(values) = values else {
            return Err(invalid("enum must be an array"));
        };
        let values = values
            .iter()
            .map(|value| serialize_to_bson(value))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| invalid(&format!("invalid enum value: {err}")))?;
        field.allowed_values = Some(values);
    }
    if let Some(target) = map.get("ref") {
        let Value::String(target) = target else {
            return Err(invalid("ref must be a resource name"));
        };
        field.reference = Some(Reference::new(target.clone()));
    }
    if let Some(relation) = map.get("relation") {
        let Some(reference) = field.reference.as_mut() else {
            return Err(invalid("relation metadata requires a ref"));
        };
        reference.relation =
            relation_from_json(relation).ok_or_else(|| invalid("invalid relation metadata"))?;
    }

    let flag = |key: &str| map.get(key).and_then(Value::as_bool).unwrap_or(false);
    field.private = flag("private");
    field.flags.unique = flag("unique");
    field.flags.sparse = flag("sparse");
    field.flags.index = flag("index");
    field.flags.select = map.get("select").and_then(Value::as_bool);
    field.flags.expires = map.get("expires").map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });

    Ok(field)
}

fn relation_from_json(value: &Value) -> Option<RelationMeta> {
    let map = value.as_object()?;
    let text = |key: &str| map.get(key).and_then(Value::as_str).map(str::to_string);

    Some(RelationMeta {
        name: text("name"),
        foreign_name: text("foreignName"),
        kind: match map.get("type") {
            None => None,
            Some(Value::String(kind)) => Some(match kind.as_str() {
                "one-to-one" => RelationKind::OneToOne,
                "many-to-many" => RelationKind::ManyToMany,
                "many-to-one" => RelationKind::ManyToOne,
                _ => return None,
            }),
            Some(_) => return None,
        },
    })
}

/// A shared sub-schema with its own identity.
#[derive(Debug)]
pub struct Schema {
    id: SchemaId,
    tree: RawSchema,
}

impl Schema {
    pub fn new(tree: RawSchema) -> Arc<Self> {
        Arc::new(Schema { id: SchemaId::next(), tree })
    }

    /// Builds a schema that may refer to itself through the link handed to `build`.
    pub fn recursive(build: impl FnOnce(SchemaLink) -> RawSchema) -> Arc<Self> {
        let id = SchemaId::next();

        Arc::new_cyclic(|schema| Schema {
            id,
            tree: build(SchemaLink::Recursive { id, schema: schema.clone() }),
        })
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn tree(&self) -> &RawSchema {
        &self.tree
    }
}

/// A handle on a shared schema: owning, or a back-reference from inside the schema itself.
#[derive(Debug, Clone)]
pub enum SchemaLink {
    Shared(Arc<Schema>),
    Recursive { id: SchemaId, schema: Weak<Schema> },
}

impl SchemaLink {
    pub fn id(&self) -> SchemaId {
        match self {
            SchemaLink::Shared(schema) => schema.id,
            SchemaLink::Recursive { id, .. } => *id,
        }
    }

    pub fn upgrade(&self) -> Option<Arc<Schema>> {
        match self {
            SchemaLink::Shared(schema) => Some(schema.clone()),
            SchemaLink::Recursive { schema, .. } => schema.upgrade(),
        }
    }
}

impl From<Arc<Schema>> for SchemaLink {
    fn from(schema: Arc<Schema>) -> Self {
        SchemaLink::Shared(schema)
    }
}

/// A full field declaration.
#[derive(Debug, Clone)]
pub struct RawField {
    pub ty: RawType,
    pub default: Option<FieldDefault>,
    pub allowed_values: Option<Vec<Bson>>,
    pub reference: Option<Reference>,
    pub private: bool,
    pub flags: StorageFlags,
}

impl RawField {
    pub fn new(ty: RawType) -> Self {
        RawField {
            ty,
            default: None,
            allowed_values: None,
            reference: None,
            private: false,
            flags: StorageFlags::default(),
        }
    }

    /// An `ObjectId` field referring to documents of the named resource.
    pub fn reference(target: impl Into<String>) -> Self {
        RawField {
            reference: Some(Reference::new(target)),
            ..RawField::new(RawType::ObjectId)
        }
    }

    /// Attaches relation metadata to the field's reference.
    ///
    /// Has no effect on fields without a reference.
    pub fn relation(mut self, meta: RelationMeta) -> Self {
        if let Some(reference) = self.reference.as_mut() {
            reference.relation = meta;
        }
        self
    }

    pub fn default_value(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    pub fn default_with(mut self, default: FieldDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn allowed_values(mut self, values: impl IntoIterator<Item = impl Into<Bson>>) -> Self {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.flags.unique = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.flags.sparse = true;
        self
    }

    pub fn index(mut self) -> Self {
        self.flags.index = true;
        self
    }

    pub fn select(mut self, select: bool) -> Self {
        self.flags.select = Some(select);
        self
    }

    pub fn expires(mut self, after: impl Into<String>) -> Self {
        self.flags.expires = Some(after.into());
        self
    }

    pub fn getter(mut self, hook: impl Fn(&Bson) -> Bson + Send + Sync + 'static) -> Self {
        self.flags.getter = Some(FieldHook(Arc::new(hook)));
        self
    }

    pub fn setter(mut self, hook: impl Fn(&Bson) -> Bson + Send + Sync + 'static) -> Self {
        self.flags.setter = Some(FieldHook(Arc::new(hook)));
        self
    }

    pub fn validator(mut self, check: impl Fn(&Bson) -> bool + Send + Sync + 'static) -> Self {
        self.flags.validator = Some(FieldValidator(Arc::new(check)));
        self
    }
}

/// A field's default: a literal, or a computation run when the caller leaves the field unset.
#[derive(Clone)]
pub enum FieldDefault {
    Value(Bson),
    Computed(Arc<dyn Fn() -> Bson + Send + Sync>),
}

impl FieldDefault {
    pub fn computed(compute: impl Fn() -> Bson + Send + Sync + 'static) -> Self {
        FieldDefault::Computed(Arc::new(compute))
    }

    /// The current time, computed at insertion.
    pub fn now() -> Self {
        FieldDefault::computed(|| Bson::DateTime(bson::DateTime::from_chrono(chrono::Utc::now())))
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Value(value) => f.debug_tuple("Value").field(value).finish(),
            FieldDefault::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A reference from a field to documents of another resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// Name of the referenced resource.
    pub target: String,
    pub relation: RelationMeta,
}

impl Reference {
    pub fn new(target: impl Into<String>) -> Self {
        Reference { target: target.into(), relation: RelationMeta::default() }
    }
}

/// Optional naming and cardinality hints attached to a reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationMeta {
    /// External name of the relation on the declaring resource (defaults to the field name).
    pub name: Option<String>,
    /// External name of the inverse relation on the referenced resource.
    pub foreign_name: Option<String>,
    pub kind: Option<RelationKind>,
}

impl RelationMeta {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn foreign_name(mut self, name: impl Into<String>) -> Self {
        self.foreign_name = Some(name.into());
        self
    }

    pub fn kind(mut self, kind: RelationKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    OneToOne,
    ManyToMany,
    ManyToOne,
}

/// Storage-only annotations. These never survive normalization.
#[derive(Debug, Clone, Default)]
pub struct StorageFlags {
    pub unique: bool,
    pub sparse: bool,
    pub index: bool,
    pub select: Option<bool>,
    pub expires: Option<String>,
    pub getter: Option<FieldHook>,
    pub setter: Option<FieldHook>,
    pub validator: Option<FieldValidator>,
}

#[derive(Clone)]
pub struct FieldHook(pub Arc<dyn Fn(&Bson) -> Bson + Send + Sync>);

impl fmt::Debug for FieldHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldHook(..)")
    }
}

#[derive(Clone)]
pub struct FieldValidator(pub Arc<dyn Fn(&Bson) -> bool + Send + Sync>);

impl fmt::Debug for FieldValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldValidator(..)")
    }
}
