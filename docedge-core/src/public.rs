//! Public (externally visible) schema derivation.
//!
//! A [`PublicSchema`] maps external field paths to how they are obtained from the stored
//! document. Private fields are left out. Nested sub-documents and shared sub-schemas get an
//! entry of their own plus one per dotted path below them. At the root an `id` entry
//! aliasing the storage key is added unless the schema declares its own `id` field.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    str::FromStr,
};

use crate::{
    normalized::NormalizedType,
    schema::{RawSchema, RawType, SchemaId},
};

/// How an external field is obtained from the stored document.
#[derive(Debug, Clone, PartialEq)]
pub enum PublicEntry {
    /// Same name internally; written `=`.
    Same,
    /// Stored under another name; written `=name`.
    Alias(String),
    /// Stored under another name and converted to another type.
    Transform { internal: String, ty: NormalizedType },
}

impl PublicEntry {
    /// The storage name of the external field `external`.
    pub fn internal_name<'a>(&'a self, external: &'a str) -> &'a str {
        match self {
            PublicEntry::Same => external,
            PublicEntry::Alias(internal) | PublicEntry::Transform { internal, .. } => internal,
        }
    }
}

impl fmt::Display for PublicEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicEntry::Same => f.write_str("="),
            PublicEntry::Alias(internal) => write!(f, "={internal}"),
            PublicEntry::Transform { internal, ty } => write!(f, "={internal} as {ty:?}"),
        }
    }
}

impl FromStr for PublicEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('=') {
            Some("") => Ok(PublicEntry::Same),
            Some(internal) => Ok(PublicEntry::Alias(internal.to_string())),
            None => Err(format!("public entry must start with '=': {s}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublicSchema {
    entries: BTreeMap<String, PublicEntry>,
}

impl PublicSchema {
    pub fn new() -> Self {
        PublicSchema::default()
    }

    /// Derives the public schema of a resource's root tree.
    pub fn derive(tree: &RawSchema) -> Self {
        let mut schema = PublicSchema::new();
        let mut visited = HashSet::new();
        schema.collect(tree, "", &mut visited);

        if !tree.contains("id") {
            schema.insert("id", PublicEntry::Alias("_id".to_string()));
        }

        schema
    }

    fn collect(&mut self, tree: &RawSchema, prefix: &str, visited: &mut HashSet<SchemaId>) {
        for (name, node) in tree.iter() {
            if node.is_private() {
                continue;
            }

            let path = join(prefix, name);
            self.insert(path.clone(), PublicEntry::Same);

            match node.declared_type() {
                Some(RawType::Nested(nested)) => self.collect(nested, &path, visited),
                Some(RawType::Schema(link)) if visited.insert(link.id()) => {
                    if let Some(schema) = link.upgrade() {
                        self.collect(schema.tree(), &path, visited);
                    }
                    visited.remove(&link.id());
                }
                _ => {}
            }
        }
    }

    /// Adds an entry and returns the schema, for chained construction.
    pub fn entry(mut self, external: impl Into<String>, entry: PublicEntry) -> Self {
        self.insert(external, entry);
        self
    }

    pub fn insert(&mut self, external: impl Into<String>, entry: PublicEntry) {
        self.entries.insert(external.into(), entry);
    }

    pub fn remove(&mut self, external: &str) -> Option<PublicEntry> {
        self.entries.remove(external)
    }

    pub fn get(&self, external: &str) -> Option<&PublicEntry> {
        self.entries.get(external)
    }

    pub fn contains(&self, external: &str) -> bool {
        self.entries.contains_key(external)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PublicEntry)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Paths left out of default store projections: private fields and `select(false)` fields.
pub fn hidden_paths(tree: &RawSchema) -> Vec<String> {
    let mut paths = Vec::new();
    collect_hidden(tree, "", &mut HashSet::new(), &mut paths);
    paths
}

fn collect_hidden(
    tree: &RawSchema,
    prefix: &str,
    visited: &mut HashSet<SchemaId>,
    paths: &mut Vec<String>,
) {
    for (name, node) in tree.iter() {
        let path = join(prefix, name);
        if node.is_hidden() {
            paths.push(path);
            continue;
        }

        match node.declared_type() {
            Some(RawType::Nested(nested)) => collect_hidden(nested, &path, visited, paths),
            Some(RawType::Schema(link)) if visited.insert(link.id()) => {
                if let Some(schema) = link.upgrade() {
                    collect_hidden(schema.tree(), &path, visited, paths);
                }
                visited.remove(&link.id());
            }
            _ => {}
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() { name.to_string() } else { format!("{prefix}.{name}") }
}

/// How a resource's public schema is obtained.
pub enum PublicSchemaOverride {
    /// Derived from the resource's schema.
    Derived,
    /// Used as given.
    Replace(PublicSchema),
    /// Derived, then modified.
    Modify(Box<dyn FnOnce(PublicSchema) -> PublicSchema + Send>),
}

impl PublicSchemaOverride {
    pub fn apply(self, tree: &RawSchema) -> PublicSchema {
        match self {
            PublicSchemaOverride::Derived => PublicSchema::derive(tree),
            PublicSchemaOverride::Replace(schema) => schema,
            PublicSchemaOverride::Modify(modify) => modify(PublicSchema::derive(tree)),
        }
    }
}

impl fmt::Debug for PublicSchemaOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicSchemaOverride::Derived => f.write_str("Derived"),
            PublicSchemaOverride::Replace(schema) => f.debug_tuple("Replace").field(schema).finish(),
            PublicSchemaOverride::Modify(_) => f.write_str("Modify(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawField, RawNode, Schema};

    #[test]
    fn private_fields_are_skipped_and_id_synthesized() {
        let tree = RawSchema::new()
            .field("name", RawType::String)
            .field("password", RawField::new(RawType::String).private())
            .field("address", RawSchema::new().field("city", RawType::String));

        let public = PublicSchema::derive(&tree);

        assert_eq!(public.get("name"), Some(&PublicEntry::Same));
        assert_eq!(public.get("address.city"), Some(&PublicEntry::Same));
        assert_eq!(public.get("id"), Some(&PublicEntry::Alias("_id".into())));
        assert!(!public.contains("password"));
        assert_eq!(public.get("address"), Some(&PublicEntry::Same));
        assert_eq!(
            public.iter().map(|(path, _)| path).collect::<Vec<_>>(),
            vec!["address", "address.city", "id", "name"]
        );
    }

    #[test]
    fn declared_id_is_kept() {
        let tree = RawSchema::new().field("id", RawType::String);

        assert_eq!(PublicSchema::derive(&tree).get("id"), Some(&PublicEntry::Same));
    }

    #[test]
    fn recursive_schemas_are_flattened_once() {
        let node = Schema::recursive(|this| {
            RawSchema::new()
                .field("label", RawType::String)
                .field("parent", this)
        });

        let public = PublicSchema::derive(&RawSchema::new().field("root", node));

        assert_eq!(public.get("root"), Some(&PublicEntry::Same));
        assert_eq!(public.get("root.label"), Some(&PublicEntry::Same));
        assert_eq!(public.get("root.parent"), Some(&PublicEntry::Same));
        assert!(!public.contains("root.parent.label"));
        // arrays are leaves
        let list = PublicSchema::derive(&RawSchema::new().field("tags", RawNode::array(RawType::String)));
        assert_eq!(list.get("tags"), Some(&PublicEntry::Same));
    }

    #[test]
    fn hidden_paths_cover_private_and_unselected_fields() {
        let tree = RawSchema::new()
            .field("name", RawType::String)
            .field("password", RawField::new(RawType::String).private())
            .field("meta", RawSchema::new().field("token", RawField::new(RawType::String).select(false)));

        assert_eq!(hidden_paths(&tree), vec!["meta.token".to_string(), "password".to_string()]);
    }

    #[test]
    fn entries_parse_from_notation() {
        assert_eq!("=".parse::<PublicEntry>(), Ok(PublicEntry::Same));
        assert_eq!("=_id".parse::<PublicEntry>(), Ok(PublicEntry::Alias("_id".into())));
        assert!("name".parse::<PublicEntry>().is_err());
        assert_eq!(PublicEntry::Alias("_id".into()).to_string(), "=_id");
    }

    #[test]
    fn overrides_replace_or_modify() {
        let tree = RawSchema::new().field("name", RawType::String);

        let replaced = PublicSchemaOverride::Replace(PublicSchema::new().entry("title", PublicEntry::Alias("name".into())))
            .apply(&tree);
        assert_eq!(replaced.len(), 1);

        let modified = PublicSchemaOverride::Modify(Box::new(|mut schema| {
            schema.remove("id");
            schema
        }))
        .apply(&tree);
        assert!(modified.contains("name"));
        assert!(!modified.contains("id"));
    }
}
