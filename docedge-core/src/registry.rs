//! Registry of resources and of the relations inferred between them.
//!
//! Every resource built by a [`ResourceFactory`](crate::factory::ResourceFactory) is recorded
//! here together with the relations its schema declares. A relation may point at a resource
//! that is not registered yet; with lazy resolution enabled its key on that side stays
//! [`KeyField::Pending`] until the target registers, at which point it is filled in.
//!
//! Registration of a resource and the inference of its relations happen under a single write
//! guard, so concurrent registrations never observe each other half-done.

use mea::rwlock::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Identity and naming of a registered resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub name: String,
    pub plural: String,
    /// External identifier field (usually `id`).
    pub id_field: String,
    /// Storage key field (usually `_id`).
    pub key_field: String,
    pub collection: String,
    /// Storage paths left out of default projections.
    pub hidden_fields: Vec<String>,
}

impl ResourceInfo {
    /// Maps an external field name to the name it is stored under.
    pub fn storage_name(&self, field: &str) -> String {
        if field == self.id_field {
            self.key_field.clone()
        } else {
            field.to_string()
        }
    }
}

/// Outcome of looking up a relation target.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    Registered(&'a ResourceInfo),
    /// Not registered yet; relations to it are recorded with pending keys.
    Lazy,
    /// Not registered and lazy resolution is disabled.
    Unknown,
}

/// A key on one side of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyField {
    Field(String),
    /// The id field of a resource that has not been registered yet.
    Pending { awaiting: String },
}

impl KeyField {
    pub fn as_field(&self) -> Option<&str> {
        match self {
            KeyField::Field(field) => Some(field),
            KeyField::Pending { .. } => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, KeyField::Pending { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
}

/// A directed relation between two resources.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub from: String,
    pub to: String,
    /// Key on the `from` side.
    pub relation_key: KeyField,
    /// Key on the `to` side.
    pub related_key: KeyField,
    pub cardinality: Cardinality,
    pub name: Option<String>,
    /// Name of the inverse relation, when known.
    pub pair_name: Option<String>,
    pub has_pair: bool,
    /// Set when the relation was recorded before its target was registered.
    pub resolved_lazily: bool,
}

impl Relation {
    /// Whether both keys are known.
    pub fn is_resolved(&self) -> bool {
        !self.relation_key.is_pending() && !self.related_key.is_pending()
    }

    /// Whether the relation joins `a` and `b`, in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    fn resolve(&mut self, resource: &ResourceInfo) {
        for key in [&mut self.relation_key, &mut self.related_key] {
            if matches!(key, KeyField::Pending { awaiting } if *awaiting == resource.name) {
                *key = KeyField::Field(resource.id_field.clone());
            }
        }
    }
}

/// The registry contents, reachable only through a [`ResourceRegistry`] guard.
#[derive(Debug)]
pub struct RegistryState {
    lazy_resolution: bool,
    resources: HashMap<String, ResourceInfo>,
    relations: Vec<Relation>,
    /// Indices into `relations`, keyed by the resource they await.
    pending: HashMap<String, Vec<usize>>,
}

impl RegistryState {
    fn new(lazy_resolution: bool) -> Self {
        RegistryState {
            lazy_resolution,
            resources: HashMap::new(),
            relations: Vec::new(),
            pending: HashMap::new(),
        }
    }

    pub fn resolve(&self, name: &str) -> Resolution<'_> {
        match self.resources.get(name) {
            Some(info) => Resolution::Registered(info),
            None if self.lazy_resolution => Resolution::Lazy,
            None => Resolution::Unknown,
        }
    }

    /// Whether any relation already joins `a` and `b`, in either direction.
    pub fn connected(&self, a: &str, b: &str) -> bool {
        self.relations
            .iter()
            .any(|relation| relation.connects(a, b))
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn add_relation(&mut self, relation: Relation) {
        let index = self.relations.len();

        for key in [&relation.relation_key, &relation.related_key] {
            if let KeyField::Pending { awaiting } = key {
                let waiting = self.pending.entry(awaiting.clone()).or_default();
                if !waiting.contains(&index) {
                    waiting.push(index);
                }
            }
        }

        debug!(
            from = %relation.from,
            to = %relation.to,
            name = ?relation.name,
            cardinality = ?relation.cardinality,
            pending = !relation.is_resolved(),
            "Recorded relation"
        );
        self.relations.push(relation);
    }

    fn insert_resource(&mut self, info: ResourceInfo) -> ResourceResult<()> {
        if self.resources.contains_key(&info.name) {
            return Err(ResourceError::Registration(format!(
                "resource {} is already registered",
                info.name
            )));
        }

        if let Some(waiting) = self.pending.remove(&info.name) {
            for index in &waiting {
                if let Some(relation) = self.relations.get_mut(*index) {
                    relation.resolve(&info);
                }
            }
            debug!(resource = %info.name, count = waiting.len(), "Resolved pending relations");
        }

        debug!(resource = %info.name, collection = %info.collection, "Registered resource");
        self.resources.insert(info.name.clone(), info);
        Ok(())
    }
}

/// Shared, thread-safe registry of resources and relations.
#[derive(Debug)]
pub struct ResourceRegistry {
    state: RwLock<RegistryState>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        ResourceRegistry::new()
    }
}

impl ResourceRegistry {
    /// Creates a registry with lazy resolution enabled.
    pub fn new() -> Self {
        ResourceRegistry::builder().build()
    }

    pub fn builder() -> ResourceRegistryBuilder {
        ResourceRegistryBuilder { lazy_resolution: true }
    }

    /// Registers a resource, then runs `with` under the same write guard.
    ///
    /// Relations awaiting this resource are resolved before `with` runs, so a resource can
    /// refer to itself.
    pub async fn register_with<T>(
        &self,
        info: ResourceInfo,
        with: impl FnOnce(&mut RegistryState) -> T,
    ) -> ResourceResult<T> {
        let mut state = self.state.write().await;

        state.insert_resource(info)?;
        Ok(with(&mut *state))
    }

    pub async fn register(&self, info: ResourceInfo) -> ResourceResult<()> {
        self.register_with(info, |_| ()).await
    }

    pub async fn resource(&self, name: &str) -> Option<ResourceInfo> {
        self.state.read().await.resources.get(name).cloned()
    }

    pub async fn is_registered(&self, name: &str) -> bool {
        self.state.read().await.resources.contains_key(name)
    }

    pub async fn relations(&self) -> Vec<Relation> {
        self.state.read().await.relations.clone()
    }

    /// Relations whose `from` side is the named resource.
    pub async fn relations_from(&self, name: &str) -> Vec<Relation> {
        self.state
            .read()
            .await
            .relations
            .iter()
            .filter(|relation| relation.from == name)
            .cloned()
            .collect()
    }

    /// Number of relations still awaiting the named resource.
    pub async fn pending_for(&self, name: &str) -> usize {
        self.state
            .read()
            .await
            .pending
            .get(name)
            .map_or(0, Vec::len)
    }
}

pub struct ResourceRegistryBuilder {
    lazy_resolution: bool,
}

impl ResourceRegistryBuilder {
    /// Whether relations may point at resources that are not registered yet.
    pub fn lazy_resolution(mut self, enabled: bool) -> Self {
        self.lazy_resolution = enabled;
        self
    }

    pub fn build(self) -> ResourceRegistry {
        ResourceRegistry { state: RwLock::new(RegistryState::new(self.lazy_resolution)) }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn info(name: &str) -> ResourceInfo {
        ResourceInfo {
            name: name.to_string(),
            plural: format!("{name}s"),
            id_field: "id".to_string(),
            key_field: "_id".to_string(),
            collection: format!("{name}s"),
            hidden_fields: Vec::new(),
        }
    }

    fn pending_relation(from: &str, to: &str) -> Relation {
        Relation {
            from: from.to_string(),
            to: to.to_string(),
            relation_key: KeyField::Field("owner".to_string()),
            related_key: KeyField::Pending { awaiting: to.to_string() },
            cardinality: Cardinality::OneToOne,
            name: Some("owner".to_string()),
            pair_name: None,
            has_pair: true,
            resolved_lazily: true,
        }
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = ResourceRegistry::new();
        registry.register(info("user")).await.unwrap();

        let err = registry.register(info("user")).await.unwrap_err();
        assert!(matches!(err, ResourceError::Registration(_)));
    }

    #[tokio::test]
    async fn pending_keys_resolve_once_target_registers() {
        let registry = ResourceRegistry::new();
        registry
            .register_with(info("pet"), |state| state.add_relation(pending_relation("pet", "user")))
            .await
            .unwrap();
        assert_eq!(registry.pending_for("user").await, 1);

        registry.register(info("user")).await.unwrap();

        let relations = registry.relations().await;
        assert_eq!(relations[0].related_key, KeyField::Field("id".to_string()));
        assert!(relations[0].resolved_lazily);
        assert_eq!(registry.pending_for("user").await, 0);
    }

    #[tokio::test]
    async fn lookups_respect_lazy_resolution() {
        let lazy = ResourceRegistry::new();
        let strict = ResourceRegistry::builder().lazy_resolution(false).build();

        lazy.register_with(info("a"), |state| {
            assert_eq!(state.resolve("b"), Resolution::Lazy);
            assert!(matches!(state.resolve("a"), Resolution::Registered(_)));
        })
        .await
        .unwrap();
        strict
            .register_with(info("a"), |state| assert_eq!(state.resolve("b"), Resolution::Unknown))
            .await
            .unwrap();
    }

    #[test]
    fn storage_name_maps_only_the_id_field() {
        let user = info("user");

        assert_eq!(user.storage_name("id"), "_id");
        assert_eq!(user.storage_name("name"), "name");
    }
}
