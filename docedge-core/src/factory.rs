//! Construction of resources from schema declarations.
//!
//! ```ignore
//! let registry = Arc::new(ResourceRegistry::new());
//! let factory = ResourceFactory::new(registry, InMemoryStore::new());
//!
//! let users = factory.resource("user", user_schema).build().await?;
//! let pets = factory
//!     .resource("pet", pet_schema)
//!     .plural("pets")
//!     .public_schema_with(|mut public| {
//!         public.remove("internalCode");
//!         public
//!     })
//!     .build()
//!     .await?;
//! ```

use mea::mutex::Mutex;
use std::{collections::HashMap, sync::Arc};
use tracing::info;

use crate::{
    action::{Action, ActionRef},
    backend::StoreBackend,
    convert::{SchemaCache, SchemaConverter},
    error::ResourceResult,
    infer::RelationInferencer,
    normalized::NormalizedSchema,
    public::{PublicSchema, PublicSchemaOverride, hidden_paths},
    registry::{ResourceInfo, ResourceRegistry},
    resource::ResourceAdapter,
    schema::RawSchema,
};

/// Builds resources sharing one registry and one store backend.
#[derive(Debug)]
pub struct ResourceFactory<B> {
    registry: Arc<ResourceRegistry>,
    backend: B,
    shared_cache: Option<Arc<Mutex<SchemaCache>>>,
}

impl<B: StoreBackend + Clone> ResourceFactory<B> {
    pub fn new(registry: Arc<ResourceRegistry>, backend: B) -> Self {
        ResourceFactory { registry, backend, shared_cache: None }
    }

    /// Converts each shared sub-schema once for all resources built by this factory,
    /// instead of once per resource.
    pub fn with_shared_cache(mut self) -> Self {
        self.shared_cache = Some(Arc::new(Mutex::new(SchemaCache::new())));
        self
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn resource(&self, name: impl Into<String>, schema: RawSchema) -> ResourceBuilder<'_, B> {
        ResourceBuilder {
            factory: self,
            name: name.into(),
            schema,
            plural: None,
            collection: None,
            id_field: "id".to_string(),
            key_field: "_id".to_string(),
            public: PublicSchemaOverride::Derived,
            actions: HashMap::new(),
        }
    }
}

pub struct ResourceBuilder<'f, B> {
    factory: &'f ResourceFactory<B>,
    name: String,
    schema: RawSchema,
    plural: Option<String>,
    collection: Option<String>,
    id_field: String,
    key_field: String,
    public: PublicSchemaOverride,
    actions: HashMap<String, ActionRef<B>>,
}

impl<B: StoreBackend + Clone> ResourceBuilder<'_, B> {
    /// Defaults to the name followed by `s`.
    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = Some(plural.into());
        self
    }

    /// Defaults to the plural name.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = field.into();
        self
    }

    /// Uses `schema` as the public schema instead of deriving one.
    pub fn public_schema(mut self, schema: PublicSchema) -> Self {
        self.public = PublicSchemaOverride::Replace(schema);
        self
    }

    /// Derives the public schema, then hands it to `modify`.
    pub fn public_schema_with(
        mut self,
        modify: impl FnOnce(PublicSchema) -> PublicSchema + Send + 'static,
    ) -> Self {
        self.public = PublicSchemaOverride::Modify(Box::new(modify));
        self
    }

    pub fn action(mut self, action: impl Action<B> + 'static) -> Self {
        self.actions
            .insert(action.name().to_string(), Arc::new(action));
        self
    }

    /// Registers the resource, records the relations its schema declares and returns the
    /// adapter.
    ///
    /// Fails with [`ResourceError::Registration`](crate::error::ResourceError::Registration)
    /// when a resource with the same name already exists.
    pub async fn build(self) -> ResourceResult<ResourceAdapter<B>> {
        let plural = self
            .plural
            .unwrap_or_else(|| format!("{}s", self.name));
        let info = ResourceInfo {
            collection: self.collection.unwrap_or_else(|| plural.clone()),
            name: self.name,
            plural,
            id_field: self.id_field,
            key_field: self.key_field,
            hidden_fields: hidden_paths(&self.schema),
        };

        let public_schema = self.public.apply(&self.schema);
        let registry = self.factory.registry.clone();

        let schema = match &self.factory.shared_cache {
            Some(shared) => {
                let mut cache = shared.lock().await;
                register(&registry, info.clone(), &self.schema, &mut *cache).await?
            }
            None => register(&registry, info.clone(), &self.schema, &mut SchemaCache::new()).await?,
        };

        info!(resource = %info.name, collection = %info.collection, fields = schema.len(), "Built resource");

        Ok(ResourceAdapter {
            info,
            schema,
            public_schema,
            registry,
            backend: self.factory.backend.clone(),
            actions: self.actions,
        })
    }
}

/// Registers `info` and converts its tree under the same registry guard.
async fn register(
    registry: &ResourceRegistry,
    info: ResourceInfo,
    tree: &RawSchema,
    cache: &mut SchemaCache,
) -> ResourceResult<NormalizedSchema> {
    let name = info.name.clone();

    registry
        .register_with(info, |state| {
            let mut inferencer = RelationInferencer::new(state, name);
            SchemaConverter::new(cache).convert_root(tree, &mut inferencer)
        })
        .await
}
