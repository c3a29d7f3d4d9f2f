//! CRUD resources over a document store.
//!
//! A [`Resource`] exposes the standard operations of an API resource (get, list, create,
//! patch, update, remove, exists) in transport-neutral form: requests arrive as a
//! [`QueryContext`] plus an optional body, results leave as a [`Response`] or a
//! [`ResourceError`] carrying its status code.
//!
//! [`ResourceAdapter`] implements it on top of any [`StoreBackend`]:
//!
//! - identifiers are translated from the external `id` to the storage key
//! - private and unselected fields are left out unless a field selection asks for them
//! - reference fields named in `populated_fields` are replaced by the referenced entries
//! - validation failures reported by the store become [`ResourceError::Unprocessable`]

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::{debug, warn};

use crate::{
    action::ActionRef,
    backend::StoreBackend,
    context::QueryContext,
    error::{ResourceError, ResourceResult},
    normalized::NormalizedSchema,
    public::PublicSchema,
    query::{Expr, FieldOp, Filter, Projection, Query, Sort},
    registry::{Relation, ResourceInfo, ResourceRegistry},
    response::Response,
    translate::FilterTranslator,
};

/// The operations every resource supports.
#[async_trait]
pub trait Resource: Send + Sync {
    fn info(&self) -> &ResourceInfo;

    /// Fetches the entry identified by `context.id`.
    async fn get(&self, context: &QueryContext) -> ResourceResult<Response<Document>>;

    /// Lists entries matching the context filters.
    ///
    /// With pagination, the response carries the total number of matching entries.
    async fn list(&self, context: &QueryContext) -> ResourceResult<Response<Vec<Document>>>;

    /// Stores a new entry and returns it as stored.
    async fn create(&self, body: Document) -> ResourceResult<Response<Document>>;

    /// Sets the fields present in `body` (nested ones by path) on an existing entry.
    async fn patch(&self, context: &QueryContext, body: Document) -> ResourceResult<Response<Document>>;

    /// Overwrites the top-level fields present in `body` and stores the whole entry back.
    async fn update(&self, context: &QueryContext, body: Document) -> ResourceResult<Response<Document>>;

    /// Deletes an entry, returning it as it was before deletion.
    async fn remove(&self, context: &QueryContext, body: Document) -> ResourceResult<Response<Document>>;

    /// Whether an entry with `context.id` exists. Context filters do not apply.
    async fn exists(&self, context: &QueryContext) -> ResourceResult<Response<bool>>;

    async fn update_all(&self, context: &QueryContext, body: Document) -> ResourceResult<Response<Vec<Document>>>;

    async fn remove_all(&self, context: &QueryContext) -> ResourceResult<Response<Vec<Document>>>;
}

/// A [`Resource`] backed by a [`StoreBackend`]. Built by a
/// [`ResourceFactory`](crate::factory::ResourceFactory).
pub struct ResourceAdapter<B: StoreBackend> {
    pub(crate) info: ResourceInfo,
    pub(crate) schema: NormalizedSchema,
    pub(crate) public_schema: PublicSchema,
    pub(crate) registry: Arc<ResourceRegistry>,
    pub(crate) backend: B,
    pub(crate) actions: HashMap<String, ActionRef<B>>,
}

impl<B: StoreBackend> ResourceAdapter<B> {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn plural_name(&self) -> &str {
        &self.info.plural
    }

    pub fn schema(&self) -> &NormalizedSchema {
        &self.schema
    }

    pub fn public_schema(&self) -> &PublicSchema {
        &self.public_schema
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Relations starting at this resource.
    pub async fn relations(&self) -> Vec<Relation> {
        self.registry.relations_from(&self.info.name).await
    }

    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// Runs the action registered under `name`.
    pub async fn call_action(
        &self,
        name: &str,
        context: &QueryContext,
        body: Document,
    ) -> ResourceResult<Response<Bson>> {
        let action = self
            .actions
            .get(name)
            .ok_or_else(|| ResourceError::UnknownAction(name.to_string()))?;

        debug!(resource = %self.info.name, action = name, "Running action");
        action.run(self, context, body).await
    }

    fn translator(&self) -> FilterTranslator<'_> {
        FilterTranslator::new(&self.info)
    }

    fn projection(&self, context: &QueryContext) -> Option<Projection> {
        if !context.fields.is_empty() {
            return Some(Projection::Include(
                context
                    .fields
                    .iter()
                    .map(|field| self.info.storage_name(field))
                    .collect(),
            ));
        }

        if self.info.hidden_fields.is_empty() {
            None
        } else {
            Some(Projection::Exclude(self.info.hidden_fields.clone()))
        }
    }

    /// The storage key and identifier a write applies to.
    ///
    /// Looked up in order: the context id, the key field of the body, then the body's literal
    /// `id` or `_id`, both of which address the physical `_id` key.
    fn resolve_id(&self, context: &QueryContext, body: &Document) -> ResourceResult<(String, Bson)> {
        let present = |value: Option<&Bson>| value.filter(|value| **value != Bson::Null).cloned();
        let key = &self.info.key_field;

        if let Some(id) = context.id.clone().filter(|id| *id != Bson::Null) {
            return Ok((key.clone(), id));
        }
        if let Some(id) = present(body.get(key)) {
            return Ok((key.clone(), id));
        }
        match present(body.get("id")).or_else(|| present(body.get("_id"))) {
            Some(id) => Ok(("_id".to_string(), id)),
            None => Err(ResourceError::missing_id()),
        }
    }

    /// The filter addressing one entry, narrowed by the context filters.
    fn keyed_filter(&self, key: &str, id: &Bson, context: &QueryContext) -> Expr {
        self.translator()
            .translate_keyed(Some((key.to_string(), id.clone())), &context.filters)
            .unwrap_or_else(|| Filter::eq(key, id.clone()))
    }

    /// Whether a body key identifies the entry rather than describing it.
    fn is_identity_key(&self, key: &str) -> bool {
        key == "_id"
            || key == self.info.key_field
            || ((key == "id" || key == self.info.id_field) && self.schema.get(key).is_none())
    }

    async fn fetch(&self, key: &str, id: &Bson, context: &QueryContext) -> ResourceResult<Document> {
        let query = Query {
            filter: Some(self.keyed_filter(key, id, context)),
            projection: self.projection(context),
            ..Query::default()
        };

        let mut entry = self
            .backend
            .find_one(query, &self.info.collection)
            .await?
            .ok_or(ResourceError::NotFound)?;

        self.populate(std::slice::from_mut(&mut entry), &context.populated_fields)
            .await?;
        Ok(entry)
    }

    /// Replaces reference fields named in `fields` with the entries they refer to.
    ///
    /// Only relations starting at this resource whose keys are both known are populated;
    /// identifiers with no matching entry are left as they are.
    async fn populate(&self, entries: &mut [Document], fields: &[String]) -> ResourceResult<()> {
        if fields.is_empty() || entries.is_empty() {
            return Ok(());
        }

        let relations = self.relations().await;

        for field in fields {
            let Some(relation) = relations.iter().find(|relation| {
                *field != self.info.id_field && relation.relation_key.as_field() == Some(field.as_str())
            }) else {
                debug!(resource = %self.info.name, field = %field, "No relation to populate");
                continue;
            };
            let Some(related_key) = relation.related_key.as_field() else {
                warn!(resource = %self.info.name, field = %field, target = %relation.to, "Relation target is not registered yet; skipping population");
                continue;
            };
            let Some(target) = self.registry.resource(&relation.to).await else {
                continue;
            };

            let storage_key = target.storage_name(related_key);
            let ids: Vec<Bson> = entries
                .iter()
                .filter_map(|entry| entry.get(field))
                .flat_map(|value| match value {
                    Bson::Array(items) => items.clone(),
                    Bson::Null => Vec::new(),
                    other => vec![other.clone()],
                })
                .collect();
            if ids.is_empty() {
                continue;
            }

            let query = Query {
                filter: Some(Filter::any_of(storage_key.clone(), ids)),
                projection: (!target.hidden_fields.is_empty())
                    .then(|| Projection::Exclude(target.hidden_fields.clone())),
                ..Query::default()
            };
            let related = self.backend.find(query, &target.collection).await?;
            let lookup = |id: &Bson| {
                related
                    .iter()
                    .find(|candidate| candidate.get(&storage_key).is_some_and(|key| same_key(key, id)))
                    .cloned()
                    .map(Bson::Document)
            };

            for entry in entries.iter_mut() {
                let populated = match entry.get(field) {
                    Some(Bson::Array(items)) => Some(Bson::Array(
                        items.iter().map(|id| lookup(id).unwrap_or_else(|| id.clone())).collect(),
                    )),
                    Some(Bson::Null) | None => None,
                    Some(id) => lookup(id),
                };
                if let Some(populated) = populated {
                    entry.insert(field.clone(), populated);
                }
            }
        }

        Ok(())
    }
}

/// Key equality where a hex string also matches the object id it spells.
fn same_key(stored: &Bson, requested: &Bson) -> bool {
    match (stored, requested) {
        (Bson::ObjectId(oid), Bson::String(hex)) | (Bson::String(hex), Bson::ObjectId(oid)) => {
            ObjectId::parse_str(hex).is_ok_and(|parsed| parsed == *oid)
        }
        _ => stored == requested,
    }
}

/// Flattens a body into dotted leaf paths. Arrays and empty documents are leaves.
fn leaf_paths(prefix: &str, document: &Document, into: &mut Document) {
    for (key, value) in document {
        let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };

        match value {
            Bson::Document(nested) if !nested.is_empty() => leaf_paths(&path, nested, into),
            other => {
                into.insert(path, other.clone());
            }
        }
    }
}

#[async_trait]
impl<B: StoreBackend> Resource for ResourceAdapter<B> {
    fn info(&self) -> &ResourceInfo {
        &self.info
    }

    async fn get(&self, context: &QueryContext) -> ResourceResult<Response<Document>> {
        let id = context.id.clone().ok_or_else(ResourceError::missing_id)?;

        Ok(Response::new(self.fetch(&self.info.key_field, &id, context).await?))
    }

    async fn list(&self, context: &QueryContext) -> ResourceResult<Response<Vec<Document>>> {
        let filter = self.translator().translate(None, &context.filters);
        let mut query = Query {
            filter: filter.clone(),
            projection: self.projection(context),
            sort: context
                .sort_by
                .iter()
                .map(|(field, direction)| Sort { field: self.info.storage_name(field), direction: *direction })
                .collect(),
            ..Query::default()
        };
        let collection = &self.info.collection;

        let Some(pagination) = context.pagination else {
            let mut entries = self.backend.find(query, collection).await?;
            self.populate(&mut entries, &context.populated_fields).await?;
            return Ok(Response::new(entries));
        };

        query.limit = Some(pagination.limit);
        query.offset = Some(pagination.skip);

        let (total, mut entries) = futures::try_join!(
            self.backend.count(filter, collection),
            self.backend.find(query, collection)
        )?;
        self.populate(&mut entries, &context.populated_fields).await?;

        Ok(Response::builder(entries)
            .with_pagination(total, pagination.limit, pagination.skip)
            .build())
    }

    async fn create(&self, body: Document) -> ResourceResult<Response<Document>> {
        let stored = self.backend.insert(body, &self.info.collection).await?;

        debug!(resource = %self.info.name, "Created entry");
        Ok(Response::new(stored))
    }

    async fn patch(&self, context: &QueryContext, body: Document) -> ResourceResult<Response<Document>> {
        let (key, id) = self.resolve_id(context, &body)?;

        let mut fields = Document::new();
        for (name, value) in &body {
            if self.is_identity_key(name) {
                continue;
            }
            match value {
                Bson::Document(nested) if !nested.is_empty() => leaf_paths(name, nested, &mut fields),
                other => {
                    fields.insert(name.clone(), other.clone());
                }
            }
        }

        if !fields.is_empty() {
            let matched = self
                .backend
                .update_fields(self.keyed_filter(&key, &id, context), fields, &self.info.collection)
                .await?;
            if matched == 0 {
                return Err(ResourceError::NotFound);
            }
        }

        Ok(Response::new(self.fetch(&key, &id, context).await?))
    }

    async fn update(&self, context: &QueryContext, body: Document) -> ResourceResult<Response<Document>> {
        let (key, id) = self.resolve_id(context, &body)?;
        let filter = self.keyed_filter(&key, &id, context);

        let mut entry = self
            .backend
            .find_one(Query::filtered(Some(filter.clone())), &self.info.collection)
            .await?
            .ok_or(ResourceError::NotFound)?;

        for (name, value) in body {
            if !self.is_identity_key(&name) {
                entry.insert(name, value);
            }
        }

        let target = match entry.get("_id") {
            Some(primary) => Filter::eq("_id", primary.clone()),
            None => filter,
        };
        self.backend
            .replace(target, entry, &self.info.collection)
            .await?;

        Ok(Response::new(self.fetch(&key, &id, context).await?))
    }

    async fn remove(&self, context: &QueryContext, body: Document) -> ResourceResult<Response<Document>> {
        let (key, id) = self.resolve_id(context, &body)?;
        let entry = self.fetch(&key, &id, context).await?;

        let deleted = self
            .backend
            .delete(Expr::field(key, FieldOp::Eq, id), &self.info.collection)
            .await?;
        debug!(resource = %self.info.name, deleted, "Removed entry");

        Ok(Response::new(entry))
    }

    async fn exists(&self, context: &QueryContext) -> ResourceResult<Response<bool>> {
        let id = context.id.clone().ok_or_else(ResourceError::missing_id)?;

        let count = self
            .backend
            .count(Some(Filter::eq(self.info.key_field.clone(), id)), &self.info.collection)
            .await?;
        Ok(Response::new(count > 0))
    }

    async fn update_all(&self, _: &QueryContext, _: Document) -> ResourceResult<Response<Vec<Document>>> {
        Err(ResourceError::NotSupported)
    }

    async fn remove_all(&self, _: &QueryContext) -> ResourceResult<Response<Vec<Document>>> {
        Err(ResourceError::NotSupported)
    }
}

impl<B: StoreBackend> fmt::Display for ResourceAdapter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.info.plural)
    }
}

impl<B: StoreBackend> fmt::Debug for ResourceAdapter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceAdapter")
            .field("info", &self.info)
            .field("backend", &self.backend)
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}
