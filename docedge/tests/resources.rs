use bson::{Bson, Document, doc, oid::ObjectId};
use docedge::{memory::InMemoryStore, prelude::*};
use serde_json::json;
use std::sync::Arc;

fn user_schema() -> RawSchema {
    RawSchema::new()
        .field("name", RawType::String)
        .field("age", RawType::Number)
        .field("password", RawField::new(RawType::String).private())
        .field(
            "address",
            RawSchema::new()
                .field("city", RawType::String)
                .field("zip", RawType::String),
        )
}

async fn users_on<B: StoreBackend + Clone>(backend: B) -> ResourceAdapter<B> {
    ResourceFactory::new(Arc::new(ResourceRegistry::new()), backend)
        .resource("user", user_schema())
        .build()
        .await
        .unwrap()
}

async fn users() -> ResourceAdapter<InMemoryStore> {
    users_on(InMemoryStore::new()).await
}

async fn create(users: &ResourceAdapter<InMemoryStore>, body: Document) -> Bson {
    users
        .create(body)
        .await
        .unwrap()
        .into_data()
        .get("_id")
        .cloned()
        .unwrap()
}

#[tokio::test]
async fn created_entries_are_fetched_without_private_fields() {
    let users = users().await;
    let id = create(&users, doc! { "name": "Alice", "password": "secret" }).await;

    let fetched = users.get(&QueryContext::for_id(id.clone())).await.unwrap();

    assert_eq!(fetched.data, doc! { "_id": id, "name": "Alice" });
    assert_eq!(fetched.meta, None);
}

#[tokio::test]
async fn field_selection_overrides_the_default_projection() {
    let users = users().await;
    let id = create(&users, doc! { "name": "Alice", "age": 30, "password": "secret" }).await;

    let fetched = users
        .get(&QueryContext::builder().id(id.clone()).field("password").build())
        .await
        .unwrap();

    assert_eq!(fetched.data, doc! { "_id": id, "password": "secret" });
}

#[tokio::test]
async fn get_requires_an_id_and_an_existing_entry() {
    let users = users().await;

    let err = users.get(&QueryContext::new()).await.unwrap_err();
    assert!(matches!(&err, ResourceError::BadRequest(message) if message == "Missing ID"));
    assert_eq!(err.status_code(), 400);

    let err = users.get(&QueryContext::for_id(ObjectId::new())).await.unwrap_err();
    assert!(matches!(err, ResourceError::NotFound));
}

#[tokio::test]
async fn context_filters_narrow_single_entry_lookups() {
    let users = users().await;
    let id = create(&users, doc! { "name": "Alice", "age": 30 }).await;

    let minors = QueryContext::builder()
        .id(id.clone())
        .filter("age", FilterOperator::LowerThan, 18)
        .build();
    assert!(matches!(users.get(&minors).await, Err(ResourceError::NotFound)));

    let adults = QueryContext::builder()
        .id(id)
        .filter("age", FilterOperator::GreaterThanOrEquals, 18)
        .build();
    assert!(users.get(&adults).await.is_ok());
}

#[tokio::test]
async fn patch_sets_nested_fields_by_path() {
    let users = users().await;
    let id = create(
        &users,
        doc! { "name": "Kari", "address": { "city": "Oslo", "zip": "0150" } },
    )
    .await;

    let patched = users
        .patch(&QueryContext::for_id(id.clone()), doc! { "address": { "city": "Bergen" } })
        .await
        .unwrap()
        .into_data();

    assert_eq!(
        patched,
        doc! { "_id": id, "name": "Kari", "address": { "city": "Bergen", "zip": "0150" } }
    );
}

#[tokio::test]
async fn patch_resolves_the_id_from_the_body() {
    let users = users().await;
    let id = create(&users, doc! { "name": "Kari" }).await;

    let patched = users
        .patch(&QueryContext::new(), doc! { "id": id.clone(), "name": "Kari N" })
        .await
        .unwrap()
        .into_data();

    assert_eq!(patched, doc! { "_id": id, "name": "Kari N" });
}

#[tokio::test]
async fn patch_of_a_missing_entry_is_not_found() {
    let users = users().await;

    let result = users
        .patch(&QueryContext::for_id(ObjectId::new()), doc! { "name": "Nobody" })
        .await;

    assert!(matches!(result, Err(ResourceError::NotFound)));
}

#[tokio::test]
async fn update_overwrites_top_level_fields_and_keeps_the_rest() {
    let users = users().await;
    let id = create(
        &users,
        doc! { "name": "Ola", "age": 40, "password": "hunter2", "address": { "city": "Oslo", "zip": "0150" } },
    )
    .await;

    let updated = users
        .update(&QueryContext::for_id(id.clone()), doc! { "name": "Ola N", "address": { "city": "Tromsø" } })
        .await
        .unwrap()
        .into_data();
    assert_eq!(
        updated,
        doc! { "_id": id.clone(), "name": "Ola N", "age": 40, "address": { "city": "Tromsø" } }
    );

    // Hidden fields survive the rewrite.
    let stored = users
        .get(&QueryContext::builder().id(id).field("password").build())
        .await
        .unwrap();
    assert_eq!(stored.data.get_str("password").unwrap(), "hunter2");
}

#[tokio::test]
async fn update_without_an_id_is_a_bad_request() {
    let users = users().await;

    let result = users.update(&QueryContext::new(), doc! { "name": "Anyone" }).await;

    assert!(matches!(result, Err(ResourceError::BadRequest(_))));
}

#[tokio::test]
async fn remove_returns_the_deleted_entry() {
    let users = users().await;
    let id = create(&users, doc! { "name": "Alice", "password": "secret" }).await;

    let removed = users
        .remove(&QueryContext::new(), doc! { "_id": id.clone() })
        .await
        .unwrap();
    assert_eq!(removed.data, doc! { "_id": id.clone(), "name": "Alice" });

    let exists = users.exists(&QueryContext::for_id(id.clone())).await.unwrap();
    assert!(!exists.data);
    assert!(matches!(
        users.remove(&QueryContext::for_id(id), Document::new()).await,
        Err(ResourceError::NotFound)
    ));
}

#[tokio::test]
async fn remove_without_an_id_is_a_bad_request() {
    let users = users().await;
    create(&users, doc! { "name": "Alice" }).await;

    let result = users.remove(&QueryContext::new(), doc! { "id": Bson::Null }).await;

    assert!(matches!(result, Err(ResourceError::BadRequest(_))));
    assert_eq!(users.list(&QueryContext::new()).await.unwrap().data.len(), 1);
}

#[tokio::test]
async fn exists_reports_presence() {
    let users = users().await;
    let id = create(&users, doc! { "name": "Alice" }).await;

    assert!(users.exists(&QueryContext::for_id(id)).await.unwrap().data);
    assert!(!users.exists(&QueryContext::for_id(ObjectId::new())).await.unwrap().data);
    assert!(matches!(
        users.exists(&QueryContext::new()).await,
        Err(ResourceError::BadRequest(_))
    ));
}

#[tokio::test]
async fn exists_ignores_context_filters() {
    let users = users().await;
    let id = create(&users, doc! { "name": "Alice", "age": 30 }).await;

    let context = QueryContext::builder()
        .id(id)
        .filter("age", FilterOperator::LowerThan, 18)
        .build();

    assert!(users.exists(&context).await.unwrap().data);
}

#[tokio::test]
async fn contexts_decoded_from_json_address_entries_by_hex_id() {
    let users = users().await;
    let id = create(&users, doc! { "name": "Alice", "age": 30 }).await;
    let hex = id.as_object_id().unwrap().to_hex();

    let context: QueryContext = serde_json::from_value(json!({ "id": hex.clone() })).unwrap();
    assert_eq!(context.id, Some(Bson::String(hex)));

    let fetched = users.get(&context).await.unwrap();
    assert_eq!(fetched.data.get_str("name").unwrap(), "Alice");
    assert!(users.exists(&context).await.unwrap().data);

    let patched = users.patch(&context, doc! { "age": 31 }).await.unwrap();
    assert_eq!(patched.data.get_i32("age").unwrap(), 31);

    let updated = users.update(&context, doc! { "name": "Alicia" }).await.unwrap();
    assert_eq!(updated.data.get("_id"), Some(&id));
    assert_eq!(updated.data.get_str("name").unwrap(), "Alicia");

    let removed = users.remove(&context, Document::new()).await.unwrap();
    assert_eq!(removed.data.get("_id"), Some(&id));
    assert!(!users.exists(&context).await.unwrap().data);
}

#[tokio::test]
async fn body_id_addresses_the_storage_key_whatever_the_id_field() {
    let users = ResourceFactory::new(Arc::new(ResourceRegistry::new()), InMemoryStore::new())
        .resource("user", user_schema())
        .id_field("uid")
        .build()
        .await
        .unwrap();
    let id = create(&users, doc! { "name": "Kari" }).await;

    let patched = users
        .patch(&QueryContext::new(), doc! { "id": id.clone(), "name": "Kari N" })
        .await
        .unwrap()
        .into_data();

    assert_eq!(patched, doc! { "_id": id, "name": "Kari N" });
}

#[tokio::test]
async fn paginated_lists_carry_the_total() {
    let users = users().await;
    for age in 0..45 {
        create(&users, doc! { "name": format!("user-{age}"), "age": age }).await;
    }

    let page = users
        .list(
            &QueryContext::builder()
                .sort("age", SortDirection::Desc)
                .paginate(10, 5)
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(page.total(), Some(45));
    assert_eq!(page.data.len(), 10);
    assert_eq!(page.data[0].get_i32("age").unwrap(), 39);
    assert_eq!(page.data[9].get_i32("age").unwrap(), 30);
    assert!(page.data.iter().all(|user| !user.contains_key("password")));

    let pagination = page.meta.unwrap().pagination.unwrap();
    assert_eq!((pagination.limit, pagination.skip), (10, 5));
    assert!(pagination.has_more());
}

#[tokio::test]
async fn unpaginated_lists_have_no_meta() {
    let users = users().await;
    create(&users, doc! { "name": "Alice" }).await;

    let listed = users.list(&QueryContext::new()).await.unwrap();

    assert_eq!(listed.data.len(), 1);
    assert_eq!(listed.total(), None);
}

#[tokio::test]
async fn later_filters_on_a_field_replace_earlier_ones() {
    let users = users().await;
    for age in 0..10 {
        create(&users, doc! { "age": age }).await;
    }

    let listed = users
        .list(
            &QueryContext::builder()
                .filter("age", FilterOperator::GreaterThan, 6)
                .filter("age", FilterOperator::LowerThan, 3)
                .filter("age", FilterOperator::Unknown, 100)
                .build(),
        )
        .await
        .unwrap();

    let ages: Vec<i32> = listed
        .data
        .iter()
        .map(|user| user.get_i32("age").unwrap())
        .collect();
    assert_eq!(ages, vec![0, 1, 2]);
}

#[tokio::test]
async fn similar_and_in_filters() {
    let users = users().await;
    create(&users, doc! { "name": "Alice" }).await;
    create(&users, doc! { "name": "Malin" }).await;
    create(&users, doc! { "name": "Bob" }).await;

    let similar = users
        .list(&QueryContext::builder().filter("name", FilterOperator::Similar, "LI").build())
        .await
        .unwrap();
    assert_eq!(similar.data.len(), 2);

    let listed = users
        .list(
            &QueryContext::builder()
                .filter("name", FilterOperator::In, vec!["Bob", "Eve"])
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(listed.data.len(), 1);
    assert_eq!(listed.data[0].get_str("name").unwrap(), "Bob");
}

#[tokio::test]
async fn store_validation_failures_are_unprocessable() {
    let store = InMemoryStore::builder()
        .validator("users", |user| match user.get_str("name") {
            Ok(_) => Ok(()),
            Err(_) => Err("name is required".to_string()),
        })
        .build()
        .await
        .unwrap();
    let users = users_on(store).await;

    let err = users.create(doc! { "age": 3 }).await.unwrap_err();
    assert!(matches!(err, ResourceError::Unprocessable));
    assert_eq!(err.status_code(), 422);

    let id = users
        .create(doc! { "name": "Alice" })
        .await
        .unwrap()
        .into_data()
        .get("_id")
        .cloned()
        .unwrap();
    let err = users
        .update(&QueryContext::for_id(id), doc! { "name": Bson::Null })
        .await
        .unwrap_err();
    assert!(matches!(err, ResourceError::Unprocessable));
}

#[tokio::test]
async fn duplicate_keys_pass_through_as_store_errors() {
    let users = users().await;
    let id = create(&users, doc! { "name": "Alice" }).await;

    let err = users.create(doc! { "_id": id, "name": "Eve" }).await.unwrap_err();

    assert!(matches!(err, ResourceError::Store(StoreError::DuplicateKey(_, _))));
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn bulk_operations_are_not_supported() {
    let users = users().await;

    let err = users
        .update_all(&QueryContext::new(), doc! { "name": "Everyone" })
        .await
        .unwrap_err();
    assert!(matches!(err, ResourceError::NotSupported));
    assert!(matches!(
        users.remove_all(&QueryContext::new()).await,
        Err(ResourceError::NotSupported)
    ));
}

#[tokio::test]
async fn custom_key_fields_address_entries() {
    let users = ResourceFactory::new(Arc::new(ResourceRegistry::new()), InMemoryStore::new())
        .resource("user", RawSchema::new().field("email", RawType::String).field("name", RawType::String))
        .key_field("email")
        .build()
        .await
        .unwrap();
    users.create(doc! { "email": "kari@example.com", "name": "Kari" }).await.unwrap();

    let fetched = users.get(&QueryContext::for_id("kari@example.com")).await.unwrap();
    assert_eq!(fetched.data.get_str("name").unwrap(), "Kari");

    let patched = users
        .patch(&QueryContext::new(), doc! { "email": "kari@example.com", "name": "Kari N" })
        .await
        .unwrap();
    assert_eq!(patched.data.get_str("name").unwrap(), "Kari N");
    assert_eq!(patched.data.get_str("email").unwrap(), "kari@example.com");
}

#[tokio::test]
async fn shared_backends_serve_every_resource() {
    let store = Arc::new(InMemoryStore::new());
    let users = users_on(store.clone()).await;

    users.create(doc! { "name": "Alice" }).await.unwrap();

    assert_eq!(store.collections().await, vec!["users".to_string()]);
    assert_eq!(users.list(&QueryContext::new()).await.unwrap().data.len(), 1);
}

struct CountEntries;

#[async_trait::async_trait]
impl Action<InMemoryStore> for CountEntries {
    fn name(&self) -> &str {
        "count"
    }

    async fn run(
        &self,
        resource: &ResourceAdapter<InMemoryStore>,
        context: &QueryContext,
        _: Document,
    ) -> ResourceResult<Response<Bson>> {
        let entries = resource.list(context).await?;
        Ok(Response::new(Bson::Int64(entries.data.len() as i64)))
    }
}

#[tokio::test]
async fn actions_run_by_name() {
    let users = ResourceFactory::new(Arc::new(ResourceRegistry::new()), InMemoryStore::new())
        .resource("user", user_schema())
        .action(CountEntries)
        .build()
        .await
        .unwrap();
    users.create(doc! { "name": "Alice" }).await.unwrap();
    users.create(doc! { "name": "Bob" }).await.unwrap();

    let counted = users
        .call_action("count", &QueryContext::new(), Document::new())
        .await
        .unwrap();
    assert_eq!(counted.data, Bson::Int64(2));
    assert_eq!(users.action_names().collect::<Vec<_>>(), vec!["count"]);

    let err = users
        .call_action("archive", &QueryContext::new(), Document::new())
        .await
        .unwrap_err();
    assert!(matches!(&err, ResourceError::UnknownAction(name) if name == "archive"));
    assert_eq!(err.status_code(), 404);
}
