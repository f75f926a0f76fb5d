//! End-to-end verb handler scenarios against the in-memory backend.

use std::collections::HashMap;

use bson::{Bson, Document};
use docrest_core::{
    api::{ApiResult, ErrorKind},
    backend::{Schema, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult, FieldError, ValidationFailure},
    handler::{Reply, RestCollection, Verb},
};
use docrest_memory::InMemoryStore;
use serde_json::{Value, json};

const UNKNOWN_ID: &str = "5ec2d0193fd8c5d9b72948cf";

struct Harness {
    things: RestCollection<InMemoryStore>,
}

impl Harness {
    async fn new() -> Self {
        Self {
            things: RestCollection::new("things", InMemoryStore::builder().build().await.unwrap()),
        }
    }

    async fn with_schema(schema: impl Schema + 'static) -> Self {
        let backend = InMemoryStore::builder().schema(schema).build().await.unwrap();
        Self {
            things: RestCollection::new("things", backend),
        }
    }

    async fn call(&self, verb: Verb, path: &str, params: &[(&str, &str)], body: Value) -> ApiResult<Reply> {
        let params: HashMap<String, String> = params
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        self.things.handle(verb, path, &params, body).await
    }

    /// Creates a document and returns its rendered form.
    async fn create(&self, body: Value) -> Value {
        let reply = self.call(Verb::Post, "/", &[], body).await.unwrap();
        assert_eq!(reply.status, 201);
        reply.body.unwrap()
    }
}

fn data(reply: Reply) -> Value {
    reply.body.unwrap()["data"].clone()
}

fn id_of(value: &Value) -> String {
    value["_id"].as_str().unwrap().to_string()
}

fn sample() -> Value {
    json!({
        "name": "root",
        "age": 30,
        "profile": { "city": "Oslo" },
        "nested": [
            { "dayOfWeek": "Monday", "deeplyNested": [{ "deepField": "a" }] },
            { "dayOfWeek": "Tuesday" },
        ],
    })
}

#[tokio::test]
async fn test_post_collection_stamps_ids() {
    let harness = Harness::new().await;

    let created = harness.create(sample()).await;

    assert_eq!(id_of(&created).len(), 24);
    assert_eq!(created["name"], "root");
    for element in created["nested"].as_array().unwrap() {
        assert_eq!(id_of(element).len(), 24);
    }
    assert_eq!(id_of(&created["nested"][0]["deeplyNested"][0]).len(), 24);
    assert!(created["profile"].get("_id").is_none());
}

#[tokio::test]
async fn test_post_non_object_body_is_rejected() {
    let harness = Harness::new().await;

    let err = harness.call(Verb::Post, "/", &[], json!([1, 2])).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_post_with_bad_nested_id_reports_cast() {
    let harness = Harness::new().await;

    let err = harness
        .call(Verb::Post, "/", &[], json!({ "nested": [{ "_id": "abc" }] }))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.details().len(), 1);
    assert_eq!(err.to_json()["error"]["detail"][0]["fieldPath"], "nested._id");
}

#[tokio::test]
async fn test_get_collection_in_insertion_order() {
    let harness = Harness::new().await;
    let first = harness.create(json!({ "name": "a", "age": 10 })).await;
    let second = harness.create(json!({ "name": "b", "age": 20 })).await;

    let reply = harness.call(Verb::Get, "/", &[], Value::Null).await.unwrap();

    assert_eq!(reply.status, 200);
    assert_eq!(data(reply), json!([first, second]));
}

#[tokio::test]
async fn test_get_collection_with_query_and_fields() {
    let harness = Harness::new().await;
    harness.create(json!({ "name": "a", "age": 10 })).await;
    let older = harness.create(json!({ "name": "b", "age": 20 })).await;

    let reply = harness
        .call(
            Verb::Get,
            "/",
            &[("query", r#"{"age":{"$gt":15}}"#), ("fields", r#"["name"]"#)],
            Value::Null,
        )
        .await
        .unwrap();

    assert_eq!(data(reply), json!([{ "_id": id_of(&older), "name": "b" }]));
}

#[tokio::test]
async fn test_get_collection_single() {
    let harness = Harness::new().await;
    let first = harness.create(json!({ "name": "a" })).await;
    harness.create(json!({ "name": "b" })).await;

    let reply = harness
        .call(Verb::Get, "/", &[("multiplicity", "one")], Value::Null)
        .await
        .unwrap();
    assert_eq!(data(reply), first);

    let reply = harness
        .call(
            Verb::Get,
            "/",
            &[("multiplicity", "one"), ("query", r#"{"name":"z"}"#)],
            Value::Null,
        )
        .await
        .unwrap();
    assert_eq!(data(reply), Value::Null);
}

#[tokio::test]
async fn test_get_rejects_bad_parameters() {
    let harness = Harness::new().await;

    let err = harness
        .call(Verb::Get, "/", &[("query", "{not json")], Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = harness
        .call(Verb::Get, "/", &[("query", r#"{"a":{"$regex":"x"}}"#)], Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = harness
        .call(Verb::Get, "/", &[("fields", r#"["name","-age"]"#)], Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_get_document_and_nested_values() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);
    let element = id_of(&created["nested"][0]);

    let reply = harness.call(Verb::Get, &format!("/{root}"), &[], Value::Null).await.unwrap();
    assert_eq!(data(reply), created);

    let reply = harness
        .call(Verb::Get, &format!("/{root}/nested/{element}"), &[], Value::Null)
        .await
        .unwrap();
    assert_eq!(data(reply), created["nested"][0]);

    let reply = harness
        .call(Verb::Get, &format!("/{root}/nested/{element}/dayOfWeek"), &[], Value::Null)
        .await
        .unwrap();
    assert_eq!(data(reply), json!("Monday"));

    let reply = harness
        .call(Verb::Get, &format!("/{root}/profile/city/"), &[], Value::Null)
        .await
        .unwrap();
    assert_eq!(data(reply), json!("Oslo"));
}

#[tokio::test]
async fn test_get_document_with_projection() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);

    let reply = harness
        .call(Verb::Get, &format!("/{root}"), &[("fields", r#"["-nested","-profile"]"#)], Value::Null)
        .await
        .unwrap();

    assert_eq!(data(reply), json!({ "_id": root, "name": "root", "age": 30 }));
}

#[tokio::test]
async fn test_get_nested_value_ignores_projection() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);
    let element = id_of(&created["nested"][0]);

    let reply = harness
        .call(Verb::Get, &format!("/{root}/nested/{element}"), &[("fields", r#"["name"]"#)], Value::Null)
        .await
        .unwrap();

    assert_eq!(data(reply), created["nested"][0]);
}

#[tokio::test]
async fn test_get_failures() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);

    let err = harness.call(Verb::Get, "/abc", &[], Value::Null).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.message(), "The ID provided: abc is not a valid id");

    let err = harness
        .call(Verb::Get, &format!("/{UNKNOWN_ID}"), &[], Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(
        err.message(),
        format!("The resource specified by ID: {UNKNOWN_ID} was not found")
    );

    let err = harness
        .call(Verb::Get, &format!("/{root}/missing"), &[], Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.message(), "The requested key: missing does not exist on this document");

    let err = harness
        .call(Verb::Get, &format!("/{root}/nested/{UNKNOWN_ID}"), &[], Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_post_nested_array_pushes_element() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);
    let element = id_of(&created["nested"][1]);

    let reply = harness
        .call(
            Verb::Post,
            &format!("/{root}/nested/{element}/deeplyNested"),
            &[],
            json!({ "deepField": "b" }),
        )
        .await
        .unwrap();

    assert_eq!(reply.status, 201);
    let document = data(reply);
    let pushed = &document["nested"][1]["deeplyNested"][0];
    assert_eq!(pushed["deepField"], "b");
    assert_eq!(id_of(pushed).len(), 24);
}

#[tokio::test]
async fn test_post_to_document_or_element_is_rejected() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);
    let element = id_of(&created["nested"][0]);

    let err = harness.call(Verb::Post, &format!("/{root}"), &[], json!({})).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.message(), "Cannot POST to the route specified");

    let err = harness
        .call(Verb::Post, &format!("/{root}/nested/{element}"), &[], json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_post_nested_to_unknown_document() {
    let harness = Harness::new().await;

    let err = harness
        .call(Verb::Post, &format!("/{UNKNOWN_ID}/nested"), &[], json!({ "x": 1 }))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_put_document_replaces_and_upserts() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);

    let reply = harness
        .call(Verb::Put, &format!("/{root}"), &[], json!({ "name": "replaced" }))
        .await
        .unwrap();
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body.unwrap(), json!({ "_id": root, "name": "replaced" }));

    let reply = harness
        .call(Verb::Put, &format!("/{UNKNOWN_ID}"), &[], json!({ "name": "fresh" }))
        .await
        .unwrap();
    assert_eq!(reply.body.unwrap(), json!({ "_id": UNKNOWN_ID, "name": "fresh" }));

    let reply = harness.call(Verb::Get, "/", &[], Value::Null).await.unwrap();
    assert_eq!(data(reply).as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_put_collection_needs_query() {
    let harness = Harness::new().await;
    let created = harness.create(json!({ "name": "a" })).await;

    let err = harness.call(Verb::Put, "/", &[], json!({ "name": "b" })).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.message(), "Query parameter (query) is required");

    let reply = harness
        .call(Verb::Put, "/", &[("query", r#"{"name":"a"}"#)], json!({ "name": "b" }))
        .await
        .unwrap();
    assert_eq!(data(reply), json!({ "_id": id_of(&created), "name": "b" }));

    let reply = harness
        .call(Verb::Put, "/", &[("query", r#"{"name":"zzz"}"#)], json!({ "name": "c" }))
        .await
        .unwrap();
    assert_eq!(data(reply), Value::Null);
}

#[tokio::test]
async fn test_put_nested_element_keeps_id() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);
    let element = id_of(&created["nested"][0]);

    let reply = harness
        .call(
            Verb::Put,
            &format!("/{root}/nested/{element}"),
            &[],
            json!({ "dayOfWeek": "Friday" }),
        )
        .await
        .unwrap();

    let document = data(reply);
    assert_eq!(document["nested"][0], json!({ "_id": element, "dayOfWeek": "Friday" }));
    assert_eq!(document["nested"][1], created["nested"][1]);
}

#[tokio::test]
async fn test_put_nested_field_uses_update_key() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);

    let reply = harness
        .call(Verb::Put, &format!("/{root}/profile/city"), &[], json!({ "update": "Bergen" }))
        .await
        .unwrap();
    assert_eq!(data(reply)["profile"]["city"], "Bergen");

    let err = harness
        .call(Verb::Put, &format!("/{root}/profile/city"), &[], json!({ "city": "Bergen" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.message(), "Requests on nested fields must contain the 'update' field");
}

#[tokio::test]
async fn test_patch_collection_many_and_one() {
    let harness = Harness::new().await;
    harness.create(json!({ "name": "a", "flag": false })).await;
    harness.create(json!({ "name": "b", "flag": true })).await;

    let reply = harness
        .call(Verb::Patch, "/", &[], json!({ "flag": true }))
        .await
        .unwrap();
    assert_eq!(data(reply), json!({ "matched": 2, "modified": 1 }));

    let reply = harness
        .call(
            Verb::Patch,
            "/",
            &[("multiplicity", "one"), ("query", r#"{"name":"b"}"#)],
            json!({ "color": "red" }),
        )
        .await
        .unwrap();
    let document = data(reply);
    assert_eq!(document["name"], "b");
    assert_eq!(document["color"], "red");
}

#[tokio::test]
async fn test_patch_document_merges_fields() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);

    let reply = harness
        .call(Verb::Patch, &format!("/{root}"), &[], json!({ "age": 31, "extra": true }))
        .await
        .unwrap();

    let document = data(reply);
    assert_eq!(document["age"], 31);
    assert_eq!(document["extra"], true);
    assert_eq!(document["name"], "root");
}

#[tokio::test]
async fn test_patch_nested_element_merges_fields() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);
    let element = id_of(&created["nested"][1]);

    let reply = harness
        .call(
            Verb::Patch,
            &format!("/{root}/nested/{element}"),
            &[],
            json!({ "activity": "Running" }),
        )
        .await
        .unwrap();

    let document = data(reply);
    assert_eq!(document["nested"][1]["activity"], "Running");
    assert_eq!(document["nested"][1]["dayOfWeek"], "Tuesday");
    assert!(document["nested"][0].get("activity").is_none());
}

#[tokio::test]
async fn test_patch_with_colliding_scope_labels() {
    let harness = Harness::new().await;
    let created = harness
        .create(json!({
            "items": [{
                "x": {
                    "items": [
                        { "items2": [{ "v": 1 }] },
                        { "items2": [{ "v": 2 }, { "v": 3 }] },
                    ],
                },
            }],
        }))
        .await;
    let root = id_of(&created);
    let outer = id_of(&created["items"][0]);
    let inner = &created["items"][0]["x"]["items"][1];
    let target = id_of(&inner["items2"][1]);

    let reply = harness
        .call(
            Verb::Patch,
            &format!("/{root}/items/{outer}/x/items/{}/items2/{target}", id_of(inner)),
            &[],
            json!({ "v": 30 }),
        )
        .await
        .unwrap();

    let document = data(reply);
    let inner_items = &document["items"][0]["x"]["items"];
    assert_eq!(inner_items[1]["items2"][1], json!({ "_id": target, "v": 30 }));
    assert_eq!(inner_items[1]["items2"][0]["v"], 2);
    assert_eq!(inner_items[0], created["items"][0]["x"]["items"][0]);
}

#[tokio::test]
async fn test_patch_unknown_document() {
    let harness = Harness::new().await;

    let err = harness
        .call(Verb::Patch, &format!("/{UNKNOWN_ID}"), &[], json!({ "a": 1 }))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_delete_document() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);

    let reply = harness.call(Verb::Delete, &format!("/{root}"), &[], Value::Null).await.unwrap();
    assert_eq!(reply, Reply::no_content());

    let err = harness
        .call(Verb::Delete, &format!("/{root}"), &[], Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_delete_nested_element() {
    let harness = Harness::new().await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);
    let element = id_of(&created["nested"][0]);
    let deep = id_of(&created["nested"][0]["deeplyNested"][0]);

    let reply = harness
        .call(
            Verb::Delete,
            &format!("/{root}/nested/{element}/deeplyNested/{deep}"),
            &[],
            Value::Null,
        )
        .await
        .unwrap();
    assert_eq!(data(reply)["nested"][0]["deeplyNested"], json!([]));

    let reply = harness
        .call(Verb::Delete, &format!("/{root}/nested/{element}"), &[], Value::Null)
        .await
        .unwrap();
    let document = data(reply);
    assert_eq!(document["nested"].as_array().unwrap().len(), 1);
    assert_eq!(document["nested"][0], created["nested"][1]);
}

#[tokio::test]
async fn test_delete_collection_needs_query() {
    let harness = Harness::new().await;
    harness.create(json!({ "name": "a" })).await;
    harness.create(json!({ "name": "b" })).await;

    let err = harness.call(Verb::Delete, "/", &[], Value::Null).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let reply = harness
        .call(Verb::Delete, "/", &[("query", r#"{"name":{"$in":["a","c"]}}"#)], Value::Null)
        .await
        .unwrap();
    assert_eq!(data(reply), json!({ "deletedCount": 1 }));
}

#[derive(Debug)]
struct ThingSchema;

impl Schema for ThingSchema {
    fn validate(&self, _collection: &str, document: &Document) -> DocumentStoreResult<()> {
        let mut failure = ValidationFailure::new();

        if !document.contains_key("name") {
            failure.push("name", FieldError::new("Path `name` is required."));
        }

        if let Ok(elements) = document.get_array("nested") {
            let mut nested = ValidationFailure::new();
            for element in elements {
                let missing_day = match element {
                    Bson::Document(element) => !element.contains_key("dayOfWeek"),
                    _ => true,
                };
                if missing_day {
                    nested.push("dayOfWeek", FieldError::new("Path `dayOfWeek` is required."));
                }
            }
            if !nested.is_empty() {
                failure.push("nested", FieldError::nested("Validation failed", nested));
            }
        }

        if failure.is_empty() {
            Ok(())
        } else {
            Err(DocumentStoreError::Validation(failure))
        }
    }
}

#[tokio::test]
async fn test_validation_failures_are_flattened() {
    let harness = Harness::with_schema(ThingSchema).await;

    let err = harness
        .call(Verb::Post, "/", &[], json!({ "nested": [{ "activity": "x" }] }))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(err.message(), "The document provided failed validation");
    assert_eq!(
        err.to_json()["error"]["detail"],
        json!([
            { "message": "Path `name` is required.", "fieldPath": "name", "location": "body" },
            { "message": "Path `dayOfWeek` is required.", "fieldPath": "nested.*.dayOfWeek", "location": "body" },
        ])
    );
}

#[tokio::test]
async fn test_validation_guards_nested_writes() {
    let harness = Harness::with_schema(ThingSchema).await;
    let created = harness.create(sample()).await;
    let root = id_of(&created);

    let err = harness
        .call(Verb::Post, &format!("/{root}/nested"), &[], json!({ "activity": "x" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let reply = harness.call(Verb::Get, &format!("/{root}"), &[], Value::Null).await.unwrap();
    assert_eq!(data(reply), created);
}
