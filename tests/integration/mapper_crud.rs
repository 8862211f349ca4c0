#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use common::{memory_mapper, person_schema, props};
use serde_json::json;
use sombra_ogm::testkit::{MemoryGraph, CONSTRAINT_FAILED, ENTITY_NOT_FOUND};
use sombra_ogm::{
    CreateOptions, Direction, Mapper, ModelEvent, NewRelationship, NodeKey, OgmError,
    RelationshipSpec, RemoveOptions,
};

#[tokio::test]
async fn create_stores_sanitized_props() {
    let (mapper, graph) = memory_mapper();
    let created = mapper
        .create(props(json!({"name": "Alice", "age": 30, "shoe": 9})))
        .await
        .unwrap();

    assert!(created.relationship.is_none());
    assert_eq!(created.node.entity, props(json!({"name": "Alice", "age": 30})));
    let stored = graph.node(created.node.id).expect("stored node");
    assert_eq!(stored.label, "Person");
    assert_eq!(stored.props, created.node.entity);

    let stmt = &graph.submitted()[0];
    assert_eq!(stmt.parameter("props"), Some(&json!({"name": "Alice", "age": 30})));
    assert_eq!(stmt.text().matches("CREATE").count(), 1);
    assert_eq!(stmt.text().matches("RETURN").count(), 1);

    let events = mapper.schema().events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, ModelEvent::Created);
    assert_eq!(events[0].1[0]["id"], json!(created.node.id));
}

#[tokio::test]
async fn create_with_identity_relationship() {
    let (mapper, graph) = memory_mapper();
    let boss = mapper.create(props(json!({"name": "Bob"}))).await.unwrap();

    let spec = RelationshipSpec::new()
        .with_direction(Direction::To)
        .with_type("MANAGES")
        .with_index("_id", boss.node.id)
        .with_node_label("Person");
    let created = mapper
        .create_with(
            props(json!({"name": "Alice"})),
            CreateOptions::new().with_relationship(spec),
        )
        .await
        .unwrap();

    let stmt = graph.submitted().pop().unwrap();
    assert!(stmt.text().starts_with("START relNode = node({indexValue})"));
    assert!(stmt.text().contains("<-[rel:MANAGES {relData}]-"));
    assert!(stmt.text().ends_with("RETURN id(n), n, type(rel), rel"));
    assert_eq!(stmt.parameter("indexValue"), Some(&json!(boss.node.id)));
    assert_eq!(stmt.parameter("relData"), Some(&json!({})));

    let rel = created.relationship.expect("relationship");
    assert_eq!(rel.rel_type, "MANAGES");
    assert_eq!(graph.relationship_count(), 1);
    let stored = graph.relationship(3).expect("stored relationship");
    assert_eq!((stored.from, stored.to), (boss.node.id, created.node.id));
}

#[tokio::test]
async fn create_with_indexed_relationship_points_outward() {
    let (mapper, graph) = memory_mapper();
    let bob = mapper
        .create(props(json!({"name": "Bob", "email": "bob@example.com"})))
        .await
        .unwrap();

    let spec = RelationshipSpec::new()
        .with_direction(Direction::From)
        .with_type("REPORTS_TO")
        .with_index("email", "bob@example.com")
        .with_node_label("Person")
        .with_data(props(json!({"since": 2019})));
    let created = mapper
        .create_with(
            props(json!({"name": "Carol"})),
            CreateOptions::new().with_relationship(spec),
        )
        .await
        .unwrap();

    let rel = created.relationship.expect("relationship");
    assert_eq!(rel.entity, props(json!({"since": 2019})));
    let stored = graph.relationship(3).expect("stored relationship");
    assert_eq!((stored.from, stored.to), (created.node.id, bob.node.id));
}

#[tokio::test]
async fn incomplete_relationship_spec_fails_before_io() {
    let (mapper, graph) = memory_mapper();
    let spec = RelationshipSpec::new()
        .with_direction(Direction::To)
        .with_type("MANAGES")
        .with_node_label("Person");
    let err = mapper
        .create_with(
            props(json!({"name": "Alice"})),
            CreateOptions::new().with_relationship(spec),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OgmError::InvalidOptions(_)));
    assert_eq!(mapper.schema().validations(), 0);
    assert!(graph.submitted().is_empty());
}

#[tokio::test]
async fn unknown_direction_is_invalid() {
    let (mapper, graph) = memory_mapper();
    let mut spec = RelationshipSpec::new()
        .with_type("MANAGES")
        .with_index("_id", 1)
        .with_node_label("Person");
    spec.direction = Some("both".into());
    let err = mapper
        .create_with(
            props(json!({"name": "Alice"})),
            CreateOptions::new().with_relationship(spec),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "InvalidOptions");
    assert!(graph.submitted().is_empty());
}

#[tokio::test]
async fn validation_failure_compiles_nothing() {
    let (mapper, graph) = memory_mapper();
    let err = mapper.create(props(json!({"age": 3}))).await.unwrap_err();
    match err {
        OgmError::ValidationFailed(v) => assert_eq!(v.field.as_deref(), Some("name")),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(graph.submitted().is_empty());
    assert!(mapper.schema().events().is_empty());
}

#[tokio::test]
async fn pending_indexes_are_prepared_once() {
    let graph = MemoryGraph::new();
    let mapper = Mapper::new(
        Arc::new(person_schema().with_pending_indexes()),
        graph.clone(),
    );
    mapper.create(props(json!({"name": "A"}))).await.unwrap();
    mapper.create(props(json!({"name": "B"}))).await.unwrap();
    assert_eq!(mapper.schema().index_runs(), 1);
    assert_eq!(graph.node_count(), 2);
}

#[tokio::test]
async fn update_sets_and_removes() {
    let (mapper, graph) = memory_mapper();
    let created = mapper
        .create(props(json!({"name": "Alice", "email": "a@example.com"})))
        .await
        .unwrap();

    let updated = mapper
        .update(&created.node, props(json!({"age": 31, "email": null})))
        .await
        .unwrap();

    let stmt = graph.submitted().pop().unwrap();
    assert_eq!(
        stmt.text(),
        "START n = node({nodeId}) SET n.age = {age_NEW} REMOVE n.email RETURN id(n), n"
    );
    assert!(stmt.parameter("email_NEW").is_none());
    assert_eq!(updated.id, created.node.id);
    assert_eq!(updated.entity, props(json!({"name": "Alice", "age": 31})));
}

#[tokio::test]
async fn empty_update_returns_node_unchanged() {
    let (mapper, graph) = memory_mapper();
    let created = mapper.create(props(json!({"name": "Alice"}))).await.unwrap();
    let updated = mapper
        .update(&created.node, Default::default())
        .await
        .unwrap();

    assert_eq!(updated, created.node);
    let stmt = graph.submitted().pop().unwrap();
    assert!(!stmt.text().contains("SET"));
    assert!(!stmt.text().contains("REMOVE"));
}

#[tokio::test]
async fn update_validates_merged_entity() {
    let (mapper, graph) = memory_mapper();
    let created = mapper.create(props(json!({"name": "Alice"}))).await.unwrap();
    let err = mapper
        .update(&created.node, props(json!({"name": null})))
        .await
        .unwrap_err();
    assert!(matches!(err, OgmError::ValidationFailed(_)));
    assert_eq!(graph.submitted().len(), 1);
}

#[tokio::test]
async fn create_update_round_trip_reflects_merged_properties() {
    let (mapper, graph) = memory_mapper();
    let created = mapper
        .create(props(json!({"name": "Alice", "age": 30, "nick": "al"})))
        .await
        .unwrap();
    let first = mapper
        .update(&created.node, props(json!({"age": 31, "nick": null})))
        .await
        .unwrap();
    mapper
        .update(&first, props(json!({"email": "a@example.com"})))
        .await
        .unwrap();

    let stored = graph.node(created.node.id).unwrap();
    assert_eq!(
        stored.props,
        props(json!({"name": "Alice", "age": 31, "email": "a@example.com"}))
    );
}

#[tokio::test]
async fn remove_refuses_connected_node_without_force() {
    let (mapper, graph) = memory_mapper();
    let a = mapper.create(props(json!({"name": "A"}))).await.unwrap();
    let b = mapper.create(props(json!({"name": "B"}))).await.unwrap();
    mapper
        .create_relationship(NewRelationship::between(&a, &b, "KNOWS"))
        .await
        .unwrap();

    let err = mapper.remove(&a.node).await.unwrap_err();
    match err {
        OgmError::Driver(driver) => assert_eq!(driver.code.as_deref(), Some(CONSTRAINT_FAILED)),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(graph.node_count(), 2);

    mapper
        .remove_with(&a.node, RemoveOptions::new().force(true))
        .await
        .unwrap();
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.relationship_count(), 0);
    let last = mapper.schema().events().pop().unwrap();
    assert_eq!(last, (ModelEvent::Removed, vec![json!(a.node.id)]));
}

#[tokio::test]
async fn relationship_create_and_remove() {
    let (mapper, graph) = memory_mapper();
    let a = mapper.create(props(json!({"name": "A"}))).await.unwrap();
    let b = mapper.create(props(json!({"name": "B"}))).await.unwrap();

    let rel = mapper
        .create_relationship(NewRelationship::between(a.node.id, b.node.id, "KNOWS"))
        .await
        .unwrap();
    let stmt = graph.submitted().pop().unwrap();
    assert_eq!(
        serde_json::Value::Object(stmt.parameters().clone()),
        json!({"from": a.node.id, "to": b.node.id, "data": {}})
    );
    assert_eq!(rel.rel_type, "KNOWS");
    assert!(rel.entity.is_empty());

    mapper.remove_relationship(rel.id).await.unwrap();
    assert_eq!(graph.relationship_count(), 0);

    let err = mapper.remove_relationship(rel.id).await.unwrap_err();
    assert_eq!(err.code(), "DriverError");
}

#[tokio::test]
async fn relationship_requires_type() {
    let (mapper, graph) = memory_mapper();
    let err = mapper
        .create_relationship(NewRelationship {
            from: Some(NodeKey(1)),
            to: Some(NodeKey(2)),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OgmError::InvalidOptions(_)));
    assert!(graph.submitted().is_empty());
}

#[tokio::test]
async fn save_with_id_validates_against_stored_entity() {
    let (mapper, graph) = memory_mapper();
    let created = mapper
        .create(props(json!({"name": "Alice", "email": "a@example.com"})))
        .await
        .unwrap();
    mapper
        .update(&created.node, props(json!({"age": 31})))
        .await
        .unwrap();

    let saved = mapper
        .save(props(json!({"_id": created.node.id, "age": 32})))
        .await
        .unwrap();

    let expected = props(json!({"name": "Alice", "email": "a@example.com", "age": 32}));
    assert_eq!(saved.id, created.node.id);
    assert_eq!(saved.entity, expected);
    assert_eq!(graph.node(created.node.id).unwrap().props, expected);

    let update = graph.submitted().pop().unwrap();
    assert_eq!(
        update.text(),
        "START n = node({nodeId}) SET n.age = {age_NEW} RETURN id(n), n"
    );
    let (last, _) = mapper.schema().events().pop().unwrap();
    assert_eq!(last, ModelEvent::Updated);
}

#[tokio::test]
async fn save_with_unknown_id_reports_driver_error() {
    let (mapper, graph) = memory_mapper();
    let err = mapper
        .save(props(json!({"_id": 42, "name": "Ghost"})))
        .await
        .unwrap_err();
    match err {
        OgmError::Driver(driver) => assert_eq!(driver.code.as_deref(), Some(ENTITY_NOT_FOUND)),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(graph.node_count(), 0);
    assert_eq!(mapper.schema().validations(), 0);
}
