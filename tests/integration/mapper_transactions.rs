#[path = "../common/mod.rs"]
mod common;

use common::{memory_mapper, props, scripted_mapper};
use serde_json::json;
use sombra_ogm::testkit::{continuation_envelope, ScriptedTransaction};
use sombra_ogm::{
    CreateOptions, DriverError, MapperConfig, ModelEvent, NewRelationship, OgmError,
    RelationshipOptions, RemoveOptions, TransactionHandle, TxState, UpdateOptions,
};

#[tokio::test]
async fn statements_join_the_ambient_transaction() {
    let (mapper, driver) = scripted_mapper(MapperConfig::default());
    let mut tx = ScriptedTransaction::new();
    tx.respond(continuation_envelope(vec![vec![json!(1), json!({"name": "A"})]]));
    tx.respond(continuation_envelope(vec![vec![json!(2), json!({"name": "B"})]]));

    let a = mapper
        .create_with(
            props(json!({"name": "A"})),
            CreateOptions::new().in_transaction(&mut tx),
        )
        .await
        .unwrap();
    let b = mapper
        .create_with(
            props(json!({"name": "B"})),
            CreateOptions::new().in_transaction(&mut tx),
        )
        .await
        .unwrap();

    assert_eq!((a.node.id, b.node.id), (1, 2));
    assert!(driver.submitted().is_empty());
    assert_eq!(tx.executed().len(), 2);
    assert_eq!(tx.outbox().len(), 2);
    assert!(mapper.schema().events().is_empty());

    assert_eq!(tx.commit().unwrap(), 2);
    let events = mapper.schema().events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|(event, _)| *event == ModelEvent::Created));
    assert_eq!(events[0].1[0]["id"], json!(1));
}

#[tokio::test]
async fn exec_failure_rolls_back_exactly_once() {
    let (mapper, _driver) = scripted_mapper(MapperConfig::default());
    let mut tx = ScriptedTransaction::new();
    tx.fail_next(DriverError::with_code(
        "Neo.TransientError.Transaction.DeadlockDetected",
        "deadlock",
    ));

    let err = mapper
        .remove_with(7_i64, RemoveOptions::new().in_transaction(&mut tx))
        .await
        .unwrap_err();

    match err {
        OgmError::Driver(driver) => assert_eq!(driver.message, "deadlock"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(tx.rollbacks(), 1);
    assert_eq!(tx.state(), TxState::RolledBack);
    assert!(mapper.schema().events().is_empty());
}

#[tokio::test]
async fn rollback_failure_is_discarded_by_default() {
    let (mapper, _driver) = scripted_mapper(MapperConfig::default());
    let mut tx = ScriptedTransaction::new();
    tx.fail_next(DriverError::new("boom"));
    tx.fail_rollback(DriverError::new("connection reset"));

    let err = mapper
        .remove_relationship_with(3, RelationshipOptions::in_transaction(&mut tx))
        .await
        .unwrap_err();

    assert!(matches!(&err, OgmError::Driver(d) if d.message == "boom"));
    assert_eq!(tx.rollbacks(), 1);
}

#[tokio::test]
async fn rollback_failure_can_be_surfaced() {
    let config = MapperConfig {
        surface_rollback_failures: true,
        ..MapperConfig::default()
    };
    let (mapper, _driver) = scripted_mapper(config);
    let mut tx = ScriptedTransaction::new();
    tx.fail_next(DriverError::new("boom"));
    tx.fail_rollback(DriverError::new("connection reset"));

    let err = mapper
        .remove_relationship_with(3, RelationshipOptions::in_transaction(&mut tx))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "RollbackFailed");
    assert!(matches!(err.primary(), OgmError::Driver(d) if d.message == "boom"));
    assert_eq!(tx.rollbacks(), 1);
}

#[tokio::test]
async fn validation_failure_rolls_back_ambient_transaction() {
    let (mapper, _driver) = scripted_mapper(MapperConfig::default());
    let mut tx = ScriptedTransaction::new();
    let err = mapper
        .create_with(
            props(json!({"age": 4})),
            CreateOptions::new().in_transaction(&mut tx),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OgmError::ValidationFailed(_)));
    assert!(tx.executed().is_empty());
    assert_eq!(tx.rollbacks(), 1);
}

#[tokio::test]
async fn malformed_response_rolls_back_ambient_transaction() {
    let (mapper, _driver) = scripted_mapper(MapperConfig::default());
    let mut tx = ScriptedTransaction::new();
    tx.respond(json!({"unexpected": true}));
    let node = sombra_ogm::NodeRef::new(5, props(json!({"name": "A"})));

    let err = mapper
        .update_with(
            &node,
            props(json!({"age": 2})),
            UpdateOptions::in_transaction(&mut tx),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OgmError::MalformedResponse(_)));
    assert_eq!(tx.executed().len(), 1);
    assert_eq!(tx.rollbacks(), 1);
}

#[tokio::test]
async fn invalid_options_leave_transaction_untouched() {
    let (mapper, _driver) = scripted_mapper(MapperConfig::default());
    let mut tx = ScriptedTransaction::new();
    let err = mapper
        .create_relationship_with(
            NewRelationship::default(),
            RelationshipOptions::in_transaction(&mut tx),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OgmError::InvalidOptions(_)));
    assert_eq!(tx.rollbacks(), 0);
    assert_eq!(tx.state(), TxState::Open);
}

#[tokio::test]
async fn reused_terminal_handle_is_rejected() {
    let (mapper, _driver) = scripted_mapper(MapperConfig::default());
    let mut tx = ScriptedTransaction::new();
    tx.fail_next(DriverError::new("boom"));
    mapper
        .remove_with(1_i64, RemoveOptions::new().in_transaction(&mut tx))
        .await
        .unwrap_err();

    let err = mapper
        .create_with(
            props(json!({"name": "A"})),
            CreateOptions::new().in_transaction(&mut tx),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OgmError::InvalidTransactionState(TxState::RolledBack)
    ));
    assert_eq!(tx.executed().len(), 1);
    assert_eq!(tx.rollbacks(), 1);
    assert_eq!(mapper.schema().validations(), 0);
}

#[tokio::test]
async fn memory_transaction_rollback_undoes_earlier_statements() {
    let (mapper, graph) = memory_mapper();
    let mut tx = graph.begin();

    mapper
        .create_with(
            props(json!({"name": "A"})),
            CreateOptions::new().in_transaction(&mut tx),
        )
        .await
        .unwrap();
    assert_eq!(graph.node_count(), 1);

    let err = mapper
        .create_relationship_with(
            NewRelationship::between(1_i64, 99_i64, "KNOWS"),
            RelationshipOptions::in_transaction(&mut tx),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "DriverError");
    assert_eq!(tx.state(), TxState::RolledBack);
    assert_eq!(graph.node_count(), 0);
    assert!(tx.outbox_mut().is_empty());
    assert!(mapper.schema().events().is_empty());
}

#[tokio::test]
async fn memory_transaction_commit_flushes_events_in_order() {
    let (mapper, graph) = memory_mapper();
    let mut tx = graph.begin();

    let a = mapper
        .create_with(
            props(json!({"name": "A"})),
            CreateOptions::new().in_transaction(&mut tx),
        )
        .await
        .unwrap();
    let updated = mapper
        .update_with(
            &a.node,
            props(json!({"age": 9})),
            UpdateOptions::in_transaction(&mut tx),
        )
        .await
        .unwrap();
    assert_eq!(updated.entity, props(json!({"name": "A", "age": 9})));
    assert!(mapper.schema().events().is_empty());

    tx.commit().unwrap();
    let names: Vec<_> = mapper
        .schema()
        .events()
        .into_iter()
        .map(|(event, _)| event)
        .collect();
    assert_eq!(names, vec![ModelEvent::Created, ModelEvent::Updated]);
    assert_eq!(graph.node(a.node.id).unwrap().props, updated.entity);
}

#[tokio::test]
async fn index_failure_rolls_back_before_validation() {
    common::init_tracing();
    let driver = std::sync::Arc::new(sombra_ogm::testkit::ScriptedDriver::new());
    let schema = common::person_schema().with_pending_indexes();
    schema.fail_indexes(DriverError::new("index build failed"));
    let mapper = sombra_ogm::Mapper::new(std::sync::Arc::new(schema), driver);
    let mut tx = ScriptedTransaction::new();

    let err = mapper
        .create_with(
            props(json!({"name": "A"})),
            CreateOptions::new().in_transaction(&mut tx),
        )
        .await
        .unwrap_err();

    assert!(matches!(&err, OgmError::Driver(d) if d.message == "index build failed"));
    assert_eq!(tx.rollbacks(), 1);
    assert_eq!(mapper.schema().validations(), 0);
    assert!(tx.executed().is_empty());
}
