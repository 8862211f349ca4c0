#![allow(dead_code)]

use std::sync::{Arc, Once};

use serde_json::Value;
use sombra_ogm::testkit::{MemoryGraph, ScriptedDriver, TestSchema};
use sombra_ogm::{Mapper, MapperConfig, Props};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("sombra_ogm=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

pub fn props(value: Value) -> Props {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn person_schema() -> TestSchema {
    TestSchema::new("Person")
        .with_fields(["name", "age", "email", "nick"])
        .with_required("name")
}

pub fn memory_mapper() -> (Mapper<TestSchema, MemoryGraph>, Arc<MemoryGraph>) {
    init_tracing();
    let graph = MemoryGraph::new();
    let mapper = Mapper::new(Arc::new(person_schema()), graph.clone());
    (mapper, graph)
}

pub fn scripted_mapper(
    config: MapperConfig,
) -> (Mapper<TestSchema, ScriptedDriver>, Arc<ScriptedDriver>) {
    init_tracing();
    let driver = Arc::new(ScriptedDriver::new());
    let mapper = Mapper::with_config(Arc::new(person_schema()), driver.clone(), config);
    (mapper, driver)
}
