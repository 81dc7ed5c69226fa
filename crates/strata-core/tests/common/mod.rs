#![allow(dead_code)]

use std::{sync::Arc, time::Duration};
use strata_core::{
    config::StrataConfig,
    executor::Executor,
    mapper::ObjectMapper,
    schema::{
        ID_FIELD, definition::ObjectDefinition, index::Index, keyspace::KeyspaceDefinition,
        sharding::ShardingStrategy, types::FieldType,
    },
    store::MemoryStore,
    value::{Row, Value},
};
use tracing_subscriber::EnvFilter;

pub const HORIZON: Duration = Duration::from_millis(100);
pub const BASE_MILLIS: i64 = 1_700_000_000_000;

///
/// Fixtures
///

pub fn accounts() -> ObjectDefinition {
    ObjectDefinition::new("account")
        .with_field("owner", FieldType::BigInt)
        .with_field("region", FieldType::VarChar)
        .with_field("tier", FieldType::Int)
        .with_field("note", FieldType::VarChar)
        .with_index(Index::from_key("owner", ShardingStrategy::None))
        .with_index(Index::from_key("region:tier", ShardingStrategy::Daily))
}

pub fn keyspace() -> KeyspaceDefinition {
    KeyspaceDefinition::new("integration").with_definition(accounts())
}

pub fn account(owner: i64, region: &str, tier: i32) -> Row {
    [
        ("owner".to_string(), Value::BigInt(owner)),
        ("region".to_string(), Value::text(region)),
        ("tier".to_string(), Value::Int(tier)),
        ("note".to_string(), Value::text("opened")),
    ]
    .into_iter()
    .collect()
}

pub fn ids(rows: &[Row]) -> Vec<Value> {
    rows.iter()
        .filter_map(|row| row.get(ID_FIELD).cloned())
        .collect()
}

/// Route engine logs to the test writer; `RUST_LOG` narrows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Mapper over a fresh in-memory store with the fixture keyspace built.
pub async fn setup() -> (ObjectMapper, Arc<MemoryStore>) {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let executor = Executor::new(store.clone(), StrataConfig::new(HORIZON));
    let mapper = ObjectMapper::new(executor, keyspace());

    mapper
        .build_keyspace(false)
        .await
        .expect("fixture keyspace should build");

    (mapper, store)
}
