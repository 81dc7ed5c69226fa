use crate::{
    config::StrataConfig,
    executor::Executor,
    mapper::ObjectMapper,
    store::memory::MemoryStore,
    value::{Row, Value},
};
use std::{sync::Arc, time::Duration};
use strata_schema::{
    definition::ObjectDefinition, index::Index, keyspace::KeyspaceDefinition,
    sharding::ShardingStrategy, types::FieldType,
};

///
/// Fixtures
///

pub(crate) fn ledger() -> ObjectDefinition {
    ObjectDefinition::new("ledger")
        .with_field("foreignid", FieldType::BigInt)
        .with_field("type", FieldType::Int)
        .with_field("amount", FieldType::Decimal)
        .with_index(Index::from_key("foreignid", ShardingStrategy::None))
}

/// Object with an unsharded index and two daily-sharded composites.
pub(crate) fn tracked() -> ObjectDefinition {
    ObjectDefinition::new("testtype")
        .with_field("foreignid", FieldType::BigInt)
        .with_field("type", FieldType::Int)
        .with_field("instance", FieldType::BigInt)
        .with_field("filtered", FieldType::Int)
        .with_field("data1", FieldType::VarChar)
        .with_index(Index::from_key("foreignid", ShardingStrategy::None))
        .with_index(Index::from_key("instance:type", ShardingStrategy::Daily))
        .with_index(Index::from_key("foreignid:instance:type", ShardingStrategy::Daily))
}

pub(crate) fn keyspace() -> KeyspaceDefinition {
    KeyspaceDefinition::new("functional")
        .with_definition(tracked())
        .with_definition(ledger())
}

pub(crate) fn row<const N: usize>(pairs: [(&str, Value); N]) -> Row {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Mapper over a fresh in-memory store with the fixture keyspace built.
pub(crate) async fn memory_mapper() -> (ObjectMapper, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let config = StrataConfig::new(Duration::from_millis(100));
    let executor = Executor::new(store.clone(), config);
    let mapper = ObjectMapper::new(executor, keyspace());

    mapper
        .build_keyspace(false)
        .await
        .expect("fixture keyspace should build");

    (mapper, store)
}
