use super::*;
use crate::{
    CQL_LIMIT_MAX, DEFAULT_LIMIT,
    iterator::StatementIterator,
    test_support::{ledger, row, tracked},
};
use proptest::prelude::*;
use strata_schema::{
    field::Field,
    index::Index,
    keyspace::KeyspaceDefinition,
    sharding::{NANOS_PER_DAY, ShardingStrategy},
    timeuuid,
};

fn generator() -> CqlGenerator {
    CqlGenerator::new("functional")
}

fn day_id(day: i64) -> Value {
    Value::Timeuuid(timeuuid::from_unix_nanos(day * NANOS_PER_DAY + 1_000, 0, [1; 6]))
}

fn queries(statements: &[Statement]) -> Vec<&str> {
    statements.iter().map(Statement::query).collect()
}

///
/// Naming
///

#[test]
fn index_table_names_are_deterministic_and_bounded() {
    let def = tracked();
    let index = def.index("instance:type").expect("fixture index");

    let a = index_table_name(&def, index);
    let b = index_table_name(&def, index);

    assert_eq!(a, b);
    assert!(a.starts_with("testtype"));
    assert_eq!(a.len(), "testtype".len() + 32);
    assert!(a.len() <= strata_schema::MAX_NAME_LEN);
    assert_ne!(
        a,
        index_table_name(&def, def.index("foreignid").expect("fixture index"))
    );
}

#[test]
fn long_object_names_are_truncated_before_the_digest() {
    let def = ObjectDefinition::new("averyveryverylongobjectname")
        .with_field("a", FieldType::Int)
        .with_index(Index::from_key("a", ShardingStrategy::None));
    let index = def.index("a").expect("fixture index");

    let name = index_table_name(&def, index);

    assert!(name.starts_with("averyveryverylon"));
    assert_eq!(name.len(), 48);
}

///
/// Schema
///

#[test]
fn create_table_emits_static_then_one_wide_table_per_index() {
    let def = ledger();
    let index = def.index("foreignid").expect("fixture index");

    let statements = generator().make_create_table(&def);

    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[0].query(),
        "CREATE TABLE \"functional\".\"ledger\" (id timeuuid PRIMARY KEY, amount decimal, foreignid bigint, type int);"
    );
    assert_eq!(
        statements[1].query(),
        format!(
            "CREATE TABLE \"functional\".\"{}\" (id timeuuid, shardid bigint, amount decimal, foreignid bigint, type int, PRIMARY KEY ((shardid, foreignid), id));",
            index_table_name(&def, index)
        )
    );
    assert!(statements.iter().all(|s| !s.is_preparable()));
}

#[test]
fn system_tables_use_fixed_layouts() {
    let statements = generator().make_create_system_tables();

    assert_eq!(
        queries(&statements),
        vec![
            "CREATE TABLE \"functional\".\"__shardindex\" (shardid bigint, tablename varchar, indexvalues varchar, targetrowkey varchar, PRIMARY KEY ((tablename, indexvalues), shardid));",
            "CREATE TABLE \"functional\".\"__index_updates\" (id timeuuid, statictablename varchar, instanceid varchar, indexvalues varchar, PRIMARY KEY ((statictablename, instanceid), id));",
        ]
    );
}

#[test]
fn create_keyspace_renders_replication_factors() {
    let keyspace = KeyspaceDefinition::new("functional")
        .with_replication("NetworkTopologyStrategy", [("dc1".to_string(), 3)].into());

    let statement = generator().make_create_keyspace(&keyspace);

    assert_eq!(
        statement.query(),
        "CREATE KEYSPACE \"functional\" WITH replication = { 'class' : 'NetworkTopologyStrategy', 'dc1' : 3 };"
    );
}

#[test]
fn compaction_covers_system_and_object_tables() {
    let keyspace = KeyspaceDefinition::new("functional").with_definition(ledger());

    let statements = generator().make_compaction(&keyspace, CompactionStrategy::leveled());

    assert_eq!(statements.len(), 4);
    assert!(statements[0].query().contains("'sstable_size_in_mb' : 5"));
    assert_eq!(statements[0].table(), Some(SHARD_INDEX_TABLE));
}

#[test]
fn add_field_alters_named_table() {
    let statement = generator().make_add_field("ledger", &Field::new("memo", FieldType::Text));

    assert_eq!(
        statement.query(),
        "ALTER TABLE \"functional\".\"ledger\" ADD memo text;"
    );
}

///
/// Limits
///

#[test]
fn list_limit_follows_filter_and_clamp_rules() {
    assert_eq!(list_limit(Some(10), true), 50);
    assert_eq!(list_limit(Some(40), true), 80);
    assert_eq!(list_limit(Some(0), false), 50);
    assert_eq!(list_limit(Some(-3), false), 50);
    assert_eq!(list_limit(Some(20_000), false), 10_000);
    assert_eq!(list_limit(None, false), 50);
    assert_eq!(list_limit(Some(7), false), 7);
}

proptest! {
    #[test]
    fn filtered_pages_overfetch_but_stay_within_cql_bounds(requested in -100i64..20_000) {
        let filtered = list_limit(Some(requested), true);
        let plain = list_limit(Some(requested), false);

        prop_assert!(filtered >= DEFAULT_LIMIT);
        prop_assert!(filtered <= CQL_LIMIT_MAX);
        prop_assert!((1..=CQL_LIMIT_MAX).contains(&plain));
        if requested > 0 {
            prop_assert_eq!(filtered, (requested * 2).clamp(DEFAULT_LIMIT, CQL_LIMIT_MAX));
        }
    }
}

///
/// Insert
///

#[test]
fn insert_writes_static_index_locator_and_change_log() {
    let def = tracked();
    let id = day_id(10);
    let values = row([
        ("foreignid", Value::BigInt(5)),
        ("instance", Value::BigInt(6)),
        ("type", Value::Int(7)),
        ("data1", Value::text("x")),
    ]);

    let statements = generator()
        .make_insert(&def, &id, &values, None)
        .expect("insert should generate");

    // static + unsharded index + 2 × (sharded index + locator) + change log
    assert_eq!(statements.len(), 1 + 1 + 4 + 1);
    assert_eq!(
        statements[0].query(),
        "INSERT INTO \"functional\".\"testtype\" (id, data1, foreignid, instance, type) VALUES (?, ?, ?, ?, ?);"
    );
    assert_eq!(
        statements.iter().filter(|s| s.table() == Some(SHARD_INDEX_TABLE)).count(),
        2
    );

    let log = statements.last().expect("change log entry");
    assert_eq!(log.table(), Some(INDEX_UPDATES_TABLE));
    assert_eq!(log.values()[2], Value::text(id.to_index_string()));
    assert_eq!(
        log.values()[3],
        Value::text(r#"{"foreignid":5,"instance":6,"type":7}"#)
    );
}

#[test]
fn locator_row_carries_shard_and_escaped_index_values() {
    let def = ObjectDefinition::new("notes")
        .with_field("label", FieldType::Text)
        .with_index(Index::from_key("label", ShardingStrategy::Daily));
    let id = day_id(3);

    let statements = generator()
        .make_insert(&def, &id, &row([("label", Value::text("a:b"))]), None)
        .expect("insert should generate");

    let locator = statements
        .iter()
        .find(|s| s.table() == Some(SHARD_INDEX_TABLE))
        .expect("sharded index should write a locator row");
    assert_eq!(locator.values()[1], Value::text("a&#58;b"));
    assert_eq!(locator.values()[2], Value::BigInt(3));
    assert_eq!(locator.values()[3], Value::text("3:a&#58;b"));
}

#[test]
fn insert_with_ttl_appends_using_clause() {
    let def = ledger();

    let statements = generator()
        .make_insert(&def, &day_id(1), &row([("foreignid", Value::BigInt(1))]), Some(60))
        .expect("insert should generate");

    assert!(statements[0].query().ends_with(" USING TTL 60;"));
    assert!(statements[1].query().ends_with(" USING TTL 60;"));
    assert!(!statements[2].query().contains("TTL"));
}

#[test]
fn insert_without_required_fields_is_rejected() {
    let err = generator()
        .make_insert(&tracked(), &day_id(1), &row([("foreignid", Value::BigInt(1))]), None)
        .expect_err("instance and type are required");

    assert!(matches!(
        err,
        GenerateError::MissingRequiredFields { ref fields, .. } if fields == &["instance", "type"]
    ));
}

#[test]
fn null_key_inserts_skip_unpopulated_indexes_when_allowed() {
    let def = tracked().with_null_primary_key_inserts(true);

    let statements = generator()
        .make_insert(&def, &day_id(1), &row([("foreignid", Value::BigInt(1))]), None)
        .expect("null keys are allowed");

    // static + foreignid index + change log
    assert_eq!(statements.len(), 3);
}

///
/// Update
///

#[test]
fn update_with_unchanged_key_does_not_delete_old_index_row() {
    let def = ledger();
    let id = day_id(2);
    let old = row([("id", id.clone()), ("foreignid", Value::BigInt(1))]);

    let statements = generator()
        .make_update(&def, &id, &old, &row([("foreignid", Value::BigInt(1))]))
        .expect("update should generate");

    assert!(statements.iter().all(|s| !s.query().starts_with("DELETE")));
}

#[test]
fn update_of_key_deletes_old_row_and_writes_new_with_locator() {
    let def = tracked();
    let id = day_id(2);
    let old = row([
        ("id", id.clone()),
        ("foreignid", Value::BigInt(1)),
        ("instance", Value::BigInt(2)),
        ("type", Value::Int(3)),
    ]);

    let statements = generator()
        .make_update(&def, &id, &old, &row([("type", Value::Int(4))]))
        .expect("update should generate");

    let deletes: Vec<_> = statements
        .iter()
        .filter(|s| s.query().starts_with("DELETE"))
        .collect();
    assert_eq!(deletes.len(), 2);
    assert!(deletes.iter().all(|s| s.values().contains(&Value::Int(3))));

    // the unsharded foreignid index is refreshed without a locator row
    assert_eq!(
        statements.iter().filter(|s| s.table() == Some(SHARD_INDEX_TABLE)).count(),
        2
    );

    let static_write = statements
        .iter()
        .find(|s| s.table() == Some("testtype"))
        .expect("static row should be rewritten");
    assert_eq!(
        static_write.query(),
        "INSERT INTO \"functional\".\"testtype\" (id, type) VALUES (?, ?);"
    );
}

#[test]
fn update_skips_delete_when_old_key_was_never_populated() {
    let def = tracked().with_null_primary_key_inserts(true);
    let id = day_id(2);
    let old = row([("id", id.clone()), ("foreignid", Value::BigInt(1))]);

    let statements = generator()
        .make_update(
            &def,
            &id,
            &old,
            &row([("instance", Value::BigInt(2)), ("type", Value::Int(3))]),
        )
        .expect("update should generate");

    assert!(statements.iter().all(|s| !s.query().starts_with("DELETE")));
}

///
/// Delete
///

#[test]
fn delete_covers_static_and_populated_index_rows() {
    let def = tracked();
    let id = day_id(4);
    let stored = row([("foreignid", Value::BigInt(1))]);

    let statements = generator().make_delete(&def, &id, &stored);

    assert_eq!(statements.len(), 2);
    assert_eq!(
        statements[0].query(),
        "DELETE FROM \"functional\".\"testtype\" WHERE id = ?;"
    );
}

#[test]
fn timestamped_delete_is_literal_and_not_preparable() {
    let def = ledger();
    let index = def.index("foreignid").expect("fixture index");
    let id = day_id(4);

    let statement = generator()
        .make_delete_by_index_with_timestamp(&def, index, &id, &row([("foreignid", Value::BigInt(9))]), 1234)
        .expect("populated key should produce a delete");

    assert!(!statement.is_preparable());
    assert_eq!(
        statement.query(),
        format!(
            "DELETE FROM \"functional\".\"{}\" USING TIMESTAMP 1234 WHERE id = {} AND shardid = 1 AND foreignid = 9;",
            index_table_name(&def, index),
            id.to_index_string()
        )
    );
    assert!(generator()
        .make_delete_by_index_with_timestamp(&def, index, &id, &Row::new(), 1234)
        .is_none());
}

///
/// List planning
///

#[test]
fn unsharded_index_plans_single_shard_range() {
    let criteria = Criteria::new().with_index_value("foreignid", 5_i64);

    let plan = generator()
        .make_list(&tracked(), &criteria)
        .expect("foreignid is indexed");

    let ListPlan::Ranged(mut iter) = plan else {
        panic!("unsharded index should plan a range");
    };
    let statement = iter
        .next_statement()
        .expect("first statement renders")
        .expect("one shard");
    assert_eq!(statement.values()[0], Value::BigInt(1));
    assert!(!iter.has_next());
}

#[test]
fn sharded_index_without_start_uses_the_locator() {
    let criteria = Criteria::new()
        .with_index_value("instance", 1_i64)
        .with_index_value("type", 2);

    let plan = generator()
        .make_list(&tracked(), &criteria)
        .expect("instance:type is indexed");

    let ListPlan::Located { locator, query } = plan else {
        panic!("open-ended sharded query should consult the locator");
    };
    assert!(locator.query().starts_with("SELECT shardid FROM \"functional\".\"__shardindex\""));
    assert!(locator.query().contains("shardid <= ?"));
    assert!(locator.query().contains("ORDER BY shardid DESC"));
    assert_eq!(locator.values()[1], Value::text("1:2"));
    assert_eq!(query.order(), SortOrder::Desc);
}

#[test]
fn time_bounded_query_plans_analytic_range() {
    let day = NANOS_PER_DAY / 1_000_000;
    let criteria = Criteria::new()
        .with_index_value("instance", 1_i64)
        .with_index_value("type", 2)
        .with_time_window(3 * day, 5 * day + 10)
        .with_order(SortOrder::Asc);

    let ListPlan::Ranged(mut iter) = generator()
        .make_list(&tracked(), &criteria)
        .expect("bounded query plans")
    else {
        panic!("bounded query should plan a range");
    };

    let mut shards = Vec::new();
    while let Some(statement) = iter.next_statement().expect("within ceiling") {
        shards.push(statement.values()[0].clone());
    }
    assert_eq!(shards, vec![Value::BigInt(3), Value::BigInt(4), Value::BigInt(5)]);
}

#[test]
fn wide_time_window_plans_and_fails_only_past_the_ceiling() {
    let day = NANOS_PER_DAY / 1_000_000;
    let criteria = Criteria::new()
        .with_index_value("instance", 1_i64)
        .with_index_value("type", 2)
        .with_time_window(0, 100 * day)
        .with_order(SortOrder::Asc);

    let ListPlan::Ranged(mut iter) = generator()
        .make_list(&tracked(), &criteria)
        .expect("a wide window still plans")
    else {
        panic!("bounded query should plan a range");
    };

    for shard in 0..50 {
        let statement = iter
            .next_statement()
            .expect("within ceiling")
            .expect("shard statement");
        assert_eq!(statement.values()[0], Value::BigInt(shard));
    }

    let err = iter
        .next_statement()
        .expect_err("the 51st statement exceeds the ceiling");
    assert!(matches!(err, GenerateError::FanOutExceeded { limit: 50, needed: 51 }));
}

#[test]
fn inverted_window_plans_nothing() {
    let criteria = Criteria::new()
        .with_index_value("instance", 1_i64)
        .with_index_value("type", 2)
        .with_start_id(day_id(9))
        .with_end_id(day_id(3));

    let plan = generator()
        .make_list(&tracked(), &criteria)
        .expect("inverted window is not an error");

    assert!(matches!(plan, ListPlan::Bounded(ref iter) if iter.is_empty()));
}

#[test]
fn surplus_criteria_become_client_filters_and_widen_limit() {
    let criteria = Criteria::new()
        .with_index_value("foreignid", 5_i64)
        .with_index_value("filtered", 1)
        .with_limit(10);

    let ListPlan::Ranged(iter) = generator()
        .make_list(&tracked(), &criteria)
        .expect("foreignid covers the criteria")
    else {
        panic!("unsharded index should plan a range");
    };

    assert_eq!(iter.limit(), 50);
    assert_eq!(
        iter.client_filters(),
        Some(&row([("filtered", Value::Int(1))]))
    );
}

#[test]
fn criteria_without_any_index_is_rejected() {
    let criteria = Criteria::new().with_index_value("data1", "x");

    let err = generator()
        .make_list(&tracked(), &criteria)
        .expect_err("data1 is not indexed");

    assert!(matches!(err, GenerateError::NoMatchingIndex { .. }));
}

#[test]
fn null_index_value_is_rejected() {
    let criteria = Criteria::new().with_index_value("foreignid", Value::Null);

    let err = generator()
        .make_list(&tracked(), &criteria)
        .expect_err("null key values cannot be queried");

    assert!(matches!(err, GenerateError::InvalidIndexValue { ref field } if field == "foreignid"));
}

#[test]
fn count_without_filters_projects_count() {
    let criteria = Criteria::new().with_index_value("foreignid", 5_i64);

    let ListPlan::Ranged(mut iter) = generator()
        .make_count(&tracked(), &criteria)
        .expect("count plans")
    else {
        panic!("unsharded index should plan a range");
    };

    let statement = iter
        .next_statement()
        .expect("renders")
        .expect("one shard");
    assert!(statement.query().starts_with("SELECT count(*)"));
    assert!(statement.query().contains("LIMIT 10000"));
}

#[test]
fn filtered_count_fetches_rows_at_the_widened_page_size() {
    let criteria = Criteria::new()
        .with_index_value("foreignid", 5_i64)
        .with_index_value("filtered", 1)
        .with_limit(5);

    let ListPlan::Ranged(mut iter) = generator()
        .make_count(&tracked(), &criteria)
        .expect("count plans")
    else {
        panic!("unsharded index should plan a range");
    };

    assert_eq!(iter.limit(), 50);
    let statement = iter
        .next_statement()
        .expect("renders")
        .expect("one shard");
    assert!(statement.query().starts_with("SELECT *"));
    assert!(statement.query().contains("LIMIT 50"));
}

///
/// Change log and definitions
///

#[test]
fn change_log_queries_match_templates() {
    let horizon = timeuuid::generate();
    let r#gen = generator();

    assert_eq!(
        r#gen.make_get_first_eligible_index_update(horizon).query(),
        "SELECT statictablename, instanceid FROM \"functional\".\"__index_updates\" WHERE id < ? LIMIT 1 ALLOW FILTERING;"
    );
    assert!(r#gen
        .make_get_next_eligible_index_update("t", "i", horizon)
        .query()
        .contains("token(statictablename, instanceid) > token(?, ?) AND id < ?"));
    assert!(r#gen
        .make_get_row_index_update("t", "i")
        .query()
        .ends_with("ORDER BY id DESC;"));
    assert_eq!(
        r#gen.make_get_keyspace_definition("functional").query(),
        "SELECT def FROM \"functional\".\"__keyspace_definitions\" WHERE name = ? ORDER BY id DESC LIMIT 1;"
    );
}

#[test]
fn table_scan_resumes_by_token() {
    let def = ledger();
    let r#gen = generator();

    let first = r#gen.make_table_scan(&def, -10, 10, 201, None);
    assert_eq!(
        first.query(),
        "SELECT * FROM \"functional\".\"ledger\" WHERE token(id) >= ? AND token(id) <= ? LIMIT 201;"
    );

    let next = r#gen.make_table_scan(&def, -10, 10, 201, Some(&Value::BigInt(3)));
    assert_eq!(next.values(), &[Value::BigInt(3), Value::BigInt(10)]);
}
