mod common;

use common::{BASE_MILLIS, account, accounts, ids, setup};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use strata_core::{
    generator::{Criteria, SortOrder},
    migration::ObjectMigrator,
    reconcile::UpdateProcessor,
    scan::{TableScanner, TokenVisitor},
    schema::{ID_FIELD, index::Index, sharding::ShardingStrategy, types::FieldType},
    value::{Row, Value},
};

fn by_owner(owner: i64) -> Criteria {
    Criteria::new().with_index_value("owner", owner)
}

fn by_region_tier(region: &str, tier: i32) -> Criteria {
    Criteria::new()
        .with_index_value("region", Value::text(region))
        .with_index_value("tier", tier)
}

///
/// Round trip
///

#[tokio::test]
async fn inserted_fields_read_back_unchanged_by_primary_key() {
    let (mapper, _store) = setup().await;
    let written = account(42, "eu", 3);

    let id = mapper
        .insert("account", written.clone())
        .await
        .expect("insert should succeed");
    let fetched = mapper
        .get_by_key("account", id.clone())
        .await
        .expect("get should succeed")
        .expect("object should exist");

    assert_eq!(fetched.get(ID_FIELD), Some(&id));
    for (field, value) in &written {
        assert_eq!(fetched.get(field), Some(value), "field {field}");
    }
}

///
/// Update
///

#[tokio::test]
async fn update_moves_the_object_to_its_new_index_values() {
    let (mapper, _store) = setup().await;
    let processor = UpdateProcessor::new(mapper.clone());

    let id = mapper
        .insert("account", account(42, "eu", 1))
        .await
        .expect("insert should succeed");
    mapper
        .update(
            "account",
            id.clone(),
            [("tier".to_string(), Value::Int(2))].into_iter().collect(),
        )
        .await
        .expect("update should succeed");

    let current = mapper
        .list("account", &by_region_tier("eu", 2))
        .await
        .expect("list should succeed");
    assert_eq!(ids(&current), vec![id.clone()]);
    assert_eq!(current[0].get("note"), Some(&Value::text("opened")));

    tokio::time::sleep(processor.horizon() + Duration::from_millis(50)).await;
    processor.process_once().await.expect("pass should succeed");

    let old = mapper
        .list("account", &by_region_tier("eu", 1))
        .await
        .expect("list should succeed");
    assert!(old.is_empty());
    assert_eq!(
        ids(&mapper
            .list("account", &by_region_tier("eu", 2))
            .await
            .expect("list should succeed")),
        vec![id]
    );
}

///
/// Migration
///

#[test]
fn adding_a_field_and_an_index_is_one_column_and_one_table() {
    let old = accounts();
    let new = accounts()
        .with_field("score", FieldType::BigInt)
        .with_index(Index::from_key("tier:score", ShardingStrategy::None));

    let migrator = ObjectMigrator::new(&old, &new);
    assert!(migrator.is_migratable());

    let generator = strata_core::generator::CqlGenerator::new("integration");
    let plan = migrator.plan(&generator).expect("plan should build");

    assert_eq!(plan.field_additions.len(), 1);
    assert_eq!(plan.field_additions[0].field.name, "score");
    assert_eq!(plan.index_creations.len(), 1);
    assert_eq!(plan.index_creations[0].index.key(), "tier:score");
    assert!(plan.created_objects.is_empty());
}

#[test]
fn retyping_an_existing_field_is_not_migratable() {
    let old = accounts();
    let new = strata_core::schema::definition::ObjectDefinition::new("account")
        .with_field("owner", FieldType::VarChar)
        .with_field("region", FieldType::VarChar)
        .with_field("tier", FieldType::Int)
        .with_field("note", FieldType::VarChar)
        .with_index(Index::from_key("owner", ShardingStrategy::None))
        .with_index(Index::from_key("region:tier", ShardingStrategy::Daily));

    let migrator = ObjectMigrator::new(&old, &new);
    let generator = strata_core::generator::CqlGenerator::new("integration");

    assert!(!migrator.is_migratable());
    assert!(migrator.migration_statements(&generator).is_err());
}

///
/// Count
///

#[tokio::test]
async fn batched_rows_count_exactly_with_and_without_filters() {
    let (mapper, _store) = setup().await;

    let rows: Vec<Row> = (0..200)
        .map(|n| account(9, "eu", if n % 3 == 0 { 1 } else { 0 }))
        .collect();
    let mut objects = BTreeMap::new();
    objects.insert("account".to_string(), rows);
    let inserted = mapper
        .insert_batch_mixed(objects)
        .await
        .expect("batch should succeed");
    assert_eq!(inserted.len(), 200);

    let all = mapper
        .count("account", &by_owner(9))
        .await
        .expect("count should succeed");
    assert_eq!(all, 200);

    let filtered = mapper
        .count("account", &by_owner(9).with_index_value("tier", 1))
        .await
        .expect("filtered count should succeed");
    assert_eq!(filtered, 67);
}

#[tokio::test]
async fn filtered_count_with_a_small_limit_pages_like_the_filtered_list() {
    let (mapper, _store) = setup().await;

    let rows: Vec<Row> = (0..300).map(|_| account(9, "eu", 0)).collect();
    let mut objects = BTreeMap::new();
    objects.insert("account".to_string(), rows);
    mapper
        .insert_batch_mixed(objects)
        .await
        .expect("batch should succeed");

    let criteria = by_owner(9).with_index_value("tier", 1).with_limit(5);

    let listed = mapper
        .list("account", &criteria)
        .await
        .expect("filtered list should succeed");
    let counted = mapper
        .count("account", &criteria)
        .await
        .expect("filtered count should stay under the statement ceiling");

    assert!(listed.is_empty());
    assert_eq!(counted, 0);
}

///
/// Wide windows
///

#[tokio::test]
async fn wide_daily_window_is_answered_by_its_first_shards() {
    let (mapper, _store) = setup().await;
    let day = 24 * 60 * 60 * 1_000;

    let id = mapper
        .insert_at("account", account(3, "eu", 1), BASE_MILLIS + 89 * day)
        .await
        .expect("insert should succeed");

    let criteria = by_region_tier("eu", 1)
        .with_time_window(BASE_MILLIS, BASE_MILLIS + 90 * day)
        .with_order(SortOrder::Desc)
        .with_limit(1);
    let found = mapper
        .list("account", &criteria)
        .await
        .expect("a 90 day window should not trip the statement ceiling");

    assert_eq!(ids(&found), vec![id]);
}

///
/// End cursor
///

#[tokio::test]
async fn end_cursor_inclusivity_decides_whether_the_bound_row_is_returned() {
    let (mapper, _store) = setup().await;

    let mut inserted = Vec::new();
    for n in 0..12 {
        let id = mapper
            .insert_at("account", account(5, "us", 1), BASE_MILLIS + n * 10)
            .await
            .expect("insert should succeed");
        inserted.push(id);
    }

    let ascending = |end: &Value, inclusive: bool| {
        by_owner(5)
            .with_end_id(end.clone())
            .with_order(SortOrder::Asc)
            .with_inclusive(inclusive)
    };

    for n in [0usize, 1, 7, 11] {
        let inclusive = mapper
            .list("account", &ascending(&inserted[n], true))
            .await
            .expect("list should succeed");
        let exclusive = mapper
            .list("account", &ascending(&inserted[n], false))
            .await
            .expect("list should succeed");

        assert_eq!(ids(&inclusive), inserted[..=n].to_vec(), "inclusive at {n}");
        assert_eq!(ids(&exclusive), inserted[..n].to_vec(), "exclusive at {n}");
    }
}

///
/// Reconciliation
///

#[tokio::test]
async fn reconciling_a_consistent_log_twice_writes_nothing_the_second_time() {
    let (mapper, store) = setup().await;
    let processor = UpdateProcessor::new(mapper.clone());

    let id = mapper
        .insert("account", account(1, "eu", 1))
        .await
        .expect("insert should succeed");
    mapper
        .update(
            "account",
            id,
            [("tier".to_string(), Value::Int(4))].into_iter().collect(),
        )
        .await
        .expect("update should succeed");

    tokio::time::sleep(processor.horizon() + Duration::from_millis(50)).await;
    processor.process_once().await.expect("first pass should succeed");

    store.reset_counters();
    let second = processor
        .process_once()
        .await
        .expect("second pass should succeed");

    assert!(second.is_clean());
    assert_eq!(store.write_count(), 0);
}

///
/// Scan
///

#[derive(Clone, Default)]
struct Tally(Arc<AtomicU64>);

impl TokenVisitor for Tally {
    fn visit(&mut self, _row: &Row) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[tokio::test]
async fn interrupted_scan_resumes_from_its_cursor_files() {
    let (mapper, _store) = setup().await;
    for owner in 0..90 {
        mapper
            .insert("account", account(owner, "eu", 1))
            .await
            .expect("insert should succeed");
    }

    let dir = tempfile::tempdir().expect("temp dir");
    let first = Tally::default();
    let report = TableScanner::new(mapper.clone(), "account", 3)
        .with_batch_size(16)
        .with_resume_dir(dir.path())
        .scan(|_| first.clone())
        .await
        .expect("scan should succeed");
    assert_eq!(report.visited, 90);
    assert_eq!(first.0.load(Ordering::Relaxed), 90);

    let rerun = TableScanner::new(mapper, "account", 3)
        .with_resume_dir(dir.path())
        .scan(|_| Tally::default())
        .await
        .expect("rerun should succeed");
    assert_eq!(rerun.visited, 0);
    assert_eq!(rerun.partitions, 3);
}
