use super::*;

const WIDE: &str = "CREATE TABLE \"ks\".\"w\" (id timeuuid, shardid bigint, k int, v varchar, PRIMARY KEY ((shardid, k), id));";
const STATIC: &str = "CREATE TABLE \"ks\".\"s\" (id bigint PRIMARY KEY, v varchar);";

async fn store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .execute_raw("CREATE KEYSPACE ks WITH replication = { 'class' : 'SimpleStrategy', 'replication_factor' : 1 };")
        .await
        .expect("keyspace should be created");
    store.execute_raw(WIDE).await.expect("wide table");
    store.execute_raw(STATIC).await.expect("static table");

    store
}

async fn run(store: &MemoryStore, query: &str, values: &[Value]) -> ResultSet {
    let id = store.prepare(query).await.expect("statement should prepare");
    store
        .execute_prepared(&id, values)
        .await
        .expect("statement should execute")
}

fn day_id(n: i64) -> Value {
    Value::Timeuuid(timeuuid::from_unix_nanos(1_700_000_000_000_000_000 + n, 0, [2; 6]))
}

async fn insert_wide(store: &MemoryStore, n: i64) {
    run(
        store,
        "INSERT INTO \"ks\".\"w\" (id, shardid, k, v) VALUES (?, ?, ?, ?);",
        &[day_id(n), Value::BigInt(1), Value::Int(7), Value::text(format!("v{n}"))],
    )
    .await;
}

#[tokio::test]
async fn duplicate_create_reports_already_exists_unless_guarded() {
    let store = store().await;

    let err = store.execute_raw(STATIC).await.expect_err("duplicate should fail");
    assert!(matches!(err, StoreError::AlreadyExists(_)));

    store
        .execute_raw("CREATE TABLE IF NOT EXISTS \"ks\".\"s\" (id bigint PRIMARY KEY, v varchar);")
        .await
        .expect("guarded create should succeed");
}

#[tokio::test]
async fn unknown_table_is_unconfigured() {
    let store = store().await;

    let err = store
        .execute_raw("SELECT * FROM \"ks\".\"missing\" WHERE id = 1;")
        .await
        .expect_err("missing table should fail");

    assert!(matches!(err, StoreError::Unconfigured(_)));
}

#[tokio::test]
async fn clustering_order_follows_order_by_and_limit() {
    let store = store().await;
    for n in [3, 1, 2] {
        insert_wide(&store, n).await;
    }

    let select = "SELECT * FROM \"ks\".\"w\" WHERE shardid = ? AND k = ? ORDER BY id DESC LIMIT 2 ALLOW FILTERING;";
    let rows = run(&store, select, &[Value::BigInt(1), Value::Int(7)])
        .await
        .into_rows();

    let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![day_id(3), day_id(2)]);
    assert_eq!(rows[0]["shardid"], Value::BigInt(1));
}

#[tokio::test]
async fn range_conditions_on_the_clustering_key_filter_rows() {
    let store = store().await;
    for n in 1..=5 {
        insert_wide(&store, n).await;
    }

    let select = "SELECT * FROM \"ks\".\"w\" WHERE shardid = ? AND k = ? AND id > ? AND id <= ? ORDER BY id ASC LIMIT 10 ALLOW FILTERING;";
    let rows = run(
        &store,
        select,
        &[Value::BigInt(1), Value::Int(7), day_id(2), day_id(4)],
    )
    .await
    .into_rows();

    let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![day_id(3), day_id(4)]);
}

#[tokio::test]
async fn count_projection_honours_the_limit() {
    let store = store().await;
    for n in 1..=4 {
        insert_wide(&store, n).await;
    }

    let count = "SELECT count(*) FROM \"ks\".\"w\" WHERE shardid = ? AND k = ? LIMIT 3 ALLOW FILTERING;";
    let result = run(&store, count, &[Value::BigInt(1), Value::Int(7)]).await;

    assert_eq!(result.count(), Some(3));
}

#[tokio::test]
async fn timestamped_delete_shadows_only_older_writes() {
    let store = store().await;
    run(
        &store,
        "INSERT INTO \"ks\".\"s\" (id, v) VALUES (?, ?) USING TIMESTAMP 100;",
        &[Value::BigInt(1), Value::text("old")],
    )
    .await;

    store
        .execute_raw("DELETE FROM \"ks\".\"s\" USING TIMESTAMP 50 WHERE id = 1;")
        .await
        .expect("delete should run");
    assert_eq!(store.rows("ks", "s").len(), 1);

    store
        .execute_raw("DELETE FROM \"ks\".\"s\" USING TIMESTAMP 150 WHERE id = 1;")
        .await
        .expect("delete should run");
    assert!(store.rows("ks", "s").is_empty());

    // a later write at an older timestamp stays shadowed
    run(
        &store,
        "INSERT INTO \"ks\".\"s\" (id, v) VALUES (?, ?) USING TIMESTAMP 120;",
        &[Value::BigInt(1), Value::text("late")],
    )
    .await;
    assert!(store.rows("ks", "s").is_empty());
}

#[tokio::test]
async fn upsert_merges_cells_and_null_clears_a_cell() {
    let store = store().await;
    let insert = "INSERT INTO \"ks\".\"s\" (id, v) VALUES (?, ?);";

    run(&store, insert, &[Value::BigInt(9), Value::text("a")]).await;
    run(&store, insert, &[Value::BigInt(9), Value::Null]).await;

    let rows = store.rows("ks", "s");
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].contains_key("v"));
}

#[tokio::test]
async fn token_ranges_cover_each_partition_once() {
    let store = store().await;
    let insert = "INSERT INTO \"ks\".\"s\" (id, v) VALUES (?, ?);";
    for n in 0..20 {
        run(&store, insert, &[Value::BigInt(n), Value::text("x")]).await;
    }

    let scan = "SELECT * FROM \"ks\".\"s\" WHERE token(id) >= ? AND token(id) <= ? LIMIT 100;";
    let low = run(&store, scan, &[Value::BigInt(i64::MIN), Value::BigInt(-1)])
        .await
        .into_rows();
    let high = run(&store, scan, &[Value::BigInt(0), Value::BigInt(i64::MAX)])
        .await
        .into_rows();

    assert_eq!(low.len() + high.len(), 20);
}

#[tokio::test]
async fn resume_after_a_key_skips_through_its_token() {
    let store = store().await;
    let insert = "INSERT INTO \"ks\".\"s\" (id, v) VALUES (?, ?);";
    for n in 0..10 {
        run(&store, insert, &[Value::BigInt(n), Value::text("x")]).await;
    }

    let first = "SELECT * FROM \"ks\".\"s\" WHERE token(id) >= ? AND token(id) <= ? LIMIT 4;";
    let page = run(&store, first, &[Value::BigInt(i64::MIN), Value::BigInt(i64::MAX)])
        .await
        .into_rows();
    let last = page[3]["id"].clone();

    let next = "SELECT * FROM \"ks\".\"s\" WHERE token(id) > token(?) AND token(id) <= ? LIMIT 100;";
    let rest = run(&store, next, &[last, Value::BigInt(i64::MAX)])
        .await
        .into_rows();

    assert_eq!(page.len() + rest.len(), 10);
}

#[tokio::test]
async fn injected_failures_are_consumed() {
    let store = store().await;
    store.fail_next("\"ks\".\"s\"", 1);

    let insert = "INSERT INTO \"ks\".\"s\" (id, v) VALUES (?, ?);";
    let id = store.prepare(insert).await.expect("prepare");
    let values = [Value::BigInt(1), Value::text("x")];

    let err = store
        .execute_prepared(&id, &values)
        .await
        .expect_err("first execution should fail");
    assert!(matches!(err, StoreError::Unavailable(_)));

    store
        .execute_prepared(&id, &values)
        .await
        .expect("second execution should succeed");
    assert_eq!(store.write_count(), 1);
}

#[tokio::test]
async fn raw_statements_reject_bind_markers() {
    let store = store().await;

    let err = store
        .execute_raw("SELECT * FROM \"ks\".\"s\" WHERE id = ?;")
        .await
        .expect_err("bind markers need a prepared statement");

    assert!(matches!(err, StoreError::InvalidQuery(_)));
}

#[tokio::test]
async fn ttl_rows_expire() {
    let store = store().await;
    run(
        &store,
        "INSERT INTO \"ks\".\"s\" (id, v) VALUES (?, ?) USING TTL 1;",
        &[Value::BigInt(1), Value::text("x")],
    )
    .await;
    assert_eq!(store.rows("ks", "s").len(), 1);

    std::thread::sleep(Duration::from_millis(1_100));
    assert!(store.rows("ks", "s").is_empty());
}
