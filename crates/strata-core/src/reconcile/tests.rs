use super::*;
use crate::{
    generator::Criteria,
    test_support::{memory_mapper, row, tracked},
    value::Value,
};

fn tracked_row(instance: i64, kind: i32) -> Row {
    row([
        ("foreignid", Value::BigInt(7)),
        ("instance", Value::BigInt(instance)),
        ("type", Value::Int(kind)),
        ("filtered", Value::Int(0)),
    ])
}

fn by_instance_type(instance: i64, kind: i32) -> Criteria {
    Criteria::new()
        .with_index_value("instance", instance)
        .with_index_value("type", kind)
}

async fn past_horizon(processor: &UpdateProcessor) {
    tokio::time::sleep(processor.horizon() + Duration::from_millis(50)).await;
}

#[tokio::test]
async fn failed_old_index_delete_is_healed_after_the_horizon() {
    let (mapper, store) = memory_mapper().await;
    let processor = UpdateProcessor::new(mapper.clone());

    let id = mapper
        .insert("testtype", tracked_row(11, 1))
        .await
        .expect("insert should succeed");

    // both composite indexes contain `type`, so both old-row deletes fail
    store.fail_next("DELETE FROM", 2);
    mapper
        .update("testtype", id.clone(), row([("type", Value::Int(2))]))
        .await
        .expect_err("failed index deletes should surface");

    let stale = mapper
        .list("testtype", &by_instance_type(11, 1))
        .await
        .expect("list should succeed");
    assert_eq!(stale.len(), 1, "old index row survives the failed delete");

    past_horizon(&processor).await;
    let report = processor.process_once().await.expect("pass should succeed");

    assert_eq!(report.groups, 1);
    assert_eq!(report.index_deletes, 2);
    assert_eq!(report.log_deletes, 2);
    assert!(
        mapper
            .list("testtype", &by_instance_type(11, 1))
            .await
            .expect("list should succeed")
            .is_empty()
    );

    let current = mapper
        .list("testtype", &by_instance_type(11, 2))
        .await
        .expect("list should succeed");
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].get("id"), Some(&id));
}

#[tokio::test]
async fn second_pass_over_a_clean_log_writes_nothing() {
    let (mapper, store) = memory_mapper().await;
    let processor = UpdateProcessor::new(mapper.clone());

    let id = mapper
        .insert("testtype", tracked_row(11, 1))
        .await
        .expect("insert should succeed");
    mapper
        .update("testtype", id, row([("type", Value::Int(2))]))
        .await
        .expect("update should succeed");

    past_horizon(&processor).await;
    let first = processor.process_once().await.expect("pass should succeed");
    assert!(!first.is_clean());

    store.reset_counters();
    let second = processor.process_once().await.expect("pass should succeed");

    assert!(second.is_clean());
    assert_eq!(second.groups, 0);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn lone_entry_is_kept_until_it_ages_past_the_horizon() {
    let (mapper, store) = memory_mapper().await;
    let processor = UpdateProcessor::new(mapper.clone());

    mapper
        .insert("testtype", tracked_row(11, 1))
        .await
        .expect("insert should succeed");

    let early = processor.process_once().await.expect("pass should succeed");
    assert_eq!(early.groups, 0);
    assert_eq!(store.rows("functional", "__index_updates").len(), 1);

    past_horizon(&processor).await;
    let late = processor.process_once().await.expect("pass should succeed");

    assert_eq!(late.log_deletes, 1);
    assert_eq!(late.index_deletes, 0);
    assert!(store.rows("functional", "__index_updates").is_empty());
}

#[tokio::test]
async fn a_failing_group_does_not_halt_the_sweep() {
    let (mapper, store) = memory_mapper().await;
    let processor = UpdateProcessor::new(mapper.clone());

    for instance in [1, 2] {
        mapper
            .insert("testtype", tracked_row(instance, 1))
            .await
            .expect("insert should succeed");
    }
    past_horizon(&processor).await;

    store.fail_next("ORDER BY id DESC;", 1);
    let report = processor.process_once().await.expect("pass should succeed");

    assert_eq!(report.groups, 2);
    assert_eq!(report.failed_groups, 1);
    assert_eq!(report.log_deletes, 1);
}

#[tokio::test]
async fn row_limit_stops_the_pass_early() {
    let (mapper, _store) = memory_mapper().await;
    let processor = UpdateProcessor::new(mapper.clone());

    for instance in 1..=3 {
        mapper
            .insert("testtype", tracked_row(instance, 1))
            .await
            .expect("insert should succeed");
    }
    past_horizon(&processor).await;

    let report = processor
        .process_with_limit(2)
        .await
        .expect("pass should succeed");

    assert_eq!(report.groups, 2);
}

#[tokio::test]
async fn close_updates_are_reported_within_the_window() {
    let (mapper, _store) = memory_mapper().await;
    let processor = UpdateProcessor::new(mapper.clone());

    let id = mapper
        .insert("testtype", tracked_row(11, 1))
        .await
        .expect("insert should succeed");
    mapper
        .update("testtype", id, row([("type", Value::Int(2))]))
        .await
        .expect("update should succeed");
    past_horizon(&processor).await;

    let close = processor
        .updates_within_timeframe(Duration::from_secs(10), 0)
        .await
        .expect("scan should succeed");
    assert_eq!(close.len(), 1);
    assert_eq!(close[0].newer.get("type"), Some(&Value::Int(2)));
    assert_eq!(close[0].older.get("type"), Some(&Value::Int(1)));
    assert!(close[0].difference < Duration::from_secs(10));

    let none = processor
        .updates_within_timeframe(Duration::ZERO, 0)
        .await
        .expect("scan should succeed");
    assert!(none.is_empty());
}

#[tokio::test]
async fn polling_loop_stops_on_signal() {
    let (mapper, _store) = memory_mapper().await;
    let processor = UpdateProcessor::new(mapper);
    let (stop_tx, stop_rx) = watch::channel(false);

    let handle = tokio::spawn(async move { processor.process(stop_rx).await });
    stop_tx.send(true).expect("processor should be listening");

    let report = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should stop promptly")
        .expect("task should not panic")
        .expect("passes should succeed");
    assert!(report.is_clean());
}

#[test]
fn null_key_fields_never_produce_a_delete() {
    let def = tracked();
    let index = def.index("instance:type").expect("fixture index");

    let mut values = tracked_row(11, 1);
    assert_eq!(written_key(index, &values), Some("11:1".to_string()));

    values.insert("type".to_string(), Value::Null);
    assert_eq!(written_key(index, &values), None);
}
