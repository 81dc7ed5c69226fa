use crate::value::{Row, SortKey, Value, token};
use std::collections::{BTreeMap, btree_map::Entry};
use strata_schema::types::FieldType;

///
/// PartitionKey
///
/// Partitions order by token first, then by key values, mirroring the
/// ring order of a partitioned store.
///

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub(crate) struct PartitionKey {
    pub token: i64,
    pub values: Vec<SortKey>,
}

impl PartitionKey {
    pub(crate) fn new(values: Vec<Value>) -> Self {
        Self {
            token: token(&values),
            values: values.into_iter().map(SortKey).collect(),
        }
    }
}

///
/// StoredRow
///

#[derive(Clone, Debug)]
pub(crate) struct StoredRow {
    pub cells: Row,
    pub written_at: i64,
    pub expires_at: Option<i64>,
}

impl StoredRow {
    pub(crate) fn is_live(&self, now_micros: i64) -> bool {
        self.expires_at.is_none_or(|at| at > now_micros)
    }
}

///
/// Partition
///

#[derive(Clone, Debug, Default)]
pub(crate) struct Partition {
    pub rows: BTreeMap<Vec<SortKey>, StoredRow>,
    pub tombstones: BTreeMap<Vec<SortKey>, i64>,
}

///
/// Table
///

#[derive(Clone, Debug)]
pub(crate) struct Table {
    pub columns: Vec<(String, FieldType)>,
    pub partition_key: Vec<String>,
    pub clustering_key: Vec<String>,
    pub partitions: BTreeMap<PartitionKey, Partition>,
}

impl Table {
    pub(crate) const fn new(
        columns: Vec<(String, FieldType)>,
        partition_key: Vec<String>,
        clustering_key: Vec<String>,
    ) -> Self {
        Self {
            columns,
            partition_key,
            clustering_key,
            partitions: BTreeMap::new(),
        }
    }

    pub(crate) fn column_type(&self, name: &str) -> Option<FieldType> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, field_type)| *field_type)
    }

    pub(crate) fn truncate(&mut self) {
        self.partitions.clear();
    }

    /// Upsert one row. Writes older than a tombstone on the same row are
    /// dropped; null cells clear the stored cell.
    pub(crate) fn upsert(
        &mut self,
        partition: PartitionKey,
        clustering: Vec<SortKey>,
        cells: Row,
        written_at: i64,
        expires_at: Option<i64>,
    ) -> bool {
        let partition = self.partitions.entry(partition).or_default();

        if partition
            .tombstones
            .get(&clustering)
            .is_some_and(|deleted_at| *deleted_at >= written_at)
        {
            return false;
        }

        match partition.rows.entry(clustering) {
            Entry::Vacant(slot) => {
                let cells = cells.into_iter().filter(|(_, v)| !v.is_null()).collect();
                slot.insert(StoredRow {
                    cells,
                    written_at,
                    expires_at,
                });
            }
            Entry::Occupied(mut slot) => {
                let row = slot.get_mut();
                for (name, value) in cells {
                    if value.is_null() {
                        row.cells.remove(&name);
                    } else {
                        row.cells.insert(name, value);
                    }
                }
                row.written_at = row.written_at.max(written_at);
                row.expires_at = expires_at;
            }
        }

        true
    }

    /// Delete the rows of one partition selected by `matches`, shadowing
    /// anything written at or before `deleted_at`. An `exact` clustering key
    /// is tombstoned even when no row exists yet. Returns the rows removed.
    pub(crate) fn delete(
        &mut self,
        partition: &PartitionKey,
        exact: Option<Vec<SortKey>>,
        matches: impl Fn(&[SortKey], &StoredRow) -> bool,
        deleted_at: i64,
    ) -> usize {
        let partition = self.partitions.entry(partition.clone()).or_default();

        let targets: Vec<Vec<SortKey>> = partition
            .rows
            .iter()
            .filter(|(key, row)| matches(key, row))
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in &targets {
            if partition
                .rows
                .get(key)
                .is_some_and(|row| row.written_at <= deleted_at)
            {
                partition.rows.remove(key);
                removed += 1;
            }
            record_tombstone(partition, key.clone(), deleted_at);
        }
        if let Some(key) = exact {
            record_tombstone(partition, key, deleted_at);
        }

        removed
    }
}

fn record_tombstone(partition: &mut Partition, key: Vec<SortKey>, deleted_at: i64) {
    let slot = partition.tombstones.entry(key).or_insert(deleted_at);
    *slot = (*slot).max(deleted_at);
}
