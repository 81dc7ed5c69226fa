//! Index reconciliation.
//!
//! Writes to the static table and the index tables are independent, so an
//! update that fails halfway can leave an index row pointing at values the
//! object no longer has. Every mutation appends a snapshot of the indexed
//! fields to the change log; this processor walks the log one object at a
//! time and removes index rows that no longer match the newest snapshot.

#[cfg(test)]
mod tests;

use crate::{
    error::InternalError,
    generator::key_values,
    mapper::{IndexUpdateEntry, IndexUpdateRow, IndexUpdateRowKey, ObjectMapper},
    value::{Row, index_values_string},
};
use std::{collections::HashSet, time::Duration};
use strata_schema::{index::Index, timeuuid};
use tokio::sync::watch;

///
/// ProcessReport
///
/// Totals for one or more reconciliation passes.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProcessReport {
    pub groups: u64,
    pub index_deletes: u64,
    pub log_deletes: u64,
    pub failed_groups: u64,
}

impl ProcessReport {
    /// Whether the pass changed anything in the store.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.index_deletes == 0 && self.log_deletes == 0
    }

    const fn absorb(&mut self, other: Self) {
        self.groups += other.groups;
        self.index_deletes += other.index_deletes;
        self.log_deletes += other.log_deletes;
        self.failed_groups += other.failed_groups;
    }
}

///
/// CloseUpdate
///
/// Two consecutive snapshots of one object written less than a window
/// apart.
///

#[derive(Clone, Debug)]
pub struct CloseUpdate {
    pub key: IndexUpdateRowKey,
    pub newer: Row,
    pub older: Row,
    pub difference: Duration,
}

///
/// UpdateProcessor
///

#[derive(Clone, Debug)]
pub struct UpdateProcessor {
    mapper: ObjectMapper,
    horizon: Duration,
}

impl UpdateProcessor {
    #[must_use]
    pub fn new(mapper: ObjectMapper) -> Self {
        let horizon = mapper.config().consistency_horizon();

        Self { mapper, horizon }
    }

    #[must_use]
    pub const fn horizon(&self) -> Duration {
        self.horizon
    }

    // ------------------------------------------------------------------
    // Passes
    // ------------------------------------------------------------------

    /// One sweep over every eligible change-log group. A failing group is
    /// logged and counted; the sweep carries on with the next one.
    pub async fn process_once(&self) -> Result<ProcessReport, InternalError> {
        self.process_groups(None).await
    }

    /// Like [`process_once`](Self::process_once), stopping after
    /// `row_limit` groups.
    pub async fn process_with_limit(
        &self,
        row_limit: u64,
    ) -> Result<ProcessReport, InternalError> {
        self.process_groups(Some(row_limit)).await
    }

    async fn process_groups(
        &self,
        row_limit: Option<u64>,
    ) -> Result<ProcessReport, InternalError> {
        let mut report = ProcessReport::default();
        let mut cursor: Option<IndexUpdateRowKey> = None;

        while let Some(key) = self.mapper.next_update_key(cursor.as_ref()).await? {
            if row_limit.is_some_and(|limit| report.groups >= limit) {
                break;
            }

            let outcome = match self.mapper.get_update_index_row(&key).await {
                Ok(Some(row)) => self.process_row(&row).await,
                Ok(None) => Ok(ProcessReport::default()),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(outcome) => report.absorb(outcome),
                Err(err) => {
                    tracing::warn!(
                        table = %key.table,
                        instance = %key.instance_id,
                        error = %err,
                        "reconciliation failed for group"
                    );
                    report.failed_groups += 1;
                }
            }
            report.groups += 1;
            cursor = Some(key);
        }

        tracing::info!(
            groups = report.groups,
            index_deletes = report.index_deletes,
            log_deletes = report.log_deletes,
            failed = report.failed_groups,
            "reconciliation pass complete"
        );

        Ok(report)
    }

    /// Poll the change log until `stop` flips to true, sleeping one horizon
    /// between passes.
    pub async fn process(
        &self,
        mut stop: watch::Receiver<bool>,
    ) -> Result<ProcessReport, InternalError> {
        let mut total = ProcessReport::default();

        loop {
            if *stop.borrow() {
                break;
            }
            total.absorb(self.process_once().await?);

            tokio::select! {
                () = tokio::time::sleep(self.horizon) => {}
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        Ok(total)
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Reconcile one object. The newest snapshot is the truth; index rows
    /// written for any older snapshot with a different key are deleted at
    /// the newest snapshot's time so a later write of the same key survives.
    pub async fn process_row(
        &self,
        row: &IndexUpdateRow,
    ) -> Result<ProcessReport, InternalError> {
        let mut report = ProcessReport::default();
        let Some(newest) = row.newest() else {
            return Ok(report);
        };
        let horizon = self.horizon_micros();

        if row.entries.len() == 1 {
            if newest.micros() < horizon {
                self.mapper
                    .delete_obsolete_update_entry(&row.key, newest.id)
                    .await?;
                report.log_deletes += 1;
            }
            return Ok(report);
        }

        let older = &row.entries[1..];
        let mut deleted = HashSet::new();

        for entry in older {
            for index in stale_indexes(row, newest, entry) {
                let Some(values) = written_key(index, &entry.values) else {
                    continue;
                };
                if !deleted.insert((index.key(), values)) {
                    continue;
                }

                if self
                    .mapper
                    .delete_obsolete_index(row, index, &entry.values, newest.micros())
                    .await?
                {
                    report.index_deletes += 1;
                }
            }
        }

        let mut retained = 0usize;
        for entry in older {
            if entry.micros() < horizon {
                self.mapper
                    .delete_obsolete_update_entry(&row.key, entry.id)
                    .await?;
                report.log_deletes += 1;
            } else {
                retained += 1;
            }
        }

        // nothing left to compare against, so the truth is settled too
        if retained == 0 && newest.micros() < horizon {
            self.mapper
                .delete_obsolete_update_entry(&row.key, newest.id)
                .await?;
            report.log_deletes += 1;
        }

        tracing::debug!(
            table = %row.key.table,
            instance = %row.key.instance_id,
            index_deletes = report.index_deletes,
            log_deletes = report.log_deletes,
            "group reconciled"
        );

        Ok(report)
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Consecutive snapshots written less than `window` apart, across
    /// every eligible group. `row_limit` caps the groups examined; zero
    /// means no cap.
    pub async fn updates_within_timeframe(
        &self,
        window: Duration,
        row_limit: u64,
    ) -> Result<Vec<CloseUpdate>, InternalError> {
        let window_nanos = i64::try_from(window.as_nanos()).unwrap_or(i64::MAX);
        let mut found = Vec::new();
        let mut examined = 0u64;
        let mut cursor: Option<IndexUpdateRowKey> = None;

        while let Some(row) = self.mapper.get_next_update_index_row(cursor.as_ref()).await? {
            for pair in row.entries.windows(2) {
                let (newer, older) = (&pair[0], &pair[1]);
                let difference = nanos(newer).saturating_sub(nanos(older));

                if difference < window_nanos {
                    found.push(CloseUpdate {
                        key: row.key.clone(),
                        newer: newer.values.clone(),
                        older: older.values.clone(),
                        difference: Duration::from_nanos(
                            u64::try_from(difference).unwrap_or(0),
                        ),
                    });
                }
            }

            examined += 1;
            if row_limit > 0 && examined >= row_limit {
                break;
            }
            cursor = Some(row.key);
        }

        Ok(found)
    }

    fn horizon_micros(&self) -> i64 {
        timeuuid::unix_micros(&self.mapper.horizon_uuid()).unwrap_or(i64::MIN)
    }
}

// indexes whose key values differ between the truth and an older snapshot
fn stale_indexes<'a>(
    row: &'a IndexUpdateRow,
    newest: &'a IndexUpdateEntry,
    older: &'a IndexUpdateEntry,
) -> impl Iterator<Item = &'a Index> {
    row.object
        .indexes()
        .filter(move |index| {
            key_values(index, &newest.values) != key_values(index, &older.values)
        })
}

// canonical key string, or None when a key field is null and no row was written
fn written_key(index: &Index, values: &Row) -> Option<String> {
    let key = key_values(index, values)
        .into_iter()
        .collect::<Option<Vec<_>>>()?;

    Some(index_values_string(key))
}

fn nanos(entry: &IndexUpdateEntry) -> i64 {
    timeuuid::unix_nanos(&entry.id).unwrap_or_default()
}
