use super::ObjectMapper;
use crate::{
    error::InternalError,
    generator::static_table_name,
    value::{Row, Value, row_from_json},
};
use std::time::Duration;
use strata_schema::{definition::ObjectDefinition, index::Index, timeuuid};
use uuid::Uuid;

///
/// IndexUpdateRowKey
///
/// Identifies one change-log group: a static table and an object id in
/// index-string form.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IndexUpdateRowKey {
    pub table: String,
    pub instance_id: String,
}

impl IndexUpdateRowKey {
    #[must_use]
    pub fn new(table: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            instance_id: instance_id.into(),
        }
    }

    fn from_row(row: &Row) -> Option<Self> {
        let table = row.get("statictablename").and_then(Value::as_str)?;
        let instance = row.get("instanceid").and_then(Value::as_str)?;

        Some(Self::new(table, instance))
    }
}

///
/// IndexUpdateEntry
///
/// One snapshot of the index-relevant fields of an object.
///

#[derive(Clone, Debug, PartialEq)]
pub struct IndexUpdateEntry {
    pub id: Uuid,
    pub values: Row,
}

impl IndexUpdateEntry {
    /// Write time of the entry in microseconds.
    #[must_use]
    pub fn micros(&self) -> i64 {
        timeuuid::unix_micros(&self.id).unwrap_or_default()
    }
}

///
/// IndexUpdateRow
///
/// Every change-log entry of one object, newest first.
///

#[derive(Clone, Debug)]
pub struct IndexUpdateRow {
    pub key: IndexUpdateRowKey,
    pub object: ObjectDefinition,
    pub entries: Vec<IndexUpdateEntry>,
}

impl IndexUpdateRow {
    #[must_use]
    pub fn newest(&self) -> Option<&IndexUpdateEntry> {
        self.entries.first()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object id, typed by the definition.
    pub fn instance_id(&self) -> Result<Value, InternalError> {
        Ok(Value::text(self.key.instance_id.as_str()).coerce(self.object.primary_key_type())?)
    }
}

impl ObjectMapper {
    // ------------------------------------------------------------------
    // Change log
    // ------------------------------------------------------------------

    /// Lowest time-based id still inside the consistency horizon.
    #[must_use]
    pub fn horizon_uuid(&self) -> Uuid {
        horizon_uuid_at(timeuuid::now_unix_nanos(), self.config().consistency_horizon())
    }

    /// Key of the next group holding an entry older than the horizon, in
    /// token order after `last`.
    pub async fn next_update_key(
        &self,
        last: Option<&IndexUpdateRowKey>,
    ) -> Result<Option<IndexUpdateRowKey>, InternalError> {
        let horizon = self.horizon_uuid();
        let statement = match last {
            Some(key) => self.generator.make_get_next_eligible_index_update(
                &key.table,
                &key.instance_id,
                horizon,
            ),
            None => self.generator.make_get_first_eligible_index_update(horizon),
        };

        let result = self.execute_one(&statement).await?;

        Ok(result.first().and_then(IndexUpdateRowKey::from_row))
    }

    /// Every entry of one group. Groups of tables no longer in the keyspace
    /// definition are reported as absent.
    pub async fn get_update_index_row(
        &self,
        key: &IndexUpdateRowKey,
    ) -> Result<Option<IndexUpdateRow>, InternalError> {
        let keyspace = self.keyspace_definition();
        let Some(object) = keyspace
            .definitions()
            .find(|def| static_table_name(def) == key.table)
            .cloned()
        else {
            tracing::warn!(table = %key.table, "change log references an unknown table");
            return Ok(None);
        };

        let rows = self
            .execute_one(
                &self
                    .generator
                    .make_get_row_index_update(&key.table, &key.instance_id),
            )
            .await?
            .into_rows();

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(id) = row.get("id").and_then(Value::as_uuid).copied() else {
                continue;
            };
            let document = row.get("indexvalues").and_then(Value::as_str).unwrap_or("{}");
            let json = serde_json::from_str(document).map_err(|err| {
                InternalError::serialize_corruption(format!(
                    "change log entry {id} for {}:{} is unreadable: {err}",
                    key.table, key.instance_id
                ))
            })?;

            entries.push(IndexUpdateEntry {
                id,
                values: row_from_json(&object, &json)?,
            });
        }
        entries.sort_by(|a, b| timeuuid::compare(&b.id, &a.id));

        Ok(Some(IndexUpdateRow {
            key: key.clone(),
            object,
            entries,
        }))
    }

    /// Next eligible group after `last`, with its entries.
    pub async fn get_next_update_index_row(
        &self,
        last: Option<&IndexUpdateRowKey>,
    ) -> Result<Option<IndexUpdateRow>, InternalError> {
        let mut cursor = last.cloned();

        while let Some(key) = self.next_update_key(cursor.as_ref()).await? {
            if let Some(row) = self.get_update_index_row(&key).await? {
                return Ok(Some(row));
            }
            cursor = Some(key);
        }

        Ok(None)
    }

    /// Remove the index row `values` placed for an object, shadowed by any
    /// write newer than `timestamp_micros`. Returns whether a delete was
    /// issued.
    pub async fn delete_obsolete_index(
        &self,
        row: &IndexUpdateRow,
        index: &Index,
        values: &Row,
        timestamp_micros: i64,
    ) -> Result<bool, InternalError> {
        let id = row.instance_id()?;
        let Some(statement) = self.generator.make_delete_by_index_with_timestamp(
            &row.object,
            index,
            &id,
            values,
            timestamp_micros,
        ) else {
            return Ok(false);
        };

        tracing::debug!(
            object = row.object.name(),
            index = %index.key(),
            id = %row.key.instance_id,
            "deleting obsolete index row"
        );
        self.execute_one(&statement).await?;

        Ok(true)
    }

    pub async fn delete_obsolete_update_entry(
        &self,
        key: &IndexUpdateRowKey,
        id: Uuid,
    ) -> Result<(), InternalError> {
        self.execute_one(
            &self
                .generator
                .make_delete_index_update(&key.table, &key.instance_id, id),
        )
        .await?;

        Ok(())
    }
}

fn horizon_uuid_at(now_nanos: i64, horizon: Duration) -> Uuid {
    let horizon = i64::try_from(horizon.as_nanos()).unwrap_or(i64::MAX);

    timeuuid::min_for_unix_nanos(now_nanos.saturating_sub(horizon))
}
