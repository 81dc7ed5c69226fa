use super::{
    CqlGenerator, GenerateError,
    naming::{INDEX_UPDATES_TABLE, SHARD_INDEX_TABLE, index_table_name, static_table_name},
};
use crate::{
    statement::Statement,
    value::{Row, Value, index_values_string, row_to_json},
};
use strata_schema::{
    ID_FIELD, SHARD_ID_FIELD, definition::ObjectDefinition, index::Index, timeuuid,
};

impl CqlGenerator {
    // ------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------

    /// Static row, one row per populated index (plus a locator row when the
    /// index is sharded), then the change-log entry.
    ///
    /// `values` must already be coerced and must not contain `id`.
    pub fn make_insert(
        &self,
        def: &ObjectDefinition,
        id: &Value,
        values: &Row,
        ttl: Option<u32>,
    ) -> Result<Vec<Statement>, GenerateError> {
        let missing = missing_required_fields(def, values);
        if !missing.is_empty() && !def.allow_null_primary_key_inserts() {
            return Err(GenerateError::MissingRequiredFields {
                object: def.name().to_string(),
                fields: missing,
            });
        }

        let mut statements = vec![self.insert_row(&static_table_name(def), id, None, values, ttl)];

        for index in def.indexes() {
            if !is_populated(index, values) {
                continue;
            }
            statements.extend(self.index_insert(def, index, id, values, ttl, true));
        }

        if def.has_indexes() {
            statements.push(self.make_index_update(def, id, values));
        }

        Ok(statements)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Rewrite an existing object.
    ///
    /// Indexes whose key fields appear in `new_values` are affected: their
    /// old row is deleted when the key actually changed and was populated,
    /// and the new row is written from the merged object with a locator.
    /// Unaffected indexes are refreshed from the new values plus the index
    /// fields of the old row. The static row receives only the changed
    /// fields.
    pub fn make_update(
        &self,
        def: &ObjectDefinition,
        id: &Value,
        old_row: &Row,
        new_values: &Row,
    ) -> Result<Vec<Statement>, GenerateError> {
        let mut complete = old_row.clone();
        complete.remove(ID_FIELD);
        complete.remove(SHARD_ID_FIELD);
        complete.extend(new_values.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut statements = Vec::new();

        for index in def.indexes() {
            let affected = index.fields().iter().any(|f| new_values.contains_key(f));

            if affected {
                let old_key = key_values(index, old_row);
                let new_key = key_values(index, &complete);

                if old_key != new_key && is_populated(index, old_row) {
                    statements.push(self.index_delete(def, index, id, old_row));
                }
                if is_populated(index, &complete) {
                    statements.extend(self.index_insert(def, index, id, &complete, None, true));
                }
            } else {
                let mut refreshed = new_values.clone();
                for field in def.required_fields() {
                    if let Some(value) = complete.get(field) {
                        refreshed.insert(field.to_string(), value.clone());
                    }
                }
                if is_populated(index, &refreshed) {
                    statements.extend(self.index_insert(def, index, id, &refreshed, None, false));
                }
            }
        }

        if !new_values.is_empty() {
            statements.push(self.insert_row(&static_table_name(def), id, None, new_values, None));
        }

        if def.has_indexes() {
            statements.push(self.make_index_update(def, id, &complete));
        }

        Ok(statements)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Static row plus every index row whose key is populated in `row`.
    #[must_use]
    pub fn make_delete(&self, def: &ObjectDefinition, id: &Value, row: &Row) -> Vec<Statement> {
        let table = static_table_name(def);
        let mut statements = vec![
            Statement::prepared(
                format!("DELETE FROM {} WHERE id = ?;", self.qualified(&table)),
                vec![id.clone()],
            )
            .on_table(table),
        ];

        statements.extend(
            def.indexes()
                .filter(|index| is_populated(index, row))
                .map(|index| self.index_delete(def, index, id, row)),
        );

        statements
    }

    /// Literal delete of one index row, shadowing writes older than
    /// `timestamp_micros`. `None` when the row's key is not fully populated.
    #[must_use]
    pub fn make_delete_by_index_with_timestamp(
        &self,
        def: &ObjectDefinition,
        index: &Index,
        id: &Value,
        values: &Row,
        timestamp_micros: i64,
    ) -> Option<Statement> {
        if !is_populated(index, values) {
            return None;
        }

        let table = index_table_name(def, index);
        let shard = id.shard_id(index.sharding());

        let mut predicates = vec![
            format!("id = {}", id.to_cql_literal()),
            format!("{SHARD_ID_FIELD} = {shard}"),
        ];
        for field in index.fields() {
            let value = values.get(field)?;
            predicates.push(format!("{field} = {}", value.to_cql_literal()));
        }

        Some(
            Statement::raw(format!(
                "DELETE FROM {} USING TIMESTAMP {timestamp_micros} WHERE {};",
                self.qualified(&table),
                predicates.join(" AND ")
            ))
            .on_table(table),
        )
    }

    // ------------------------------------------------------------------
    // Change log
    // ------------------------------------------------------------------

    /// Change-log entry holding the index-relevant snapshot of an object.
    #[must_use]
    pub fn make_index_update(&self, def: &ObjectDefinition, id: &Value, row: &Row) -> Statement {
        let snapshot: Row = def
            .required_fields()
            .into_iter()
            .filter_map(|field| row.get(field).map(|v| (field.to_string(), v.clone())))
            .collect();

        Statement::prepared(
            format!(
                "INSERT INTO {} (id, statictablename, instanceid, indexvalues) VALUES (?, ?, ?, ?);",
                self.qualified(INDEX_UPDATES_TABLE)
            ),
            vec![
                Value::Timeuuid(timeuuid::generate()),
                Value::text(static_table_name(def)),
                Value::text(id.to_index_string()),
                Value::text(row_to_json(&snapshot).to_string()),
            ],
        )
        .on_table(INDEX_UPDATES_TABLE)
    }

    // ------------------------------------------------------------------
    // Row helpers
    // ------------------------------------------------------------------

    fn insert_row(
        &self,
        table: &str,
        id: &Value,
        shard: Option<i64>,
        values: &Row,
        ttl: Option<u32>,
    ) -> Statement {
        let mut columns = vec![ID_FIELD.to_string()];
        let mut bound = vec![id.clone()];

        if let Some(shard) = shard {
            columns.push(SHARD_ID_FIELD.to_string());
            bound.push(Value::BigInt(shard));
        }
        for (name, value) in values {
            if name == ID_FIELD || name == SHARD_ID_FIELD {
                continue;
            }
            columns.push(name.clone());
            bound.push(value.clone());
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let using = ttl.map(|ttl| format!(" USING TTL {ttl}")).unwrap_or_default();

        Statement::prepared(
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders}){using};",
                self.qualified(table),
                columns.join(", ")
            ),
            bound,
        )
        .on_table(table)
    }

    fn index_insert(
        &self,
        def: &ObjectDefinition,
        index: &Index,
        id: &Value,
        values: &Row,
        ttl: Option<u32>,
        with_locator: bool,
    ) -> Vec<Statement> {
        let table = index_table_name(def, index);
        let shard = id.shard_id(index.sharding());

        let mut statements = vec![self.insert_row(&table, id, Some(shard), values, ttl)];

        if with_locator && index.sharding().is_sharded() {
            let index_values = index_values_string(key_values(index, values).into_iter().flatten());

            statements.push(
                Statement::prepared(
                    format!(
                        "INSERT INTO {} (tablename, indexvalues, shardid, targetrowkey) VALUES (?, ?, ?, ?);",
                        self.qualified(SHARD_INDEX_TABLE)
                    ),
                    vec![
                        Value::text(table),
                        Value::text(index_values.clone()),
                        Value::BigInt(shard),
                        Value::text(format!("{shard}:{index_values}")),
                    ],
                )
                .on_table(SHARD_INDEX_TABLE),
            );
        }

        statements
    }

    fn index_delete(
        &self,
        def: &ObjectDefinition,
        index: &Index,
        id: &Value,
        row: &Row,
    ) -> Statement {
        let table = index_table_name(def, index);

        let mut predicates = vec!["id = ?".to_string(), format!("{SHARD_ID_FIELD} = ?")];
        let mut bound = vec![id.clone(), Value::BigInt(id.shard_id(index.sharding()))];
        for field in index.fields() {
            predicates.push(format!("{field} = ?"));
            bound.push(row.get(field).cloned().unwrap_or(Value::Null));
        }

        Statement::prepared(
            format!(
                "DELETE FROM {} WHERE {};",
                self.qualified(&table),
                predicates.join(" AND ")
            ),
            bound,
        )
        .on_table(table)
    }
}

/// Key values of an index in key order; `None` for absent or null fields.
pub(crate) fn key_values<'a>(index: &Index, row: &'a Row) -> Vec<Option<&'a Value>> {
    index
        .fields()
        .iter()
        .map(|field| row.get(field).filter(|v| !v.is_null()))
        .collect()
}

/// Whether every key field of the index has a non-null value.
pub(crate) fn is_populated(index: &Index, row: &Row) -> bool {
    key_values(index, row).iter().all(Option::is_some)
}

fn missing_required_fields(def: &ObjectDefinition, values: &Row) -> Vec<String> {
    def.required_fields()
        .into_iter()
        .filter(|field| values.get(*field).is_none_or(Value::is_null))
        .map(str::to_string)
        .collect()
}
