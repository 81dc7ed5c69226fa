use super::{
    CqlGenerator, Criteria, GenerateError, ListPlan, SortOrder, count_limit, list_limit,
    naming::{
        INDEX_UPDATES_TABLE, KEYSPACE_DEFINITIONS_TABLE, SHARD_INDEX_TABLE, index_table_name,
        static_table_name,
    },
};
use crate::{
    iterator::{BoundedStatementIterator, IdBound, ShardQuery, UnboundedStatementIterator},
    statement::Statement,
    value::{Row, Value, index_values_string},
};
use strata_schema::{
    definition::ObjectDefinition,
    index::Index,
    timeuuid::{self, max_for_unix_millis, min_for_unix_millis},
};
use uuid::Uuid;

impl CqlGenerator {
    // ------------------------------------------------------------------
    // Point reads
    // ------------------------------------------------------------------

    #[must_use]
    pub fn make_get(&self, def: &ObjectDefinition, id: &Value) -> Statement {
        let table = static_table_name(def);

        Statement::prepared(
            format!("SELECT * FROM {} WHERE id = ?;", self.qualified(&table)),
            vec![id.clone()],
        )
        .on_table(table)
    }

    // ------------------------------------------------------------------
    // List / count
    // ------------------------------------------------------------------

    /// Plan a list over the most selective index matching the criteria.
    pub fn make_list(
        &self,
        def: &ObjectDefinition,
        criteria: &Criteria,
    ) -> Result<ListPlan, GenerateError> {
        self.plan(def, criteria, false)
    }

    /// Plan a count. Without client filters each statement is a
    /// `count(*)`; with filters full rows are fetched and counted by the
    /// caller after filtering.
    pub fn make_count(
        &self,
        def: &ObjectDefinition,
        criteria: &Criteria,
    ) -> Result<ListPlan, GenerateError> {
        self.plan(def, criteria, true)
    }

    fn plan(
        &self,
        def: &ObjectDefinition,
        criteria: &Criteria,
        count: bool,
    ) -> Result<ListPlan, GenerateError> {
        if criteria.index_values.is_empty() {
            return self.plan_by_id(def, criteria, count);
        }

        let index = def
            .most_selective_matching_index(criteria.index_values.keys().map(String::as_str))
            .ok_or_else(|| GenerateError::NoMatchingIndex {
                object: def.name().to_string(),
            })?;

        // key values in key order, then the surplus as client filters
        let mut key_values = Vec::with_capacity(index.fields().len());
        for field in index.fields() {
            let value = criteria
                .index_values
                .get(field)
                .cloned()
                .unwrap_or(Value::Null);
            let value = self.coerce_field(def, field, value)?;
            if value.is_null() {
                return Err(GenerateError::InvalidIndexValue {
                    field: field.clone(),
                });
            }
            key_values.push(value);
        }

        let mut filters = Row::new();
        for (field, value) in &criteria.index_values {
            if !index.contains(field) {
                filters.insert(field.clone(), self.coerce_field(def, field, value.clone())?);
            }
        }

        let has_filters = !filters.is_empty();
        // filtered counts fetch rows, so they page like a filtered list
        let limit = if count && !has_filters {
            count_limit(criteria.limit)
        } else {
            list_limit(criteria.limit, has_filters)
        };

        let start = self.start_bound(def, criteria)?;
        let end = self.end_bound(def, criteria)?;

        let start_nanos = start.as_ref().and_then(IdBound::unix_nanos);
        let end_nanos = end
            .as_ref()
            .map_or_else(|| Some(timeuuid::now_unix_nanos()), IdBound::unix_nanos);

        let table = index_table_name(def, index);
        let query = ShardQuery::new(
            self.qualified(&table),
            index.fields().to_vec(),
            key_values.clone(),
        )
        .on_table(table.clone())
        .with_bounds(start, end)
        .with_order(criteria.order)
        .with_limit(limit)
        .with_count(count && !has_filters)
        .with_client_filters(filters);

        let strategy = index.sharding();
        if !strategy.is_sharded() {
            return Ok(ListPlan::Ranged(UnboundedStatementIterator::new(
                query,
                1..=1,
                self.statement_limit,
            )));
        }

        match (start_nanos, end_nanos) {
            (Some(start), Some(end)) => {
                if start > end {
                    return Ok(ListPlan::Bounded(BoundedStatementIterator::empty()));
                }

                // the walk enforces the statement ceiling as it advances
                Ok(ListPlan::Ranged(UnboundedStatementIterator::new(
                    query,
                    strategy.shard_range(start, end),
                    self.statement_limit,
                )))
            }
            (start, end) => {
                let locator = self.make_shard_list(
                    def,
                    index,
                    &key_values,
                    start.map(|ns| strategy.shard_of_nanos(ns)),
                    end.map(|ns| strategy.shard_of_nanos(ns)),
                    criteria.order,
                );

                Ok(ListPlan::Located { locator, query })
            }
        }
    }

    // id-keyed fallback when no index values are supplied
    fn plan_by_id(
        &self,
        def: &ObjectDefinition,
        criteria: &Criteria,
        count: bool,
    ) -> Result<ListPlan, GenerateError> {
        let Some(id) = criteria.start_id.clone().or_else(|| criteria.end_id.clone()) else {
            return Err(GenerateError::NoMatchingIndex {
                object: def.name().to_string(),
            });
        };
        let id = self.coerce_id(def, id)?;

        let statement = if count {
            let table = static_table_name(def);
            Statement::prepared(
                format!("SELECT count(*) FROM {} WHERE id = ?;", self.qualified(&table)),
                vec![id],
            )
            .on_table(table)
        } else {
            self.make_get(def, &id)
        };

        Ok(ListPlan::Bounded(
            BoundedStatementIterator::new(vec![statement]).with_limit(1),
        ))
    }

    fn start_bound(
        &self,
        def: &ObjectDefinition,
        criteria: &Criteria,
    ) -> Result<Option<IdBound>, GenerateError> {
        if let Some(id) = &criteria.start_id {
            return Ok(Some(IdBound::new(
                self.coerce_id(def, id.clone())?,
                criteria.inclusive,
            )));
        }

        Ok(criteria
            .start_timestamp
            .map(|ms| IdBound::new(Value::Timeuuid(min_for_unix_millis(ms)), true)))
    }

    fn end_bound(
        &self,
        def: &ObjectDefinition,
        criteria: &Criteria,
    ) -> Result<Option<IdBound>, GenerateError> {
        if let Some(id) = &criteria.end_id {
            return Ok(Some(IdBound::new(
                self.coerce_id(def, id.clone())?,
                criteria.inclusive,
            )));
        }

        Ok(criteria
            .end_timestamp
            .map(|ms| IdBound::new(Value::Timeuuid(max_for_unix_millis(ms)), true)))
    }

    fn coerce_field(
        &self,
        def: &ObjectDefinition,
        field: &str,
        value: Value,
    ) -> Result<Value, GenerateError> {
        let field_type = def
            .field(field)
            .map(|f| f.field_type)
            .ok_or_else(|| GenerateError::UnknownField {
                object: def.name().to_string(),
                field: field.to_string(),
            })?;

        Ok(value.coerce(field_type)?)
    }

    // ------------------------------------------------------------------
    // Shard locator
    // ------------------------------------------------------------------

    /// Shard ids recorded for one index value combination, in query order.
    #[must_use]
    pub fn make_shard_list(
        &self,
        def: &ObjectDefinition,
        index: &Index,
        key_values: &[Value],
        start_shard: Option<i64>,
        end_shard: Option<i64>,
        order: SortOrder,
    ) -> Statement {
        let mut query = format!(
            "SELECT shardid FROM {} WHERE tablename = ? AND indexvalues = ?",
            self.qualified(SHARD_INDEX_TABLE)
        );
        let mut values = vec![
            Value::text(index_table_name(def, index)),
            Value::text(index_values_string(key_values)),
        ];

        if let Some(start) = start_shard {
            query.push_str(" AND shardid >= ?");
            values.push(Value::BigInt(start));
        }
        if let Some(end) = end_shard {
            query.push_str(" AND shardid <= ?");
            values.push(Value::BigInt(end));
        }
        query.push_str(&format!(" ORDER BY shardid {} ALLOW FILTERING;", order.keyword()));

        Statement::prepared(query, values).on_table(SHARD_INDEX_TABLE)
    }

    // ------------------------------------------------------------------
    // Change log
    // ------------------------------------------------------------------

    /// First change-log group holding an entry older than the horizon.
    #[must_use]
    pub fn make_get_first_eligible_index_update(&self, horizon: Uuid) -> Statement {
        Statement::prepared(
            format!(
                "SELECT statictablename, instanceid FROM {} WHERE id < ? LIMIT 1 ALLOW FILTERING;",
                self.qualified(INDEX_UPDATES_TABLE)
            ),
            vec![Value::Timeuuid(horizon)],
        )
        .on_table(INDEX_UPDATES_TABLE)
    }

    /// Next eligible group after `(table, instance)` in token order.
    #[must_use]
    pub fn make_get_next_eligible_index_update(
        &self,
        table: &str,
        instance: &str,
        horizon: Uuid,
    ) -> Statement {
        Statement::prepared(
            format!(
                "SELECT statictablename, instanceid FROM {} WHERE token(statictablename, instanceid) > token(?, ?) AND id < ? LIMIT 1 ALLOW FILTERING;",
                self.qualified(INDEX_UPDATES_TABLE)
            ),
            vec![
                Value::text(table),
                Value::text(instance),
                Value::Timeuuid(horizon),
            ],
        )
        .on_table(INDEX_UPDATES_TABLE)
    }

    /// Every entry of one group, newest first.
    #[must_use]
    pub fn make_get_row_index_update(&self, table: &str, instance: &str) -> Statement {
        Statement::prepared(
            format!(
                "SELECT * FROM {} WHERE statictablename = ? AND instanceid = ? ORDER BY id DESC;",
                self.qualified(INDEX_UPDATES_TABLE)
            ),
            vec![Value::text(table), Value::text(instance)],
        )
        .on_table(INDEX_UPDATES_TABLE)
    }

    #[must_use]
    pub fn make_delete_index_update(&self, table: &str, instance: &str, id: Uuid) -> Statement {
        Statement::prepared(
            format!(
                "DELETE FROM {} WHERE statictablename = ? AND instanceid = ? AND id = ?;",
                self.qualified(INDEX_UPDATES_TABLE)
            ),
            vec![
                Value::text(table),
                Value::text(instance),
                Value::Timeuuid(id),
            ],
        )
        .on_table(INDEX_UPDATES_TABLE)
    }

    // ------------------------------------------------------------------
    // Keyspace definitions
    // ------------------------------------------------------------------

    #[must_use]
    pub fn make_insert_keyspace_definition(&self, name: &str, document: &str) -> Statement {
        Statement::prepared(
            format!(
                "INSERT INTO {} (id, name, def) VALUES (?, ?, ?);",
                self.qualified(KEYSPACE_DEFINITIONS_TABLE)
            ),
            vec![
                Value::Uuid(timeuuid::generate()),
                Value::text(name),
                Value::text(document),
            ],
        )
        .on_table(KEYSPACE_DEFINITIONS_TABLE)
    }

    /// Latest stored definition document for a keyspace.
    #[must_use]
    pub fn make_get_keyspace_definition(&self, name: &str) -> Statement {
        Statement::prepared(
            format!(
                "SELECT def FROM {} WHERE name = ? ORDER BY id DESC LIMIT 1;",
                self.qualified(KEYSPACE_DEFINITIONS_TABLE)
            ),
            vec![Value::text(name)],
        )
        .on_table(KEYSPACE_DEFINITIONS_TABLE)
    }

    // ------------------------------------------------------------------
    // Table scan
    // ------------------------------------------------------------------

    /// One page of a static-table scan over `[min_token, max_token]`,
    /// optionally resuming after the token of `resume_after`.
    #[must_use]
    pub fn make_table_scan(
        &self,
        def: &ObjectDefinition,
        min_token: i64,
        max_token: i64,
        limit: i64,
        resume_after: Option<&Value>,
    ) -> Statement {
        let table = static_table_name(def);

        let statement = match resume_after {
            Some(id) => Statement::prepared(
                format!(
                    "SELECT * FROM {} WHERE token(id) > token(?) AND token(id) <= ? LIMIT {limit};",
                    self.qualified(&table)
                ),
                vec![id.clone(), Value::BigInt(max_token)],
            ),
            None => Statement::prepared(
                format!(
                    "SELECT * FROM {} WHERE token(id) >= ? AND token(id) <= ? LIMIT {limit};",
                    self.qualified(&table)
                ),
                vec![Value::BigInt(min_token), Value::BigInt(max_token)],
            ),
        };

        statement.on_table(table)
    }
}
