//! Statement generator.
//!
//! Pure translation from (definition, operation, parameters) to
//! [`Statement`]s. Nothing here touches the store; the mapper executes what
//! the generator emits. Every template qualifies tables with the
//! double-quoted keyspace.

mod criteria;
mod mutation;
mod naming;
mod query;
mod schema;

#[cfg(test)]
mod tests;

pub use criteria::{Criteria, SortOrder};
pub use naming::{
    INDEX_UPDATES_TABLE, KEYSPACE_DEFINITIONS_TABLE, SHARD_INDEX_TABLE, index_table_name,
    static_table_name,
};
pub use schema::{CompactionStrategy, DEFAULT_MIN_THRESHOLD, DEFAULT_SSTABLE_SIZE_MB};

pub(crate) use mutation::key_values;

use crate::{
    CQL_LIMIT_MAX, DEFAULT_LIMIT, STATEMENT_LIMIT,
    iterator::{BoundedStatementIterator, ShardQuery, UnboundedStatementIterator},
    statement::Statement,
    value::{Row, Value, ValueError},
};
use strata_schema::{ID_FIELD, definition::ObjectDefinition, types::FieldType};
use thiserror::Error as ThisError;

///
/// GenerateError
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum GenerateError {
    #[error("query would issue more than {limit} statements ({needed} required)")]
    FanOutExceeded { limit: usize, needed: usize },

    #[error("object '{object}' cannot generate an id of type {field_type}")]
    InvalidId {
        object: String,
        field_type: FieldType,
    },

    #[error("index value for field '{field}' must not be null")]
    InvalidIndexValue { field: String },

    #[error("object '{object}' is missing required index fields: {}", fields.join(", "))]
    MissingRequiredFields { object: String, fields: Vec<String> },

    #[error("no index on '{object}' matches the supplied criteria")]
    NoMatchingIndex { object: String },

    #[error("object '{object}' has no field '{field}'")]
    UnknownField { object: String, field: String },

    #[error("unknown object type '{0}'")]
    UnknownObject(String),

    #[error(transparent)]
    Value(#[from] ValueError),
}

///
/// ListPlan
///
/// How a list or count request reaches its rows. `Located` needs the shard
/// locator executed first; its shard ids then drive a lazy iterator.
///

#[derive(Debug)]
pub enum ListPlan {
    Bounded(BoundedStatementIterator),
    Located { locator: Statement, query: ShardQuery },
    Ranged(UnboundedStatementIterator),
}

///
/// CqlGenerator
///

#[derive(Clone, Debug)]
pub struct CqlGenerator {
    keyspace: String,
    statement_limit: usize,
}

impl CqlGenerator {
    #[must_use]
    pub fn new(keyspace: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            statement_limit: STATEMENT_LIMIT,
        }
    }

    #[must_use]
    pub const fn with_statement_limit(mut self, limit: usize) -> Self {
        self.statement_limit = limit;
        self
    }

    #[must_use]
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    #[must_use]
    pub const fn statement_limit(&self) -> usize {
        self.statement_limit
    }

    /// Keyspace-qualified, quoted table reference.
    #[must_use]
    pub fn qualified(&self, table: &str) -> String {
        format!("\"{}\".\"{}\"", self.keyspace, table)
    }

    // ------------------------------------------------------------------
    // Row preparation
    // ------------------------------------------------------------------

    /// Coerce every value of a caller row to its declared field type.
    pub fn coerce_row(&self, def: &ObjectDefinition, row: Row) -> Result<Row, GenerateError> {
        row.into_iter()
            .map(|(name, value)| {
                let field = def
                    .field(&name)
                    .ok_or_else(|| GenerateError::UnknownField {
                        object: def.name().to_string(),
                        field: name.clone(),
                    })?;

                Ok((name, value.coerce(field.field_type)?))
            })
            .collect()
    }

    /// Coerce a caller-supplied id to the definition's primary key type.
    pub fn coerce_id(&self, def: &ObjectDefinition, id: Value) -> Result<Value, GenerateError> {
        let id = id.coerce(def.primary_key_type())?;
        if id.is_null() {
            return Err(GenerateError::InvalidIndexValue {
                field: ID_FIELD.to_string(),
            });
        }

        Ok(id)
    }
}

///
/// list_limit
///
/// Effective per-query limit. Client-side filters over-fetch so enough rows
/// survive filtering; everything else is clamped to what the store accepts.
///

#[must_use]
pub fn list_limit(requested: Option<i64>, has_filters: bool) -> i64 {
    let requested = requested.unwrap_or(DEFAULT_LIMIT);

    if has_filters {
        return requested
            .saturating_mul(2)
            .max(DEFAULT_LIMIT)
            .min(CQL_LIMIT_MAX);
    }

    if requested <= 0 {
        DEFAULT_LIMIT
    } else {
        requested.clamp(1, CQL_LIMIT_MAX)
    }
}

/// Upper bound on rows counted by one count request.
#[must_use]
pub fn count_limit(requested: Option<i64>) -> i64 {
    match requested {
        Some(limit) if limit > 0 => limit.min(CQL_LIMIT_MAX),
        _ => CQL_LIMIT_MAX,
    }
}
