//! Statement iteration and pagination.
//!
//! A logical read becomes a stream of statements, one or more per shard.
//! Iterators hand out statements lazily so the caller can stop as soon as
//! the limit is met, and they page within a shard by resuming after the
//! last id seen.

mod bounded;
mod lazy;
mod paged;
mod unbounded;


pub use bounded::BoundedStatementIterator;
pub use lazy::LazyBoundedStatementIterator;
pub use paged::{PAGE_SIZE, PagedRows};
pub use unbounded::UnboundedStatementIterator;

use crate::{
    generator::{GenerateError, SortOrder},
    statement::Statement,
    value::{Row, SortKey, Value},
};
use std::cmp::Ordering;
use strata_schema::{SHARD_ID_FIELD, timeuuid};

///
/// StatementIterator
///

pub trait StatementIterator: Send {
    fn has_next(&self) -> bool;

    /// Next statement at the iterator's own limit.
    fn next_statement(&mut self) -> Result<Option<Statement>, GenerateError> {
        let limit = self.limit();
        self.next_with_page_limit(limit)
    }

    /// Next statement with a per-page LIMIT, used when re-fetching within a
    /// shard for the rows still owed to the caller.
    fn next_with_page_limit(&mut self, page_limit: i64)
    -> Result<Option<Statement>, GenerateError>;

    /// Report the page returned for the last statement. A full page keeps
    /// the iterator in the same shard, resuming after `last_id`; a short
    /// page moves it on. Skipping this call counts as a short page.
    fn record_page(&mut self, _fetched: usize, _last_id: Option<Value>) {}

    fn client_filters(&self) -> Option<&Row> {
        None
    }

    fn limit(&self) -> i64;

    fn is_bounded(&self) -> bool;
}

///
/// IdBound
///
/// One end of an id window on the clustering column.
///

#[derive(Clone, Debug, PartialEq)]
pub struct IdBound {
    pub id: Value,
    pub inclusive: bool,
}

impl IdBound {
    #[must_use]
    pub const fn new(id: Value, inclusive: bool) -> Self {
        Self { id, inclusive }
    }

    /// Embedded time of a time-based id bound.
    #[must_use]
    pub fn unix_nanos(&self) -> Option<i64> {
        self.id.as_uuid().and_then(timeuuid::unix_nanos)
    }

    const fn lower_op(&self) -> &'static str {
        if self.inclusive { ">=" } else { ">" }
    }

    const fn upper_op(&self) -> &'static str {
        if self.inclusive { "<=" } else { "<" }
    }
}

///
/// ShardQuery
///
/// Template for one wide-table read, rendered once per shard. Binding
/// order is shard, key values, then bounds.
///

#[derive(Clone, Debug)]
pub struct ShardQuery {
    qualified_table: String,
    table: Option<String>,
    key_fields: Vec<String>,
    key_values: Vec<Value>,
    start: Option<IdBound>,
    end: Option<IdBound>,
    order: SortOrder,
    limit: i64,
    count: bool,
    client_filters: Row,
}

impl ShardQuery {
    #[must_use]
    pub fn new(
        qualified_table: impl Into<String>,
        key_fields: Vec<String>,
        key_values: Vec<Value>,
    ) -> Self {
        Self {
            qualified_table: qualified_table.into(),
            table: None,
            key_fields,
            key_values,
            start: None,
            end: None,
            order: SortOrder::default(),
            limit: crate::DEFAULT_LIMIT,
            count: false,
            client_filters: Row::new(),
        }
    }

    #[must_use]
    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn with_bounds(mut self, start: Option<IdBound>, end: Option<IdBound>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    #[must_use]
    pub const fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub const fn with_count(mut self, count: bool) -> Self {
        self.count = count;
        self
    }

    #[must_use]
    pub fn with_client_filters(mut self, filters: Row) -> Self {
        self.client_filters = filters;
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn order(&self) -> SortOrder {
        self.order
    }

    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.limit
    }

    #[must_use]
    pub const fn is_count(&self) -> bool {
        self.count
    }

    #[must_use]
    pub fn client_filters(&self) -> Option<&Row> {
        (!self.client_filters.is_empty()).then_some(&self.client_filters)
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Render for one shard. A resume id replaces the bound on the side the
    /// scan is moving away from, exclusively.
    #[must_use]
    pub fn render(&self, shard: i64, resume_after: Option<&Value>, page_limit: i64) -> Statement {
        let mut start = self.start.clone();
        let mut end = self.end.clone();
        if let Some(resume) = resume_after {
            let bound = Some(IdBound::new(resume.clone(), false));
            if self.order.is_ascending() {
                start = bound;
            } else {
                end = bound;
            }
        }

        let mut predicates = vec![format!("{SHARD_ID_FIELD} = ?")];
        let mut values = vec![Value::BigInt(shard)];
        for (field, value) in self.key_fields.iter().zip(&self.key_values) {
            predicates.push(format!("{field} = ?"));
            values.push(value.clone());
        }
        if let Some(bound) = start {
            predicates.push(format!("id {} ?", bound.lower_op()));
            values.push(bound.id);
        }
        if let Some(bound) = end {
            predicates.push(format!("id {} ?", bound.upper_op()));
            values.push(bound.id);
        }

        let projection = if self.count { "count(*)" } else { "*" };
        let query = format!(
            "SELECT {projection} FROM {} WHERE {} ORDER BY id {} LIMIT {} ALLOW FILTERING;",
            self.qualified_table,
            predicates.join(" AND "),
            self.order.keyword(),
            page_limit.clamp(1, crate::CQL_LIMIT_MAX),
        );

        let statement = Statement::prepared(query, values);
        match &self.table {
            Some(table) => statement.on_table(table.clone()),
            None => statement,
        }
    }
}

///
/// ShardSource
///
/// Where a shard walk takes its next shard id from.
///

trait ShardSource: Send {
    fn next_shard(&mut self) -> Option<i64>;

    fn is_exhausted(&self) -> bool;
}

///
/// ShardWalk
///
/// Paging state shared by the shard-driven iterators.
///

#[derive(Debug)]
struct ShardWalk<S> {
    source: S,
    query: ShardQuery,
    current: Option<i64>,
    resume_after: Option<Value>,
    stay: bool,
    last_page_limit: i64,
    issued: usize,
    statement_limit: usize,
}

impl<S: ShardSource> ShardWalk<S> {
    fn new(source: S, query: ShardQuery, statement_limit: usize) -> Self {
        let last_page_limit = query.limit();

        Self {
            source,
            query,
            current: None,
            resume_after: None,
            stay: false,
            last_page_limit,
            issued: 0,
            statement_limit,
        }
    }

    fn has_next(&self) -> bool {
        (self.stay && self.current.is_some()) || !self.source.is_exhausted()
    }

    fn next(&mut self, page_limit: i64) -> Result<Option<Statement>, GenerateError> {
        if !(self.stay && self.current.is_some()) {
            self.current = self.source.next_shard();
            self.resume_after = None;
        }
        self.stay = false;

        let Some(shard) = self.current else {
            return Ok(None);
        };

        if self.issued >= self.statement_limit {
            return Err(GenerateError::FanOutExceeded {
                limit: self.statement_limit,
                needed: self.issued + 1,
            });
        }
        self.issued += 1;
        self.last_page_limit = page_limit;

        Ok(Some(self.query.render(
            shard,
            self.resume_after.as_ref(),
            page_limit,
        )))
    }

    fn record_page(&mut self, fetched: usize, last_id: Option<Value>) {
        let full = i64::try_from(fetched).unwrap_or(i64::MAX) >= self.last_page_limit;

        match last_id {
            Some(id) if full && !self.query.is_count() => {
                self.resume_after = Some(id);
                self.stay = true;
            }
            _ => self.stay = false,
        }
    }
}

// ======================================================================
// Client filters
// ======================================================================

/// Whether a row satisfies every client-side equality filter.
#[must_use]
pub fn matches_filters(row: &Row, filters: Option<&Row>) -> bool {
    filters.is_none_or(|filters| {
        filters.iter().all(|(field, expected)| {
            row.get(field).is_some_and(|actual| {
                SortKey::compare(actual, expected) == Ordering::Equal
            })
        })
    })
}

/// Drop the wide-table shard column from a fetched row.
#[must_use]
pub fn strip_shard(mut row: Row) -> Row {
    row.remove(SHARD_ID_FIELD);
    row
}
