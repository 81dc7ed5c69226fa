use super::{ShardQuery, ShardSource, ShardWalk, StatementIterator};
use crate::{
    generator::GenerateError,
    statement::Statement,
    value::{Row, Value},
};
use std::ops::RangeInclusive;

///
/// UnboundedStatementIterator
///
/// Walks an analytically derived range of shard ids, one shard at a time,
/// in the query's order. The range is known without touching the store.
///

#[derive(Debug)]
pub struct UnboundedStatementIterator {
    walk: ShardWalk<ShardRange>,
}

impl UnboundedStatementIterator {
    #[must_use]
    pub fn new(query: ShardQuery, shards: RangeInclusive<i64>, statement_limit: usize) -> Self {
        let source = ShardRange {
            shards,
            ascending: query.order().is_ascending(),
        };

        Self {
            walk: ShardWalk::new(source, query, statement_limit),
        }
    }

    #[must_use]
    pub const fn query(&self) -> &ShardQuery {
        &self.walk.query
    }
}

impl StatementIterator for UnboundedStatementIterator {
    fn has_next(&self) -> bool {
        self.walk.has_next()
    }

    fn next_with_page_limit(
        &mut self,
        page_limit: i64,
    ) -> Result<Option<Statement>, GenerateError> {
        self.walk.next(page_limit)
    }

    fn record_page(&mut self, fetched: usize, last_id: Option<Value>) {
        self.walk.record_page(fetched, last_id);
    }

    fn client_filters(&self) -> Option<&Row> {
        self.walk.query.client_filters()
    }

    fn limit(&self) -> i64 {
        self.walk.query.limit()
    }

    fn is_bounded(&self) -> bool {
        false
    }
}

///
/// ShardRange
///

#[derive(Debug)]
struct ShardRange {
    shards: RangeInclusive<i64>,
    ascending: bool,
}

impl ShardSource for ShardRange {
    fn next_shard(&mut self) -> Option<i64> {
        if self.ascending {
            self.shards.next()
        } else {
            self.shards.next_back()
        }
    }

    fn is_exhausted(&self) -> bool {
        self.shards.is_empty()
    }
}
