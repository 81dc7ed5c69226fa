use super::{ShardQuery, ShardSource, ShardWalk, StatementIterator};
use crate::{
    generator::GenerateError,
    statement::Statement,
    value::{Row, Value},
};
use std::collections::VecDeque;

///
/// LazyBoundedStatementIterator
///
/// Walks the shard ids recorded in the shard locator. The locator is read
/// first and already returns shards in query order.
///

#[derive(Debug)]
pub struct LazyBoundedStatementIterator {
    walk: ShardWalk<ShardList>,
}

impl LazyBoundedStatementIterator {
    #[must_use]
    pub fn new(query: ShardQuery, shards: Vec<i64>, statement_limit: usize) -> Self {
        let source = ShardList {
            shards: shards.into(),
        };

        Self {
            walk: ShardWalk::new(source, query, statement_limit),
        }
    }

    #[must_use]
    pub fn remaining_shards(&self) -> usize {
        self.walk.source.shards.len()
    }
}

impl StatementIterator for LazyBoundedStatementIterator {
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
        true
    }
}

///
/// ShardList
///

#[derive(Debug)]
struct ShardList {
    shards: VecDeque<i64>,
}

impl ShardSource for ShardList {
    fn next_shard(&mut self) -> Option<i64> {
        self.shards.pop_front()
    }

    fn is_exhausted(&self) -> bool {
        self.shards.is_empty()
    }
}
