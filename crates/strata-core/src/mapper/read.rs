use super::ObjectMapper;
use crate::{
    DEFAULT_LIMIT,
    error::InternalError,
    generator::{Criteria, ListPlan},
    iterator::{
        LazyBoundedStatementIterator, PagedRows, StatementIterator, matches_filters, strip_shard,
    },
    value::{Row, Value},
};
use std::sync::Arc;
use strata_schema::{ID_FIELD, SHARD_ID_FIELD};

///
/// ObjectVisitor
///
/// Receives every object of a full-table visit.
///

pub trait ObjectVisitor: Send {
    fn should_include(&self, _row: &Row) -> bool {
        true
    }

    fn visit(&mut self, row: Row);
}

impl<F> ObjectVisitor for F
where
    F: FnMut(Row) + Send,
{
    fn visit(&mut self, row: Row) {
        self(row);
    }
}

impl ObjectMapper {
    // ------------------------------------------------------------------
    // Point reads
    // ------------------------------------------------------------------

    pub async fn get_by_key(
        &self,
        object: &str,
        id: impl Into<Value>,
    ) -> Result<Option<Row>, InternalError> {
        let def = self.definition(object)?;
        let id = self.generator.coerce_id(&def, id.into())?;

        let result = self.execute_one(&self.generator.make_get(&def, &id)).await?;

        Ok(result.into_rows().into_iter().next())
    }

    // ------------------------------------------------------------------
    // List / count
    // ------------------------------------------------------------------

    /// Objects matching the criteria, in id order across shards. Client
    /// filters are applied page by page and filtered-out rows do not count
    /// toward the limit.
    pub async fn list(&self, object: &str, criteria: &Criteria) -> Result<Vec<Row>, InternalError> {
        let def = self.definition(object)?;
        let plan = self.generator.make_list(&def, criteria)?;
        let mut iterator = self.open(plan).await?;

        let limit = criteria
            .limit
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_LIMIT);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        self.collect(iterator.as_mut(), limit).await
    }

    /// Number of objects matching the criteria. Without client filters each
    /// shard answers with a `count(*)`; with filters rows are fetched and
    /// counted after filtering.
    pub async fn count(&self, object: &str, criteria: &Criteria) -> Result<u64, InternalError> {
        let def = self.definition(object)?;
        let plan = self.generator.make_count(&def, criteria)?;
        let mut iterator = self.open(plan).await?;
        let filters = iterator.client_filters().cloned();

        let cap = criteria
            .limit
            .filter(|limit| *limit > 0)
            .and_then(|limit| u64::try_from(limit).ok())
            .unwrap_or(u64::MAX);

        let mut total = 0u64;
        while total < cap && iterator.has_next() {
            let Some(statement) = iterator.next_statement()? else {
                break;
            };
            let result = self.execute_one(&statement).await?;

            if result.is_count() {
                let counted = result.count().and_then(|n| u64::try_from(n).ok());
                total = total.saturating_add(counted.unwrap_or(0));
                iterator.record_page(0, None);
                continue;
            }

            let rows = result.into_rows();
            let last_id = rows.last().and_then(|row| row.get(ID_FIELD)).cloned();
            iterator.record_page(rows.len(), last_id);

            let matched = rows
                .iter()
                .filter(|row| matches_filters(row, filters.as_ref()))
                .count();
            total = total.saturating_add(u64::try_from(matched).unwrap_or(u64::MAX));
        }

        Ok(total.min(cap))
    }

    // run the locator when the plan needs one
    async fn open(&self, plan: ListPlan) -> Result<Box<dyn StatementIterator>, InternalError> {
        match plan {
            ListPlan::Bounded(iterator) => Ok(Box::new(iterator)),
            ListPlan::Ranged(iterator) => Ok(Box::new(iterator)),
            ListPlan::Located { locator, query } => {
                let shards: Vec<i64> = self
                    .execute_one(&locator)
                    .await?
                    .into_rows()
                    .iter()
                    .filter_map(|row| row.get(SHARD_ID_FIELD).and_then(Value::as_i64))
                    .collect();
                tracing::debug!(table = locator.table(), shards = shards.len(), "shards located");

                Ok(Box::new(LazyBoundedStatementIterator::new(
                    query,
                    shards,
                    self.generator.statement_limit(),
                )))
            }
        }
    }

    async fn collect(
        &self,
        iterator: &mut dyn StatementIterator,
        limit: usize,
    ) -> Result<Vec<Row>, InternalError> {
        let filters = iterator.client_filters().cloned();
        let mut rows = Vec::new();

        while rows.len() < limit && iterator.has_next() {
            // filtered reads over-fetch at the iterator's own limit
            let page_limit = if filters.is_some() {
                iterator.limit()
            } else {
                i64::try_from(limit - rows.len())
                    .unwrap_or(i64::MAX)
                    .min(iterator.limit())
            };

            let Some(statement) = iterator.next_with_page_limit(page_limit)? else {
                break;
            };
            let page = self.execute_one(&statement).await?.into_rows();
            let last_id = page.last().and_then(|row| row.get(ID_FIELD)).cloned();
            iterator.record_page(page.len(), last_id);

            for row in page {
                let row = strip_shard(row);
                if matches_filters(&row, filters.as_ref()) {
                    rows.push(row);
                    if rows.len() >= limit {
                        break;
                    }
                }
            }
        }

        Ok(rows)
    }

    // ------------------------------------------------------------------
    // Full-table visit
    // ------------------------------------------------------------------

    /// Page through every object of a type in token order. Returns the
    /// number of objects handed to the visitor.
    pub async fn visit_objects<V>(
        &self,
        object: &str,
        visitor: &mut V,
    ) -> Result<u64, InternalError>
    where
        V: ObjectVisitor + ?Sized,
    {
        let def = Arc::new(self.definition(object)?);
        let mut pages = PagedRows::full_table(self.generator.clone(), def);
        let mut visited = 0u64;

        while let Some(statement) = pages.next_statement() {
            let rows = self.execute_one(&statement).await?.into_rows();
            for row in pages.accept(rows) {
                if visitor.should_include(&row) {
                    visitor.visit(row);
                    visited += 1;
                }
            }
        }

        Ok(visited)
    }
}
