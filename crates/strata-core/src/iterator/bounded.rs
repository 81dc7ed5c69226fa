use super::StatementIterator;
use crate::{CQL_LIMIT_MAX, generator::GenerateError, statement::Statement};
use std::collections::VecDeque;

///
/// BoundedStatementIterator
///
/// A fixed, ordered list of statements known up front. Mutations and
/// point reads use this form; it never pages.
///

#[derive(Clone, Debug, Default)]
pub struct BoundedStatementIterator {
    statements: VecDeque<Statement>,
    limit: i64,
}

impl BoundedStatementIterator {
    #[must_use]
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            statements: statements.into(),
            limit: CQL_LIMIT_MAX,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Merge several iterators into one, preserving order.
    #[must_use]
    pub fn condense(iterators: Vec<Self>) -> Self {
        let limit = iterators
            .iter()
            .map(|it| it.limit)
            .max()
            .unwrap_or(CQL_LIMIT_MAX);

        Self {
            statements: iterators.into_iter().flat_map(|it| it.statements).collect(),
            limit,
        }
    }

    #[must_use]
    pub fn all_preparable(&self) -> bool {
        self.statements.iter().all(Statement::is_preparable)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statements(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter()
    }

    #[must_use]
    pub fn into_statements(self) -> Vec<Statement> {
        self.statements.into()
    }
}

impl From<Vec<Statement>> for BoundedStatementIterator {
    fn from(statements: Vec<Statement>) -> Self {
        Self::new(statements)
    }
}

impl StatementIterator for BoundedStatementIterator {
    fn has_next(&self) -> bool {
        !self.statements.is_empty()
    }

    fn next_with_page_limit(
        &mut self,
        _page_limit: i64,
    ) -> Result<Option<Statement>, GenerateError> {
        Ok(self.statements.pop_front())
    }

    fn limit(&self) -> i64 {
        self.limit
    }

    fn is_bounded(&self) -> bool {
        true
    }
}
