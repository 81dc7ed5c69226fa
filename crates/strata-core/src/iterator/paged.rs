use crate::{
    generator::CqlGenerator,
    statement::Statement,
    value::{Row, Value},
};
use std::sync::Arc;
use strata_schema::{ID_FIELD, definition::ObjectDefinition};

///
/// CONSTANTS
///

/// Rows handed to the caller per page.
pub const PAGE_SIZE: i64 = 50;

///
/// PagedRows
///
/// Pages through a static table in token order within `[min, max]`. Each
/// page asks for one row more than it returns; the extra row only signals
/// that another page exists. The next page resumes after the last id
/// returned.
///

#[derive(Clone, Debug)]
pub struct PagedRows {
    generator: CqlGenerator,
    def: Arc<ObjectDefinition>,
    min_token: i64,
    max_token: i64,
    page_size: i64,
    resume_after: Option<Value>,
    done: bool,
}

impl PagedRows {
    #[must_use]
    pub const fn new(
        generator: CqlGenerator,
        def: Arc<ObjectDefinition>,
        min_token: i64,
        max_token: i64,
    ) -> Self {
        Self {
            generator,
            def,
            min_token,
            max_token,
            page_size: PAGE_SIZE,
            resume_after: None,
            done: false,
        }
    }

    /// Every row of the table.
    #[must_use]
    pub const fn full_table(generator: CqlGenerator, def: Arc<ObjectDefinition>) -> Self {
        Self::new(generator, def, i64::MIN, i64::MAX)
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Continue after a previously visited id.
    #[must_use]
    pub fn resume_after(mut self, id: Option<Value>) -> Self {
        self.resume_after = id;
        self
    }

    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    #[must_use]
    pub const fn last_id(&self) -> Option<&Value> {
        self.resume_after.as_ref()
    }

    /// Statement for the next page, `None` once the range is exhausted.
    #[must_use]
    pub fn next_statement(&self) -> Option<Statement> {
        (!self.done).then(|| {
            self.generator.make_table_scan(
                &self.def,
                self.min_token,
                self.max_token,
                self.page_size.saturating_add(1),
                self.resume_after.as_ref(),
            )
        })
    }

    /// Accept the rows fetched for the last statement and return the page.
    pub fn accept(&mut self, mut rows: Vec<Row>) -> Vec<Row> {
        let page_size = usize::try_from(self.page_size).unwrap_or(usize::MAX);

        if rows.len() > page_size {
            rows.truncate(page_size);
        } else {
            self.done = true;
        }

        if let Some(id) = rows.last().and_then(|row| row.get(ID_FIELD)) {
            self.resume_after = Some(id.clone());
        }

        rows
    }
}
