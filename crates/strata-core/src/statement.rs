use crate::value::Value;
use std::fmt;

///
/// Statement
///
/// One query against the store: text, positional values, the table it
/// targets, and whether the text can be prepared. Equality ignores the
/// target table.
///

#[derive(Clone, Debug)]
pub struct Statement {
    query: String,
    values: Vec<Value>,
    table: Option<String>,
    preparable: bool,
}

impl Statement {
    /// Fixed text with `?` placeholders bound at execution time.
    #[must_use]
    pub fn prepared(query: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            query: query.into(),
            values,
            table: None,
            preparable: true,
        }
    }

    /// Literal text issued as-is; bypasses the prepared-statement cache.
    #[must_use]
    pub fn raw(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            values: Vec::new(),
            table: None,
            preparable: false,
        }
    }

    #[must_use]
    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    #[must_use]
    pub const fn is_preparable(&self) -> bool {
        self.preparable
    }

    /// Whether the statement mutates data, judged from its leading keyword.
    #[must_use]
    pub fn is_write(&self) -> bool {
        let head = self
            .query
            .trim_start()
            .split_whitespace()
            .next()
            .unwrap_or_default();

        !head.eq_ignore_ascii_case("SELECT")
    }
}

impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        self.query == other.query
            && self.values == other.values
            && self.preparable == other.preparable
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query)?;
        if !self.values.is_empty() {
            let values: Vec<String> = self.values.iter().map(ToString::to_string).collect();
            write!(f, " [{}]", values.join(", "))?;
        }

        Ok(())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_target_table() {
        let a = Statement::prepared("SELECT * FROM t WHERE id = ?", vec![Value::Int(1)])
            .on_table("t");
        let b = Statement::prepared("SELECT * FROM t WHERE id = ?", vec![Value::Int(1)]);

        assert_eq!(a, b);
    }

    #[test]
    fn preparability_participates_in_equality() {
        let a = Statement::prepared("TRUNCATE t;", Vec::new());
        let b = Statement::raw("TRUNCATE t;");

        assert_ne!(a, b);
        assert!(a.is_write());
    }
}
