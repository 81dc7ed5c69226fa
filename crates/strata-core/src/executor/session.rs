use crate::value::{Row, Value};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error as ThisError;

///
/// StoreError
///
/// Failures reported by a store session.
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum StoreError {
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("unconfigured table {0}")]
    Unconfigured(String),

    #[error("unknown prepared statement")]
    UnknownPrepared,
}

///
/// PreparedId
///
/// Opaque handle returned by [`Session::prepare`].
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PreparedId(Arc<[u8]>);

impl PreparedId {
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

///
/// BatchKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BatchKind {
    Logged,
    Unlogged,
}

///
/// ResultSet
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    #[must_use]
    pub const fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    #[must_use]
    pub const fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Value of a `count(*)` projection.
    #[must_use]
    pub fn count(&self) -> Option<i64> {
        self.first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64)
    }

    /// Whether this is the single-column result of a `count(*)`.
    #[must_use]
    pub fn is_count(&self) -> bool {
        matches!(self.columns.as_slice(), [column] if column == "count")
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

///
/// Session
///
/// The only boundary between the engine and a store. Implementations own
/// connection pooling and wire encoding; the engine only sees prepared
/// handles, positional values and result rows.
///

#[async_trait]
pub trait Session: Send + Sync {
    async fn prepare(&self, query: &str) -> Result<PreparedId, StoreError>;

    async fn execute_prepared(
        &self,
        id: &PreparedId,
        values: &[Value],
    ) -> Result<ResultSet, StoreError>;

    async fn execute_raw(&self, query: &str) -> Result<ResultSet, StoreError>;

    async fn execute_batch(
        &self,
        kind: BatchKind,
        statements: Vec<(PreparedId, Vec<Value>)>,
    ) -> Result<(), StoreError>;
}
