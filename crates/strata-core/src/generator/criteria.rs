use crate::value::{Row, Value};
use serde::{Deserialize, Serialize};

///
/// SortOrder
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    #[must_use]
    pub const fn is_ascending(self) -> bool {
        matches!(self, Self::Asc)
    }
}

///
/// Criteria
///
/// A list or count request: index values to match (any superset of an
/// index key; surplus fields become client-side filters), an optional id or
/// time window, ordering and limit.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Criteria {
    pub index_values: Row,
    pub start_id: Option<Value>,
    pub end_id: Option<Value>,
    pub start_timestamp: Option<i64>,
    pub end_timestamp: Option<i64>,
    pub order: SortOrder,
    pub limit: Option<i64>,
    pub inclusive: bool,
}

impl Criteria {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_index_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.index_values.insert(field.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_start_id(mut self, id: impl Into<Value>) -> Self {
        self.start_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_end_id(mut self, id: impl Into<Value>) -> Self {
        self.end_id = Some(id.into());
        self
    }

    /// Time window in unix milliseconds, both ends inclusive.
    #[must_use]
    pub const fn with_time_window(mut self, start_millis: i64, end_millis: i64) -> Self {
        self.start_timestamp = Some(start_millis);
        self.end_timestamp = Some(end_millis);
        self
    }

    #[must_use]
    pub const fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn with_inclusive(mut self, inclusive: bool) -> Self {
        self.inclusive = inclusive;
        self
    }
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
            index_values: Row::new(),
            start_id: None,
            end_id: None,
            start_timestamp: None,
            end_timestamp: None,
            order: SortOrder::default(),
            limit: None,
            inclusive: true,
        }
    }
}
