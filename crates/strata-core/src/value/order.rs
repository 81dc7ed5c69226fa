use super::Value;
use std::cmp::Ordering;
use strata_schema::timeuuid;

///
/// SortKey
///
/// Total order over values as the store compares clustering and partition
/// keys. Time-based ids order by embedded time; values of different kinds
/// order by kind label so mixed columns still sort deterministically.
///

#[derive(Clone, Debug)]
pub struct SortKey(pub Value);

impl SortKey {
    #[must_use]
    pub fn compare(a: &Value, b: &Value) -> Ordering {
        match (a, b) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,

            (Value::Timeuuid(x) | Value::Uuid(x), Value::Timeuuid(y) | Value::Uuid(y)) => {
                if timeuuid::is_time_based(x) && timeuuid::is_time_based(y) {
                    timeuuid::compare(x, y)
                } else {
                    x.as_bytes().cmp(y.as_bytes())
                }
            }

            (Value::Text(x), Value::Text(y)) => x.cmp(y),
            (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
            (Value::Blob(x), Value::Blob(y)) => x.cmp(y),
            (Value::Decimal(x), Value::Decimal(y)) => x.cmp(y),
            (Value::VarInt(x), Value::VarInt(y)) => x.cmp(y),
            (Value::Double(x), Value::Double(y)) => x.total_cmp(y),
            (Value::Float(x), Value::Float(y)) => x.total_cmp(y),

            (x, y) => match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x.label().cmp(y.label()),
            },
        }
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::compare(&self.0, &other.0)
    }
}
