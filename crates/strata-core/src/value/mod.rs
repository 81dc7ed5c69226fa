//! Schema-free scalar values.
//!
//! Rows are maps from field name to [`Value`]. Every variant maps onto one
//! native column type; conversions between the two live in [`coerce`].

mod coerce;
mod json;
mod order;


pub use json::{row_from_json, row_to_json};
pub use order::SortKey;

use num_bigint::BigInt;
use rust_decimal::Decimal;
use std::{collections::BTreeMap, fmt};
use strata_schema::{sharding::UNSHARDED_ID, types::FieldType};
use thiserror::Error as ThisError;
use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_64;

///
/// Row
///

pub type Row = BTreeMap<String, Value>;

///
/// CONSTANTS
///

/// Separator between values inside an index-values string.
pub const INDEX_VALUE_SEPARATOR: char = ':';

/// Escaped form of the separator when it appears inside a value.
pub const INDEX_VALUE_SEPARATOR_ESCAPE: &str = "&#58;";

///
/// ValueError
///

#[derive(Debug, ThisError)]
pub enum ValueError {
    #[error("cannot convert {found} value to {expected}")]
    Mismatch {
        expected: FieldType,
        found: &'static str,
    },

    #[error("invalid {expected} literal '{text}'")]
    Parse { expected: FieldType, text: String },
}

///
/// Value
///
/// Tagged union over the scalar kinds the store understands. Text-like
/// column types (`ascii`, `text`, `varchar`) share the `Text` variant.
///

#[derive(Clone, Debug, PartialEq)]
#[remain::sorted]
pub enum Value {
    BigInt(i64),
    Blob(Vec<u8>),
    Boolean(bool),
    Counter(i64),
    Decimal(Decimal),
    Double(f64),
    Float(f32),
    Int(i32),
    Null,
    Text(String),
    Timestamp(i64),
    Timeuuid(Uuid),
    Uuid(Uuid),
    VarInt(BigInt),
}

impl Value {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short variant label, used in conversion errors.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::BigInt(_) => "bigint",
            Self::Blob(_) => "blob",
            Self::Boolean(_) => "boolean",
            Self::Counter(_) => "counter",
            Self::Decimal(_) => "decimal",
            Self::Double(_) => "double",
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Null => "null",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Timeuuid(_) => "timeuuid",
            Self::Uuid(_) => "uuid",
            Self::VarInt(_) => "varint",
        }
    }

    /// Native column type of this value, `None` for `Null`.
    #[must_use]
    pub const fn kind(&self) -> Option<FieldType> {
        let kind = match self {
            Self::BigInt(_) => FieldType::BigInt,
            Self::Blob(_) => FieldType::Blob,
            Self::Boolean(_) => FieldType::Boolean,
            Self::Counter(_) => FieldType::Counter,
            Self::Decimal(_) => FieldType::Decimal,
            Self::Double(_) => FieldType::Double,
            Self::Float(_) => FieldType::Float,
            Self::Int(_) => FieldType::Int,
            Self::Null => return None,
            Self::Text(_) => FieldType::VarChar,
            Self::Timestamp(_) => FieldType::Timestamp,
            Self::Timeuuid(_) => FieldType::Timeuuid,
            Self::Uuid(_) => FieldType::Uuid,
            Self::VarInt(_) => FieldType::VarInt,
        };

        Some(kind)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> Option<&Uuid> {
        match self {
            Self::Timeuuid(id) | Self::Uuid(id) => Some(id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::BigInt(v) | Self::Counter(v) | Self::Timestamp(v) => Some(*v),
            Self::Int(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Shard id of a primary key under the given strategy. Keys without an
    /// embedded time land on the unsharded id.
    #[must_use]
    pub fn shard_id(&self, strategy: strata_schema::sharding::ShardingStrategy) -> i64 {
        self.as_uuid()
            .map_or(UNSHARDED_ID, |id| strategy.shard_of(id))
    }

    /// Canonical string form used inside index-values strings and tokens.
    #[must_use]
    pub fn to_index_string(&self) -> String {
        match self {
            Self::BigInt(v) | Self::Counter(v) | Self::Timestamp(v) => v.to_string(),
            Self::Blob(bytes) => hex(bytes),
            Self::Boolean(v) => v.to_string(),
            Self::Decimal(v) => v.normalize().to_string(),
            Self::Double(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Null => String::new(),
            Self::Text(s) => s.clone(),
            Self::Timeuuid(id) | Self::Uuid(id) => id.hyphenated().to_string(),
            Self::VarInt(v) => v.to_string(),
        }
    }

    /// Literal form for statements that cannot be prepared.
    #[must_use]
    pub fn to_cql_literal(&self) -> String {
        match self {
            Self::Blob(bytes) => format!("0x{}", hex(bytes)),
            Self::Null => "null".to_string(),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
            other => other.to_index_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            other => f.write_str(&other.to_index_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::BigInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        if strata_schema::timeuuid::is_time_based(&id) {
            Self::Timeuuid(id)
        } else {
            Self::Uuid(id)
        }
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

// ======================================================================
// Index values
// ======================================================================

/// Join index values with `:`, escaping any separator inside a value.
#[must_use]
pub fn index_values_string<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a Value>,
{
    values
        .into_iter()
        .map(|v| {
            v.to_index_string()
                .replace(INDEX_VALUE_SEPARATOR, INDEX_VALUE_SEPARATOR_ESCAPE)
        })
        .collect::<Vec<_>>()
        .join(":")
}

/// Partition token over one or more key values.
///
/// Offline scans and the in-memory store must agree on this function so
/// token ranges partition the same key space.
#[must_use]
pub fn token<'a, I>(values: I) -> i64
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut bytes = Vec::new();
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            bytes.push(0);
        }
        bytes.extend_from_slice(value.to_index_string().as_bytes());
    }

    xxh3_64(&bytes).cast_signed()
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
