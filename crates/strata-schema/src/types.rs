use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

///
/// FieldType
///
/// Closed set of column types understood by the engine. The serialized form
/// is the store's native lowercase type name.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "String", into = "String")]
#[remain::sorted]
pub enum FieldType {
    Ascii,
    BigInt,
    Blob,
    Boolean,
    Counter,
    Decimal,
    Double,
    Float,
    Int,
    Text,
    Timestamp,
    Timeuuid,
    Uuid,
    VarChar,
    VarInt,
}

impl FieldType {
    /// Native type name as used in table definitions.
    #[must_use]
    pub const fn cql_name(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::BigInt => "bigint",
            Self::Blob => "blob",
            Self::Boolean => "boolean",
            Self::Counter => "counter",
            Self::Decimal => "decimal",
            Self::Double => "double",
            Self::Float => "float",
            Self::Int => "int",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Timeuuid => "timeuuid",
            Self::Uuid => "uuid",
            Self::VarChar => "varchar",
            Self::VarInt => "varint",
        }
    }

    /// Whether values of this type may form part of a composite index key.
    #[must_use]
    pub const fn is_indexable(self) -> bool {
        !matches!(self, Self::Blob | Self::Counter)
    }

    /// Whether this type may be used as the primary key of an object.
    #[must_use]
    pub const fn is_valid_id(self) -> bool {
        matches!(
            self,
            Self::BigInt | Self::Text | Self::Timeuuid | Self::Uuid | Self::VarChar
        )
    }

    #[must_use]
    pub const fn is_textual(self) -> bool {
        matches!(self, Self::Ascii | Self::Text | Self::VarChar)
    }

    #[must_use]
    pub const fn is_uuid(self) -> bool {
        matches!(self, Self::Timeuuid | Self::Uuid)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cql_name())
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ty = match s.trim().to_ascii_lowercase().as_str() {
            "ascii" => Self::Ascii,
            "bigint" => Self::BigInt,
            "blob" => Self::Blob,
            "boolean" => Self::Boolean,
            "counter" => Self::Counter,
            "decimal" => Self::Decimal,
            "double" => Self::Double,
            "float" => Self::Float,
            "int" => Self::Int,
            "text" => Self::Text,
            "timestamp" => Self::Timestamp,
            "timeuuid" => Self::Timeuuid,
            "uuid" => Self::Uuid,
            "varchar" => Self::VarChar,
            "varint" => Self::VarInt,
            _ => return Err(SchemaError::UnknownFieldType(s.to_string())),
        };

        Ok(ty)
    }
}

impl TryFrom<String> for FieldType {
    type Error = SchemaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FieldType> for String {
    fn from(ty: FieldType) -> Self {
        ty.cql_name().to_string()
    }
}

///
/// TESTS
///
