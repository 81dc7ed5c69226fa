use thiserror::Error as ThisError;

///
/// SchemaError
/// Rejections raised while parsing or validating schema documents.
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum SchemaError {
    #[error("object '{object}' index '{index}' has {count} fields (max {max})")]
    IndexTooWide {
        object: String,
        index: String,
        count: usize,
        max: usize,
    },

    #[error("invalid schema document: {0}")]
    InvalidDocument(#[from] serde_json::Error),

    #[error("object '{object}' has invalid primary key type '{field_type}'")]
    InvalidIdType { object: String, field_type: String },

    #[error("invalid identifier '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("object '{object}' index '{index}' uses non-indexable field '{field}'")]
    NonIndexableField {
        object: String,
        index: String,
        field: String,
    },

    #[error("object '{object}' uses reserved name '{name}'")]
    ReservedName { object: String, name: String },

    #[error("object '{object}' index '{index}' is sharded but the primary key is not a timeuuid")]
    ShardedWithoutTimeId { object: String, index: String },

    #[error("unknown field type '{0}'")]
    UnknownFieldType(String),

    #[error("object '{object}' index '{index}' references unknown field '{field}'")]
    UnknownIndexField {
        object: String,
        index: String,
        field: String,
    },

    #[error("unknown sharding strategy '{0}'")]
    UnknownShardingStrategy(String),
}
