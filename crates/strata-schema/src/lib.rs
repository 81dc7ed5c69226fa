//! Schema model for Strata: field types, composite indexes, sharding
//! strategies, and the object/keyspace definitions that drive statement
//! generation.
//!
//! Everything in this crate is immutable once constructed. Schema evolution
//! produces a new [`KeyspaceDefinition`](keyspace::KeyspaceDefinition); it
//! never mutates an existing one.

pub mod definition;
pub mod error;
pub mod field;
pub mod index;
pub mod keyspace;
pub mod sharding;
pub mod timeuuid;
pub mod types;

pub use error::SchemaError;

///
/// CONSTANTS
///

/// Maximum number of fields allowed in one composite index key.
pub const MAX_INDEX_FIELDS: usize = 8;

/// Maximum length for object and field identifiers.
pub const MAX_NAME_LEN: usize = 48;

/// Name of the primary key field on every object definition.
pub const ID_FIELD: &str = "id";

/// Column holding the shard id in every wide table.
pub const SHARD_ID_FIELD: &str = "shardid";

/// Table names reserved for system bookkeeping inside each keyspace.
pub const RESERVED_TABLE_NAMES: [&str; 3] =
    ["__shardindex", "__index_updates", "__keyspace_definitions"];

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        definition::ObjectDefinition,
        field::Field,
        index::Index,
        keyspace::KeyspaceDefinition,
        sharding::ShardingStrategy,
        types::FieldType,
    };
    pub use serde::{Deserialize, Serialize};
}
