use sha2::{Digest, Sha256};
use strata_schema::{definition::ObjectDefinition, index::Index};

///
/// CONSTANTS
///

pub const SHARD_INDEX_TABLE: &str = "__shardindex";
pub const INDEX_UPDATES_TABLE: &str = "__index_updates";
pub const KEYSPACE_DEFINITIONS_TABLE: &str = "__keyspace_definitions";

/// Display prefix kept from the object name in index table names.
const INDEX_TABLE_PREFIX_LEN: usize = 16;

/// Digest bytes (hex-encoded) appended to index table names.
const INDEX_TABLE_HASH_BYTES: usize = 16;

/// Static table name for an object.
#[must_use]
pub fn static_table_name(def: &ObjectDefinition) -> String {
    def.name().to_string()
}

/// Wide table name for one index of an object.
///
/// Deterministic for a given (object, index key): a 16-character display
/// prefix followed by 32 hex characters of the sha256 of
/// `"{object}|{field_field...}"`. Fits the store's 48-character limit.
#[must_use]
pub fn index_table_name(def: &ObjectDefinition, index: &Index) -> String {
    let digest = Sha256::digest(format!("{}|{}", def.name(), index.fields().join("_")));

    let prefix: String = def.name().chars().take(INDEX_TABLE_PREFIX_LEN).collect();
    let hash: String = digest[..INDEX_TABLE_HASH_BYTES]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();

    format!("{prefix}{hash}")
}
