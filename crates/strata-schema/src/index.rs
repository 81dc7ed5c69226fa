use crate::sharding::ShardingStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// Index
///
/// A composite index: a set of field names plus the strategy used to shard
/// its wide table. Field names are kept sorted, so the key string is the
/// lookup identity regardless of the order they were declared in.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "IndexDocument", into = "IndexDocument")]
pub struct Index {
    fields: Vec<String>,
    sharding: ShardingStrategy,
}

impl Index {
    #[must_use]
    pub fn new<I, S>(fields: I, sharding: ShardingStrategy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        fields.sort();
        fields.dedup();

        Self { fields, sharding }
    }

    /// Parse a `:`-separated key such as `"instance:type"`.
    #[must_use]
    pub fn from_key(key: &str, sharding: ShardingStrategy) -> Self {
        Self::new(
            key.split(':').map(str::trim).filter(|s| !s.is_empty()),
            sharding,
        )
    }

    /// Canonical key: sorted field names joined with `:`.
    #[must_use]
    pub fn key(&self) -> String {
        self.fields.join(":")
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub const fn sharding(&self) -> ShardingStrategy {
        self.sharding
    }

    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Same variant of sharding strategy; required for an index to survive
    /// a migration.
    #[must_use]
    pub fn same_strategy(&self, other: &Self) -> bool {
        self.sharding == other.sharding
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.fields.join(", "), self.sharding)
    }
}

///
/// IndexDocument
///

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexDocument {
    key: String,

    #[serde(default)]
    sharding_strategy: ShardingStrategy,
}

impl From<IndexDocument> for Index {
    fn from(doc: IndexDocument) -> Self {
        Self::from_key(&doc.key, doc.sharding_strategy)
    }
}

impl From<Index> for IndexDocument {
    fn from(index: Index) -> Self {
        Self {
            key: index.key(),
            sharding_strategy: index.sharding,
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_sorted_regardless_of_declaration_order() {
        let index = Index::from_key("type:instance", ShardingStrategy::Daily);

        assert_eq!(index.key(), "instance:type");
        assert_eq!(index, Index::new(["instance", "type"], ShardingStrategy::Daily));
    }

    #[test]
    fn strategy_participates_in_equality() {
        let daily = Index::from_key("a:b", ShardingStrategy::Daily);
        let monthly = Index::from_key("a:b", ShardingStrategy::Monthly);

        assert_ne!(daily, monthly);
        assert!(!daily.same_strategy(&monthly));
    }

    #[test]
    fn document_defaults_to_unsharded() {
        let index: Index = serde_json::from_str(r#"{"key": "foreignid"}"#).expect("index doc");

        assert_eq!(index.sharding(), ShardingStrategy::None);
        assert_eq!(index.fields(), ["foreignid".to_string()]);
    }
}
