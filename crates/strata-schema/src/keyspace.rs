use crate::{SchemaError, definition::ObjectDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// CONSTANTS
///

pub const DEFAULT_REPLICATION_CLASS: &str = "SimpleStrategy";
pub const DEFAULT_CONSISTENCY_LEVEL: &str = "ONE";

///
/// KeyspaceDefinition
///
/// A published schema: keyspace name, replication settings and the object
/// definitions it contains. Persisted as append-only JSON snapshots; the
/// newest snapshot for a keyspace name wins.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(from = "KeyspaceDocument", into = "KeyspaceDocument")]
pub struct KeyspaceDefinition {
    name: String,
    replication_class: String,
    replication_factors: BTreeMap<String, u32>,
    consistency_level: String,
    definitions: BTreeMap<String, ObjectDefinition>,
}

impl KeyspaceDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replication_class: DEFAULT_REPLICATION_CLASS.to_string(),
            replication_factors: BTreeMap::from([("replication_factor".to_string(), 1)]),
            consistency_level: DEFAULT_CONSISTENCY_LEVEL.to_string(),
            definitions: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_replication(
        mut self,
        class: impl Into<String>,
        factors: BTreeMap<String, u32>,
    ) -> Self {
        self.replication_class = class.into();
        self.replication_factors = factors;
        self
    }

    #[must_use]
    pub fn with_consistency_level(mut self, level: impl Into<String>) -> Self {
        self.consistency_level = level.into();
        self
    }

    #[must_use]
    pub fn with_definition(mut self, def: ObjectDefinition) -> Self {
        self.definitions.insert(def.name().to_string(), def);
        self
    }

    /// Parse and validate a schema document.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let keyspace: Self = serde_json::from_str(json)?;
        keyspace.validate()?;

        Ok(keyspace)
    }

    /// Stable, sorted JSON form used for persisted snapshots.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.is_empty() || !self.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(SchemaError::InvalidName {
                name: self.name.clone(),
                reason: "keyspace names are ascii letters, digits and underscores",
            });
        }

        self.definitions.values().try_for_each(ObjectDefinition::validate)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn replication_class(&self) -> &str {
        &self.replication_class
    }

    #[must_use]
    pub const fn replication_factors(&self) -> &BTreeMap<String, u32> {
        &self.replication_factors
    }

    #[must_use]
    pub fn consistency_level(&self) -> &str {
        &self.consistency_level
    }

    #[must_use]
    pub fn definition(&self, name: &str) -> Option<&ObjectDefinition> {
        self.definitions.get(name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ObjectDefinition> {
        self.definitions.values()
    }
}

///
/// KeyspaceDocument
///

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyspaceDocument {
    name: String,

    #[serde(default = "default_replication_class")]
    replication_class: String,

    #[serde(default)]
    replication_factors: BTreeMap<String, u32>,

    #[serde(default = "default_consistency_level")]
    consistency_level: String,

    #[serde(default)]
    definitions: Vec<ObjectDefinition>,
}

fn default_replication_class() -> String {
    DEFAULT_REPLICATION_CLASS.to_string()
}

fn default_consistency_level() -> String {
    DEFAULT_CONSISTENCY_LEVEL.to_string()
}

impl From<KeyspaceDocument> for KeyspaceDefinition {
    fn from(doc: KeyspaceDocument) -> Self {
        let mut keyspace = Self::new(doc.name)
            .with_replication(doc.replication_class, doc.replication_factors)
            .with_consistency_level(doc.consistency_level);

        for def in doc.definitions {
            keyspace = keyspace.with_definition(def);
        }

        keyspace
    }
}

impl From<KeyspaceDefinition> for KeyspaceDocument {
    fn from(keyspace: KeyspaceDefinition) -> Self {
        Self {
            name: keyspace.name,
            replication_class: keyspace.replication_class,
            replication_factors: keyspace.replication_factors,
            consistency_level: keyspace.consistency_level,
            definitions: keyspace.definitions.into_values().collect(),
        }
    }
}

///
/// TESTS
///
