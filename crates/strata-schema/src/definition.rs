use crate::{
    ID_FIELD, MAX_INDEX_FIELDS, MAX_NAME_LEN, RESERVED_TABLE_NAMES, SHARD_ID_FIELD, SchemaError,
    field::Field, index::Index, types::FieldType,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

///
/// ObjectDefinition
///
/// Schema for one object type: its fields, composite indexes and the
/// null-key insert policy. Equality covers all four.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(from = "DefinitionDocument", into = "DefinitionDocument")]
pub struct ObjectDefinition {
    name: String,
    fields: BTreeMap<String, Field>,
    indexes: BTreeMap<String, Index>,
    allow_null_primary_key_inserts: bool,
}

impl ObjectDefinition {
    /// New definition with only the default `id timeuuid` primary key.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(ID_FIELD.to_string(), Field::new(ID_FIELD, FieldType::Timeuuid));

        Self {
            name: name.into(),
            fields,
            indexes: BTreeMap::new(),
            allow_null_primary_key_inserts: false,
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        let field = Field::new(name, field_type);
        self.fields.insert(field.name.clone(), field);
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: Index) -> Self {
        self.indexes.insert(index.key(), index);
        self
    }

    #[must_use]
    pub const fn with_null_primary_key_inserts(mut self, allow: bool) -> Self {
        self.allow_null_primary_key_inserts = allow;
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn allow_null_primary_key_inserts(&self) -> bool {
        self.allow_null_primary_key_inserts
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn indexes(&self) -> impl Iterator<Item = &Index> {
        self.indexes.values()
    }

    #[must_use]
    pub fn index(&self, key: &str) -> Option<&Index> {
        self.indexes.get(key)
    }

    #[must_use]
    pub fn has_indexes(&self) -> bool {
        !self.indexes.is_empty()
    }

    #[must_use]
    pub fn primary_key_type(&self) -> FieldType {
        self.fields
            .get(ID_FIELD)
            .map_or(FieldType::Timeuuid, |f| f.field_type)
    }

    /// Every field that participates in at least one index.
    #[must_use]
    pub fn required_fields(&self) -> BTreeSet<&str> {
        self.indexes
            .values()
            .flat_map(Index::fields)
            .map(String::as_str)
            .collect()
    }

    #[must_use]
    pub fn is_field_used_in_any_index(&self, field: &str) -> bool {
        self.indexes.values().any(|index| index.contains(field))
    }

    // ------------------------------------------------------------------
    // Index selection
    // ------------------------------------------------------------------

    /// Index whose key is exactly the given set of field names.
    pub fn exact_index<'a, I>(&self, names: I) -> Option<&Index>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let names: BTreeSet<&str> = names.into_iter().collect();
        let key = names.into_iter().collect::<Vec<_>>().join(":");

        self.indexes.get(&key)
    }

    /// Most selective index covered by the candidate field names.
    ///
    /// Candidates not used by any index are discarded, the rest are sorted,
    /// and the greatest name is dropped until the joined key names a
    /// registered index. Surplus candidates become client-side filters.
    pub fn most_selective_matching_index<'a, I>(&self, names: I) -> Option<&Index>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut keys: Vec<&str> = names
            .into_iter()
            .filter(|name| self.is_field_used_in_any_index(name))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        while !keys.is_empty() {
            if let Some(index) = self.indexes.get(&keys.join(":")) {
                return Some(index);
            }
            keys.pop();
        }

        None
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    pub fn validate(&self) -> Result<(), SchemaError> {
        validate_name(&self.name)?;

        if RESERVED_TABLE_NAMES.contains(&self.name.as_str()) {
            return Err(SchemaError::ReservedName {
                object: self.name.clone(),
                name: self.name.clone(),
            });
        }

        for field in self.fields.values() {
            validate_name(&field.name)?;

            if field.name == SHARD_ID_FIELD {
                return Err(SchemaError::ReservedName {
                    object: self.name.clone(),
                    name: field.name.clone(),
                });
            }
        }

        let id_type = self.primary_key_type();
        if !id_type.is_valid_id() {
            return Err(SchemaError::InvalidIdType {
                object: self.name.clone(),
                field_type: id_type.to_string(),
            });
        }

        for index in self.indexes.values() {
            self.validate_index(index, id_type)?;
        }

        Ok(())
    }

    fn validate_index(&self, index: &Index, id_type: FieldType) -> Result<(), SchemaError> {
        if index.fields().len() > MAX_INDEX_FIELDS {
            return Err(SchemaError::IndexTooWide {
                object: self.name.clone(),
                index: index.key(),
                count: index.fields().len(),
                max: MAX_INDEX_FIELDS,
            });
        }

        if index.sharding().is_sharded() && id_type != FieldType::Timeuuid {
            return Err(SchemaError::ShardedWithoutTimeId {
                object: self.name.clone(),
                index: index.key(),
            });
        }

        for name in index.fields() {
            let field = self
                .fields
                .get(name)
                .ok_or_else(|| SchemaError::UnknownIndexField {
                    object: self.name.clone(),
                    index: index.key(),
                    field: name.clone(),
                })?;

            if !field.field_type.is_indexable() {
                return Err(SchemaError::NonIndexableField {
                    object: self.name.clone(),
                    index: index.key(),
                    field: name.clone(),
                });
            }
        }

        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), SchemaError> {
    let reason = if name.is_empty() {
        Some("empty")
    } else if name.len() > MAX_NAME_LEN {
        Some("too long")
    } else if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        Some("must start with a letter or underscore")
    } else if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some("only ascii letters, digits and underscores are allowed")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(SchemaError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

///
/// DefinitionDocument
///

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionDocument {
    name: String,

    #[serde(default)]
    fields: Vec<Field>,

    #[serde(default)]
    indexes: Vec<Index>,

    #[serde(default)]
    allow_null_primary_key_inserts: bool,
}

impl From<DefinitionDocument> for ObjectDefinition {
    fn from(doc: DefinitionDocument) -> Self {
        let mut def =
            Self::new(doc.name).with_null_primary_key_inserts(doc.allow_null_primary_key_inserts);

        for field in doc.fields {
            def = def.with_field(field.name, field.field_type);
        }
        for index in doc.indexes {
            def = def.with_index(index);
        }

        def
    }
}

impl From<ObjectDefinition> for DefinitionDocument {
    fn from(def: ObjectDefinition) -> Self {
        Self {
            name: def.name,
            fields: def.fields.into_values().collect(),
            indexes: def.indexes.into_values().collect(),
            allow_null_primary_key_inserts: def.allow_null_primary_key_inserts,
        }
    }
}

///
/// TESTS
///
