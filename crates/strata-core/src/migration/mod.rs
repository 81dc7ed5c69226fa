//! Schema migration.
//!
//! Fields may only be added, never removed or retyped, and the id field is
//! fixed once defined. Indexes may be added; an index present in both
//! definitions must keep its sharding strategy variant. A dropped index
//! emits nothing and is no longer written. Compatibility is checked before
//! anything is emitted, so a plan is either complete or absent.


use crate::{
    generator::{CqlGenerator, index_table_name, static_table_name},
    statement::Statement,
};
use strata_schema::{
    ID_FIELD, definition::ObjectDefinition, field::Field, index::Index,
    keyspace::KeyspaceDefinition,
};
use thiserror::Error as ThisError;

///
/// MigrationError
///

#[derive(Debug, ThisError)]
pub enum MigrationError {
    #[error("object '{object}' cannot be migrated: {reason}")]
    Incompatible { object: String, reason: String },
}

impl MigrationError {
    fn incompatible(object: &str, reason: impl Into<String>) -> Self {
        Self::Incompatible {
            object: object.to_string(),
            reason: reason.into(),
        }
    }
}

///
/// FieldAddition
///
/// One new field: an `ALTER TABLE ADD` against the static table followed
/// by one per pre-existing index table.
///

#[derive(Clone, Debug)]
pub struct FieldAddition {
    pub field: Field,
    pub statements: Vec<Statement>,
}

///
/// IndexCreation
///

#[derive(Clone, Debug)]
pub struct IndexCreation {
    pub index: Index,
    pub statement: Statement,
}

///
/// MigrationPlan
///

#[derive(Clone, Debug, Default)]
pub struct MigrationPlan {
    pub field_additions: Vec<FieldAddition>,
    pub index_creations: Vec<IndexCreation>,
    pub created_objects: Vec<Statement>,
}

impl MigrationPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.field_additions.is_empty()
            && self.index_creations.is_empty()
            && self.created_objects.is_empty()
    }

    fn extend(&mut self, other: Self) {
        self.field_additions.extend(other.field_additions);
        self.index_creations.extend(other.index_creations);
        self.created_objects.extend(other.created_objects);
    }

    /// Field additions first, then new index tables, then whole new objects.
    #[must_use]
    pub fn into_statements(self) -> Vec<Statement> {
        let mut statements: Vec<Statement> = self
            .field_additions
            .into_iter()
            .flat_map(|addition| addition.statements)
            .collect();
        statements.extend(self.index_creations.into_iter().map(|c| c.statement));
        statements.extend(self.created_objects);

        statements
    }
}

///
/// ObjectMigrator
///

#[derive(Clone, Copy, Debug)]
pub struct ObjectMigrator<'a> {
    old: &'a ObjectDefinition,
    new: &'a ObjectDefinition,
}

impl<'a> ObjectMigrator<'a> {
    #[must_use]
    pub const fn new(old: &'a ObjectDefinition, new: &'a ObjectDefinition) -> Self {
        Self { old, new }
    }

    #[must_use]
    pub fn is_migratable(&self) -> bool {
        self.check().is_ok()
    }

    /// First incompatibility between the two definitions, if any.
    pub fn check(&self) -> Result<(), MigrationError> {
        let object = self.old.name();

        if self.old.name() != self.new.name() {
            return Err(MigrationError::incompatible(
                object,
                format!("renamed to '{}'", self.new.name()),
            ));
        }

        if self.old.primary_key_type() != self.new.primary_key_type() {
            return Err(MigrationError::incompatible(
                object,
                format!(
                    "{ID_FIELD} type changed from {} to {}",
                    self.old.primary_key_type(),
                    self.new.primary_key_type()
                ),
            ));
        }

        for field in self.old.fields() {
            match self.new.field(&field.name) {
                None => {
                    return Err(MigrationError::incompatible(
                        object,
                        format!("field '{}' removed", field.name),
                    ));
                }
                Some(next) if next.field_type != field.field_type => {
                    return Err(MigrationError::incompatible(
                        object,
                        format!(
                            "field '{}' retyped from {} to {}",
                            field.name, field.field_type, next.field_type
                        ),
                    ));
                }
                Some(_) => {}
            }
        }

        // a dropped index is left in place and simply stops receiving writes
        for index in self.old.indexes() {
            match self.new.index(&index.key()) {
                None => {}
                Some(next) if !next.same_strategy(index) => {
                    return Err(MigrationError::incompatible(
                        object,
                        format!("index '{}' changed sharding strategy", index.key()),
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn new_fields(&self) -> Vec<&'a Field> {
        self.new
            .fields()
            .filter(|field| self.old.field(&field.name).is_none())
            .collect()
    }

    #[must_use]
    pub fn new_indexes(&self) -> Vec<&'a Index> {
        self.new
            .indexes()
            .filter(|index| self.old.index(&index.key()).is_none())
            .collect()
    }

    pub fn plan(&self, generator: &CqlGenerator) -> Result<MigrationPlan, MigrationError> {
        self.check()?;

        let existing: Vec<&Index> = self.old.indexes().collect();
        let field_additions = self
            .new_fields()
            .into_iter()
            .map(|field| {
                let mut statements =
                    vec![generator.make_add_field(&static_table_name(self.new), field)];
                statements.extend(existing.iter().map(|index| {
                    generator.make_add_field(&index_table_name(self.new, index), field)
                }));

                FieldAddition {
                    field: field.clone(),
                    statements,
                }
            })
            .collect();

        let index_creations = self
            .new_indexes()
            .into_iter()
            .map(|index| IndexCreation {
                index: index.clone(),
                statement: generator.make_create_index_table(self.new, index),
            })
            .collect();

        Ok(MigrationPlan {
            field_additions,
            index_creations,
            created_objects: Vec::new(),
        })
    }

    pub fn migration_statements(
        &self,
        generator: &CqlGenerator,
    ) -> Result<Vec<Statement>, MigrationError> {
        Ok(self.plan(generator)?.into_statements())
    }
}

///
/// KeyspaceMigrator
///

#[derive(Clone, Copy, Debug)]
pub struct KeyspaceMigrator<'a> {
    old: &'a KeyspaceDefinition,
    new: &'a KeyspaceDefinition,
}

impl<'a> KeyspaceMigrator<'a> {
    #[must_use]
    pub const fn new(old: &'a KeyspaceDefinition, new: &'a KeyspaceDefinition) -> Self {
        Self { old, new }
    }

    #[must_use]
    pub fn is_migratable(&self) -> bool {
        self.check().is_ok()
    }

    pub fn check(&self) -> Result<(), MigrationError> {
        if self.old.name() != self.new.name() {
            return Err(MigrationError::incompatible(
                self.old.name(),
                format!("keyspace renamed to '{}'", self.new.name()),
            ));
        }

        for def in self.new.definitions() {
            if let Some(old) = self.old.definition(def.name()) {
                ObjectMigrator::new(old, def).check()?;
            }
        }

        Ok(())
    }

    /// Plan for every object. Object types only present in the new keyspace
    /// are created wholesale.
    pub fn plan(&self, generator: &CqlGenerator) -> Result<MigrationPlan, MigrationError> {
        self.check()?;

        let mut plan = MigrationPlan::default();
        for def in self.new.definitions() {
            match self.old.definition(def.name()) {
                Some(old) => plan.extend(ObjectMigrator::new(old, def).plan(generator)?),
                None => plan.created_objects.extend(generator.make_create_table(def)),
            }
        }

        Ok(plan)
    }

    pub fn migration_statements(
        &self,
        generator: &CqlGenerator,
    ) -> Result<Vec<Statement>, MigrationError> {
        Ok(self.plan(generator)?.into_statements())
    }
}
