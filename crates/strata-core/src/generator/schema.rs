use super::{
    CqlGenerator,
    naming::{
        INDEX_UPDATES_TABLE, KEYSPACE_DEFINITIONS_TABLE, SHARD_INDEX_TABLE, index_table_name,
        static_table_name,
    },
};
use crate::statement::Statement;
use strata_schema::{
    ID_FIELD, SHARD_ID_FIELD, definition::ObjectDefinition, field::Field, index::Index,
    keyspace::KeyspaceDefinition,
};

///
/// CONSTANTS
///

pub const DEFAULT_SSTABLE_SIZE_MB: u32 = 5;
pub const DEFAULT_MIN_THRESHOLD: u32 = 6;

///
/// CompactionStrategy
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompactionStrategy {
    Leveled { sstable_size_mb: u32 },
    SizeTiered { min_threshold: u32 },
}

impl CompactionStrategy {
    #[must_use]
    pub const fn leveled() -> Self {
        Self::Leveled {
            sstable_size_mb: DEFAULT_SSTABLE_SIZE_MB,
        }
    }

    #[must_use]
    pub const fn size_tiered() -> Self {
        Self::SizeTiered {
            min_threshold: DEFAULT_MIN_THRESHOLD,
        }
    }

    fn options(self) -> String {
        match self {
            Self::Leveled { sstable_size_mb } => format!(
                "{{ 'class' : 'LeveledCompactionStrategy', 'sstable_size_in_mb' : {sstable_size_mb} }}"
            ),
            Self::SizeTiered { min_threshold } => format!(
                "{{ 'class' : 'SizeTieredCompactionStrategy', 'min_threshold' : {min_threshold} }}"
            ),
        }
    }
}

impl CqlGenerator {
    // ------------------------------------------------------------------
    // Keyspace
    // ------------------------------------------------------------------

    #[must_use]
    pub fn make_create_keyspace(&self, keyspace: &KeyspaceDefinition) -> Statement {
        Statement::raw(format!(
            "CREATE KEYSPACE \"{}\" WITH {};",
            self.keyspace,
            replication(keyspace)
        ))
    }

    /// Re-apply replication settings to an existing keyspace.
    #[must_use]
    pub fn make_alter_keyspace(&self, keyspace: &KeyspaceDefinition) -> Statement {
        Statement::raw(format!(
            "ALTER KEYSPACE \"{}\" WITH {};",
            self.keyspace,
            replication(keyspace)
        ))
    }

    #[must_use]
    pub fn make_drop_keyspace(&self) -> Statement {
        Statement::raw(format!("DROP KEYSPACE \"{}\";", self.keyspace))
    }

    // ------------------------------------------------------------------
    // Object tables
    // ------------------------------------------------------------------

    /// Static table followed by one wide table per index.
    #[must_use]
    pub fn make_create_table(&self, def: &ObjectDefinition) -> Vec<Statement> {
        let mut statements = vec![self.make_create_static_table(def)];
        statements.extend(
            def.indexes()
                .map(|index| self.make_create_index_table(def, index)),
        );

        statements
    }

    #[must_use]
    pub fn make_create_static_table(&self, def: &ObjectDefinition) -> Statement {
        let table = static_table_name(def);
        let columns = column_definitions(def);

        let query = if columns.is_empty() {
            format!(
                "CREATE TABLE {} (id {} PRIMARY KEY);",
                self.qualified(&table),
                def.primary_key_type()
            )
        } else {
            format!(
                "CREATE TABLE {} (id {} PRIMARY KEY, {});",
                self.qualified(&table),
                def.primary_key_type(),
                columns.join(", ")
            )
        };

        Statement::raw(query).on_table(table)
    }

    /// Wide table partitioned by (shard, key fields), clustered by id.
    #[must_use]
    pub fn make_create_index_table(&self, def: &ObjectDefinition, index: &Index) -> Statement {
        let table = index_table_name(def, index);
        let mut columns = vec![
            format!("id {}", def.primary_key_type()),
            format!("{SHARD_ID_FIELD} bigint"),
        ];
        columns.extend(column_definitions(def));

        let query = format!(
            "CREATE TABLE {} ({}, PRIMARY KEY (({SHARD_ID_FIELD}, {}), id));",
            self.qualified(&table),
            columns.join(", "),
            index.fields().join(", ")
        );

        Statement::raw(query).on_table(table)
    }

    #[must_use]
    pub fn make_drop_table(&self, def: &ObjectDefinition) -> Vec<Statement> {
        self.object_tables(def)
            .into_iter()
            .map(|table| {
                Statement::raw(format!("DROP TABLE IF EXISTS {};", self.qualified(&table)))
                    .on_table(table)
            })
            .collect()
    }

    #[must_use]
    pub fn make_truncate_table(&self, def: &ObjectDefinition) -> Vec<Statement> {
        self.object_tables(def)
            .into_iter()
            .map(|table| self.make_truncate(&table))
            .collect()
    }

    #[must_use]
    pub fn make_truncate(&self, table: &str) -> Statement {
        Statement::raw(format!("TRUNCATE {};", self.qualified(table))).on_table(table)
    }

    /// `ALTER TABLE … ADD` for one new field.
    #[must_use]
    pub fn make_add_field(&self, table: &str, field: &Field) -> Statement {
        Statement::raw(format!(
            "ALTER TABLE {} ADD {} {};",
            self.qualified(table),
            field.name,
            field.field_type
        ))
        .on_table(table)
    }

    // ------------------------------------------------------------------
    // System tables
    // ------------------------------------------------------------------

    /// Shard locator and change log.
    #[must_use]
    pub fn make_create_system_tables(&self) -> Vec<Statement> {
        vec![
            Statement::raw(format!(
                "CREATE TABLE {} (shardid bigint, tablename varchar, indexvalues varchar, \
                 targetrowkey varchar, PRIMARY KEY ((tablename, indexvalues), shardid));",
                self.qualified(SHARD_INDEX_TABLE)
            ))
            .on_table(SHARD_INDEX_TABLE),
            Statement::raw(format!(
                "CREATE TABLE {} (id timeuuid, statictablename varchar, instanceid varchar, \
                 indexvalues varchar, PRIMARY KEY ((statictablename, instanceid), id));",
                self.qualified(INDEX_UPDATES_TABLE)
            ))
            .on_table(INDEX_UPDATES_TABLE),
        ]
    }

    #[must_use]
    pub fn make_truncate_system_tables(&self) -> Vec<Statement> {
        vec![
            self.make_truncate(SHARD_INDEX_TABLE),
            self.make_truncate(INDEX_UPDATES_TABLE),
        ]
    }

    #[must_use]
    pub fn make_create_keyspace_definitions_table(&self) -> Statement {
        Statement::raw(format!(
            "CREATE TABLE {} (id uuid, name varchar, def varchar, PRIMARY KEY ((name), id));",
            self.qualified(KEYSPACE_DEFINITIONS_TABLE)
        ))
        .on_table(KEYSPACE_DEFINITIONS_TABLE)
    }

    // ------------------------------------------------------------------
    // Compaction
    // ------------------------------------------------------------------

    /// Compaction settings for the system tables and every object table.
    #[must_use]
    pub fn make_compaction(
        &self,
        keyspace: &KeyspaceDefinition,
        strategy: CompactionStrategy,
    ) -> Vec<Statement> {
        let mut tables = vec![
            SHARD_INDEX_TABLE.to_string(),
            INDEX_UPDATES_TABLE.to_string(),
        ];
        for def in keyspace.definitions() {
            tables.extend(self.object_tables(def));
        }

        let options = strategy.options();
        tables
            .into_iter()
            .map(|table| {
                Statement::raw(format!(
                    "ALTER TABLE {} WITH compaction = {options};",
                    self.qualified(&table)
                ))
                .on_table(table)
            })
            .collect()
    }

    fn object_tables(&self, def: &ObjectDefinition) -> Vec<String> {
        let mut tables = vec![static_table_name(def)];
        tables.extend(def.indexes().map(|index| index_table_name(def, index)));

        tables
    }
}

fn replication(keyspace: &KeyspaceDefinition) -> String {
    let mut options = format!("replication = {{ 'class' : '{}'", keyspace.replication_class());
    if keyspace.replication_factors().is_empty() {
        options.push_str(", 'replication_factor' : 1");
    }
    for (key, factor) in keyspace.replication_factors() {
        options.push_str(&format!(", '{key}' : {factor}"));
    }
    options.push_str(" }");

    options
}

// every non-id field as `name type`
fn column_definitions(def: &ObjectDefinition) -> Vec<String> {
    def.fields()
        .filter(|field| field.name != ID_FIELD)
        .map(|field| format!("{} {}", field.name, field.field_type))
        .collect()
}
