//! Object mapper.
//!
//! The caller-facing API: object CRUD, indexed list and count, keyspace
//! lifecycle, persisted keyspace definitions and migrations. Every write
//! keeps the static table, the wide index tables, the shard locator and
//! the change log coherent by executing what the generator emits as one
//! batch.

mod changelog;
mod connection;
mod read;
mod write;


pub use changelog::{IndexUpdateEntry, IndexUpdateRow, IndexUpdateRowKey};
pub use connection::ConnectionManager;
pub use read::ObjectVisitor;

use crate::{
    config::StrataConfig,
    error::{ErrorClass, InternalError},
    executor::{Executor, ResultSet},
    generator::{CompactionStrategy, CqlGenerator, GenerateError},
    migration::KeyspaceMigrator,
    statement::Statement,
    value::Value,
};
use parking_lot::RwLock;
use std::sync::Arc;
use strata_schema::{definition::ObjectDefinition, keyspace::KeyspaceDefinition};

///
/// ObjectMapper
///
/// Cheap to clone; clones share the executor and the current keyspace
/// definition, so a migration applied through one clone is seen by all.
///

#[derive(Clone)]
pub struct ObjectMapper {
    executor: Executor,
    generator: CqlGenerator,
    system: CqlGenerator,
    keyspace: Arc<RwLock<Arc<KeyspaceDefinition>>>,
}

impl ObjectMapper {
    #[must_use]
    pub fn new(executor: Executor, keyspace: KeyspaceDefinition) -> Self {
        let config = executor.config();
        let generator =
            CqlGenerator::new(keyspace.name()).with_statement_limit(config.statement_limit);
        let system = CqlGenerator::new(config.system_keyspace.clone())
            .with_statement_limit(config.statement_limit);

        Self {
            executor,
            generator,
            system,
            keyspace: Arc::new(RwLock::new(Arc::new(keyspace))),
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn executor(&self) -> &Executor {
        &self.executor
    }

    #[must_use]
    pub fn config(&self) -> &StrataConfig {
        self.executor.config()
    }

    #[must_use]
    pub const fn generator(&self) -> &CqlGenerator {
        &self.generator
    }

    /// Snapshot of the current keyspace definition.
    #[must_use]
    pub fn keyspace_definition(&self) -> Arc<KeyspaceDefinition> {
        self.keyspace.read().clone()
    }

    pub fn set_keyspace_definition(&self, keyspace: KeyspaceDefinition) {
        *self.keyspace.write() = Arc::new(keyspace);
    }

    /// Definition of one object type.
    pub fn definition(&self, object: &str) -> Result<ObjectDefinition, InternalError> {
        self.keyspace_definition()
            .definition(object)
            .cloned()
            .ok_or_else(|| GenerateError::UnknownObject(object.to_string()).into())
    }

    // ------------------------------------------------------------------
    // Keyspace lifecycle
    // ------------------------------------------------------------------

    /// Create the keyspace, the system tables and every object table, then
    /// record the definition. Existing tables are kept unless
    /// `force_rebuild` is set, in which case they are dropped and created
    /// again and the system tables are emptied.
    pub async fn build_keyspace(&self, force_rebuild: bool) -> Result<(), InternalError> {
        let keyspace = self.keyspace_definition();
        tracing::info!(keyspace = keyspace.name(), force_rebuild, "building keyspace");

        // table layouts may change, so no prepared handle survives a rebuild
        self.executor.cache().clear();

        self.create_ignoring_conflict(&self.generator.make_create_keyspace(&keyspace))
            .await?;

        for statement in self.generator.make_create_system_tables() {
            self.create_ignoring_conflict(&statement).await?;
        }
        if force_rebuild {
            for statement in self.generator.make_truncate_system_tables() {
                self.executor.execute(&statement).await?;
            }
        }

        for def in keyspace.definitions() {
            let creates = self.generator.make_create_table(def);
            let drops = self.generator.make_drop_table(def);

            for (create, drop) in creates.iter().zip(&drops) {
                match self.executor.execute(create).await {
                    Ok(_) => {}
                    Err(err) if err.class == ErrorClass::Conflict && force_rebuild => {
                        tracing::debug!(table = create.table(), "rebuilding existing table");
                        self.executor.execute(drop).await?;
                        self.executor.execute(create).await?;
                    }
                    Err(err) if err.class == ErrorClass::Conflict => {
                        tracing::debug!(
                            table = create.table(),
                            "table already exists and will not be updated"
                        );
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        self.persist_keyspace_definition(&keyspace).await?;

        Ok(())
    }

    /// Create the keyspace when missing, otherwise re-apply its replication
    /// settings. Returns whether it was created.
    pub async fn create_keyspace_if_not_exists(&self) -> Result<bool, InternalError> {
        let keyspace = self.keyspace_definition();

        match self
            .executor
            .execute(&self.generator.make_create_keyspace(&keyspace))
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.class == ErrorClass::Conflict => {
                self.executor
                    .execute(&self.generator.make_alter_keyspace(&keyspace))
                    .await?;
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Empty every object table and both system tables.
    pub async fn truncate_tables(&self) -> Result<(), InternalError> {
        let keyspace = self.keyspace_definition();

        let mut statements = Vec::new();
        for def in keyspace.definitions() {
            statements.extend(self.generator.make_truncate_table(def));
        }
        statements.extend(self.generator.make_truncate_system_tables());

        self.execute_all(&statements).await
    }

    pub async fn drop_keyspace(&self) -> Result<(), InternalError> {
        tracing::info!(keyspace = self.generator.keyspace(), "dropping keyspace");
        self.executor
            .execute(&self.generator.make_drop_keyspace())
            .await?;
        self.executor.cache().clear();

        Ok(())
    }

    /// Apply a compaction strategy to the system tables and every object
    /// table.
    pub async fn set_compaction(&self, strategy: CompactionStrategy) -> Result<(), InternalError> {
        let keyspace = self.keyspace_definition();
        let statements = self.generator.make_compaction(&keyspace, strategy);

        self.execute_all(&statements).await
    }

    // ------------------------------------------------------------------
    // Keyspace definitions
    // ------------------------------------------------------------------

    /// Append a snapshot of `keyspace` to the definitions table in the
    /// system keyspace.
    pub async fn persist_keyspace_definition(
        &self,
        keyspace: &KeyspaceDefinition,
    ) -> Result<(), InternalError> {
        self.ensure_definition_store().await?;

        let document = keyspace.to_json()?;
        self.executor
            .execute(
                &self
                    .system
                    .make_insert_keyspace_definition(keyspace.name(), &document),
            )
            .await?;

        Ok(())
    }

    /// Latest persisted snapshot for a keyspace name.
    pub async fn hydrate_keyspace_definition(
        &self,
        name: &str,
    ) -> Result<Option<KeyspaceDefinition>, InternalError> {
        self.ensure_definition_store().await?;

        let result = self
            .executor
            .execute(&self.system.make_get_keyspace_definition(name))
            .await?;
        let Some(document) = result
            .first()
            .and_then(|row| row.get("def"))
            .and_then(Value::as_str)
        else {
            return Ok(None);
        };

        KeyspaceDefinition::from_json(document)
            .map(Some)
            .map_err(|err| {
                InternalError::serialize_corruption(format!(
                    "stored definition for keyspace '{name}' is unreadable: {err}"
                ))
            })
    }

    /// Migrate from the stored definition (or the current one when nothing
    /// is stored) to `next`. With `execute` unset the statements are only
    /// returned. Applying the plan records `next` and makes it current.
    pub async fn run_migration(
        &self,
        next: KeyspaceDefinition,
        execute: bool,
    ) -> Result<Vec<Statement>, InternalError> {
        let current = match self.hydrate_keyspace_definition(next.name()).await? {
            Some(stored) => stored,
            None => self.keyspace_definition().as_ref().clone(),
        };

        let statements =
            KeyspaceMigrator::new(&current, &next).migration_statements(&self.generator)?;
        tracing::info!(
            keyspace = next.name(),
            statements = statements.len(),
            execute,
            "migration planned"
        );

        if execute {
            self.execute_all(&statements).await?;
            self.persist_keyspace_definition(&next).await?;
            self.set_keyspace_definition(next);
        }

        Ok(statements)
    }

    // system keyspace and definitions table, both idempotent
    async fn ensure_definition_store(&self) -> Result<(), InternalError> {
        let keyspace = self.keyspace_definition();

        self.create_ignoring_conflict(&self.system.make_create_keyspace(&keyspace))
            .await?;
        self.create_ignoring_conflict(&self.system.make_create_keyspace_definitions_table())
            .await
    }

    // ------------------------------------------------------------------
    // Execution helpers
    // ------------------------------------------------------------------

    async fn create_ignoring_conflict(&self, statement: &Statement) -> Result<(), InternalError> {
        match self.executor.execute(statement).await {
            Ok(_) => Ok(()),
            Err(err) if err.class == ErrorClass::Conflict => {
                tracing::debug!(table = statement.table(), "already exists");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn execute_all(&self, statements: &[Statement]) -> Result<(), InternalError> {
        for statement in statements {
            self.executor.execute(statement).await?;
        }

        Ok(())
    }

    async fn execute_one(&self, statement: &Statement) -> Result<ResultSet, InternalError> {
        self.executor.execute(statement).await
    }
}

impl std::fmt::Debug for ObjectMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectMapper")
            .field("keyspace", &self.generator.keyspace())
            .field("system", &self.system.keyspace())
            .finish_non_exhaustive()
    }
}
