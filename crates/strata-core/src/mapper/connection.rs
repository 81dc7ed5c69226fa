use super::ObjectMapper;
use crate::{
    config::StrataConfig,
    error::{ErrorClass, ErrorOrigin, InternalError},
    executor::{Executor, Session},
    statement::Statement,
};
use dashmap::DashMap;
use std::sync::Arc;
use strata_schema::keyspace::KeyspaceDefinition;

///
/// ConnectionManager
///
/// Owns one executor over a store session and hands out one mapper per
/// keyspace. Mappers share the executor, so they share the prepared cache
/// and the in-flight request budget.
///

#[derive(Clone)]
pub struct ConnectionManager {
    executor: Executor,
    mappers: Arc<DashMap<String, ObjectMapper>>,
}

impl ConnectionManager {
    pub fn new(session: Arc<dyn Session>, config: StrataConfig) -> Result<Self, InternalError> {
        config.validate()?;
        tracing::info!(
            system_keyspace = %config.system_keyspace,
            statement_limit = config.statement_limit,
            "connection manager ready"
        );

        Ok(Self {
            executor: Executor::new(session, config),
            mappers: Arc::new(DashMap::new()),
        })
    }

    #[must_use]
    pub const fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Build the keyspace from scratch (or over existing tables when
    /// `force_rebuild` is unset) and register its mapper.
    pub async fn build_keyspace(
        &self,
        keyspace: KeyspaceDefinition,
        force_rebuild: bool,
    ) -> Result<ObjectMapper, InternalError> {
        keyspace.validate()?;

        let mapper = ObjectMapper::new(self.executor.clone(), keyspace);
        mapper.build_keyspace(force_rebuild).await?;
        self.register(&mapper);

        Ok(mapper)
    }

    /// Mapper for an existing keyspace. The persisted definition wins over
    /// `keyspace`; when nothing is persisted yet `keyspace` is recorded.
    pub async fn object_mapper(
        &self,
        keyspace: KeyspaceDefinition,
    ) -> Result<ObjectMapper, InternalError> {
        let name = keyspace.name().to_string();
        let mapper = ObjectMapper::new(self.executor.clone(), keyspace.clone());

        match mapper.hydrate_keyspace_definition(&name).await? {
            Some(stored) if stored == keyspace => {}
            Some(stored) => {
                tracing::warn!(
                    keyspace = %name,
                    "supplied keyspace definition differs from the stored one; using the stored definition"
                );
                mapper.set_keyspace_definition(stored);
            }
            None => {
                tracing::warn!(
                    keyspace = %name,
                    "no stored keyspace definition; recording the supplied one"
                );
                mapper.persist_keyspace_definition(&keyspace).await?;
            }
        }

        self.register(&mapper);

        Ok(mapper)
    }

    /// Mapper built from the persisted definition alone.
    pub async fn object_mapper_by_name(&self, name: &str) -> Result<ObjectMapper, InternalError> {
        if let Some(mapper) = self.mappers.get(name) {
            return Ok(mapper.clone());
        }

        let probe = ObjectMapper::new(self.executor.clone(), KeyspaceDefinition::new(name));
        let Some(stored) = probe.hydrate_keyspace_definition(name).await? else {
            return Err(InternalError::new(
                ErrorClass::NotFound,
                ErrorOrigin::Schema,
                format!("no stored definition for keyspace '{name}'"),
            ));
        };

        let mapper = ObjectMapper::new(self.executor.clone(), stored);
        self.register(&mapper);

        Ok(mapper)
    }

    /// Registered mapper for a keyspace, if any.
    #[must_use]
    pub fn mapper(&self, name: &str) -> Option<ObjectMapper> {
        self.mappers.get(name).map(|mapper| mapper.clone())
    }

    /// Migrate a keyspace to `next` through its mapper.
    pub async fn run_migration(
        &self,
        next: KeyspaceDefinition,
        execute: bool,
    ) -> Result<Vec<Statement>, InternalError> {
        next.validate()?;

        let mapper = match self.mapper(next.name()) {
            Some(mapper) => mapper,
            None => self.object_mapper_by_name(next.name()).await?,
        };

        mapper.run_migration(next, execute).await
    }

    pub async fn drop_keyspace(&self, name: &str) -> Result<(), InternalError> {
        let mapper = match self.mappers.remove(name) {
            Some((_, mapper)) => mapper,
            None => ObjectMapper::new(self.executor.clone(), KeyspaceDefinition::new(name)),
        };

        mapper.drop_keyspace().await
    }

    fn register(&self, mapper: &ObjectMapper) {
        self.mappers
            .insert(mapper.generator().keyspace().to_string(), mapper.clone());
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("keyspaces", &self.mappers.len())
            .finish_non_exhaustive()
    }
}
