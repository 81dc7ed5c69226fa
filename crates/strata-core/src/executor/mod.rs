//! Execution layer.
//!
//! Sends statements to a [`Session`], preparing each distinct text once,
//! and runs mutation batches under a shared deadline.

mod cache;
mod session;


pub use cache::PreparedCache;
pub use session::{BatchKind, PreparedId, ResultSet, Session, StoreError};

use crate::{
    config::StrataConfig,
    error::{BatchFailure, InternalError, StatementFailure},
    iterator::BoundedStatementIterator,
    statement::Statement,
};
use futures::future::try_join_all;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::Semaphore,
    task::{JoinHandle, JoinSet},
    time::{Instant, timeout_at},
};

///
/// Executor
///
/// Cheap to clone; clones share the session, the prepared cache and the
/// in-flight request budget.
///

#[derive(Clone)]
pub struct Executor {
    session: Arc<dyn Session>,
    cache: Arc<PreparedCache>,
    config: Arc<StrataConfig>,
    permits: Arc<Semaphore>,
}

impl Executor {
    #[must_use]
    pub fn new(session: Arc<dyn Session>, config: StrataConfig) -> Self {
        let in_flight = usize::try_from(config.pool_limits().max_in_flight_local())
            .unwrap_or(Semaphore::MAX_PERMITS)
            .clamp(1, Semaphore::MAX_PERMITS);

        Self {
            session,
            cache: Arc::new(PreparedCache::new()),
            config: Arc::new(config),
            permits: Arc::new(Semaphore::new(in_flight)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StrataConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &PreparedCache {
        &self.cache
    }

    #[must_use]
    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    // ------------------------------------------------------------------
    // Single statements
    // ------------------------------------------------------------------

    /// Execute one statement and wait for its result. Statements that
    /// cannot be prepared are sent as raw text.
    pub async fn execute(&self, statement: &Statement) -> Result<ResultSet, InternalError> {
        if self.config.log_cql {
            tracing::debug!(table = statement.table(), cql = %statement, "executing statement");
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| InternalError::executor_internal("executor request budget closed"))?;

        let result = if statement.is_preparable() {
            let id = self
                .cache
                .get_or_prepare(self.session.as_ref(), statement.query())
                .await?;
            self.session.execute_prepared(&id, statement.values()).await?
        } else {
            self.session.execute_raw(statement.query()).await?
        };

        Ok(result)
    }

    /// Dispatch one statement on the runtime without waiting.
    #[must_use]
    pub fn submit(&self, statement: Statement) -> JoinHandle<Result<ResultSet, InternalError>> {
        let executor = self.clone();

        tokio::spawn(async move { executor.execute(&statement).await })
    }

    /// Prepare every preparable statement ahead of first use, concurrently.
    /// Returns the number of distinct texts now cached.
    pub async fn pre_prepare<'a, I>(&self, statements: I) -> Result<usize, InternalError>
    where
        I: IntoIterator<Item = &'a Statement>,
    {
        let prepares = statements
            .into_iter()
            .filter(|s| s.is_preparable())
            .map(|statement| {
                self.cache
                    .get_or_prepare(self.session.as_ref(), statement.query())
            });
        try_join_all(prepares).await?;

        Ok(self.cache.len())
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    /// Run every statement of the iterators as one batch.
    ///
    /// Statements are dispatched concurrently under one deadline of
    /// `batch_timeout`. On expiry the outstanding statements are aborted
    /// and the error is classed `Timeout`; otherwise individual failures
    /// are collected without cancelling siblings and reported together.
    pub async fn execute_batch(
        &self,
        iterators: Vec<BoundedStatementIterator>,
    ) -> Result<(), InternalError> {
        let batch = BoundedStatementIterator::condense(iterators);
        if batch.is_empty() {
            return Ok(());
        }

        if !self.config.execute_async {
            return self.execute_sync_batch(vec![batch]).await;
        }
        if self.config.use_logged_batches && batch.all_preparable() {
            return self.execute_logged(batch).await;
        }

        let deadline = Instant::now() + self.config.batch_timeout();
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();

        for (ordinal, statement) in batch.into_statements().into_iter().enumerate() {
            let executor = self.clone();
            let query = statement.query().to_string();
            let handle = tasks.spawn(async move { executor.execute(&statement).await });
            pending.insert(handle.id(), (ordinal, query));
        }

        let mut failure = BatchFailure::default();
        loop {
            match timeout_at(deadline, tasks.join_next_with_id()).await {
                Ok(None) => break,
                Ok(Some(Ok((id, result)))) => {
                    let slot = pending.remove(&id);
                    if let (Err(err), Some((ordinal, query))) = (result, slot) {
                        tracing::warn!(ordinal, %query, error = %err, "batch statement failed");
                        failure.failures.push(StatementFailure {
                            ordinal,
                            query,
                            message: err.to_string(),
                        });
                    }
                }
                Ok(Some(Err(err))) => {
                    if let Some((ordinal, query)) = pending.remove(&err.id()) {
                        failure.failures.push(StatementFailure {
                            ordinal,
                            query,
                            message: err.to_string(),
                        });
                    }
                }
                Err(_) => {
                    failure.timed_out = true;
                    failure.cancelled = tasks.len();
                    tasks.abort_all();
                    tracing::warn!(
                        cancelled = failure.cancelled,
                        timeout_ms = self.config.batch_timeout_millis,
                        "batch deadline elapsed"
                    );
                    break;
                }
            }
        }

        if failure.timed_out || !failure.failures.is_empty() {
            failure.failures.sort_by_key(|f| f.ordinal);
            return Err(InternalError::batch(failure));
        }

        Ok(())
    }

    /// Run the statements one after another, stopping at the first failure.
    pub async fn execute_sync_batch(
        &self,
        iterators: Vec<BoundedStatementIterator>,
    ) -> Result<(), InternalError> {
        for statement in BoundedStatementIterator::condense(iterators).into_statements() {
            self.execute(&statement).await?;
        }

        Ok(())
    }

    // single logged batch at the store
    async fn execute_logged(&self, batch: BoundedStatementIterator) -> Result<(), InternalError> {
        let deadline = Instant::now() + self.config.batch_timeout();

        let mut prepared = Vec::with_capacity(batch.len());
        for statement in batch.into_statements() {
            if self.config.log_cql {
                tracing::debug!(table = statement.table(), cql = %statement, "batching statement");
            }
            let id = self
                .cache
                .get_or_prepare(self.session.as_ref(), statement.query())
                .await?;
            prepared.push((id, statement.values().to_vec()));
        }

        let count = prepared.len();
        match timeout_at(
            deadline,
            self.session.execute_batch(BatchKind::Logged, prepared),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(statements = count, "logged batch deadline elapsed");
                Err(InternalError::batch(BatchFailure {
                    timed_out: true,
                    cancelled: count,
                    failures: Vec::new(),
                }))
            }
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("prepared", &self.cache.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
