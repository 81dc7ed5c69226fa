//! Offline table scans.
//!
//! Splits the token ring into contiguous ranges and pages through a static
//! table one range per task. Each partition can checkpoint the last id it
//! visited to a cursor file so an interrupted scan picks up where it
//! stopped.

mod cursor;

#[cfg(test)]
mod tests;

pub use cursor::ResumeCursor;

use crate::{
    error::InternalError, iterator::PagedRows, mapper::ObjectMapper, statement::Statement,
    value::Row,
};
use std::{collections::HashMap, ops::RangeInclusive, path::PathBuf, sync::Arc};
use strata_schema::definition::ObjectDefinition;
use thiserror::Error as ThisError;
use tokio::task::JoinSet;

///
/// CONSTANTS
///

pub const DEFAULT_BATCH_SIZE: i64 = 200;
pub const DEFAULT_RETRIES: usize = 5;

/// Objects between progress log lines.
const PROGRESS_EVERY: u64 = 1_000;

///
/// ScanError
///

#[derive(Debug, ThisError)]
pub enum ScanError {
    #[error("corrupt resume cursor {path}: {reason}")]
    CorruptCursor { path: PathBuf, reason: String },

    #[error("resume cursor {path}: {source}")]
    Cursor {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a scan needs at least one partition")]
    NoPartitions,

    #[error("scan partition {partition} aborted: {message}")]
    PartitionAborted { partition: usize, message: String },
}

///
/// TokenVisitor
///
/// Receives the objects of one scan partition, in token order.
///

pub trait TokenVisitor: Send {
    fn visit(&mut self, row: &Row);

    /// Called once the partition has been read to its end.
    fn on_complete(&mut self) {}
}

///
/// ScanReport
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanReport {
    pub visited: u64,
    pub partitions: usize,
}

///
/// make_ranges
///
/// Split the full token ring into `partitions` contiguous inclusive ranges.
/// The last range absorbs the remainder and always ends at `i64::MAX`.
///

pub fn make_ranges(partitions: usize) -> Result<Vec<RangeInclusive<i64>>, ScanError> {
    if partitions == 0 {
        return Err(ScanError::NoPartitions);
    }

    let span = i128::from(i64::MAX) - i128::from(i64::MIN) + 1;
    let count = i128::try_from(partitions).unwrap_or(i128::MAX);
    let width = (span / count).max(1);

    let mut ranges = Vec::with_capacity(partitions);
    let mut start = i128::from(i64::MIN);
    for n in 0..partitions {
        let end = if n + 1 == partitions {
            i128::from(i64::MAX)
        } else {
            (start + width - 1).min(i128::from(i64::MAX))
        };
        ranges.push(clamp(start)..=clamp(end));
        start = end + 1;
    }

    Ok(ranges)
}

fn clamp(token: i128) -> i64 {
    i64::try_from(token).unwrap_or(if token < 0 { i64::MIN } else { i64::MAX })
}

///
/// TableScanner
///

#[derive(Clone, Debug)]
pub struct TableScanner {
    mapper: ObjectMapper,
    object: String,
    partitions: usize,
    batch_size: i64,
    retries: usize,
    resume_dir: Option<PathBuf>,
}

impl TableScanner {
    #[must_use]
    pub fn new(mapper: ObjectMapper, object: impl Into<String>, partitions: usize) -> Self {
        Self {
            mapper,
            object: object.into(),
            partitions,
            batch_size: DEFAULT_BATCH_SIZE,
            retries: DEFAULT_RETRIES,
            resume_dir: None,
        }
    }

    /// Checkpoint each partition under `dir`, and resume from any
    /// checkpoints already there.
    #[must_use]
    pub fn with_resume_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resume_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Extra attempts per failed page; zero fails on the first error.
    #[must_use]
    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Visit every object once, one task per token range. `visitors` is
    /// asked for one visitor per partition, numbered from zero.
    pub async fn scan<F, V>(&self, mut visitors: F) -> Result<ScanReport, InternalError>
    where
        F: FnMut(usize) -> V,
        V: TokenVisitor + 'static,
    {
        let def = Arc::new(self.mapper.definition(&self.object)?);
        let ranges = make_ranges(self.partitions)?;
        tracing::info!(
            object = %self.object,
            partitions = ranges.len(),
            batch_size = self.batch_size,
            resume = self.resume_dir.is_some(),
            "table scan started"
        );

        let mut tasks = JoinSet::new();
        let mut partitions = HashMap::new();
        for (partition, range) in ranges.into_iter().enumerate() {
            let worker = PartitionScan {
                mapper: self.mapper.clone(),
                def: def.clone(),
                partition,
                range,
                batch_size: self.batch_size,
                retries: self.retries,
                cursor: self
                    .resume_dir
                    .as_deref()
                    .map(|dir| ResumeCursor::new(dir, &self.object, partition)),
            };
            let visitor = visitors(partition);

            let handle = tasks.spawn(worker.run(visitor));
            partitions.insert(handle.id(), partition);
        }

        let mut report = ScanReport::default();
        while let Some(joined) = tasks.join_next().await {
            let visited = joined.map_err(|err| ScanError::PartitionAborted {
                partition: partitions.get(&err.id()).copied().unwrap_or_default(),
                message: err.to_string(),
            })??;

            report.visited += visited;
            report.partitions += 1;
        }

        tracing::info!(
            object = %self.object,
            visited = report.visited,
            "table scan complete"
        );

        Ok(report)
    }
}

///
/// PartitionScan
///

struct PartitionScan {
    mapper: ObjectMapper,
    def: Arc<ObjectDefinition>,
    partition: usize,
    range: RangeInclusive<i64>,
    batch_size: i64,
    retries: usize,
    cursor: Option<ResumeCursor>,
}

impl PartitionScan {
    async fn run<V: TokenVisitor>(self, mut visitor: V) -> Result<u64, InternalError> {
        let resume_after = match &self.cursor {
            Some(cursor) => cursor.load(self.def.primary_key_type()).await?,
            None => None,
        };
        if let Some(id) = &resume_after {
            tracing::info!(
                partition = self.partition,
                id = %id.to_index_string(),
                "resuming scan partition"
            );
        }

        let mut pages = PagedRows::new(
            self.mapper.generator().clone(),
            self.def.clone(),
            *self.range.start(),
            *self.range.end(),
        )
        .with_page_size(self.batch_size)
        .resume_after(resume_after);

        let mut visited = 0u64;
        while let Some(statement) = pages.next_statement() {
            let rows = self.fetch(&statement).await?;
            let page = pages.accept(rows);

            for row in &page {
                visitor.visit(row);
                visited += 1;
                if visited % PROGRESS_EVERY == 0 {
                    tracing::info!(partition = self.partition, visited, "scan progress");
                }
            }

            if let (Some(cursor), Some(id)) = (&self.cursor, pages.last_id()) {
                cursor.record(id).await?;
            }
        }

        visitor.on_complete();
        tracing::debug!(partition = self.partition, visited, "scan partition complete");

        Ok(visited)
    }

    async fn fetch(&self, statement: &Statement) -> Result<Vec<Row>, InternalError> {
        let mut attempt = 0;

        loop {
            match self.mapper.executor().execute(statement).await {
                Ok(result) => return Ok(result.into_rows()),
                Err(err) => {
                    attempt += 1;
                    tracing::warn!(
                        partition = self.partition,
                        attempt,
                        error = %err,
                        "scan page failed"
                    );
                    if attempt > self.retries {
                        return Err(err);
                    }
                }
            }
        }
    }
}
