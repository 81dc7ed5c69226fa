//! In-memory store.
//!
//! Interprets the statement subset the generator emits against ordered
//! in-process tables: partitions in token order, rows clustered by key,
//! row-level write timestamps with delete tombstones, and TTL expiry.
//! Unstamped writes take the wall clock in microseconds; a delete wins a
//! tie with a write at the same timestamp. It
//! exists so the engine's behaviour can be exercised without a cluster.

mod parse;
mod table;

#[cfg(test)]
mod tests;

use crate::{
    executor::{BatchKind, PreparedId, ResultSet, Session, StoreError},
    value::{Row, SortKey, Value, token},
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use parse::{Command, Condition, Op, Operand, Projection, Rhs, TableRef, Term};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
    },
    time::Duration,
};
use strata_schema::{timeuuid, types::FieldType};
use table::{PartitionKey, StoredRow, Table};
use xxhash_rust::xxh3::xxh3_64;

///
/// Prepared
///

#[derive(Debug)]
struct Prepared {
    query: String,
    command: Arc<Command>,
    placeholders: usize,
}

///
/// Fault
///

#[derive(Clone, Debug)]
enum FaultKind {
    Fail,
    Delay(Duration),
}

#[derive(Debug)]
struct Fault {
    pattern: String,
    remaining: usize,
    kind: FaultKind,
}

type Keyspace = BTreeMap<String, Table>;

///
/// MemoryStore
///

#[derive(Debug, Default)]
pub struct MemoryStore {
    keyspaces: RwLock<BTreeMap<String, Keyspace>>,
    prepared: RwLock<HashMap<PreparedId, Prepared>>,
    prepares: AtomicUsize,
    writes: AtomicUsize,
    log: Mutex<Vec<String>>,
    faults: Mutex<Vec<Fault>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    #[must_use]
    pub fn has_keyspace(&self, keyspace: &str) -> bool {
        self.keyspaces.read().contains_key(keyspace)
    }

    #[must_use]
    pub fn has_table(&self, keyspace: &str, table: &str) -> bool {
        self.keyspaces
            .read()
            .get(keyspace)
            .is_some_and(|tables| tables.contains_key(table))
    }

    /// Every live row of a table, keys included, in storage order.
    #[must_use]
    pub fn rows(&self, keyspace: &str, table: &str) -> Vec<Row> {
        let now = wall_micros();
        let keyspaces = self.keyspaces.read();
        let Some(table) = keyspaces.get(keyspace).and_then(|tables| tables.get(table)) else {
            return Vec::new();
        };

        table
            .partitions
            .iter()
            .flat_map(|(key, partition)| {
                partition
                    .rows
                    .iter()
                    .filter(|(_, row)| row.is_live(now))
                    .map(move |(clustering, row)| full_row(table, key, clustering, row))
            })
            .collect()
    }

    /// Executed INSERT and DELETE statements.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(AtomicOrdering::Relaxed)
    }

    #[must_use]
    pub fn prepare_count(&self) -> usize {
        self.prepares.load(AtomicOrdering::Relaxed)
    }

    #[must_use]
    pub fn statement_log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn reset_counters(&self) {
        self.writes.store(0, AtomicOrdering::Relaxed);
        self.prepares.store(0, AtomicOrdering::Relaxed);
        self.log.lock().clear();
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// Fail the next `times` statements whose text contains `pattern`.
    pub fn fail_next(&self, pattern: impl Into<String>, times: usize) {
        self.faults.lock().push(Fault {
            pattern: pattern.into(),
            remaining: times,
            kind: FaultKind::Fail,
        });
    }

    /// Delay the next `times` statements whose text contains `pattern`.
    pub fn delay_next(&self, pattern: impl Into<String>, delay: Duration, times: usize) {
        self.faults.lock().push(Fault {
            pattern: pattern.into(),
            remaining: times,
            kind: FaultKind::Delay(delay),
        });
    }

    async fn inject(&self, query: &str) -> Result<(), StoreError> {
        let kind = {
            let mut faults = self.faults.lock();
            let fault = faults
                .iter_mut()
                .find(|f| f.remaining > 0 && query.contains(&f.pattern));

            fault.map(|f| {
                f.remaining -= 1;
                f.kind.clone()
            })
        };

        match kind {
            Some(FaultKind::Fail) => Err(StoreError::Unavailable(format!(
                "injected failure for {query}"
            ))),
            Some(FaultKind::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    fn run(
        &self,
        command: &Command,
        binds: &[Value],
        query: &str,
    ) -> Result<ResultSet, StoreError> {
        self.log.lock().push(query.to_string());
        if command.is_write() {
            self.writes.fetch_add(1, AtomicOrdering::Relaxed);
        }

        match command {
            Command::AlterKeyspace => Ok(ResultSet::empty()),

            Command::CreateKeyspace {
                name,
                if_not_exists,
            } => {
                let mut keyspaces = self.keyspaces.write();
                if keyspaces.contains_key(name) {
                    if *if_not_exists {
                        return Ok(ResultSet::empty());
                    }
                    return Err(StoreError::AlreadyExists(name.clone()));
                }
                keyspaces.insert(name.clone(), Keyspace::new());

                Ok(ResultSet::empty())
            }

            Command::DropKeyspace { name, if_exists } => {
                if self.keyspaces.write().remove(name).is_none() && !*if_exists {
                    return Err(StoreError::InvalidQuery(format!(
                        "keyspace {name} does not exist"
                    )));
                }

                Ok(ResultSet::empty())
            }

            Command::CreateTable {
                table,
                if_not_exists,
                columns,
                partition_key,
                clustering_key,
            } => {
                let keyspace = keyspace_of(table)?;
                let mut keyspaces = self.keyspaces.write();
                let tables = keyspaces.get_mut(keyspace).ok_or_else(|| {
                    StoreError::InvalidQuery(format!("keyspace {keyspace} does not exist"))
                })?;

                if tables.contains_key(&table.name) {
                    if *if_not_exists {
                        return Ok(ResultSet::empty());
                    }
                    return Err(StoreError::AlreadyExists(format!(
                        "{keyspace}.{}",
                        table.name
                    )));
                }

                let declared = |key: &String| columns.iter().any(|(c, _)| c == key);
                if let Some(key) = partition_key
                    .iter()
                    .chain(clustering_key)
                    .find(|key| !declared(*key))
                {
                    return Err(StoreError::InvalidQuery(format!(
                        "unknown key column {key}"
                    )));
                }

                tables.insert(
                    table.name.clone(),
                    Table::new(columns.clone(), partition_key.clone(), clustering_key.clone()),
                );

                Ok(ResultSet::empty())
            }

            Command::AlterTableAdd { table, column } => self.with_table(table, |t| {
                if t.column_type(&column.0).is_some() {
                    return Err(StoreError::InvalidQuery(format!(
                        "column {} already exists",
                        column.0
                    )));
                }
                t.columns.push(column.clone());

                Ok(ResultSet::empty())
            }),

            Command::AlterTableOptions { table } => {
                self.with_table(table, |_| Ok(ResultSet::empty()))
            }

            Command::DropTable { table, if_exists } => {
                let keyspace = keyspace_of(table)?;
                let removed = self
                    .keyspaces
                    .write()
                    .get_mut(keyspace)
                    .and_then(|tables| tables.remove(&table.name));

                if removed.is_none() && !*if_exists {
                    return Err(StoreError::Unconfigured(format!(
                        "{keyspace}.{}",
                        table.name
                    )));
                }

                Ok(ResultSet::empty())
            }

            Command::Truncate { table } => self.with_table(table, |t| {
                t.truncate();
                Ok(ResultSet::empty())
            }),

            Command::Insert {
                table,
                columns,
                values,
                ttl,
                timestamp,
            } => {
                let written_at = match timestamp {
                    Some(term) => resolve_i64(term, binds)?,
                    None => wall_micros(),
                };
                let expires_at = match ttl {
                    Some(term) => {
                        let seconds = resolve_i64(term, binds)?;
                        (seconds > 0).then(|| wall_micros() + seconds * 1_000_000)
                    }
                    None => None,
                };

                self.with_table(table, |t| {
                    insert(t, columns, values, binds, written_at, expires_at)?;
                    Ok(ResultSet::empty())
                })
            }

            Command::Delete {
                table,
                timestamp,
                conditions,
            } => {
                let deleted_at = match timestamp {
                    Some(term) => resolve_i64(term, binds)?,
                    None => wall_micros(),
                };

                self.with_table(table, |t| {
                    delete(t, conditions, binds, deleted_at)?;
                    Ok(ResultSet::empty())
                })
            }

            Command::Select {
                table,
                projection,
                conditions,
                descending,
                limit,
            } => {
                let keyspace = keyspace_of(table)?;
                let keyspaces = self.keyspaces.read();
                let t = keyspaces
                    .get(keyspace)
                    .and_then(|tables| tables.get(&table.name))
                    .ok_or_else(|| {
                        StoreError::Unconfigured(format!("{keyspace}.{}", table.name))
                    })?;

                let limit = match limit {
                    Some(term) => usize::try_from(resolve_i64(term, binds)?).unwrap_or(0),
                    None => usize::MAX,
                };

                select(t, projection, conditions, binds, descending.unwrap_or(false), limit)
            }
        }
    }

    fn with_table<T>(
        &self,
        table: &TableRef,
        f: impl FnOnce(&mut Table) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let keyspace = keyspace_of(table)?;
        let mut keyspaces = self.keyspaces.write();
        let t = keyspaces
            .get_mut(keyspace)
            .and_then(|tables| tables.get_mut(&table.name))
            .ok_or_else(|| StoreError::Unconfigured(format!("{keyspace}.{}", table.name)))?;

        f(t)
    }

    fn lookup(&self, id: &PreparedId) -> Result<(String, Arc<Command>, usize), StoreError> {
        self.prepared
            .read()
            .get(id)
            .map(|p| (p.query.clone(), p.command.clone(), p.placeholders))
            .ok_or(StoreError::UnknownPrepared)
    }
}

#[async_trait]
impl Session for MemoryStore {
    async fn prepare(&self, query: &str) -> Result<PreparedId, StoreError> {
        let (command, placeholders) = parse::parse(query)?;
        let id = PreparedId::new(xxh3_64(query.as_bytes()).to_be_bytes().to_vec());

        self.prepares.fetch_add(1, AtomicOrdering::Relaxed);
        self.prepared.write().insert(
            id.clone(),
            Prepared {
                query: query.to_string(),
                command: Arc::new(command),
                placeholders,
            },
        );

        Ok(id)
    }

    async fn execute_prepared(
        &self,
        id: &PreparedId,
        values: &[Value],
    ) -> Result<ResultSet, StoreError> {
        let (query, command, placeholders) = self.lookup(id)?;
        if values.len() != placeholders {
            return Err(StoreError::InvalidQuery(format!(
                "expected {placeholders} bound values, got {}",
                values.len()
            )));
        }

        self.inject(&query).await?;
        self.run(&command, values, &query)
    }

    async fn execute_raw(&self, query: &str) -> Result<ResultSet, StoreError> {
        let (command, placeholders) = parse::parse(query)?;
        if placeholders > 0 {
            return Err(StoreError::InvalidQuery(
                "raw statements cannot carry bind markers".to_string(),
            ));
        }

        self.inject(query).await?;
        self.run(&command, &[], query)
    }

    async fn execute_batch(
        &self,
        _kind: BatchKind,
        statements: Vec<(PreparedId, Vec<Value>)>,
    ) -> Result<(), StoreError> {
        let mut resolved = Vec::with_capacity(statements.len());
        for (id, values) in statements {
            let (query, command, _) = self.lookup(&id)?;
            self.inject(&query).await?;
            resolved.push((query, command, values));
        }

        for (query, command, values) in resolved {
            self.run(&command, &values, &query)?;
        }

        Ok(())
    }
}

// ======================================================================
// Statement evaluation
// ======================================================================

fn wall_micros() -> i64 {
    timeuuid::now_unix_nanos() / 1_000
}

fn keyspace_of(table: &TableRef) -> Result<&str, StoreError> {
    table
        .keyspace
        .as_deref()
        .ok_or_else(|| StoreError::InvalidQuery(format!("no keyspace for table {}", table.name)))
}

fn resolve(term: &Term, binds: &[Value], target: FieldType) -> Result<Value, StoreError> {
    let value = match term {
        Term::Placeholder(i) => binds
            .get(*i)
            .cloned()
            .ok_or_else(|| StoreError::InvalidQuery(format!("missing bound value {i}")))?,
        Term::Literal { raw, quoted } => {
            if !quoted && raw.eq_ignore_ascii_case("null") {
                Value::Null
            } else {
                Value::Text(raw.clone())
            }
        }
    };

    value
        .coerce(target)
        .map_err(|err| StoreError::InvalidQuery(err.to_string()))
}

fn resolve_i64(term: &Term, binds: &[Value]) -> Result<i64, StoreError> {
    resolve(term, binds, FieldType::BigInt)?
        .as_i64()
        .ok_or_else(|| StoreError::InvalidQuery("expected an integer".to_string()))
}

fn column_type(table: &Table, column: &str) -> Result<FieldType, StoreError> {
    table
        .column_type(column)
        .ok_or_else(|| StoreError::InvalidQuery(format!("undefined column {column}")))
}

fn full_row(table: &Table, key: &PartitionKey, clustering: &[SortKey], row: &StoredRow) -> Row {
    let mut full = row.cells.clone();
    for (name, SortKey(value)) in table.partition_key.iter().zip(&key.values) {
        full.insert(name.clone(), value.clone());
    }
    for (name, SortKey(value)) in table.clustering_key.iter().zip(clustering) {
        full.insert(name.clone(), value.clone());
    }

    full
}

fn insert(
    table: &mut Table,
    columns: &[String],
    terms: &[Term],
    binds: &[Value],
    written_at: i64,
    expires_at: Option<i64>,
) -> Result<(), StoreError> {
    let mut cells = Row::new();
    for (column, term) in columns.iter().zip(terms) {
        let value = resolve(term, binds, column_type(table, column)?)?;
        cells.insert(column.clone(), value);
    }

    let mut key_value = |name: &String| {
        cells
            .remove(name)
            .filter(|v| !v.is_null())
            .ok_or_else(|| StoreError::InvalidQuery(format!("missing key column {name}")))
    };

    let partition = table
        .partition_key
        .clone()
        .iter()
        .map(&mut key_value)
        .collect::<Result<Vec<_>, _>>()?;
    let clustering = table
        .clustering_key
        .clone()
        .iter()
        .map(&mut key_value)
        .collect::<Result<Vec<_>, _>>()?;

    table.upsert(
        PartitionKey::new(partition),
        clustering.into_iter().map(SortKey).collect(),
        cells,
        written_at,
        expires_at,
    );

    Ok(())
}

fn delete(
    table: &mut Table,
    conditions: &[Condition],
    binds: &[Value],
    deleted_at: i64,
) -> Result<(), StoreError> {
    let mut equalities = HashMap::new();
    for condition in conditions {
        let (Operand::Column(column), Op::Eq, Rhs::Term(term)) =
            (&condition.lhs, condition.op, &condition.rhs)
        else {
            return Err(StoreError::InvalidQuery(
                "deletes support only column equality".to_string(),
            ));
        };
        let value = resolve(term, binds, column_type(table, column)?)?;
        equalities.insert(column.clone(), value);
    }

    let partition = table
        .partition_key
        .iter()
        .map(|name| {
            equalities.get(name).cloned().ok_or_else(|| {
                StoreError::InvalidQuery(format!("missing partition key column {name}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let clustering: Vec<(usize, Value)> = table
        .clustering_key
        .iter()
        .enumerate()
        .filter_map(|(i, name)| equalities.get(name).map(|v| (i, v.clone())))
        .collect();

    let exact = (clustering.len() == table.clustering_key.len())
        .then(|| clustering.iter().map(|(_, v)| SortKey(v.clone())).collect());

    table.delete(
        &PartitionKey::new(partition),
        exact,
        |key, _| {
            clustering.iter().all(|(i, expected)| {
                key.get(*i).is_some_and(|SortKey(actual)| {
                    SortKey::compare(actual, expected) == Ordering::Equal
                })
            })
        },
        deleted_at,
    );

    Ok(())
}

///
/// Filter
///

enum Filter {
    Column { name: String, op: Op, value: Value },
    Token { op: Op, value: i64 },
}

impl Filter {
    fn compile(table: &Table, condition: &Condition, binds: &[Value]) -> Result<Self, StoreError> {
        match (&condition.lhs, &condition.rhs) {
            (Operand::Column(name), Rhs::Term(term)) => Ok(Self::Column {
                name: name.clone(),
                op: condition.op,
                value: resolve(term, binds, column_type(table, name)?)?,
            }),

            (Operand::Token(columns), rhs) => {
                if columns != &table.partition_key {
                    return Err(StoreError::InvalidQuery(
                        "token() must cover the partition key".to_string(),
                    ));
                }

                let value = match rhs {
                    Rhs::Token(terms) => {
                        let values = columns
                            .iter()
                            .zip(terms)
                            .map(|(column, term)| resolve(term, binds, column_type(table, column)?))
                            .collect::<Result<Vec<_>, _>>()?;
                        token(&values)
                    }
                    Rhs::Term(term) => resolve_i64(term, binds)?,
                };

                Ok(Self::Token {
                    op: condition.op,
                    value,
                })
            }

            (Operand::Column(_), Rhs::Token(_)) => Err(StoreError::InvalidQuery(
                "token() compared with a column".to_string(),
            )),
        }
    }
}

const fn satisfies(ordering: Ordering, op: Op) -> bool {
    match op {
        Op::Eq => matches!(ordering, Ordering::Equal),
        Op::Gt => matches!(ordering, Ordering::Greater),
        Op::Ge => !matches!(ordering, Ordering::Less),
        Op::Lt => matches!(ordering, Ordering::Less),
        Op::Le => !matches!(ordering, Ordering::Greater),
    }
}

fn select(
    table: &Table,
    projection: &Projection,
    conditions: &[Condition],
    binds: &[Value],
    descending: bool,
    limit: usize,
) -> Result<ResultSet, StoreError> {
    let filters = conditions
        .iter()
        .map(|c| Filter::compile(table, c, binds))
        .collect::<Result<Vec<_>, _>>()?;

    // a fully pinned partition key is a direct lookup
    let pinned: Option<Vec<Value>> = table
        .partition_key
        .iter()
        .map(|name| {
            filters.iter().find_map(|f| match f {
                Filter::Column {
                    name: column,
                    op: Op::Eq,
                    value,
                } if column == name => Some(value.clone()),
                _ => None,
            })
        })
        .collect();

    let partitions: Vec<_> = match pinned {
        Some(values) => {
            let key = PartitionKey::new(values);
            table
                .partitions
                .get_key_value(&key)
                .into_iter()
                .collect()
        }
        None => table.partitions.iter().collect(),
    };

    let now = wall_micros();
    let mut matched = Vec::new();

    'partitions: for (key, partition) in partitions {
        let token_ok = filters.iter().all(|f| match f {
            Filter::Token { op, value } => satisfies(key.token.cmp(value), *op),
            Filter::Column { .. } => true,
        });
        if !token_ok {
            continue;
        }

        let rows: Box<dyn Iterator<Item = _>> = if descending {
            Box::new(partition.rows.iter().rev())
        } else {
            Box::new(partition.rows.iter())
        };

        for (clustering, row) in rows {
            if !row.is_live(now) {
                continue;
            }

            let full = full_row(table, key, clustering, row);
            let keep = filters.iter().all(|f| match f {
                Filter::Column { name, op, value } => full
                    .get(name)
                    .is_some_and(|actual| satisfies(SortKey::compare(actual, value), *op)),
                Filter::Token { .. } => true,
            });

            if keep {
                matched.push(full);
                if matched.len() >= limit {
                    break 'partitions;
                }
            }
        }
    }

    let result = match projection {
        Projection::All => ResultSet::new(
            table.columns.iter().map(|(name, _)| name.clone()).collect(),
            matched,
        ),
        Projection::Count => {
            let count = i64::try_from(matched.len()).unwrap_or(i64::MAX);
            let row: Row = [("count".to_string(), Value::BigInt(count))].into_iter().collect();
            ResultSet::new(vec!["count".to_string()], vec![row])
        }
        Projection::Columns(columns) => {
            let rows = matched
                .into_iter()
                .map(|mut full| {
                    columns
                        .iter()
                        .filter_map(|c| full.remove_entry(c))
                        .collect::<Row>()
                })
                .collect();
            ResultSet::new(columns.clone(), rows)
        }
    };

    Ok(result)
}
