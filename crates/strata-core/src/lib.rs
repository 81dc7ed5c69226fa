//! Core engine for Strata: values, statement generation, statement
//! iteration, execution, the mutation protocol, index reconciliation,
//! migrations and offline table scans.
//!
//! Writes flow caller → [`mapper`] → [`generator`] → [`executor`] → store.
//! Reads flow back through [`iterator`]. The [`reconcile`] processor runs
//! independently and repairs index drift from the change log.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod error;
pub mod executor;
pub mod generator;
pub mod iterator;
pub mod mapper;
pub mod migration;
pub mod reconcile;
pub mod scan;
pub mod statement;
pub mod store;
pub mod value;

pub use strata_schema as schema;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// CONSTANTS
///

/// Largest LIMIT the store accepts on one statement.
pub const CQL_LIMIT_MAX: i64 = 10_000;

/// Default page size, and the floor for filtered-query limits.
pub const DEFAULT_LIMIT: i64 = 50;

/// Maximum statements one logical read may issue.
pub const STATEMENT_LIMIT: usize = 50;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, executors, stores, serializers, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        generator::{Criteria, SortOrder},
        statement::Statement,
        value::{Row, Value},
    };
    pub use strata_schema::prelude::*;
}
