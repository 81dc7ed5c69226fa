//! ## Crate layout
//! - `core`: values, statement generation and iteration, execution, the
//!   object mapper, reconciliation, migrations and table scans.
//! - `schema`: field types, indexes, sharding and keyspace definitions.
//! - `error`: the public error type with a stable kind taxonomy.
//!
//! The `prelude` module carries the vocabulary most callers need to define
//! a keyspace and read and write objects through an [`ObjectMapper`].

pub use strata_core as core;
pub use strata_schema as schema;

pub mod error;


//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//
// Entry points
//

pub use core::{
    config::StrataConfig,
    mapper::{ConnectionManager, ObjectMapper},
    reconcile::UpdateProcessor,
    scan::TableScanner,
};
pub use error::Error;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        core::{
            config::StrataConfig,
            generator::{Criteria, SortOrder},
            mapper::{ConnectionManager, ObjectMapper, ObjectVisitor},
            value::{Row, Value},
        },
        error::{Error, ErrorKind},
    };
    pub use strata_schema::prelude::*;
}
