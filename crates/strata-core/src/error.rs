use crate::{
    executor::StoreError, generator::GenerateError, migration::MigrationError, scan::ScanError,
    value::ValueError,
};
use std::fmt;
use strata_schema::SchemaError;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; intended for internal use and may change without notice.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `origin`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct an executor-origin internal error.
    pub(crate) fn executor_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Executor, message.into())
    }

    /// Construct a serialize-origin corruption error.
    pub(crate) fn serialize_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Serialize, message.into())
    }

    /// Construct a mapper-origin not-found error.
    pub(crate) fn object_not_found(object: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorClass::NotFound,
            ErrorOrigin::Mapper,
            format!("object not found: {object} {id}"),
        )
    }

    /// Construct a batch failure; the class records whether the deadline
    /// elapsed or individual statements failed.
    pub(crate) fn batch(failure: BatchFailure) -> Self {
        let class = if failure.timed_out {
            ErrorClass::Timeout
        } else {
            ErrorClass::Unavailable
        };

        Self {
            class,
            origin: ErrorOrigin::Executor,
            message: failure.to_string(),
            detail: Some(ErrorDetail::Batch(failure)),
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.class, ErrorClass::Timeout)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class, ErrorClass::NotFound)
    }

    /// Per-statement failures carried by a batch error.
    #[must_use]
    pub fn batch_failures(&self) -> &[StatementFailure] {
        match &self.detail {
            Some(ErrorDetail::Batch(failure)) => &failure.failures,
            _ => &[],
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

impl From<SchemaError> for InternalError {
    fn from(err: SchemaError) -> Self {
        Self::new(ErrorClass::Invalid, ErrorOrigin::Schema, err.to_string())
    }
}

impl From<ValueError> for InternalError {
    fn from(err: ValueError) -> Self {
        Self::new(ErrorClass::Invalid, ErrorOrigin::Serialize, err.to_string())
    }
}

impl From<GenerateError> for InternalError {
    fn from(err: GenerateError) -> Self {
        let class = match err {
            GenerateError::FanOutExceeded { .. } => ErrorClass::FanOutExceeded,
            _ => ErrorClass::Invalid,
        };

        Self::new(class, ErrorOrigin::Generator, err.to_string())
    }
}

impl From<StoreError> for InternalError {
    fn from(err: StoreError) -> Self {
        let class = match err {
            StoreError::AlreadyExists(_) => ErrorClass::Conflict,
            StoreError::Timeout(_) => ErrorClass::Timeout,
            StoreError::Unavailable(_) => ErrorClass::Unavailable,
            StoreError::InvalidQuery(_)
            | StoreError::UnknownPrepared
            | StoreError::Unconfigured(_) => ErrorClass::Invalid,
        };

        Self {
            class,
            origin: ErrorOrigin::Store,
            message: err.to_string(),
            detail: Some(ErrorDetail::Store(err)),
        }
    }
}

impl From<MigrationError> for InternalError {
    fn from(err: MigrationError) -> Self {
        Self::new(
            ErrorClass::Incompatible,
            ErrorOrigin::Migration,
            err.to_string(),
        )
    }
}

impl From<ScanError> for InternalError {
    fn from(err: ScanError) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Scan, err.to_string())
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Batch(BatchFailure),

    #[error("{0}")]
    Store(StoreError),
}

///
/// BatchFailure
///
/// Outcome of a failed asynchronous batch. Failures from sibling statements
/// are collected; a timeout additionally reports how many were cancelled.
///

#[derive(Debug, Default)]
pub struct BatchFailure {
    pub timed_out: bool,
    pub cancelled: usize,
    pub failures: Vec<StatementFailure>,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            write!(
                f,
                "batch timed out with {} statement(s) outstanding",
                self.cancelled
            )?;
        } else {
            write!(f, "batch failed")?;
        }

        if !self.failures.is_empty() {
            write!(f, "; {} statement(s) failed:", self.failures.len())?;
            for failure in &self.failures {
                write!(f, " [{failure}]")?;
            }
        }

        Ok(())
    }
}

///
/// StatementFailure
///

#[derive(Clone, Debug)]
pub struct StatementFailure {
    pub ordinal: usize,
    pub query: String,
    pub message: String,
}

impl fmt::Display for StatementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.ordinal, self.query, self.message)
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Conflict,
    Corruption,
    FanOutExceeded,
    Incompatible,
    Internal,
    Invalid,
    InvariantViolation,
    NotFound,
    Timeout,
    Unavailable,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Conflict => "conflict",
            Self::Corruption => "corruption",
            Self::FanOutExceeded => "fan_out_exceeded",
            Self::Incompatible => "incompatible",
            Self::Internal => "internal",
            Self::Invalid => "invalid",
            Self::InvariantViolation => "invariant_violation",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Config,
    Executor,
    Generator,
    Iterator,
    Mapper,
    Migration,
    Reconcile,
    Scan,
    Schema,
    Serialize,
    Store,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Config => "config",
            Self::Executor => "executor",
            Self::Generator => "generator",
            Self::Iterator => "iterator",
            Self::Mapper => "mapper",
            Self::Migration => "migration",
            Self::Reconcile => "reconcile",
            Self::Scan => "scan",
            Self::Schema => "schema",
            Self::Serialize => "serialize",
            Self::Store => "store",
        };
        write!(f, "{label}")
    }
}
