use derive_more::Display;
use serde::{Deserialize, Serialize};
use strata_core::error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Execution(ExecutionErrorKind::Timeout))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Query(QueryErrorKind::NotFound)
                | ErrorKind::Mutation(MutationErrorKind::NotFound)
        )
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let origin = ErrorOrigin::from(err.origin);

        let kind = match (err.class, err.origin) {
            (ErrorClass::Invalid, CoreErrorOrigin::Config) => ErrorKind::Config,
            (ErrorClass::Invalid, _) => ErrorKind::Query(QueryErrorKind::Invalid),
            (ErrorClass::FanOutExceeded, _) => ErrorKind::Query(QueryErrorKind::FanOutExceeded),
            (ErrorClass::NotFound, CoreErrorOrigin::Mapper) => {
                ErrorKind::Mutation(MutationErrorKind::NotFound)
            }
            (ErrorClass::NotFound, _) => ErrorKind::Query(QueryErrorKind::NotFound),
            (ErrorClass::Conflict, _) => ErrorKind::Mutation(MutationErrorKind::Conflict),
            (ErrorClass::Incompatible, _) => ErrorKind::Migration,
            (ErrorClass::Timeout, _) => ErrorKind::Execution(ExecutionErrorKind::Timeout),
            (ErrorClass::Unavailable, _) => ErrorKind::Execution(ExecutionErrorKind::Unavailable),
            (
                ErrorClass::Corruption | ErrorClass::Internal | ErrorClass::InvariantViolation,
                _,
            ) => ErrorKind::Internal,
        };

        Self::new(kind, origin, err.message)
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    Query(QueryErrorKind),
    Mutation(MutationErrorKind),
    Execution(ExecutionErrorKind),

    /// The requested schema change cannot be applied in place.
    Migration,

    /// Configuration document or values are invalid.
    Config,

    /// The caller cannot remediate this.
    Internal,
}

///
/// QueryErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum QueryErrorKind {
    /// Request shape is invalid (unknown type or field, no matching index,
    /// bad value).
    Invalid,

    /// The read would need more statements than the configured ceiling.
    FanOutExceeded,

    NotFound,
}

///
/// MutationErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum MutationErrorKind {
    /// Target object does not exist.
    NotFound,

    /// The object or table already exists.
    Conflict,
}

///
/// ExecutionErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ExecutionErrorKind {
    /// A batch missed its deadline; outstanding statements were cancelled.
    Timeout,

    /// The store rejected or failed one or more statements.
    Unavailable,
}

///
/// ErrorOrigin
/// Public origin taxonomy for callers.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
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

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Executor => Self::Executor,
            CoreErrorOrigin::Generator => Self::Generator,
            CoreErrorOrigin::Iterator => Self::Iterator,
            CoreErrorOrigin::Mapper => Self::Mapper,
            CoreErrorOrigin::Migration => Self::Migration,
            CoreErrorOrigin::Reconcile => Self::Reconcile,
            CoreErrorOrigin::Scan => Self::Scan,
            CoreErrorOrigin::Schema => Self::Schema,
            CoreErrorOrigin::Serialize => Self::Serialize,
            CoreErrorOrigin::Store => Self::Store,
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_timeout_maps_to_execution_timeout() {
        let internal = InternalError::new(ErrorClass::Timeout, CoreErrorOrigin::Executor, "late");
        let err = Error::from(internal);

        assert!(err.is_timeout());
        assert_eq!(err.origin, ErrorOrigin::Executor);
        assert_eq!(err.message, "late");
    }

    #[test]
    fn missing_object_on_update_is_a_mutation_not_found() {
        let internal =
            InternalError::new(ErrorClass::NotFound, CoreErrorOrigin::Mapper, "object not found");
        let err = Error::from(internal);

        assert_eq!(err.kind, ErrorKind::Mutation(MutationErrorKind::NotFound));
        assert!(err.is_not_found());
    }

    #[test]
    fn invalid_config_is_distinguished_from_invalid_queries() {
        let config = Error::from(InternalError::new(
            ErrorClass::Invalid,
            CoreErrorOrigin::Config,
            "zero",
        ));
        let query = Error::from(InternalError::new(
            ErrorClass::Invalid,
            CoreErrorOrigin::Generator,
            "no index",
        ));

        assert_eq!(config.kind, ErrorKind::Config);
        assert_eq!(query.kind, ErrorKind::Query(QueryErrorKind::Invalid));
    }

    #[test]
    fn public_errors_round_trip_through_json() {
        let err = Error::new(
            ErrorKind::Query(QueryErrorKind::FanOutExceeded),
            ErrorOrigin::Generator,
            "needs 60 statements",
        );

        let json = serde_json::to_string(&err).expect("error should serialize");
        let back: Error = serde_json::from_str(&json).expect("error should deserialize");

        assert_eq!(back, err);
    }
}
