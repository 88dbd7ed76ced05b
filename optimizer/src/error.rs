//! Error types and result definitions for the data optimizer.
//!
//! [`OptimizerError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, the originating error and the caller location. Worker failures collected by
//! the pipeline are aggregated into a single error holding all of them.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use postgres::error::{SqlxErrorClass, classify_sqlx_error};

use crate::types::Database;

/// Result type used across the crate.
pub type OptimizerResult<T> = Result<T, OptimizerError>;

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the data optimizer.
#[derive(Debug, Clone)]
pub struct OptimizerError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    /// Aggregation of several failures, used when more than one worker fails.
    Many {
        errors: Vec<OptimizerError>,
        location: &'static Location<'static>,
    },
}

/// Categories of failures.
///
/// The categories drive the worker error policy: connectivity kinds pause the workers until the
/// orchestrator sees the database again, [`ErrorKind::OperationCanceled`] ends a worker quietly
/// and every other kind is fatal for the process.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connectivity
    AdapterDatabaseUnavailable,
    OptimizerDatabaseUnavailable,

    // Query & transaction
    AdapterQueryFailed,
    OptimizerQueryFailed,
    AdapterTransactionConflict,
    OptimizerTransactionConflict,

    // Data
    InvalidData,
    SerializationError,
    DeserializationError,

    // Configuration & environment
    ConfigError,
    EnvironmentValidationFailed,

    // State & workflow
    InvalidState,
    OperationCanceled,
    WorkerPanic,

    IoError,
    Unknown,
}

impl ErrorKind {
    /// Returns the connectivity kind of `database`.
    pub fn unavailable(database: Database) -> ErrorKind {
        match database {
            Database::Adapter => ErrorKind::AdapterDatabaseUnavailable,
            Database::Optimizer => ErrorKind::OptimizerDatabaseUnavailable,
        }
    }

    /// Returns the database a connectivity or transaction kind refers to.
    pub fn database(&self) -> Option<Database> {
        match self {
            ErrorKind::AdapterDatabaseUnavailable
            | ErrorKind::AdapterQueryFailed
            | ErrorKind::AdapterTransactionConflict => Some(Database::Adapter),
            ErrorKind::OptimizerDatabaseUnavailable
            | ErrorKind::OptimizerQueryFailed
            | ErrorKind::OptimizerTransactionConflict => Some(Database::Optimizer),
            _ => None,
        }
    }
}

impl OptimizerError {
    /// Returns the [`ErrorKind`] of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => {
                errors.iter().flat_map(|err| err.kinds()).collect()
            }
        }
    }

    /// Returns the dynamic detail, if any.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the captured callsite location.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating error. Has no effect on aggregated errors.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Maps a driver error raised while talking to `database`.
    ///
    /// Connectivity failures become [`ErrorKind::AdapterDatabaseUnavailable`] or
    /// [`ErrorKind::OptimizerDatabaseUnavailable`], serialization and deadlock aborts become the
    /// matching transaction conflict kind and everything else is a query failure.
    #[track_caller]
    pub fn from_sqlx(database: Database, err: sqlx::Error) -> OptimizerError {
        let (kind, description) = match (classify_sqlx_error(&err), database) {
            (SqlxErrorClass::Connectivity, Database::Adapter) => (
                ErrorKind::AdapterDatabaseUnavailable,
                "Adapter database is not reachable",
            ),
            (SqlxErrorClass::Connectivity, Database::Optimizer) => (
                ErrorKind::OptimizerDatabaseUnavailable,
                "Optimizer database is not reachable",
            ),
            (SqlxErrorClass::TransactionConflict, Database::Adapter) => (
                ErrorKind::AdapterTransactionConflict,
                "Adapter database transaction conflicted with a concurrent one",
            ),
            (SqlxErrorClass::TransactionConflict, Database::Optimizer) => (
                ErrorKind::OptimizerTransactionConflict,
                "Optimizer database transaction conflicted with a concurrent one",
            ),
            (SqlxErrorClass::Query, Database::Adapter) => {
                (ErrorKind::AdapterQueryFailed, "Adapter database query failed")
            }
            (SqlxErrorClass::Query, Database::Optimizer) => (
                ErrorKind::OptimizerQueryFailed,
                "Optimizer database query failed",
            ),
        };

        let detail = err.to_string();
        OptimizerError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        OptimizerError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for OptimizerError {
    fn eq(&self, other: &OptimizerError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                )?;

                if let Some(detail) = payload.detail.as_deref() {
                    write_indented(f, "Detail", detail)?;
                }

                let backtrace = payload.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_indented(f, "Backtrace", &backtrace)?;
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

fn write_indented(f: &mut fmt::Formatter<'_>, title: &str, body: &str) -> fmt::Result {
    write!(f, "\n  {title}:")?;
    for line in body.lines() {
        if line.trim().is_empty() {
            write!(f, "\n    ")?;
        } else {
            write!(f, "\n    {line}")?;
        }
    }

    Ok(())
}

impl error::Error for OptimizerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for OptimizerError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> OptimizerError {
        OptimizerError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for OptimizerError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> OptimizerError {
        OptimizerError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Aggregates several errors. A single error is returned unchanged.
impl<E> From<Vec<E>> for OptimizerError
where
    E: Into<OptimizerError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> OptimizerError {
        let location = Location::caller();
        let mut errors: Vec<OptimizerError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        OptimizerError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for OptimizerError {
    #[track_caller]
    fn from(err: std::io::Error) -> OptimizerError {
        let detail = err.to_string();
        OptimizerError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Used by the in-memory stores, which keep rows as JSON documents.
impl From<serde_json::Error> for OptimizerError {
    #[track_caller]
    fn from(err: serde_json::Error) -> OptimizerError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => {
                (ErrorKind::DeserializationError, "JSON deserialization failed")
            }
        };

        let detail = err.to_string();
        OptimizerError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<tokio::task::JoinError> for OptimizerError {
    #[track_caller]
    fn from(err: tokio::task::JoinError) -> OptimizerError {
        let detail = err.to_string();
        OptimizerError::from_components(
            ErrorKind::WorkerPanic,
            Cow::Borrowed("Worker task panicked or was aborted"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer_error;

    #[test]
    fn aggregated_errors_expose_all_kinds() {
        let err = OptimizerError::from(vec![
            optimizer_error!(ErrorKind::InvalidState, "first"),
            optimizer_error!(ErrorKind::AdapterQueryFailed, "second", "with detail"),
        ]);

        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(
            err.kinds(),
            vec![ErrorKind::InvalidState, ErrorKind::AdapterQueryFailed]
        );
        assert_eq!(err.detail(), Some("with detail"));
    }

    #[test]
    fn single_error_vector_is_not_wrapped() {
        let err = OptimizerError::from(vec![optimizer_error!(
            ErrorKind::ConfigError,
            "bad config"
        )]);

        assert_eq!(err.kinds(), vec![ErrorKind::ConfigError]);
        assert!(err.to_string().starts_with("[ConfigError] bad config"));
    }

    #[test]
    fn pool_timeout_maps_to_database_specific_connectivity() {
        let adapter = OptimizerError::from_sqlx(Database::Adapter, sqlx::Error::PoolTimedOut);
        let optimizer = OptimizerError::from_sqlx(Database::Optimizer, sqlx::Error::PoolClosed);

        assert_eq!(adapter.kind(), ErrorKind::AdapterDatabaseUnavailable);
        assert_eq!(optimizer.kind(), ErrorKind::OptimizerDatabaseUnavailable);
        assert_eq!(adapter.kind().database(), Some(Database::Adapter));
    }

    #[test]
    fn row_not_found_is_a_query_failure() {
        let err = OptimizerError::from_sqlx(Database::Optimizer, sqlx::Error::RowNotFound);

        assert_eq!(err.kind(), ErrorKind::OptimizerQueryFailed);
    }
}
