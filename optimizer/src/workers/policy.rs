use crate::error::{ErrorKind, OptimizerError};
use crate::types::Database;

/// How a worker reacts to an error that escaped an iteration.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorHandlingPolicy {
    /// The database stayed unreachable through every retry. The worker reports it, which moves
    /// the service into the waiting state, and resumes once the orchestrator sees the database
    /// again.
    Connectivity(Database),
    /// Shutdown interrupted the iteration. The worker stops quietly.
    Cancellation,
    /// Anything else stops the worker and, through the pipeline, the whole service.
    Fatal,
}

/// Classifies an error escaping a worker iteration.
pub fn build_error_handling_policy(error: &OptimizerError) -> ErrorHandlingPolicy {
    match error.kind() {
        ErrorKind::AdapterDatabaseUnavailable => ErrorHandlingPolicy::Connectivity(Database::Adapter),
        ErrorKind::OptimizerDatabaseUnavailable => {
            ErrorHandlingPolicy::Connectivity(Database::Optimizer)
        }
        ErrorKind::OperationCanceled => ErrorHandlingPolicy::Cancellation,
        _ => ErrorHandlingPolicy::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer_error;

    fn policy(kind: ErrorKind) -> ErrorHandlingPolicy {
        build_error_handling_policy(&optimizer_error!(kind, "test"))
    }

    #[test]
    fn connectivity_errors_name_their_database() {
        assert_eq!(
            policy(ErrorKind::AdapterDatabaseUnavailable),
            ErrorHandlingPolicy::Connectivity(Database::Adapter)
        );
        assert_eq!(
            policy(ErrorKind::OptimizerDatabaseUnavailable),
            ErrorHandlingPolicy::Connectivity(Database::Optimizer)
        );
    }

    #[test]
    fn cancellation_and_everything_else() {
        assert_eq!(
            policy(ErrorKind::OperationCanceled),
            ErrorHandlingPolicy::Cancellation
        );
        assert_eq!(policy(ErrorKind::InvalidData), ErrorHandlingPolicy::Fatal);
        assert_eq!(
            policy(ErrorKind::OptimizerTransactionConflict),
            ErrorHandlingPolicy::Fatal
        );
        assert_eq!(
            policy(ErrorKind::EnvironmentValidationFailed),
            ErrorHandlingPolicy::Fatal
        );
    }
}
