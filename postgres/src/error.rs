/// Coarse classification of a [`sqlx::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlxErrorClass {
    /// The database could not be reached or dropped the session.
    Connectivity,
    /// The transaction lost a serialization or deadlock race and can be replayed.
    TransactionConflict,
    /// Any other failure, such as a constraint violation or a malformed query.
    Query,
}

/// SQLSTATE codes reported when the server is shutting down or not accepting connections.
const UNAVAILABLE_SQLSTATES: &[&str] = &["57P01", "57P02", "57P03", "53300"];

/// SQLSTATE codes of transactions aborted by a concurrent one.
const CONFLICT_SQLSTATES: &[&str] = &["40001", "40P01"];

/// Classifies a driver error so callers can map it to their own error kinds.
pub fn classify_sqlx_error(err: &sqlx::Error) -> SqlxErrorClass {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => SqlxErrorClass::Connectivity,
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => classify_sqlstate(&code),
            None => SqlxErrorClass::Query,
        },
        _ => SqlxErrorClass::Query,
    }
}

/// Classifies a SQLSTATE code.
pub fn classify_sqlstate(code: &str) -> SqlxErrorClass {
    // Class 08 is "connection exception".
    if code.starts_with("08") || UNAVAILABLE_SQLSTATES.contains(&code) {
        return SqlxErrorClass::Connectivity;
    }

    if CONFLICT_SQLSTATES.contains(&code) {
        return SqlxErrorClass::TransactionConflict;
    }

    SqlxErrorClass::Query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_exceptions_are_connectivity() {
        assert_eq!(classify_sqlstate("08006"), SqlxErrorClass::Connectivity);
        assert_eq!(classify_sqlstate("57P01"), SqlxErrorClass::Connectivity);
    }

    #[test]
    fn serialization_failures_are_conflicts() {
        assert_eq!(
            classify_sqlstate("40001"),
            SqlxErrorClass::TransactionConflict
        );
        assert_eq!(
            classify_sqlstate("40P01"),
            SqlxErrorClass::TransactionConflict
        );
    }

    #[test]
    fn unique_violation_is_a_query_error() {
        assert_eq!(classify_sqlstate("23505"), SqlxErrorClass::Query);
    }

    #[test]
    fn pool_timeouts_are_connectivity() {
        assert_eq!(
            classify_sqlx_error(&sqlx::Error::PoolTimedOut),
            SqlxErrorClass::Connectivity
        );
        assert_eq!(
            classify_sqlx_error(&sqlx::Error::RowNotFound),
            SqlxErrorClass::Query
        );
    }
}
