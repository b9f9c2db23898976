//! Translation of `sqlx` failures into the provider-neutral [`StoreError`].

use stampcard_core::error::StoreError;

/// Map a `sqlx` error onto the store error taxonomy.
///
/// Serialization failures and deadlocks become [`StoreError::Aborted`] so
/// that `run_atomic` re-executes the transaction.
#[must_use]
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            let message = db.message().to_string();
            match code.as_str() {
                "40001" | "40P01" => StoreError::Aborted(message),
                "42501" => StoreError::PermissionDenied(message),
                "57014" => StoreError::Cancelled(message),
                "57P01" | "57P02" | "57P03" => StoreError::Unavailable(message),
                c if c.starts_with("28") => StoreError::Unauthenticated(message),
                c if c.starts_with("53") => StoreError::ResourceExhausted(message),
                c if c.starts_with("08") => StoreError::Unavailable(message),
                c if c.starts_with("23") => StoreError::FailedPrecondition(message),
                _ => StoreError::Internal(format!("database error {code}: {message}")),
            }
        },
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            StoreError::Unavailable(err.to_string())
        },
        sqlx::Error::PoolTimedOut => StoreError::DeadlineExceeded(err.to_string()),
        sqlx::Error::RowNotFound => StoreError::NotFound(err.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Internal(format!("row decode failed: {err}")),
        _ => StoreError::Internal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_failures_are_transient() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(map_sqlx_error(sqlx::Error::PoolClosed).is_transient());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(map_sqlx_error(sqlx::Error::Io(io)).is_transient());
    }

    #[test]
    fn missing_rows_are_not_found() {
        assert_eq!(map_sqlx_error(sqlx::Error::RowNotFound).code(), "not-found");
    }

    #[test]
    fn unknown_failures_are_internal() {
        let err = map_sqlx_error(sqlx::Error::Protocol("garbled".into()));
        assert_eq!(err.code(), "internal");
        assert!(!err.is_conflict());
    }
}
