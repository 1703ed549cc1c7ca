//! Conversions from external infrastructure errors into domain errors.

use outpost_domain::OutpostError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub OutpostError);

impl From<InfraError> for OutpostError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<OutpostError> for InfraError {
    fn from(value: OutpostError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoOutpostError {
    fn into_outpost(self) -> OutpostError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → OutpostError */
/* -------------------------------------------------------------------------- */

impl IntoOutpostError for SqlError {
    fn into_outpost(self) -> OutpostError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match err.code {
                    ErrorCode::DatabaseBusy => OutpostError::Storage("database is busy".into()),
                    ErrorCode::DatabaseLocked => OutpostError::Storage("database is locked".into()),
                    ErrorCode::DiskFull => OutpostError::Storage("disk is full".into()),
                    ErrorCode::ReadOnly => OutpostError::Storage("database is read-only".into()),
                    ErrorCode::CannotOpen => {
                        OutpostError::Storage(format!("unable to open database: {message}"))
                    }
                    _ => OutpostError::Storage(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => OutpostError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                OutpostError::Storage(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                OutpostError::Storage(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => OutpostError::Storage("invalid UTF-8 returned from sqlite".into()),
            RE::InvalidPath(path) => OutpostError::Config(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => OutpostError::Storage(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_outpost())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → OutpostError */
/* -------------------------------------------------------------------------- */

impl IntoOutpostError for r2d2::Error {
    fn into_outpost(self) -> OutpostError {
        OutpostError::Storage(format!("connection pool error: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_outpost())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → OutpostError */
/* -------------------------------------------------------------------------- */

impl IntoOutpostError for HttpError {
    fn into_outpost(self) -> OutpostError {
        if self.is_timeout() {
            return OutpostError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return OutpostError::Network("HTTP connection failure".into());
        }

        if self.is_builder() {
            return OutpostError::Config(format!("invalid HTTP client configuration: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));
            return match code {
                404 => OutpostError::NotFound(message),
                400..=499 => OutpostError::InvalidInput(message),
                _ => OutpostError::Network(message),
            };
        }

        OutpostError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_outpost())
    }
}

/* -------------------------------------------------------------------------- */
/* tokio::task::JoinError → OutpostError */
/* -------------------------------------------------------------------------- */

impl IntoOutpostError for JoinError {
    fn into_outpost(self) -> OutpostError {
        if self.is_cancelled() {
            OutpostError::Internal("blocking task was cancelled".into())
        } else {
            OutpostError::Internal(format!("blocking task panicked: {self}"))
        }
    }
}

impl From<JoinError> for InfraError {
    fn from(value: JoinError) -> Self {
        InfraError(value.into_outpost())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
