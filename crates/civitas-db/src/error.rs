use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// Pool exhausted, database busy past the timeout, or the file cannot be opened.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A UNIQUE constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("row could not be decoded: {0}")]
    Corrupt(String),

    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Column named by a UNIQUE violation, e.g. `email` for
    /// "UNIQUE constraint failed: users.email".
    pub fn conflicting_column(&self) -> Option<&str> {
        match self {
            DbError::Conflict(detail) => detail
                .rsplit_once("failed: ")
                .map(|(_, target)| target)
                .and_then(|target| target.split(',').next())
                .map(|target| target.trim())
                .map(|target| target.rsplit_once('.').map_or(target, |(_, column)| column)),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, message) = &err {
            let detail = message.clone().unwrap_or_else(|| code.to_string());
            if code.code == ErrorCode::ConstraintViolation
                && (code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
            {
                return DbError::Conflict(detail);
            }
            if matches!(code.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) {
                return DbError::Unavailable(detail);
            }
        }
        DbError::Sqlite(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicting_column_from_unique_message() {
        let err = DbError::Conflict("UNIQUE constraint failed: users.email".into());
        assert_eq!(err.conflicting_column(), Some("email"));

        let err = DbError::Conflict("UNIQUE constraint failed: users.phone_number".into());
        assert_eq!(err.conflicting_column(), Some("phone_number"));

        let err = DbError::Unavailable("pool exhausted".into());
        assert_eq!(err.conflicting_column(), None);
    }
}
