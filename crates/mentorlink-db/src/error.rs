use mentorlink_types::api::Envelope;
use rusqlite::ErrorCode;
use rusqlite::ffi;
use thiserror::Error;

/// Failure of a mutating core operation.
///
/// `Display` is always safe to show to an end user: infrastructure variants
/// render a generic message and keep the underlying cause for logs only.
#[derive(Debug, Error)]
pub enum DbError {
    /// Caller-supplied input does not satisfy a precondition.
    #[error("{0}")]
    Validation(String),

    /// A uniqueness constraint rejected the write.
    #[error("{0}")]
    Conflict(Conflict),

    #[error("A database error occurred. Please try again later.")]
    Database(#[source] rusqlite::Error),

    #[error("The database is temporarily unavailable. Please try again later.")]
    Unavailable(String),
}

impl DbError {
    pub fn validation(message: impl Into<String>) -> Self {
        DbError::Validation(message.into())
    }
}

/// Which uniqueness rule a write collided with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    Email,
    RollNumber,
    /// Any other unique index; holds the `table.column` list SQLite reported.
    Other(String),
}

impl Conflict {
    /// Classify SQLite's "UNIQUE constraint failed: users.email" style detail.
    pub fn from_constraint(detail: &str) -> Self {
        let columns = detail
            .split_once(':')
            .map(|(_, cols)| cols.trim())
            .unwrap_or(detail);

        let touches = |name: &str| {
            columns
                .split(',')
                .map(|c| c.trim())
                .any(|c| c == name || c.ends_with(&format!(".{}", name)))
        };

        if touches("email") {
            Conflict::Email
        } else if touches("roll_number") {
            Conflict::RollNumber
        } else {
            Conflict::Other(columns.to_string())
        }
    }
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conflict::Email => f.write_str("Email already exists"),
            Conflict::RollNumber => f.write_str("Roll number already exists"),
            Conflict::Other(_) => f.write_str("A record with these details already exists"),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, detail) = &err {
            if code.code == ErrorCode::ConstraintViolation {
                let detail = detail.as_deref().unwrap_or_default();
                match code.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        return DbError::Conflict(Conflict::from_constraint(detail));
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                        return DbError::validation("Referenced record does not exist");
                    }
                    _ => {}
                }
            }
        }
        DbError::Database(err)
    }
}

impl From<DbError> for Envelope {
    fn from(err: DbError) -> Self {
        Envelope::failure(err.to_string())
    }
}
