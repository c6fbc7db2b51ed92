//! PostgreSQL SQLSTATE codes and their mapping onto [`CoreError`].
//!
//! Full list: <https://www.postgresql.org/docs/current/errcodes-appendix.html>

use cinema_core::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PgErrorCode;

impl PgErrorCode {
    // =========================================================================
    // Class 23: integrity constraint violation
    // =========================================================================

    /// Unique violation - Code 23505. A lost seat race on the partial seat index.
    pub const UNIQUE_VIOLATION: &'static str = "23505";

    /// Foreign key violation - Code 23503.
    ///
    /// On insert: the row points at a screening/movie/room that does not exist.
    /// On delete: reservations still reference the row.
    pub const FOREIGN_KEY_VIOLATION: &'static str = "23503";

    /// Check violation - Code 23514 (e.g. non-positive room dimensions).
    pub const CHECK_VIOLATION: &'static str = "23514";

    #[inline]
    pub fn is_unique_violation(code: &str) -> bool {
        code == Self::UNIQUE_VIOLATION
    }

    #[inline]
    pub fn is_foreign_key_violation(code: &str) -> bool {
        code == Self::FOREIGN_KEY_VIOLATION
    }

    #[inline]
    pub fn is_check_violation(code: &str) -> bool {
        code == Self::CHECK_VIOLATION
    }
}

/// What the failed statement was doing; decides how a foreign key violation
/// is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Insert,
    Update,
    Delete,
}

/// Maps a SQLSTATE onto the domain taxonomy. `None` means the code carries no
/// domain meaning and the caller should report a generic store failure.
pub fn classify_code(code: &str, kind: StatementKind, message: &str) -> Option<CoreError> {
    if PgErrorCode::is_unique_violation(code) {
        return Some(CoreError::Conflict(message.to_string()));
    }
    if PgErrorCode::is_foreign_key_violation(code) {
        return match kind {
            StatementKind::Insert | StatementKind::Update => Some(CoreError::ValidationError(message.to_string())),
            StatementKind::Delete => Some(CoreError::Conflict(message.to_string())),
            // A read cannot violate a reference.
            StatementKind::Read => None,
        };
    }
    if PgErrorCode::is_check_violation(code) {
        return Some(CoreError::ValidationError(message.to_string()));
    }
    None
}

/// Converts any sqlx failure. Pool exhaustion and I/O errors mean the store is
/// unreachable; everything else is surfaced once, without retry.
pub fn map_sqlx(err: sqlx::Error, kind: StatementKind) -> CoreError {
    match &err {
        sqlx::Error::Database(db) => {
            if let Some(mapped) = db.code().and_then(|code| classify_code(&code, kind, db.message())) {
                return mapped;
            }
            CoreError::StoreError(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            CoreError::ServiceUnavailable(format!("Database unreachable: {}", err))
        }
        _ => CoreError::StoreError(err.to_string()),
    }
}
