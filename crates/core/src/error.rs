/// Errors produced by the HMIS domain core.
///
/// Variants are deliberately granular so that callers (API layer, CLI) can map
/// them to the right surface behaviour: validation failures become per-field
/// 422s, missing records become 404s, everything else is a 500.
#[derive(Debug, thiserror::Error)]
pub enum HmisError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid value for {field}: {value}")]
    InvalidEnum { field: String, value: String },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("duplicate {field}: {value}")]
    Duplicate { field: &'static str, value: String },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },
    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to hash password: {0}")]
    PasswordHash(String),
}

impl HmisError {
    /// Shorthand for a not-found error on an integer primary key.
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        HmisError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True when a rusqlite error is a UNIQUE constraint violation.
    pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

pub type HmisResult<T> = std::result::Result<T, HmisError>;
