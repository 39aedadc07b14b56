use haven_shared::types::{CrewId, FieldId};
use haven_shared::DomainError;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An attribute write referenced a field owned by another crew.
    #[error("Field {field_id} does not belong to crew {crew_id}")]
    ForeignField { field_id: FieldId, crew_id: CrewId },

    /// A payload key matched no field label of the crew.
    #[error("Unknown field label: {0}")]
    UnknownLabel(String),

    /// A link endpoint could not be matched to a person.
    #[error("No person named {full_name:?} with reference {unique_id:?}")]
    UnresolvedPerson { full_name: String, unique_id: String },

    /// A list control names a table or column outside the registry.
    #[error("Unknown lookup list: {0}")]
    UnknownLookupList(String),

    /// A stored enum could not be parsed.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// UUID parsing error.
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    /// Chrono parsing error.
    #[error("Timestamp parse error: {0}")]
    ChronoParse(#[from] chrono::ParseError),
}

impl StoreError {
    /// Translate `QueryReturnedNoRows` into [`StoreError::NotFound`] and
    /// unique constraint violations into [`StoreError::Conflict`].
    pub(crate) fn from_query(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::SqliteFailure(err, msg)
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                StoreError::Conflict(msg.unwrap_or_else(|| "unique constraint".to_string()))
            }
            other => StoreError::Sqlite(other),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
