use thiserror::Error;

/// Errors raised while parsing domain vocabulary from storage or the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Unknown database type: {0}")]
    UnknownDatabaseType(String),

    #[error("Unknown requirement level: {0}")]
    UnknownRequirement(i64),

    #[error("Unknown field status: {0}")]
    UnknownStatus(i64),

    #[error("Unknown token scope: {0}")]
    UnknownScope(String),

    #[error("Field label '{0}' is reserved")]
    ReservedLabel(String),

    #[error("Invalid value for {database_type}: {value}")]
    InvalidValue {
        database_type: &'static str,
        value: String,
    },
}
