//! Storage contract error taxonomy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("new sequence number {new} is not greater than the stored one {stored}")]
    SequenceNotMonotonic { stored: u64, new: u64 },

    #[error("expected sequence number {expected} does not match the stored one {stored}")]
    SequenceNotExpected { expected: u64, stored: u64 },

    #[error("cannot replace a value owned by a different public key")]
    ImmutableSubstitutionFail,

    #[error("value failed its own consistency check")]
    InvalidValue(#[from] lib_identity::ValueError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
