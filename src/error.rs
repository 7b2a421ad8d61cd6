use thiserror::Error;

use crate::models::{CleanupReport, IngestReport};

/// Failure to read a source date with the configured format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("invalid date '{input}' (expected format {format})")]
    InvalidDate { input: String, format: String },
}

/// Errors surfaced by a [`crate::store::GuestStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The insert collided with the normalized-email uniqueness constraint.
    #[error("duplicate email: {email}")]
    UniqueViolation { email: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store rejected the operation: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// Rows were processed but the final flush failed; nothing from this run is durable.
    #[error("commit failed after {} processed rows: {source}", .report.processed)]
    Commit {
        report: Box<IngestReport>,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to load guest records: {0}")]
    Load(#[source] StoreError),
    #[error("backup failed, no records were deleted: {0}")]
    Backup(#[source] StoreError),
    #[error("deletion halted after {} of {} records: {source}", .report.deleted, .report.planned)]
    PartialDeletion {
        report: Box<CleanupReport>,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum OverlapError {
    #[error("year {0} cannot be expressed as a calendar window")]
    InvalidYear(i32),
    #[error(transparent)]
    Store(#[from] StoreError),
}
