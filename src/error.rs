//! Centralized error types for mailbundle.

use thiserror::Error;

/// Errors that abort an archive build.
///
/// Everything else (fetch failures, preview failures, bad dates) degrades
/// gracefully and is observable only through logs and the
/// [`ArchiveSummary`](crate::archive::ArchiveSummary).
#[derive(Error, Debug)]
pub enum BundleError {
    /// The caller supplied an empty selection — nothing to archive.
    #[error("no messages selected for export")]
    EmptySelection,

    /// A selected item failed shape validation before processing started.
    #[error("invalid selected item '{message_id}': {reason}")]
    InvalidItem { message_id: String, reason: String },

    /// The archive sink failed (e.g. the consumer disconnected).
    #[error("archive sink error: {0}")]
    Sink(#[from] std::io::Error),

    /// The ZIP writer failed.
    #[error("archive write error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Convenience alias for `Result<T, BundleError>`.
pub type Result<T> = std::result::Result<T, BundleError>;
