//! Domain-specific error types for the state processor.
//!
//! Only genuinely recoverable conditions are expressed as errors.  Invalid
//! moves are not errors (they are logged and dropped, consensus demands the
//! block still processes), and broken internal invariants — including
//! undecodable record blobs — are panics, since the state cannot be
//! processed deterministically without them.

use thiserror::Error;

/// Errors from opening or bootstrapping the backing store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
