//! Error handling for quarry-store
//!
//! Store functions return the engine's `QuarryError`; SQLite failures are
//! reported as storage errors.

use quarry_core::errors::QuarryError;

pub use quarry_core::errors::Result;

/// Create a storage error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> QuarryError {
    QuarryError::storage("sqlite", err.to_string())
}

/// Create an IO error for an on-disk database operation
pub fn io_error(operation: &str, err: std::io::Error) -> QuarryError {
    QuarryError::storage(operation, err.to_string())
}
