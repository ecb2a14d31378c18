//! Quarry Store - SQLite driver for the Quarry engine
//!
//! Provides:
//! - Connection helpers that open and configure SQLite databases
//! - A SQL text builder producing parameterized statements
//! - `SqliteDriver`, an implementation of `quarry_core::Driver`

pub mod db;
pub mod driver;
pub mod errors;
pub mod sql;

// Re-export key types
pub use driver::SqliteDriver;
pub use errors::Result;
