//! Structured logging facility for Quarry
//!
//! This module provides:
//! - Single initialization point via `init(profile)`
//! - Operation-boundary macros (`log_op_start!`, `log_op_end!`, `log_op_error!`)
//! - Test capture mode for deterministic assertions
//!
//! # Usage
//!
//! ```rust
//! use quarry_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```
//!
//! Public engine operations (`define_model`, `save`, `destroy`, `find`,
//! `transaction`, `migrate`) own their start/end boundary. Drivers and the
//! expression engine only emit `debug`/`trace` events.

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
