//! Core types shared across Quarry facilities
//!
//! This crate holds the canonical field keys and event names used by the
//! logging facility in `quarry-core`.

pub mod schema;
