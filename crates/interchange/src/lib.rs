//! formflow-interchange: typed form-structure documents.
//!
//! A form version is stored as one JSON document (stages → sections →
//! fields, plus the transition graph). This crate provides typed structs
//! for that document and a single `from_interchange()` entry point that
//! turns a `serde_json::Value` into a [`FormVersionDoc`].
//!
//! Conditions, rule props and action props stay as `serde_json::Value`
//! here; the engine parses them into its own domain types at load time.

pub mod deserialize;
pub mod types;

pub use deserialize::{from_interchange, to_interchange, InterchangeError};
pub use types::*;
