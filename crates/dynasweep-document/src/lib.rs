//! Simulation document access
//!
//! Read-only typed views over the structured documents exchanged with the
//! simulator:
//! - [`Document`]: load/save with transparent gzip handling, selector lookups
//! - [`ConfigFile`]: configuration snapshots (particle count, volume, ...)
//! - [`OutputFile`]: per-stage measurement output (events, time, ...)
//! - [`validate`]: well-formedness check used to gate stage regeneration

#![allow(missing_docs)]

pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod selector;

pub use config::ConfigFile;
pub use document::{validate, Compression, Document};
pub use error::DocumentError;
pub use output::OutputFile;
pub use selector::Selector;
