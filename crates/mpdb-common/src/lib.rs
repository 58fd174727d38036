//! MPDB Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the MPDB workspace.
//!
//! # Overview
//!
//! - **Identifiers**: canonical (lowercase) structure accessions and ordered sets of them
//! - **Error Handling**: Custom error types and result types
//! - **Checksums**: Integrity sidecars for curated output files
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use mpdb_common::{Identifier, IdentifierSet, Result};
//!
//! fn canonical(raw: &[&str]) -> Result<IdentifierSet> {
//!     raw.iter().map(|id| Identifier::new(id)).collect()
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod identifier;
pub mod logging;

// Re-export commonly used types
pub use error::{MpdbError, Result};
pub use identifier::{Identifier, IdentifierSet};
