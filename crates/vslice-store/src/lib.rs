//! vslice Store
//!
//! Durable state for the migration pipeline.
//!
//! - [`CheckpointStore`]: which steps completed, with per-key upsert so
//!   concurrent stage workers never clobber each other's result slot
//! - [`ProjectStore`]: projects and their planned slices
//!
//! Both come in an in-memory flavour (tests, single process) and a JSON
//! file flavour that survives a restart. A checkpoint that cannot be
//! trusted is reported as [`StoreError::CheckpointCorruption`], never
//! silently treated as empty.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod checkpoint;
mod error;
mod file;
mod project;

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use error::StoreError;
pub use file::{FileCheckpointStore, FileProjectStore};
pub use project::{MemoryProjectStore, ProjectStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
