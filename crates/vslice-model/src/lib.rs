//! vslice Model
//!
//! The persistent state of a migration:
//!
//! - [`Project`]: one migration request and its pipeline status
//! - [`Slice`]: an independently buildable unit produced by planning
//! - [`Checkpoint`]: which pipeline steps have completed, with their results
//!
//! Status changes for projects and slices go through explicit transition
//! tables ([`ProjectStatus::validate_transition`],
//! [`SliceStatus::validate_transition`]) so an illegal move is an error
//! instead of silent state drift.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod checkpoint;
mod error;
mod ids;
mod project;
mod slice;

pub use checkpoint::{Checkpoint, CheckpointViolation};
pub use error::TransitionError;
pub use ids::{ProjectId, SliceId};
pub use project::{ErrorContext, Project, ProjectStatus};
pub use slice::{Slice, SliceContract, SliceStatus};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
