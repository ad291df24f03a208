// crates/formvault-core/src/runtime/mod.rs
// ============================================================================
// Module: Formvault Runtime
// Description: Engine logic over the core model and interface seams.
// Purpose: Project, compose, revise, lock, roll back, and expose operations.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The runtime holds the engine logic: the leaf comparator, the projection
//! and composition passes over the schema registry, the revision manager,
//! the edit-lock and rollback coordinators, the control plane tying them to
//! the interface seams, and the in-memory reference store.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod comparator;
pub mod composer;
pub mod control;
pub mod lock;
pub mod memory;
pub mod projector;
pub mod revision;
pub mod rollback;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::runtime::comparator::leaf_equivalent;
pub use crate::runtime::composer::ComposeError;
pub use crate::runtime::composer::compose;
pub use crate::runtime::control::ControlPlane;
pub use crate::runtime::control::ControlPlaneConfig;
pub use crate::runtime::control::CreateSubmissionRequest;
pub use crate::runtime::control::PublishReport;
pub use crate::runtime::control::RequestContext;
pub use crate::runtime::control::SubmissionView;
pub use crate::runtime::lock::EditLockCoordinator;
pub use crate::runtime::memory::InMemorySubmissionStore;
pub use crate::runtime::projector::FormValueProjector;
pub use crate::runtime::projector::ProjectedTree;
pub use crate::runtime::projector::ProjectionError;
pub use crate::runtime::projector::strip_nulls;
pub use crate::runtime::revision::RevisionManager;
pub use crate::runtime::revision::RevisionOutcome;
pub use crate::runtime::rollback::RollbackCoordinator;
pub use crate::runtime::rollback::RollbackReport;
