// crates/formvault-core/src/lib.rs
// ============================================================================
// Module: Formvault Core Library
// Description: Submission revisioning and aggregation engine.
// Purpose: Manage revision lineages, edit locks, rollback, and projections.
// Dependencies: serde, serde_json, serde_jcs, sha2, thiserror, bigdecimal, time
// ============================================================================

//! ## Overview
//! Formvault Core manages named lineages of schema-driven submission
//! revisions: which revision is active, who holds the edit lock, what the
//! denormalized projection of a revision looks like, and which leaf values
//! were restated across edits. Storage, access decisions, and cache
//! invalidation live behind the trait seams in [`interfaces`].
//! Invariants:
//! - Revision numbers per lineage are contiguous from 1.
//! - At most one active and at most one checked-out revision per lineage.
//! - Every multi-row mutation is a single store transaction.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::AggregateRecord;
pub use crate::core::AttributePath;
pub use crate::core::AttributeType;
pub use crate::core::Checkout;
pub use crate::core::ChoiceDef;
pub use crate::core::ChoiceId;
pub use crate::core::ChoiceSetId;
pub use crate::core::ColumnDef;
pub use crate::core::ColumnDefId;
pub use crate::core::CoreError;
pub use crate::core::FormRow;
pub use crate::core::FormRowSet;
pub use crate::core::HERITABLE_SUFFIX;
pub use crate::core::MAX_SUBFORM_DEPTH;
pub use crate::core::NewRestatement;
pub use crate::core::OTHER_COLUMN_SUFFIX;
pub use crate::core::OTHER_NOT_LISTED;
pub use crate::core::OrgId;
pub use crate::core::PatchEntry;
pub use crate::core::PathError;
pub use crate::core::PrincipalId;
pub use crate::core::RestatementRecord;
pub use crate::core::RevisionPatch;
pub use crate::core::RowId;
pub use crate::core::STORAGE_DETAIL_LIMIT;
pub use crate::core::SchemaError;
pub use crate::core::SchemaRegistry;
pub use crate::core::SubmissionId;
pub use crate::core::SubmissionName;
pub use crate::core::SubmissionRecord;
pub use crate::core::hash_value;
pub use crate::core::messages;
pub use crate::core::SubmissionStatus;
pub use crate::core::TableDef;
pub use crate::core::TableDefId;
pub use crate::core::TableView;
pub use crate::core::TableViewId;
pub use crate::core::Timestamp;
pub use crate::core::TimestampParseError;
pub use crate::interfaces::AccessDecider;
pub use crate::interfaces::AccessError;
pub use crate::interfaces::ActiveFilter;
pub use crate::interfaces::CommitMode;
pub use crate::interfaces::CommitRevision;
pub use crate::interfaces::MutationHooks;
pub use crate::interfaces::NewSubmission;
pub use crate::interfaces::NoopMutationHooks;
pub use crate::interfaces::PermitAllAccess;
pub use crate::interfaces::RevisionDeletion;
pub use crate::interfaces::StoreError;
pub use crate::interfaces::SubmissionStore;
pub use crate::runtime::ComposeError;
pub use crate::runtime::ControlPlane;
pub use crate::runtime::ControlPlaneConfig;
pub use crate::runtime::CreateSubmissionRequest;
pub use crate::runtime::EditLockCoordinator;
pub use crate::runtime::FormValueProjector;
pub use crate::runtime::InMemorySubmissionStore;
pub use crate::runtime::ProjectedTree;
pub use crate::runtime::PublishReport;
pub use crate::runtime::RequestContext;
pub use crate::runtime::RevisionManager;
pub use crate::runtime::RevisionOutcome;
pub use crate::runtime::RollbackCoordinator;
pub use crate::runtime::RollbackReport;
pub use crate::runtime::SubmissionView;
pub use crate::runtime::compose;
pub use crate::runtime::leaf_equivalent;
pub use crate::runtime::strip_nulls;
