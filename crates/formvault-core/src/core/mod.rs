// crates/formvault-core/src/core/mod.rs
// ============================================================================
// Module: Formvault Core Model
// Description: Canonical data model for submissions, schemas, and paths.
// Purpose: Define the shared vocabulary used across interfaces and runtime.
// Dependencies: serde, serde_json, serde_jcs, sha2, thiserror
// ============================================================================

//! ## Overview
//! The core model defines the persisted and request-level vocabulary of the
//! engine: identifiers, timestamps, the validated schema registry, submission
//! and restatement records, typed attribute paths, canonical hashing, and the
//! caller-facing error taxonomy. Runtime logic lives under `crate::runtime`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod hashing;
pub mod identifiers;
pub mod path;
pub mod schema;
pub mod submission;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::error::CoreError;
pub use crate::core::error::STORAGE_DETAIL_LIMIT;
pub use crate::core::error::messages;
pub use crate::core::hashing::HashingError;
pub use crate::core::hashing::canonical_json_bytes;
pub use crate::core::hashing::hash_bytes;
pub use crate::core::hashing::hash_value;
pub use crate::core::identifiers::ChoiceId;
pub use crate::core::identifiers::ChoiceSetId;
pub use crate::core::identifiers::ColumnDefId;
pub use crate::core::identifiers::OrgId;
pub use crate::core::identifiers::PrincipalId;
pub use crate::core::identifiers::RowId;
pub use crate::core::identifiers::SubmissionId;
pub use crate::core::identifiers::SubmissionName;
pub use crate::core::identifiers::TableDefId;
pub use crate::core::identifiers::TableViewId;
pub use crate::core::path::AttributePath;
pub use crate::core::path::PathError;
pub use crate::core::path::PathSegment;
pub use crate::core::path::RowSelector;
pub use crate::core::schema::AttributeType;
pub use crate::core::schema::ChoiceDef;
pub use crate::core::schema::ColumnDef;
pub use crate::core::schema::HERITABLE_SUFFIX;
pub use crate::core::schema::MAX_SUBFORM_DEPTH;
pub use crate::core::schema::OTHER_COLUMN_SUFFIX;
pub use crate::core::schema::OTHER_NOT_LISTED;
pub use crate::core::schema::SchemaError;
pub use crate::core::schema::SchemaRegistry;
pub use crate::core::schema::TableDef;
pub use crate::core::schema::TableView;
pub use crate::core::submission::AggregateRecord;
pub use crate::core::submission::Checkout;
pub use crate::core::submission::FormRow;
pub use crate::core::submission::FormRowSet;
pub use crate::core::submission::NewRestatement;
pub use crate::core::submission::PatchEntry;
pub use crate::core::submission::RestatementRecord;
pub use crate::core::submission::RevisionPatch;
pub use crate::core::submission::SubmissionRecord;
pub use crate::core::submission::SubmissionStatus;
pub use crate::core::time::Timestamp;
pub use crate::core::time::TimestampParseError;
