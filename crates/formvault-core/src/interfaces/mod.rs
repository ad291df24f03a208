// crates/formvault-core/src/interfaces/mod.rs
// ============================================================================
// Module: Formvault Interfaces
// Description: Backend-agnostic interfaces for storage, access, and hooks.
// Purpose: Define the contract surfaces used by the Formvault runtime.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the engine integrates with external systems without
//! embedding backend-specific details. Storage exposes composite operations
//! so every multi-row mutation is one transaction owned by the backend.
//! Implementations must be deterministic and fail closed on missing or
//! invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::OrgId;
use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::SubmissionId;
use crate::core::identifiers::SubmissionName;
use crate::core::identifiers::TableViewId;
use crate::core::submission::Checkout;
use crate::core::submission::FormRowSet;
use crate::core::submission::NewRestatement;
use crate::core::submission::RestatementRecord;
use crate::core::submission::SubmissionRecord;
use crate::core::submission::SubmissionStatus;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Submission store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("submission store record not found: {0}")]
    NotFound(String),
    /// The operation conflicts with existing records.
    #[error("submission store conflict: {0}")]
    Conflict(String),
    /// Store I/O error.
    #[error("submission store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("submission store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("submission store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("submission store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("submission store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Store Operation Inputs
// ============================================================================

/// Filter over the active flag when listing revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveFilter {
    /// Return every revision.
    Any,
    /// Return only the active revision.
    ActiveOnly,
    /// Return only inactive revisions.
    InactiveOnly,
}

/// Input for creating revision 1 of a new lineage.
///
/// # Invariants
/// - `rows` and `aggregate` describe the same value tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    /// Lineage name; must not already exist.
    pub name: SubmissionName,
    /// Table view backing the lineage.
    pub table_view_id: TableViewId,
    /// Composed dynamic-table rows.
    pub rows: FormRowSet,
    /// Projected aggregate snapshot of `rows`.
    pub aggregate: Value,
    /// Provenance label for the initial data.
    pub data_source: Option<String>,
    /// Organization owning the lineage.
    pub org_id: OrgId,
    /// Creating principal.
    pub submitted_by: PrincipalId,
    /// Creation time.
    pub created_at: Timestamp,
}

/// Target of a revision commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Insert a new revision at `max + 1`, deactivating and releasing every
    /// sibling in the same transaction.
    NewRevision,
    /// Overwrite the identified draft revision in place.
    OverwriteDraft {
        /// Draft revision being overwritten.
        submission_id: SubmissionId,
    },
}

/// Composite atomic input for committing an edited revision.
///
/// # Invariants
/// - `rows` and `aggregate` describe the same value tree.
/// - Restatements receive store-assigned submission and group identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRevision {
    /// Lineage being committed to.
    pub name: SubmissionName,
    /// New-revision versus draft-overwrite target.
    pub mode: CommitMode,
    /// Status of the committed revision.
    pub status: SubmissionStatus,
    /// Composed dynamic-table rows replacing the target's rows.
    pub rows: FormRowSet,
    /// Projected aggregate snapshot of `rows`.
    pub aggregate: Value,
    /// Restatements produced by the edit.
    pub restatements: Vec<NewRestatement>,
    /// Principal performing the edit.
    pub author: PrincipalId,
    /// Provenance label for the edited data.
    pub data_source: Option<String>,
    /// Commit time.
    pub created_at: Timestamp,
}

/// Result of deleting one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionDeletion {
    /// The revision that was removed.
    pub deleted: SubmissionRecord,
    /// Revision promoted to active when the deleted one was active.
    pub promoted: Option<SubmissionRecord>,
}

// ============================================================================
// SECTION: Submission Store
// ============================================================================

/// Storage contract for submission revisions, rows, restatements, and
/// aggregates.
///
/// Every method that mutates more than one row must execute as a single
/// transaction: a failure anywhere rolls the whole operation back.
pub trait SubmissionStore {
    /// Lists revisions of a lineage, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list_revisions(
        &self,
        name: &SubmissionName,
        filter: ActiveFilter,
    ) -> Result<Vec<SubmissionRecord>, StoreError>;

    /// Loads one revision by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_submission(&self, id: SubmissionId) -> Result<Option<SubmissionRecord>, StoreError>;

    /// Loads the dynamic-table rows of one revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn load_form_rows(&self, id: SubmissionId) -> Result<FormRowSet, StoreError>;

    /// Creates revision 1 of a new lineage atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the name already exists, or
    /// another [`StoreError`] when persistence fails.
    fn create_submission(&self, new: NewSubmission) -> Result<SubmissionRecord, StoreError>;

    /// Commits an edited revision atomically: revision row, form rows,
    /// restatements, and aggregate together.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the target is missing or persistence
    /// fails; nothing is persisted on failure.
    fn commit_revision(&self, commit: CommitRevision) -> Result<SubmissionRecord, StoreError>;

    /// Updates the status of one revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the revision is missing or the write
    /// fails.
    fn set_status(
        &self,
        id: SubmissionId,
        status: SubmissionStatus,
    ) -> Result<SubmissionRecord, StoreError>;

    /// Updates the checkout state of one revision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the revision is missing or the write
    /// fails.
    fn set_checkout(
        &self,
        id: SubmissionId,
        checkout: Option<Checkout>,
    ) -> Result<SubmissionRecord, StoreError>;

    /// Deactivates one revision and activates another in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when either revision is missing or the write
    /// fails.
    fn swap_active(
        &self,
        deactivate: SubmissionId,
        activate: SubmissionId,
    ) -> Result<(), StoreError>;

    /// Deletes one revision, cascading its rows, restatements, and
    /// aggregate; promotes the most recent remaining revision when the
    /// deleted one was active.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the revision is missing or the delete
    /// fails.
    fn delete_revision(&self, id: SubmissionId) -> Result<RevisionDeletion, StoreError>;

    /// Deletes every revision of a lineage, returning the count removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete_all(&self, name: &SubmissionName) -> Result<u64, StoreError>;

    /// Lists restatements accumulated under a lineage group key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when listing fails.
    fn list_restatements(
        &self,
        group_id: SubmissionId,
    ) -> Result<Vec<RestatementRecord>, StoreError>;

    /// Saves the aggregate snapshot of one revision, replacing any prior
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn save_aggregate(&self, id: SubmissionId, data: &Value) -> Result<(), StoreError>;

    /// Loads the aggregate snapshot of one revision; `None` signals a miss.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when the stored snapshot fails its
    /// integrity check, or another [`StoreError`] when loading fails.
    fn load_aggregate(&self, id: SubmissionId) -> Result<Option<Value>, StoreError>;

    /// Reports store readiness for liveness/readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Access Decider
// ============================================================================

/// Access decision errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The decision backend reported an error.
    #[error("access decision error: {0}")]
    DecisionFailed(String),
}

/// Capability checks for submission operations.
///
/// Implementations own the permission model; the engine only asks the
/// questions. A failed decision fails the operation closed.
pub trait AccessDecider {
    /// Returns whether the principal may create submissions for the
    /// organization.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when the decision cannot be made.
    fn can_create(&self, principal: PrincipalId, org: OrgId) -> Result<bool, AccessError>;

    /// Returns whether the principal may read the submission.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when the decision cannot be made.
    fn can_read(
        &self,
        principal: PrincipalId,
        submission: &SubmissionRecord,
    ) -> Result<bool, AccessError>;

    /// Returns whether the principal may mutate the submission.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when the decision cannot be made.
    fn can_write(
        &self,
        principal: PrincipalId,
        submission: &SubmissionRecord,
    ) -> Result<bool, AccessError>;

    /// Returns whether the principal may take over another holder's edit
    /// lock. This is an explicit elevated capability; write access never
    /// implies it.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when the decision cannot be made.
    fn can_override_lock(&self, principal: PrincipalId) -> Result<bool, AccessError>;
}

/// Access decider permitting every action except lock overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAllAccess;

impl AccessDecider for PermitAllAccess {
    fn can_create(&self, _principal: PrincipalId, _org: OrgId) -> Result<bool, AccessError> {
        Ok(true)
    }

    fn can_read(
        &self,
        _principal: PrincipalId,
        _submission: &SubmissionRecord,
    ) -> Result<bool, AccessError> {
        Ok(true)
    }

    fn can_write(
        &self,
        _principal: PrincipalId,
        _submission: &SubmissionRecord,
    ) -> Result<bool, AccessError> {
        Ok(true)
    }

    fn can_override_lock(&self, _principal: PrincipalId) -> Result<bool, AccessError> {
        Ok(false)
    }
}

// ============================================================================
// SECTION: Mutation Hooks
// ============================================================================

/// Post-operation notification hooks.
///
/// Hooks run after the mutation has committed; they must not fail the
/// operation and are therefore infallible. Response-cache invalidation and
/// principal activity bookkeeping live behind this seam.
pub trait MutationHooks {
    /// Records activity by a principal at a point in time.
    fn on_principal_activity(&self, principal: PrincipalId, at: Timestamp);

    /// Signals that revisions of a lineage changed, listing every affected
    /// revision identifier (including deactivated siblings).
    fn on_submission_mutated(&self, name: &SubmissionName, affected: &[SubmissionId]);
}

/// Hooks implementation that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMutationHooks;

impl MutationHooks for NoopMutationHooks {
    fn on_principal_activity(&self, _principal: PrincipalId, _at: Timestamp) {}

    fn on_submission_mutated(&self, _name: &SubmissionName, _affected: &[SubmissionId]) {}
}
