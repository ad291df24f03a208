// crates/formvault-core/src/runtime/control.rs
// ============================================================================
// Module: Formvault Control Plane
// Description: The external operation surface over stores, access, and hooks.
// Purpose: Expose every submission operation with explicit request context.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! The control plane composes the store, the access decider, and the
//! mutation hooks into the engine's external interface. Every operation
//! takes an explicit [`RequestContext`]; nothing is read from ambient state.
//! Mutating operations run access checks first, commit through composite
//! store calls, keep the aggregate snapshot current, and fire the
//! centralized hooks after the mutation lands.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::error::CoreError;
use crate::core::error::messages;
use crate::core::identifiers::OrgId;
use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::SubmissionId;
use crate::core::identifiers::SubmissionName;
use crate::core::identifiers::TableViewId;
use crate::core::schema::SchemaRegistry;
use crate::core::submission::RestatementRecord;
use crate::core::submission::RevisionPatch;
use crate::core::submission::SubmissionRecord;
use crate::core::submission::SubmissionStatus;
use crate::core::time::Timestamp;
use crate::interfaces::AccessDecider;
use crate::interfaces::AccessError;
use crate::interfaces::ActiveFilter;
use crate::interfaces::MutationHooks;
use crate::interfaces::NewSubmission;
use crate::interfaces::RevisionDeletion;
use crate::interfaces::StoreError;
use crate::interfaces::SubmissionStore;
use crate::runtime::composer::compose;
use crate::runtime::lock::EditLockCoordinator;
use crate::runtime::projector::FormValueProjector;
use crate::runtime::projector::strip_nulls;
use crate::runtime::revision::RevisionManager;
use crate::runtime::revision::RevisionOutcome;
use crate::runtime::rollback::RollbackCoordinator;
use crate::runtime::rollback::RollbackReport;

// ============================================================================
// SECTION: Requests and Views
// ============================================================================

/// Explicit per-request context supplied by the host.
///
/// # Invariants
/// - `now` is the host's notion of the request time; the engine never reads
///   wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Acting principal.
    pub principal: PrincipalId,
    /// Request time.
    pub now: Timestamp,
}

/// Control plane tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Strip null leaves from trees returned by reads.
    pub strip_nulls_on_read: bool,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self { strip_nulls_on_read: true }
    }
}

/// Input for creating revision 1 of a new lineage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSubmissionRequest {
    /// New lineage name.
    pub name: SubmissionName,
    /// Table view backing the lineage.
    pub table_view_id: TableViewId,
    /// Initial nested value tree.
    pub values: Value,
    /// Provenance label for the initial data.
    pub data_source: Option<String>,
    /// Organization owning the lineage.
    pub org_id: OrgId,
}

/// One revision together with its aggregate tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionView {
    /// Revision record.
    pub record: SubmissionRecord,
    /// Aggregate value tree (null-stripped when configured).
    pub data: Value,
}

/// Result of publishing the latest draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReport {
    /// The now-published revision.
    pub record: SubmissionRecord,
    /// Restatements accumulated across the lineage.
    pub restatements: Vec<RestatementRecord>,
}

// ============================================================================
// SECTION: Control Plane
// ============================================================================

/// The engine's external operation surface.
#[derive(Debug)]
pub struct ControlPlane<S, A, H> {
    /// Validated schema registry.
    registry: Arc<SchemaRegistry>,
    /// Submission store backend.
    store: S,
    /// Capability checks.
    access: A,
    /// Post-mutation hooks.
    hooks: H,
    /// Tuning knobs.
    config: ControlPlaneConfig,
}

impl<S, A, H> ControlPlane<S, A, H>
where
    S: SubmissionStore,
    A: AccessDecider,
    H: MutationHooks,
{
    /// Creates a control plane over its collaborators.
    #[must_use]
    pub const fn new(
        registry: Arc<SchemaRegistry>,
        store: S,
        access: A,
        hooks: H,
        config: ControlPlaneConfig,
    ) -> Self {
        Self { registry, store, access, hooks, config }
    }

    /// Creates revision 1 of a new lineage: active, draft, not checked out.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Forbidden`] when the principal may not create
    /// submissions for the organization, [`CoreError::Validation`] when the
    /// value tree or name is rejected, and [`CoreError::Storage`] on backend
    /// failure.
    pub fn create_submission(
        &self,
        ctx: &RequestContext,
        request: &CreateSubmissionRequest,
    ) -> Result<SubmissionRecord, CoreError> {
        let allowed = self
            .access
            .can_create(ctx.principal, request.org_id)
            .map_err(access_error)?;
        ensure_allowed(allowed)?;

        let rows = compose(&self.registry, request.table_view_id, &request.values)
            .map_err(|err| CoreError::validation("data", err.to_string()))?;
        let aggregate = FormValueProjector::new(&self.registry)
            .project(request.table_view_id, &rows)
            .map_err(|err| CoreError::validation("data", err.to_string()))?
            .values;

        let record = self
            .store
            .create_submission(NewSubmission {
                name: request.name.clone(),
                table_view_id: request.table_view_id,
                rows,
                aggregate,
                data_source: request.data_source.clone(),
                org_id: request.org_id,
                submitted_by: ctx.principal,
                created_at: ctx.now,
            })
            .map_err(store_error)?;

        self.notify(ctx, &record.name, &[record.id]);
        Ok(record)
    }

    /// Lists revisions of a lineage, newest first, optionally filtered by
    /// the active flag.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when the lineage does not exist and
    /// [`CoreError::Forbidden`] when the principal may not read it.
    pub fn list_revisions(
        &self,
        ctx: &RequestContext,
        name: &SubmissionName,
        filter: ActiveFilter,
    ) -> Result<Vec<SubmissionRecord>, CoreError> {
        let revisions = self.revisions(name)?;
        self.ensure_read(ctx.principal, &revisions[0])?;
        Ok(revisions
            .into_iter()
            .filter(|record| match filter {
                ActiveFilter::Any => true,
                ActiveFilter::ActiveOnly => record.active,
                ActiveFilter::InactiveOnly => !record.active,
            })
            .collect())
    }

    /// Returns one revision together with its aggregate tree.
    ///
    /// `revision` selects a specific revision number; `None` selects the
    /// active revision. A missing aggregate snapshot is rebuilt from the
    /// form rows and saved back (read-through).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when the lineage or revision does
    /// not exist, [`CoreError::Forbidden`] when the principal may not read
    /// it, and [`CoreError::Storage`] when the snapshot fails its integrity
    /// check or the backend fails.
    pub fn get_revision(
        &self,
        ctx: &RequestContext,
        name: &SubmissionName,
        revision: Option<u32>,
    ) -> Result<SubmissionView, CoreError> {
        let revisions = self.revisions(name)?;
        let record = match revision {
            None => revisions
                .iter()
                .find(|record| record.active)
                .ok_or_else(|| CoreError::not_found("name", messages::NO_ACTIVE_REVISION))?,
            Some(number) => revisions
                .iter()
                .find(|record| record.revision == number)
                .ok_or_else(|| CoreError::not_found("revision", messages::REVISION_NOT_FOUND))?,
        };
        self.ensure_read(ctx.principal, record)?;

        let data = match self.store.load_aggregate(record.id).map_err(store_error)? {
            Some(data) => data,
            None => {
                let rows = self.store.load_form_rows(record.id).map_err(store_error)?;
                let values = FormValueProjector::new(&self.registry)
                    .project(record.table_view_id, &rows)
                    .map_err(|err| CoreError::validation("data", err.to_string()))?
                    .values;
                self.store.save_aggregate(record.id, &values).map_err(store_error)?;
                values
            }
        };
        let data = if self.config.strip_nulls_on_read { strip_nulls(&data) } else { data };
        Ok(SubmissionView { record: record.clone(), data })
    }

    /// Applies a patch and commits it as a published revision.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError`] from access checks and the revision manager.
    pub fn create_revision(
        &self,
        ctx: &RequestContext,
        name: &SubmissionName,
        patch: &RevisionPatch,
    ) -> Result<RevisionOutcome, CoreError> {
        self.commit_patch(ctx, name, patch, SubmissionStatus::Published)
    }

    /// Applies a patch and commits it as a draft, overwriting an existing
    /// draft in place.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError`] from access checks and the revision manager.
    pub fn save_draft(
        &self,
        ctx: &RequestContext,
        name: &SubmissionName,
        patch: &RevisionPatch,
    ) -> Result<RevisionOutcome, CoreError> {
        self.commit_patch(ctx, name, patch, SubmissionStatus::Draft)
    }

    /// Publishes the latest revision, which must be a draft, and returns the
    /// lineage's accumulated restatements.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] when the latest revision is not a
    /// draft; otherwise propagates [`CoreError`] from access checks and the
    /// store.
    pub fn publish(
        &self,
        ctx: &RequestContext,
        name: &SubmissionName,
    ) -> Result<PublishReport, CoreError> {
        let revisions = self.revisions(name)?;
        let latest = &revisions[0];
        self.ensure_write(ctx.principal, latest)?;
        if !latest.is_draft() {
            return Err(CoreError::validation("name", messages::NOT_A_DRAFT));
        }

        let record = self
            .store
            .set_status(latest.id, SubmissionStatus::Published)
            .map_err(store_error)?;
        let group_id = revisions[revisions.len() - 1].id;
        let restatements = self.store.list_restatements(group_id).map_err(store_error)?;

        self.notify(ctx, name, &[record.id]);
        Ok(PublishReport { record, restatements })
    }

    /// Checks out the latest revision for editing.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError`] from access checks and the lock coordinator.
    pub fn set_edit_mode(
        &self,
        ctx: &RequestContext,
        name: &SubmissionName,
        force: bool,
    ) -> Result<SubmissionRecord, CoreError> {
        let revisions = self.revisions(name)?;
        self.ensure_write(ctx.principal, &revisions[0])?;
        let record = EditLockCoordinator::checkout(
            &self.store,
            &self.access,
            name,
            ctx.principal,
            force,
            ctx.now,
        )?;
        self.notify(ctx, name, &[record.id]);
        Ok(record)
    }

    /// Releases the edit lock held by the caller on the latest revision.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError`] from the lock coordinator.
    pub fn clear_edit_mode(
        &self,
        ctx: &RequestContext,
        name: &SubmissionName,
    ) -> Result<SubmissionRecord, CoreError> {
        let record = EditLockCoordinator::clear(&self.store, name, ctx.principal)?;
        self.notify(ctx, name, &[record.id]);
        Ok(record)
    }

    /// Rolls the active revision back to the nearest earlier one.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError`] from access checks and the rollback
    /// coordinator.
    pub fn rollback(
        &self,
        ctx: &RequestContext,
        name: &SubmissionName,
    ) -> Result<RollbackReport, CoreError> {
        let revisions = self.revisions(name)?;
        self.ensure_write(ctx.principal, &revisions[0])?;
        let report = RollbackCoordinator::rollback(&self.store, name)?;
        self.notify(ctx, name, &[report.active_id, report.prev_active_id]);
        Ok(report)
    }

    /// Deletes one revision by number; revision 1 is protected.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] for revision 1,
    /// [`CoreError::NotFound`] when the revision does not exist, and
    /// otherwise propagates [`CoreError`] from access checks and the store.
    pub fn delete_revision(
        &self,
        ctx: &RequestContext,
        name: &SubmissionName,
        revision: u32,
    ) -> Result<RevisionDeletion, CoreError> {
        if revision == 1 {
            return Err(CoreError::validation("revision", messages::FIRST_REVISION_PROTECTED));
        }
        let revisions = self.revisions(name)?;
        let record = revisions
            .iter()
            .find(|record| record.revision == revision)
            .ok_or_else(|| CoreError::not_found("revision", messages::REVISION_NOT_FOUND))?;
        self.ensure_write(ctx.principal, record)?;

        let deletion = self.store.delete_revision(record.id).map_err(store_error)?;
        let mut affected: Vec<SubmissionId> = vec![deletion.deleted.id];
        if let Some(promoted) = &deletion.promoted {
            affected.push(promoted.id);
        }
        self.notify(ctx, name, &affected);
        Ok(deletion)
    }

    /// Deletes every revision of a lineage, returning the count removed.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError`] from access checks and the store.
    pub fn delete_all_revisions(
        &self,
        ctx: &RequestContext,
        name: &SubmissionName,
    ) -> Result<u64, CoreError> {
        let revisions = self.revisions(name)?;
        self.ensure_write(ctx.principal, &revisions[0])?;
        let affected: Vec<SubmissionId> = revisions.iter().map(|record| record.id).collect();

        let deleted = self.store.delete_all(name).map_err(store_error)?;
        self.notify(ctx, name, &affected);
        Ok(deleted)
    }

    /// Reports readiness of the underlying store.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] when the store is unavailable.
    pub fn readiness(&self) -> Result<(), CoreError> {
        self.store.readiness().map_err(store_error)
    }

    // ------------------------------------------------------------------
    // Internal helpers
    // ------------------------------------------------------------------

    /// Commits a patch with the given target status and fires hooks.
    fn commit_patch(
        &self,
        ctx: &RequestContext,
        name: &SubmissionName,
        patch: &RevisionPatch,
        status: SubmissionStatus,
    ) -> Result<RevisionOutcome, CoreError> {
        let revisions = self.revisions(name)?;
        self.ensure_write(ctx.principal, &revisions[0])?;
        let manager = RevisionManager::new(&self.registry);
        let outcome = manager.update(&self.store, name, patch, ctx.principal, status, ctx.now)?;

        // Siblings were deactivated in the same commit, so all are affected.
        let affected = self
            .store
            .list_revisions(name, ActiveFilter::Any)
            .map(|records| records.into_iter().map(|record| record.id).collect::<Vec<_>>())
            .unwrap_or_else(|_| vec![outcome.record.id]);
        self.notify(ctx, name, &affected);
        Ok(outcome)
    }

    /// Loads the revisions of a lineage, newest first; never empty.
    fn revisions(&self, name: &SubmissionName) -> Result<Vec<SubmissionRecord>, CoreError> {
        let revisions = self
            .store
            .list_revisions(name, ActiveFilter::Any)
            .map_err(store_error)?;
        if revisions.is_empty() {
            return Err(CoreError::not_found("name", messages::SUBMISSION_NOT_FOUND));
        }
        Ok(revisions)
    }

    /// Enforces read access to a revision.
    fn ensure_read(
        &self,
        principal: PrincipalId,
        record: &SubmissionRecord,
    ) -> Result<(), CoreError> {
        let allowed = self.access.can_read(principal, record).map_err(access_error)?;
        ensure_allowed(allowed)
    }

    /// Enforces write access to a revision.
    fn ensure_write(
        &self,
        principal: PrincipalId,
        record: &SubmissionRecord,
    ) -> Result<(), CoreError> {
        let allowed = self.access.can_write(principal, record).map_err(access_error)?;
        ensure_allowed(allowed)
    }

    /// Fires the centralized post-mutation hooks.
    fn notify(&self, ctx: &RequestContext, name: &SubmissionName, affected: &[SubmissionId]) {
        self.hooks.on_submission_mutated(name, affected);
        self.hooks.on_principal_activity(ctx.principal, ctx.now);
    }
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Maps a store failure into the caller-facing taxonomy.
fn store_error(err: StoreError) -> CoreError {
    match err {
        StoreError::NotFound(detail) => CoreError::not_found("id", detail),
        StoreError::Conflict(detail) => CoreError::validation("name", detail),
        other => CoreError::storage(other.to_string()),
    }
}

/// Maps an access-decision failure; decisions fail closed as storage errors.
fn access_error(err: AccessError) -> CoreError {
    CoreError::storage(err.to_string())
}

/// Converts a boolean capability decision into an error when denied.
fn ensure_allowed(allowed: bool) -> Result<(), CoreError> {
    if allowed {
        Ok(())
    } else {
        Err(CoreError::forbidden("principal", messages::ACCESS_DENIED))
    }
}
