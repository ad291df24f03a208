// crates/formvault-core/src/runtime/revision.rs
// ============================================================================
// Module: Formvault Revision Manager
// Description: Revision lifecycle: baseline projection, diff, restatements, commit.
// Purpose: Turn caller patches into atomic revision commits with restatement rows.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! The revision manager owns the hardest path of the engine: it projects the
//! latest revision into its baseline tree, classifies every patched leaf
//! (first population, semantic change, or no-op), applies the patch over the
//! baseline so untouched leaves survive, decides between overwriting a draft
//! and minting a new revision, and hands the result to the store as one
//! composite commit. Restatements are created exactly for leaves whose prior
//! value existed and differs under decimal-aware comparison.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::error::CoreError;
use crate::core::error::messages;
use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::SubmissionName;
use crate::core::schema::SchemaRegistry;
use crate::core::submission::NewRestatement;
use crate::core::submission::RevisionPatch;
use crate::core::submission::SubmissionRecord;
use crate::core::submission::SubmissionStatus;
use crate::core::time::Timestamp;
use crate::interfaces::ActiveFilter;
use crate::interfaces::CommitMode;
use crate::interfaces::CommitRevision;
use crate::interfaces::SubmissionStore;
use crate::runtime::comparator::leaf_equivalent;
use crate::runtime::composer::compose;
use crate::runtime::projector::FormValueProjector;

// ============================================================================
// SECTION: Revision Outcome
// ============================================================================

/// Result of one revision update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionOutcome {
    /// The committed revision record.
    pub record: SubmissionRecord,
    /// Number of restatements the edit produced.
    pub restatements_created: usize,
}

// ============================================================================
// SECTION: Revision Manager
// ============================================================================

/// Coordinates revision updates over a validated schema registry.
#[derive(Debug, Clone, Copy)]
pub struct RevisionManager<'a> {
    /// Validated schema registry.
    registry: &'a SchemaRegistry,
}

impl<'a> RevisionManager<'a> {
    /// Creates a revision manager over a validated registry.
    #[must_use]
    pub const fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Applies a patch over the latest revision and commits the result.
    ///
    /// The latest revision must not be checked out by a principal other than
    /// `author`; a free lineage is editable directly, and a new-revision
    /// commit assigns its checkout to the author. When the latest revision is
    /// a draft the commit overwrites it in place; otherwise a new revision is
    /// minted at `max + 1`, deactivating and releasing every sibling in the
    /// same store transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when the lineage does not exist,
    /// [`CoreError::Forbidden`] when another principal holds the edit lock,
    /// [`CoreError::Validation`] when a patch path or the resulting tree is
    /// invalid, and [`CoreError::Storage`] when persistence fails.
    pub fn update<S: SubmissionStore>(
        &self,
        store: &S,
        name: &SubmissionName,
        patch: &RevisionPatch,
        author: PrincipalId,
        status: SubmissionStatus,
        now: Timestamp,
    ) -> Result<RevisionOutcome, CoreError> {
        let revisions = store
            .list_revisions(name, ActiveFilter::Any)
            .map_err(|err| CoreError::storage(err.to_string()))?;
        let Some(latest) = revisions.first() else {
            return Err(CoreError::not_found("name", messages::SUBMISSION_NOT_FOUND));
        };
        if let Some(holder) = latest.checkout_holder()
            && holder != author
        {
            return Err(CoreError::forbidden("name", messages::CHECKED_OUT_BY_OTHER));
        }

        let rows = store
            .load_form_rows(latest.id)
            .map_err(|err| CoreError::storage(err.to_string()))?;
        let projector = FormValueProjector::new(self.registry);
        let baseline = projector
            .project(latest.table_view_id, &rows)
            .map_err(|err| CoreError::validation("data", err.to_string()))?
            .values;

        let mut restatements = Vec::new();
        let mut updated = baseline.clone();
        for entry in &patch.entries {
            let previous = entry.path.lookup(&baseline);
            let restates = previous
                .is_some_and(|prior| !prior.is_null() && !leaf_equivalent(prior, &entry.value));
            if restates
                && let Some(prior) = previous
            {
                restatements.push(NewRestatement {
                    attribute_path: entry.path.clone(),
                    previous_value: prior.clone(),
                    data_source: patch.data_source.clone(),
                    reported_at: patch.reported_at,
                    reason: entry.reason.clone(),
                });
            }
            entry
                .path
                .set(&mut updated, entry.value.clone())
                .map_err(|err| CoreError::validation(entry.path.to_string(), err.to_string()))?;
        }

        let composed = compose(self.registry, latest.table_view_id, &updated)
            .map_err(|err| CoreError::validation("data", err.to_string()))?;
        let mode = if latest.is_draft() {
            CommitMode::OverwriteDraft { submission_id: latest.id }
        } else {
            CommitMode::NewRevision
        };
        let restatements_created = restatements.len();
        let record = store
            .commit_revision(CommitRevision {
                name: name.clone(),
                mode,
                status,
                rows: composed,
                aggregate: updated,
                restatements,
                author,
                data_source: patch.data_source.clone(),
                created_at: now,
            })
            .map_err(|err| CoreError::storage(err.to_string()))?;

        Ok(RevisionOutcome { record, restatements_created })
    }
}
