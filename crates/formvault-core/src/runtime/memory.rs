// crates/formvault-core/src/runtime/memory.rs
// ============================================================================
// Module: Formvault In-Memory Store
// Description: Mutex-guarded reference implementation of the submission store.
// Purpose: Back core tests and embedders that need no durability.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The in-memory store implements the full [`SubmissionStore`] contract over
//! a single mutex-guarded state map. Composite operations mutate the state
//! only after every precondition has been checked, which gives the same
//! all-or-nothing visibility as a transactional backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde_json::Value;

use crate::core::identifiers::SubmissionId;
use crate::core::identifiers::SubmissionName;
use crate::core::submission::Checkout;
use crate::core::submission::FormRowSet;
use crate::core::submission::RestatementRecord;
use crate::core::submission::SubmissionRecord;
use crate::core::submission::SubmissionStatus;
use crate::interfaces::ActiveFilter;
use crate::interfaces::CommitMode;
use crate::interfaces::CommitRevision;
use crate::interfaces::NewSubmission;
use crate::interfaces::RevisionDeletion;
use crate::interfaces::StoreError;
use crate::interfaces::SubmissionStore;

// ============================================================================
// SECTION: State
// ============================================================================

/// One stored revision with its rows and aggregate snapshot.
#[derive(Debug, Clone)]
struct StoredSubmission {
    /// Revision record.
    record: SubmissionRecord,
    /// Dynamic-table rows of the revision.
    rows: FormRowSet,
    /// Aggregate snapshot, if computed.
    aggregate: Option<Value>,
}

/// Mutable store state behind the mutex.
#[derive(Debug, Default)]
struct MemoryState {
    /// Stored revisions keyed by raw submission identifier.
    submissions: BTreeMap<u64, StoredSubmission>,
    /// Restatement rows in insertion order.
    restatements: Vec<RestatementRecord>,
    /// Last allocated submission identifier.
    last_id: u64,
}

impl MemoryState {
    /// Allocates the next submission identifier.
    fn allocate_id(&mut self) -> Result<SubmissionId, StoreError> {
        self.last_id += 1;
        SubmissionId::from_raw(self.last_id)
            .ok_or_else(|| StoreError::Invalid("identifier allocation overflowed".to_owned()))
    }

    /// Returns revisions of a lineage, newest first.
    fn lineage(&self, name: &SubmissionName) -> Vec<SubmissionRecord> {
        let mut records: Vec<SubmissionRecord> = self
            .submissions
            .values()
            .filter(|stored| stored.record.name == *name)
            .map(|stored| stored.record.clone())
            .collect();
        records.sort_by(|left, right| right.revision.cmp(&left.revision));
        records
    }

    /// Returns the identifier of revision 1 of a lineage, if present.
    fn group_id(&self, name: &SubmissionName) -> Option<SubmissionId> {
        self.submissions
            .values()
            .find(|stored| stored.record.name == *name && stored.record.revision == 1)
            .map(|stored| stored.record.id)
    }
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Mutex-guarded in-memory submission store.
#[derive(Debug, Default)]
pub struct InMemorySubmissionStore {
    /// Guarded store state.
    state: Mutex<MemoryState>,
}

impl InMemorySubmissionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, failing closed on mutex poisoning.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Store("state mutex poisoned".to_owned()))
    }
}

impl SubmissionStore for InMemorySubmissionStore {
    fn list_revisions(
        &self,
        name: &SubmissionName,
        filter: ActiveFilter,
    ) -> Result<Vec<SubmissionRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .lineage(name)
            .into_iter()
            .filter(|record| match filter {
                ActiveFilter::Any => true,
                ActiveFilter::ActiveOnly => record.active,
                ActiveFilter::InactiveOnly => !record.active,
            })
            .collect())
    }

    fn load_submission(&self, id: SubmissionId) -> Result<Option<SubmissionRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state.submissions.get(&id.get()).map(|stored| stored.record.clone()))
    }

    fn load_form_rows(&self, id: SubmissionId) -> Result<FormRowSet, StoreError> {
        let state = self.lock()?;
        state
            .submissions
            .get(&id.get())
            .map(|stored| stored.rows.clone())
            .ok_or_else(|| StoreError::NotFound(format!("submission {id}")))
    }

    fn create_submission(&self, new: NewSubmission) -> Result<SubmissionRecord, StoreError> {
        let mut state = self.lock()?;
        if state.submissions.values().any(|stored| stored.record.name == new.name) {
            return Err(StoreError::Conflict(format!(
                "submission name {} already exists",
                new.name
            )));
        }
        let id = state.allocate_id()?;
        let record = SubmissionRecord {
            id,
            name: new.name,
            revision: 1,
            table_view_id: new.table_view_id,
            active: true,
            checkout: None,
            status: Some(SubmissionStatus::Draft),
            data_source: new.data_source,
            org_id: new.org_id,
            submitted_by: new.submitted_by,
            created_at: new.created_at,
        };
        state.submissions.insert(
            id.get(),
            StoredSubmission {
                record: record.clone(),
                rows: new.rows,
                aggregate: Some(new.aggregate),
            },
        );
        Ok(record)
    }

    fn commit_revision(&self, commit: CommitRevision) -> Result<SubmissionRecord, StoreError> {
        let mut state = self.lock()?;
        match commit.mode {
            CommitMode::NewRevision => {
                let siblings = state.lineage(&commit.name);
                let Some(latest) = siblings.first() else {
                    return Err(StoreError::NotFound(format!("submission {}", commit.name)));
                };
                let template = latest.clone();
                let id = state.allocate_id()?;
                let group_id = state.group_id(&commit.name).unwrap_or(id);

                for sibling in &siblings {
                    if let Some(stored) = state.submissions.get_mut(&sibling.id.get()) {
                        stored.record.active = false;
                        stored.record.checkout = None;
                    }
                }

                let record = SubmissionRecord {
                    id,
                    name: commit.name,
                    revision: template.revision + 1,
                    table_view_id: template.table_view_id,
                    active: true,
                    checkout: Some(Checkout { principal: commit.author, at: commit.created_at }),
                    status: Some(commit.status),
                    data_source: commit.data_source,
                    org_id: template.org_id,
                    submitted_by: commit.author,
                    created_at: commit.created_at,
                };
                state.submissions.insert(
                    id.get(),
                    StoredSubmission {
                        record: record.clone(),
                        rows: commit.rows,
                        aggregate: Some(commit.aggregate),
                    },
                );
                for restatement in commit.restatements {
                    state.restatements.push(RestatementRecord {
                        submission_id: id,
                        group_id,
                        attribute_path: restatement.attribute_path,
                        previous_value: restatement.previous_value,
                        data_source: restatement.data_source,
                        reported_at: restatement.reported_at,
                        reason: restatement.reason,
                    });
                }
                Ok(record)
            }
            CommitMode::OverwriteDraft { submission_id } => {
                let group_id = state.group_id(&commit.name).unwrap_or(submission_id);
                let stored = state
                    .submissions
                    .get_mut(&submission_id.get())
                    .ok_or_else(|| StoreError::NotFound(format!("submission {submission_id}")))?;
                stored.record.status = Some(commit.status);
                stored.record.data_source = commit.data_source;
                stored.rows = commit.rows;
                stored.aggregate = Some(commit.aggregate);
                let record = stored.record.clone();
                for restatement in commit.restatements {
                    state.restatements.push(RestatementRecord {
                        submission_id,
                        group_id,
                        attribute_path: restatement.attribute_path,
                        previous_value: restatement.previous_value,
                        data_source: restatement.data_source,
                        reported_at: restatement.reported_at,
                        reason: restatement.reason,
                    });
                }
                Ok(record)
            }
        }
    }

    fn set_status(
        &self,
        id: SubmissionId,
        status: SubmissionStatus,
    ) -> Result<SubmissionRecord, StoreError> {
        let mut state = self.lock()?;
        let stored = state
            .submissions
            .get_mut(&id.get())
            .ok_or_else(|| StoreError::NotFound(format!("submission {id}")))?;
        stored.record.status = Some(status);
        Ok(stored.record.clone())
    }

    fn set_checkout(
        &self,
        id: SubmissionId,
        checkout: Option<Checkout>,
    ) -> Result<SubmissionRecord, StoreError> {
        let mut state = self.lock()?;
        let stored = state
            .submissions
            .get_mut(&id.get())
            .ok_or_else(|| StoreError::NotFound(format!("submission {id}")))?;
        stored.record.checkout = checkout;
        Ok(stored.record.clone())
    }

    fn swap_active(
        &self,
        deactivate: SubmissionId,
        activate: SubmissionId,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if !state.submissions.contains_key(&deactivate.get()) {
            return Err(StoreError::NotFound(format!("submission {deactivate}")));
        }
        if !state.submissions.contains_key(&activate.get()) {
            return Err(StoreError::NotFound(format!("submission {activate}")));
        }
        if let Some(stored) = state.submissions.get_mut(&deactivate.get()) {
            stored.record.active = false;
        }
        if let Some(stored) = state.submissions.get_mut(&activate.get()) {
            stored.record.active = true;
        }
        Ok(())
    }

    fn delete_revision(&self, id: SubmissionId) -> Result<RevisionDeletion, StoreError> {
        let mut state = self.lock()?;
        let removed = state
            .submissions
            .remove(&id.get())
            .ok_or_else(|| StoreError::NotFound(format!("submission {id}")))?;
        state.restatements.retain(|restatement| restatement.submission_id != id);

        let mut promoted = None;
        if removed.record.active {
            let candidate = state
                .lineage(&removed.record.name)
                .into_iter()
                .next()
                .map(|record| record.id);
            if let Some(candidate_id) = candidate
                && let Some(stored) = state.submissions.get_mut(&candidate_id.get())
            {
                stored.record.active = true;
                promoted = Some(stored.record.clone());
            }
        }
        Ok(RevisionDeletion { deleted: removed.record, promoted })
    }

    fn delete_all(&self, name: &SubmissionName) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let ids: Vec<u64> = state
            .submissions
            .values()
            .filter(|stored| stored.record.name == *name)
            .map(|stored| stored.record.id.get())
            .collect();
        for id in &ids {
            state.submissions.remove(id);
        }
        state
            .restatements
            .retain(|restatement| !ids.contains(&restatement.submission_id.get()));
        Ok(u64::try_from(ids.len()).unwrap_or(u64::MAX))
    }

    fn list_restatements(
        &self,
        group_id: SubmissionId,
    ) -> Result<Vec<RestatementRecord>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .restatements
            .iter()
            .filter(|restatement| restatement.group_id == group_id)
            .cloned()
            .collect())
    }

    fn save_aggregate(&self, id: SubmissionId, data: &Value) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let stored = state
            .submissions
            .get_mut(&id.get())
            .ok_or_else(|| StoreError::NotFound(format!("submission {id}")))?;
        stored.aggregate = Some(data.clone());
        Ok(())
    }

    fn load_aggregate(&self, id: SubmissionId) -> Result<Option<Value>, StoreError> {
        let state = self.lock()?;
        Ok(state.submissions.get(&id.get()).and_then(|stored| stored.aggregate.clone()))
    }
}
