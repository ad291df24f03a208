// crates/formvault-core/src/runtime/rollback.rs
// ============================================================================
// Module: Formvault Rollback Coordinator
// Description: Point-in-time rollback of the active revision pointer.
// Purpose: Atomically retarget the active flag to the nearest earlier revision.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Rollback scans a lineage newest-first, finds the active revision, then
//! the nearest earlier revision, and swaps the active flag between them in
//! one store transaction. When either endpoint is missing nothing is
//! committed and the original active flag stays intact.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::CoreError;
use crate::core::error::messages;
use crate::core::identifiers::SubmissionId;
use crate::core::identifiers::SubmissionName;
use crate::interfaces::ActiveFilter;
use crate::interfaces::SubmissionStore;

// ============================================================================
// SECTION: Rollback Report
// ============================================================================

/// Result of a successful rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    /// Identifier of the newly active revision.
    pub active_id: SubmissionId,
    /// Revision number of the newly active revision.
    pub active_revision: u32,
    /// Identifier of the previously active revision.
    pub prev_active_id: SubmissionId,
    /// Revision number of the previously active revision.
    pub prev_active_revision: u32,
}

// ============================================================================
// SECTION: Rollback Coordinator
// ============================================================================

/// Coordinates active-pointer rollback for a lineage.
#[derive(Debug, Clone, Copy, Default)]
pub struct RollbackCoordinator;

impl RollbackCoordinator {
    /// Rolls the active revision back to the nearest earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when the lineage has no active
    /// revision or no earlier revision exists; the active flag is untouched
    /// in both cases. Returns [`CoreError::Storage`] when the swap fails.
    pub fn rollback<S: SubmissionStore>(
        store: &S,
        name: &SubmissionName,
    ) -> Result<RollbackReport, CoreError> {
        let revisions = store
            .list_revisions(name, ActiveFilter::Any)
            .map_err(|err| CoreError::storage(err.to_string()))?;
        let active_pos = revisions
            .iter()
            .position(|record| record.active)
            .ok_or_else(|| CoreError::not_found("name", messages::NO_ACTIVE_REVISION))?;
        let active = &revisions[active_pos];
        let target = revisions
            .get(active_pos + 1)
            .ok_or_else(|| CoreError::not_found("name", messages::NO_ROLLBACK_TARGET))?;

        store
            .swap_active(active.id, target.id)
            .map_err(|err| CoreError::storage(err.to_string()))?;

        Ok(RollbackReport {
            active_id: target.id,
            active_revision: target.revision,
            prev_active_id: active.id,
            prev_active_revision: active.revision,
        })
    }
}
