// crates/formvault-core/src/runtime/lock.rs
// ============================================================================
// Module: Formvault Edit Lock Coordinator
// Description: Advisory checkout protocol over the latest revision.
// Purpose: Serialize editing intent without blocking readers.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The edit lock is an advisory per-lineage state machine over the latest
//! revision: free, then checked out by one principal, then free again.
//! Taking over another holder's lock requires the explicit override
//! capability; write access alone never suffices. The lock carries no
//! lease: a crashed holder keeps it until an override-capable principal
//! forces a takeover. Two concurrent forced takeovers race at this layer;
//! the store write itself is atomic, so the record stays consistent and the
//! last writer wins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::error::CoreError;
use crate::core::error::messages;
use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::SubmissionName;
use crate::core::submission::Checkout;
use crate::core::submission::SubmissionRecord;
use crate::core::time::Timestamp;
use crate::interfaces::AccessDecider;
use crate::interfaces::ActiveFilter;
use crate::interfaces::SubmissionStore;

// ============================================================================
// SECTION: Edit Lock Coordinator
// ============================================================================

/// Coordinates the advisory checkout protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditLockCoordinator;

impl EditLockCoordinator {
    /// Checks out the latest revision for a principal.
    ///
    /// Re-checkout by the current holder is idempotent. A lock held by
    /// another principal is taken over only when `force` is set and the
    /// caller passes the explicit override capability check.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when the lineage does not exist and
    /// [`CoreError::Forbidden`] when the lock is held by another principal
    /// and the takeover is not authorized.
    pub fn checkout<S: SubmissionStore, A: AccessDecider>(
        store: &S,
        access: &A,
        name: &SubmissionName,
        principal: PrincipalId,
        force: bool,
        now: Timestamp,
    ) -> Result<SubmissionRecord, CoreError> {
        let latest = latest_revision(store, name)?;
        match latest.checkout_holder() {
            None => {}
            Some(holder) if holder == principal => return Ok(latest),
            Some(_) => {
                let may_override = force
                    && access
                        .can_override_lock(principal)
                        .map_err(|err| CoreError::storage(err.to_string()))?;
                if !may_override {
                    return Err(CoreError::forbidden("name", messages::CHECKED_OUT_BY_OTHER));
                }
            }
        }
        store
            .set_checkout(latest.id, Some(Checkout { principal, at: now }))
            .map_err(|err| CoreError::storage(err.to_string()))
    }

    /// Clears the checkout on the latest revision; holder only.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] when the lineage does not exist,
    /// [`CoreError::Validation`] when nothing is checked out, and
    /// [`CoreError::Forbidden`] when another principal holds the lock.
    pub fn clear<S: SubmissionStore>(
        store: &S,
        name: &SubmissionName,
        principal: PrincipalId,
    ) -> Result<SubmissionRecord, CoreError> {
        let latest = latest_revision(store, name)?;
        match latest.checkout_holder() {
            None => Err(CoreError::validation("name", messages::NOT_CHECKED_OUT)),
            Some(holder) if holder != principal => {
                Err(CoreError::forbidden("name", messages::CHECKED_OUT_BY_OTHER))
            }
            Some(_) => store
                .set_checkout(latest.id, None)
                .map_err(|err| CoreError::storage(err.to_string())),
        }
    }
}

/// Loads the latest revision of a lineage.
fn latest_revision<S: SubmissionStore>(
    store: &S,
    name: &SubmissionName,
) -> Result<SubmissionRecord, CoreError> {
    store
        .list_revisions(name, ActiveFilter::Any)
        .map_err(|err| CoreError::storage(err.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::not_found("name", messages::SUBMISSION_NOT_FOUND))
}
